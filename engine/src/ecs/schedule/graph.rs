//! Conflict analysis: declared system access in, dependency DAG out.
//!
//! Two systems conflict when one writes a component the other touches, or
//! when either is exclusive. Every conflict becomes a directed edge,
//! oriented by the systems' defined order with registration order breaking
//! ties, so the orientation is a total order and conflict edges alone can
//! never form a cycle. Explicit `order_before` constraints are merged in
//! as hard edges whether or not the pair conflicts; only those can create
//! a cycle, which is a fatal registration error.
//!
//! Conflicts are judged from declared access sets alone, once, at build
//! time. Refining by matched archetypes was considered and rejected: the
//! graph is built before most entities exist, and an edge dropped because
//! two populations happened to be disjoint at build time would become a
//! data race the first tick they overlap.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::ecs::component::Registry;
use crate::ecs::system::System;
use crate::ecs::view::Access;

/// The "must complete before" relation over registered systems, plus a
/// topological order proving it is acyclic.
///
/// Nodes are system indices in registration order. The executor expands
/// each node into its parallel shards at submit time; shards share the
/// logical system's edges.
pub(crate) struct DependencyGraph {
    /// Successors per system, sorted, no duplicates.
    successors: Vec<Vec<usize>>,

    /// Predecessor count per system; the executor's per-tick reset value.
    indegree: Vec<usize>,

    /// One valid topological order, smallest index first among ready sets.
    topo: Vec<usize>,
}

impl DependencyGraph {
    /// Analyze `systems` and build the DAG.
    ///
    /// # Panics
    /// Panics when a system touches a component another system's exclusive
    /// view claims, when a constraint names an unknown system, or when the
    /// constraints force a cycle. All three are registration bugs.
    pub(crate) fn build(
        systems: &[Arc<System>],
        registry: &Registry,
        constraints: &[(String, String)],
    ) -> Self {
        let accesses: Vec<Access> = systems
            .iter()
            .map(|system| system.access(registry))
            .collect();
        assert_claims(systems, &accesses, registry);

        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); systems.len()];
        for first in 0..systems.len() {
            for second in first + 1..systems.len() {
                if !accesses[first].conflicts_with(&accesses[second]) {
                    continue;
                }
                // Lower (defined_order, registration index) runs first.
                let first_key = (systems[first].defined_order(), first);
                let second_key = (systems[second].defined_order(), second);
                if first_key < second_key {
                    successors[first].push(second);
                } else {
                    successors[second].push(first);
                }
            }
        }

        for (before, after) in constraints {
            let before = index_of(systems, before);
            let after = index_of(systems, after);
            successors[before].push(after);
        }

        for list in &mut successors {
            list.sort_unstable();
            list.dedup();
        }

        let mut indegree = vec![0usize; systems.len()];
        for list in &successors {
            for &target in list {
                indegree[target] += 1;
            }
        }

        let topo = topological_order(systems, &successors, &indegree);
        Self {
            successors,
            indegree,
            topo,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.successors.len()
    }

    #[inline]
    pub(crate) fn successors(&self, system: usize) -> &[usize] {
        &self.successors[system]
    }

    #[inline]
    pub(crate) fn indegree(&self) -> &[usize] {
        &self.indegree
    }

    /// A valid topological order over all systems.
    #[inline]
    pub(crate) fn topo(&self) -> &[usize] {
        &self.topo
    }

    /// Systems with no predecessors, in index order.
    pub(crate) fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.indegree
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count == 0)
            .map(|(system, _)| system)
    }

    /// Whether a system has no successors.
    #[inline]
    pub(crate) fn is_leaf(&self, system: usize) -> bool {
        self.successors[system].is_empty()
    }
}

/// Exclusive views are ownership claims: reject any other system touching
/// a claimed component, edge or no edge.
fn assert_claims(systems: &[Arc<System>], accesses: &[Access], registry: &Registry) {
    for (owner, access) in accesses.iter().enumerate() {
        if access.claims().is_empty() {
            continue;
        }
        for (other, other_access) in accesses.iter().enumerate() {
            if other == owner {
                continue;
            }
            for id in access.claims().ids() {
                if other_access.touches(id) {
                    let component = registry
                        .info(id)
                        .map(|info| info.name())
                        .unwrap_or("<unregistered>");
                    panic!(
                        "system '{}' touches component {} claimed exclusively by system '{}'",
                        systems[other].name(),
                        component,
                        systems[owner].name(),
                    );
                }
            }
        }
    }
}

fn index_of(systems: &[Arc<System>], name: &str) -> usize {
    systems
        .iter()
        .position(|system| system.name() == name)
        .unwrap_or_else(|| panic!("order constraint names unknown system '{name}'"))
}

/// Kahn's algorithm, popping the smallest ready index so the order is
/// deterministic. Panics with the offending cycle when one exists.
fn topological_order(
    systems: &[Arc<System>],
    successors: &[Vec<usize>],
    indegree: &[usize],
) -> Vec<usize> {
    let mut remaining = indegree.to_vec();
    let mut ready: BinaryHeap<Reverse<usize>> = remaining
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count == 0)
        .map(|(system, _)| Reverse(system))
        .collect();

    let mut order = Vec::with_capacity(systems.len());
    while let Some(Reverse(system)) = ready.pop() {
        order.push(system);
        for &target in &successors[system] {
            remaining[target] -= 1;
            if remaining[target] == 0 {
                ready.push(Reverse(target));
            }
        }
    }

    if order.len() < systems.len() {
        let stuck: Vec<bool> = remaining.iter().map(|&count| count > 0).collect();
        let cycle = find_cycle(successors, &stuck);
        let mut names: Vec<&str> = cycle
            .iter()
            .map(|&system| systems[system].name())
            .collect();
        if let Some(first) = names.first().copied() {
            names.push(first);
        }
        panic!(
            "system ordering contains a cycle: {}",
            names.join(" -> "),
        );
    }
    order
}

/// Walk the unorderable subgraph depth-first until an edge closes back on
/// the active path; that path segment is a cycle.
fn find_cycle(successors: &[Vec<usize>], stuck: &[bool]) -> Vec<usize> {
    const FRESH: u8 = 0;
    const ACTIVE: u8 = 1;
    const DONE: u8 = 2;

    let mut state = vec![FRESH; successors.len()];
    for start in (0..successors.len()).filter(|&system| stuck[system]) {
        if state[start] != FRESH {
            continue;
        }
        // (node, next successor slot) frames; path mirrors the stack.
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        let mut path: Vec<usize> = vec![start];
        state[start] = ACTIVE;

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let mut closed: Option<usize> = None;
            let mut descend: Option<usize> = None;
            while frame.1 < successors[node].len() {
                let target = successors[node][frame.1];
                frame.1 += 1;
                if !stuck[target] || state[target] == DONE {
                    continue;
                }
                if state[target] == ACTIVE {
                    closed = Some(target);
                } else {
                    descend = Some(target);
                }
                break;
            }

            if let Some(target) = closed {
                let begin = path.iter().position(|&on_path| on_path == target);
                if let Some(begin) = begin {
                    return path[begin..].to_vec();
                }
            } else if let Some(target) = descend {
                state[target] = ACTIVE;
                stack.push((target, 0));
                path.push(target);
            } else {
                state[node] = DONE;
                stack.pop();
                path.pop();
            }
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::system::Ctx;
    use crate::ecs::view::View;

    struct Position;
    impl crate::ecs::component::Component for Position {}

    struct Velocity;
    impl crate::ecs::component::Component for Velocity {}

    struct Health;
    impl crate::ecs::component::Component for Health {}

    fn noop() -> impl Fn(&mut Ctx<'_>) + Send + Sync + 'static {
        |_ctx| {}
    }

    fn system(name: &str, view: View) -> Arc<System> {
        Arc::new(System::new(name, vec![Arc::new(view)], noop()))
    }

    fn reachable(graph: &DependencyGraph, from: usize, to: usize) -> bool {
        let mut frontier = vec![from];
        let mut seen = vec![false; graph.len()];
        while let Some(node) = frontier.pop() {
            if node == to {
                return true;
            }
            for &next in graph.successors(node) {
                if !seen[next] {
                    seen[next] = true;
                    frontier.push(next);
                }
            }
        }
        false
    }

    #[test]
    fn conflicting_systems_get_a_path_in_exactly_one_direction() {
        // Given - both write Position
        let registry = Registry::new();
        let systems = vec![
            system("first", View::new().writes::<Position>()),
            system("second", View::new().writes::<Position>()),
        ];

        // When
        let graph = DependencyGraph::build(&systems, &registry, &[]);

        // Then - registration order orients the edge
        assert!(reachable(&graph, 0, 1));
        assert!(!reachable(&graph, 1, 0));
    }

    #[test]
    fn readers_of_the_same_component_stay_independent() {
        // Given
        let registry = Registry::new();
        let systems = vec![
            system("left", View::new().reads::<Position>()),
            system("right", View::new().reads::<Position>()),
        ];

        // When
        let graph = DependencyGraph::build(&systems, &registry, &[]);

        // Then
        assert!(graph.successors(0).is_empty());
        assert!(graph.successors(1).is_empty());
        assert_eq!(graph.roots().count(), 2);
    }

    #[test]
    fn defined_order_overrides_registration_order() {
        // Given - registered late but ordered early
        let registry = Registry::new();
        let systems = vec![
            Arc::new(
                System::new(
                    "late",
                    vec![Arc::new(View::new().writes::<Position>())],
                    noop(),
                )
                .order(20),
            ),
            Arc::new(
                System::new(
                    "early",
                    vec![Arc::new(View::new().writes::<Position>())],
                    noop(),
                )
                .order(10),
            ),
        ];

        // When
        let graph = DependencyGraph::build(&systems, &registry, &[]);

        // Then - the lower order runs first
        assert!(reachable(&graph, 1, 0));
        assert!(!reachable(&graph, 0, 1));
        assert_eq!(graph.topo(), &[1, 0]);
    }

    #[test]
    fn a_write_chain_orders_end_to_end() {
        // Given - integrate writes what collide reads, collide writes what
        // report reads
        let registry = Registry::new();
        let systems = vec![
            system("integrate", View::new().writes::<Position>()),
            system(
                "collide",
                View::new().reads::<Position>().writes::<Health>(),
            ),
            system("report", View::new().reads::<Health>()),
        ];

        // When
        let graph = DependencyGraph::build(&systems, &registry, &[]);

        // Then - a chain, with no direct integrate/report edge
        assert_eq!(graph.topo(), &[0, 1, 2]);
        assert!(reachable(&graph, 0, 2));
        assert!(!graph.successors(0).contains(&2));
        assert_eq!(graph.indegree(), &[0, 1, 1]);
    }

    #[test]
    fn disjoint_footprints_share_no_edges() {
        // Given
        let registry = Registry::new();
        let systems = vec![
            system("movement", View::new().writes::<Position>()),
            system("vitality", View::new().writes::<Health>()),
            system("steering", View::new().writes::<Velocity>()),
        ];

        // When
        let graph = DependencyGraph::build(&systems, &registry, &[]);

        // Then - everything is a root and a leaf
        assert_eq!(graph.roots().count(), 3);
        for index in 0..3 {
            assert!(graph.is_leaf(index));
        }
    }

    #[test]
    fn exclusive_systems_serialize_against_everything() {
        // Given - teardown shares no components with the others
        let registry = Registry::new();
        let systems = vec![
            system("movement", View::new().writes::<Position>()),
            Arc::new(System::new("teardown", Vec::new(), noop()).exclusive()),
            system("vitality", View::new().writes::<Health>()),
        ];

        // When
        let graph = DependencyGraph::build(&systems, &registry, &[]);

        // Then - edges into and out of the exclusive node
        assert!(reachable(&graph, 0, 1));
        assert!(reachable(&graph, 1, 2));
        assert!(!reachable(&graph, 2, 0));
    }

    #[test]
    fn explicit_constraints_bind_unrelated_systems() {
        // Given - no access conflict between the two
        let registry = Registry::new();
        let systems = vec![
            system("movement", View::new().writes::<Position>()),
            system("vitality", View::new().writes::<Health>()),
        ];
        let constraints = vec![("vitality".to_string(), "movement".to_string())];

        // When
        let graph = DependencyGraph::build(&systems, &registry, &constraints);

        // Then - a hard edge, against registration order
        assert!(reachable(&graph, 1, 0));
        assert_eq!(graph.topo(), &[1, 0]);
    }

    #[test]
    #[should_panic(expected = "system ordering contains a cycle")]
    fn contradictory_constraints_panic() {
        // Given - the conflict edge says first -> second, the constraint
        // says the opposite
        let registry = Registry::new();
        let systems = vec![
            system("first", View::new().writes::<Position>()),
            system("second", View::new().writes::<Position>()),
        ];
        let constraints = vec![("second".to_string(), "first".to_string())];

        // When
        let _ = DependencyGraph::build(&systems, &registry, &constraints);
    }

    #[test]
    #[should_panic(expected = "unknown system 'missing'")]
    fn constraints_on_unknown_systems_panic() {
        // Given
        let registry = Registry::new();
        let systems = vec![system("movement", View::new().writes::<Position>())];
        let constraints = vec![("movement".to_string(), "missing".to_string())];

        // When
        let _ = DependencyGraph::build(&systems, &registry, &constraints);
    }

    #[test]
    #[should_panic(expected = "claimed exclusively by system 'panel'")]
    fn touching_a_claimed_component_panics() {
        // Given - panel owns Health outright, vitality still writes it
        let registry = Registry::new();
        let systems = vec![
            system("panel", View::new().writes::<Health>().exclusive()),
            system("vitality", View::new().writes::<Health>()),
        ];

        // When
        let _ = DependencyGraph::build(&systems, &registry, &[]);
    }

    #[test]
    fn a_claim_alone_is_not_a_conflict() {
        // Given - the claimed component is touched by nobody else
        let registry = Registry::new();
        let systems = vec![
            system("panel", View::new().writes::<Health>().exclusive()),
            system("movement", View::new().writes::<Position>()),
        ];

        // When
        let graph = DependencyGraph::build(&systems, &registry, &[]);

        // Then - independent
        assert_eq!(graph.roots().count(), 2);
    }

    #[test]
    fn every_build_yields_a_complete_topological_order() {
        // Given - a denser mix of readers and writers
        let registry = Registry::new();
        let systems = vec![
            system("a", View::new().writes::<Position>().reads::<Velocity>()),
            system("b", View::new().writes::<Velocity>()),
            system("c", View::new().reads::<Position>().writes::<Health>()),
            system("d", View::new().reads::<Health>().reads::<Velocity>()),
            system("e", View::new().reads::<Position>()),
        ];

        // When
        let graph = DependencyGraph::build(&systems, &registry, &[]);

        // Then - all systems ordered, and every edge points forward
        assert_eq!(graph.topo().len(), 5);
        let mut position = vec![0usize; 5];
        for (slot, &node) in graph.topo().iter().enumerate() {
            position[node] = slot;
        }
        for node in 0..5 {
            for &next in graph.successors(node) {
                assert!(position[node] < position[next]);
            }
        }
    }
}
