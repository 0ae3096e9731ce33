//! DOT rendering of the dependency graph.
//!
//! The exported text is a compatibility surface consumed by external
//! tooling and pinned by a golden test: octagon `start` and `end` anchors,
//! one box node per system labeled with its name, `start -> {roots}`, and
//! one `task -> {successors}` line per system, with `{end}` standing in for
//! leaves. Shard expansion is an executor detail and does not appear here.

use std::sync::Arc;

use crate::ecs::schedule::graph::DependencyGraph;
use crate::ecs::system::System;

/// Render the graph as a DOT document.
pub(crate) fn render(systems: &[Arc<System>], graph: &DependencyGraph) -> String {
    let ids: Vec<String> = systems.iter().map(|system| node_id(system.name())).collect();

    let mut out = String::new();
    out.push_str("digraph jobgraph {\n");
    out.push_str("    start [shape=octagon];\n");
    out.push_str("    end [shape=octagon];\n");
    for (index, system) in systems.iter().enumerate() {
        out.push_str(&format!(
            "    {} [shape=box, label=\"{}\"];\n",
            ids[index],
            escape_label(system.name()),
        ));
    }

    if !systems.is_empty() {
        let roots: Vec<&str> = graph.roots().map(|index| ids[index].as_str()).collect();
        out.push_str(&format!("    start -> {{{}}};\n", roots.join(", ")));
        for index in 0..systems.len() {
            if graph.is_leaf(index) {
                out.push_str(&format!("    {} -> {{end}};\n", ids[index]));
            } else {
                let children: Vec<&str> = graph
                    .successors(index)
                    .iter()
                    .map(|&child| ids[child].as_str())
                    .collect();
                out.push_str(&format!(
                    "    {} -> {{{}}};\n",
                    ids[index],
                    children.join(", "),
                ));
            }
        }
    }
    out.push_str("}\n");
    out
}

/// DOT identifier for a system: `task_` plus the name with anything outside
/// `[A-Za-z0-9_]` squashed to an underscore.
fn node_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len() + 5);
    id.push_str("task_");
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            id.push(ch);
        } else {
            id.push('_');
        }
    }
    id
}

fn escape_label(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}
