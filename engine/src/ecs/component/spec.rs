use crate::{
    all_tuples,
    ecs::component::{Component, Id, Registry},
};

/// Sorted, deduplicated set of component ids.
///
/// A spec names a component combination: the full set attached to an entity
/// or archetype, or the subset an operation adds, removes, or requires.
/// Keeping the ids sorted makes equal sets compare and hash equal, so a
/// spec works directly as an archetype-map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Spec {
    ids: Vec<Id>,
}

impl Spec {
    /// The spec with no components.
    pub const EMPTY: Self = Spec { ids: Vec::new() };

    /// Build a spec from ids in any order, collapsing duplicates.
    #[inline]
    pub fn new(ids: impl Into<Vec<Id>>) -> Self {
        let mut ids = ids.into();
        ids.sort();
        ids.dedup();
        ids.shrink_to_fit();

        Self { ids }
    }

    /// The ids, ascending.
    #[inline]
    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    /// Number of distinct components named.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no components are named.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `id` is named by this spec.
    #[inline]
    pub fn contains(&self, id: Id) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Whether every id in `other` is also named here. Archetype matching
    /// runs through this.
    #[inline]
    pub fn contains_all(&self, other: &Spec) -> bool {
        other.ids.iter().all(|id| self.contains(*id))
    }

    /// Whether at least one id in `other` is named here.
    #[inline]
    pub fn contains_any(&self, other: &Spec) -> bool {
        other.ids.iter().any(|id| self.contains(*id))
    }

    /// Ids in either spec. Migration target when components are inserted.
    #[inline]
    pub fn union(&self, other: &Spec) -> Self {
        let mut ids = Vec::with_capacity(self.ids.len() + other.ids.len());
        ids.extend_from_slice(&self.ids);
        ids.extend_from_slice(&other.ids);
        Self::new(ids)
    }

    /// Ids named here but not in `other`. Migration target when components
    /// are removed.
    #[inline]
    pub fn difference(&self, other: &Spec) -> Self {
        let ids: Vec<_> = self
            .ids
            .iter()
            .copied()
            .filter(|id| !other.contains(*id))
            .collect();
        // Filtering a sorted vec leaves it sorted
        Self { ids }
    }

    /// Ids named in both specs. Selects the columns that survive a
    /// migration.
    #[inline]
    pub fn intersection(&self, other: &Spec) -> Self {
        let ids: Vec<_> = self
            .ids
            .iter()
            .copied()
            .filter(|id| other.contains(*id))
            .collect();
        Self { ids }
    }
}

/// Conversion from component types to the spec naming them.
///
/// Implemented for single components, for tuples of implementors up to 26
/// wide (nested tuples flatten), and for `()` as the empty spec. Conversion
/// registers any component the registry has not seen yet.
pub trait IntoSpec {
    fn into_spec(registry: &Registry) -> Spec;
}

impl IntoSpec for () {
    fn into_spec(_registry: &Registry) -> Spec {
        Spec::EMPTY
    }
}

impl<C: Component> IntoSpec for C {
    fn into_spec(registry: &Registry) -> Spec {
        Spec::new([registry.register::<C>()])
    }
}

macro_rules! tuple_spec {
    ($($name: ident),*) => {
        impl<$($name: IntoSpec),*> IntoSpec for ($($name,)*) {
            fn into_spec(registry: &Registry) -> Spec {
                let mut ids = Vec::new();
                $(
                    ids.extend(<$name>::into_spec(registry).ids());
                )*
                Spec::new(ids)
            }
        }
    }
}

all_tuples!(tuple_spec);

#[cfg(test)]
mod tests {
    use quartz_macros::Component;
    use std::hash::{DefaultHasher, Hash, Hasher};

    use super::*;

    // Given
    #[derive(Component)]
    struct Hull;
    #[derive(Component)]
    struct Engine;
    #[derive(Component)]
    struct Shield;
    #[derive(Component)]
    struct Cargo;

    fn ids() -> (Registry, Id, Id, Id, Id) {
        let registry = Registry::new();
        let hull = registry.register::<Hull>();
        let engine = registry.register::<Engine>();
        let shield = registry.register::<Shield>();
        let cargo = registry.register::<Cargo>();
        (registry, hull, engine, shield, cargo)
    }

    fn digest(spec: &Spec) -> u64 {
        let mut hasher = DefaultHasher::new();
        spec.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn specs_compare_by_set_not_insertion_order() {
        // Given
        let (_registry, hull, engine, shield, _) = ids();

        // When - same ids, different order, one duplicated
        let a = Spec::new(vec![shield, hull, engine]);
        let b = Spec::new(vec![hull, engine, shield, engine]);

        // Then - equal as values and as hash keys
        assert_eq!(a, b);
        assert_eq!(digest(&a), digest(&b));
        assert_eq!(b.ids(), &[hull, engine, shield]);
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn membership_checks() {
        // Given
        let (_registry, hull, engine, shield, cargo) = ids();
        let spec = Spec::new(vec![hull, engine]);

        // Then
        assert!(spec.contains(hull));
        assert!(!spec.contains(shield));

        assert!(spec.contains_all(&Spec::new(vec![engine])));
        assert!(spec.contains_all(&spec.clone()));
        assert!(!spec.contains_all(&Spec::new(vec![hull, cargo])));

        assert!(spec.contains_any(&Spec::new(vec![cargo, engine])));
        assert!(!spec.contains_any(&Spec::new(vec![cargo, shield])));
    }

    #[test]
    fn set_algebra_stays_sorted() {
        // Given
        let (_registry, hull, engine, shield, cargo) = ids();
        let a = Spec::new(vec![hull, engine, shield]);
        let b = Spec::new(vec![shield, cargo]);

        // When / Then
        assert_eq!(a.union(&b).ids(), &[hull, engine, shield, cargo]);
        assert_eq!(a.difference(&b).ids(), &[hull, engine]);
        assert_eq!(a.intersection(&b).ids(), &[shield]);

        // The operands are untouched
        assert_eq!(a.len(), 3);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn nested_tuples_flatten_sorted() {
        // Given
        let registry = Registry::new();
        let hull = registry.register::<Hull>();
        let engine = registry.register::<Engine>();
        let shield = registry.register::<Shield>();

        // When - out of registration order, nested
        let spec = <(Shield, (Hull, Engine))>::into_spec(&registry);

        // Then
        assert_eq!(spec.ids(), &[hull, engine, shield]);
    }

    #[test]
    fn unit_converts_to_the_empty_spec() {
        // Given
        let registry = Registry::new();

        // When
        let spec = <()>::into_spec(&registry);

        // Then
        assert!(spec.is_empty());
        assert_eq!(spec, Spec::EMPTY);
        assert!(!spec.contains_any(&Spec::EMPTY));
    }
}
