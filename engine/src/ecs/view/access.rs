//! Declared component access and conflict detection.
//!
//! Every view names the components it reads and writes. At schedule build
//! time those declarations are folded into one [`Access`] per system and
//! compared pairwise: two systems conflict when one writes a component the
//! other touches, and conflicting systems are serialized by the job graph.
//! Read/read overlap never conflicts.
//!
//! Access is tracked as bitsets keyed by component id so the pairwise
//! comparison stays cheap even with many systems and components.

use fixedbitset::FixedBitSet;

use crate::ecs::component;

/// Bitset-backed component set. Bit N set means component id N is a member.
///
/// The bitset grows to fit whatever ids are inserted, so it never needs to
/// know the registry size up front.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ComponentSet {
    bits: FixedBitSet,
}

impl ComponentSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            bits: FixedBitSet::new(),
        }
    }

    /// Builds a set from a sorted component specification.
    pub fn from_spec(spec: &component::Spec) -> Self {
        let mut set = Self::new();
        for id in spec.ids() {
            set.insert(*id);
        }
        set
    }

    /// Adds a component id, growing the bitset if needed.
    pub fn insert(&mut self, id: component::Id) {
        let index = id.index();
        self.bits.grow(index + 1);
        self.bits.insert(index);
    }

    /// Check whether the id is a member.
    #[inline]
    pub fn contains(&self, id: component::Id) -> bool {
        self.bits.contains(id.index())
    }

    /// Check whether the set has no members.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_clear()
    }

    /// Check whether the two sets share no members.
    #[inline]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.bits.is_disjoint(&other.bits)
    }

    /// Adds every member of `other` to this set.
    pub fn union_with(&mut self, other: &Self) {
        self.bits.union_with(&other.bits);
    }

    /// Iterate the member ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = component::Id> + '_ {
        self.bits
            .ones()
            .map(|index| component::Id::new(index as u32))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.bits.count_ones(..)
    }
}

/// The component footprint of a view or system.
///
/// `reads` and `writes` come straight from the view declarations. `claims`
/// holds components a view marked exclusive: the graph builder asserts that
/// no other system touches a claimed component at all. The `exclusive` flag
/// is the system-level variant and conflicts with every other system
/// regardless of footprint.
#[derive(Debug, Clone, Default)]
pub(crate) struct Access {
    reads: ComponentSet,
    writes: ComponentSet,
    claims: ComponentSet,
    exclusive: bool,
}

impl Access {
    /// Creates an access with no footprint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare read access to a component.
    pub fn add_read(&mut self, id: component::Id) {
        self.reads.insert(id);
    }

    /// Declare write access to a component.
    pub fn add_write(&mut self, id: component::Id) {
        self.writes.insert(id);
    }

    /// Claim sole ownership of every component currently read or written.
    pub fn claim_footprint(&mut self) {
        let mut claims = self.reads.clone();
        claims.union_with(&self.writes);
        self.claims.union_with(&claims);
    }

    /// Escalate to whole-world exclusivity.
    pub fn set_exclusive(&mut self) {
        self.exclusive = true;
    }

    pub fn reads(&self) -> &ComponentSet {
        &self.reads
    }

    pub fn writes(&self) -> &ComponentSet {
        &self.writes
    }

    pub fn claims(&self) -> &ComponentSet {
        &self.claims
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Check whether the id is read or written.
    pub fn touches(&self, id: component::Id) -> bool {
        self.reads.contains(id) || self.writes.contains(id)
    }

    /// Folds another access into this one.
    pub fn merge(&mut self, other: &Access) {
        self.reads.union_with(&other.reads);
        self.writes.union_with(&other.writes);
        self.claims.union_with(&other.claims);
        self.exclusive |= other.exclusive;
    }

    /// Check whether the two accesses could race if run concurrently.
    ///
    /// Conflicts arise when one side writes a component the other reads or
    /// writes, or when either side is exclusive. Two readers of the same
    /// component never conflict.
    pub fn conflicts_with(&self, other: &Access) -> bool {
        if self.exclusive || other.exclusive {
            return true;
        }
        !self.writes.is_disjoint(&other.writes)
            || !self.writes.is_disjoint(&other.reads)
            || !self.reads.is_disjoint(&other.writes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::{Id, Spec};

    fn reader(ids: &[u32]) -> Access {
        let mut access = Access::new();
        for id in ids {
            access.add_read(Id::new(*id));
        }
        access
    }

    fn writer(ids: &[u32]) -> Access {
        let mut access = Access::new();
        for id in ids {
            access.add_write(Id::new(*id));
        }
        access
    }

    #[test]
    fn readers_of_the_same_component_do_not_conflict() {
        // Given
        let a = reader(&[0]);
        let b = reader(&[0]);

        // Then
        assert!(!a.conflicts_with(&b));
        assert!(!b.conflicts_with(&a));
    }

    #[test]
    fn writer_conflicts_with_reader_of_the_same_component() {
        // Given
        let a = writer(&[0]);
        let b = reader(&[0]);

        // Then
        assert!(a.conflicts_with(&b));
        assert!(b.conflicts_with(&a));
    }

    #[test]
    fn writers_of_the_same_component_conflict() {
        // Given
        let a = writer(&[3]);
        let b = writer(&[3]);

        // Then
        assert!(a.conflicts_with(&b));
    }

    #[test]
    fn disjoint_footprints_do_not_conflict() {
        // Given - a writes 0 and reads 1, b writes 2 and reads 3
        let mut a = writer(&[0]);
        a.add_read(Id::new(1));
        let mut b = writer(&[2]);
        b.add_read(Id::new(3));

        // Then
        assert!(!a.conflicts_with(&b));
        assert!(!b.conflicts_with(&a));
    }

    #[test]
    fn exclusive_access_conflicts_with_everything() {
        // Given
        let mut exclusive = Access::new();
        exclusive.set_exclusive();
        let unrelated = reader(&[7]);
        let empty = Access::new();

        // Then - even an empty footprint is ordered against an exclusive one
        assert!(exclusive.conflicts_with(&unrelated));
        assert!(unrelated.conflicts_with(&exclusive));
        assert!(exclusive.conflicts_with(&empty));
    }

    #[test]
    fn merge_unions_reads_writes_and_claims() {
        // Given
        let mut a = reader(&[0]);
        let mut b = writer(&[1]);
        b.claim_footprint();

        // When
        a.merge(&b);

        // Then
        assert!(a.reads().contains(Id::new(0)));
        assert!(a.writes().contains(Id::new(1)));
        assert!(a.claims().contains(Id::new(1)));
        assert!(!a.is_exclusive());
    }

    #[test]
    fn claim_footprint_covers_reads_and_writes() {
        // Given
        let mut access = reader(&[2]);
        access.add_write(Id::new(5));

        // When
        access.claim_footprint();

        // Then
        assert!(access.claims().contains(Id::new(2)));
        assert!(access.claims().contains(Id::new(5)));
        assert_eq!(access.claims().len(), 2);
    }

    #[test]
    fn component_set_grows_for_large_ids() {
        // Given
        let mut set = ComponentSet::new();

        // When
        set.insert(Id::new(1000));

        // Then
        assert!(set.contains(Id::new(1000)));
        assert!(!set.contains(Id::new(999)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn component_set_round_trips_a_spec() {
        // Given
        let spec = Spec::new([Id::new(4), Id::new(1), Id::new(9)]);

        // When
        let set = ComponentSet::from_spec(&spec);

        // Then - ids come back sorted
        let ids: Vec<_> = set.ids().collect();
        assert_eq!(ids, vec![Id::new(1), Id::new(4), Id::new(9)]);
    }

    #[test]
    fn disjoint_check_handles_sets_of_different_sizes() {
        // Given
        let mut small = ComponentSet::new();
        small.insert(Id::new(1));
        let mut large = ComponentSet::new();
        large.insert(Id::new(200));

        // Then
        assert!(small.is_disjoint(&large));

        // When the large set also gains the small one's member
        large.insert(Id::new(1));

        // Then
        assert!(!small.is_disjoint(&large));
    }
}
