/// Position of an entity within a single chunk.
///
/// A row is only meaningful together with the chunk that holds it, and it is
/// not stable: removals backfill holes from the tail, relocating whichever
/// entity lived there.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Copy, Clone, Debug, Default)]
pub struct Row(usize);

impl Row {
    /// New row for the given chunk-local index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw chunk-local index.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for Row {
    #[inline]
    fn from(index: usize) -> Self {
        Self(index)
    }
}
