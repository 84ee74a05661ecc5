//! Cache slot identifier type.

use std::fmt;

/// Index of a slot in a [`BlockPool`](crate::buffer::BlockPool).
///
/// Slots live in a fixed `Vec`, so the id is a plain index and no
/// reference to a cached block ever outlives the pool call that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub usize);

impl SlotId {
    /// Create a new SlotId.
    #[inline]
    pub fn new(id: usize) -> Self {
        SlotId(id)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", self.0)
    }
}
