//! Block - a slot in the block pool.
//!
//! A [`Block`] holds one block of file data plus the metadata needed for
//! write-back:
//! - Which block is loaded (if any)
//! - Dirty flag

use crate::common::config::BLOCK_SIZE;
use crate::common::BlockId;

/// A cached block of [`BLOCK_SIZE`] bytes.
///
/// Blocks are owned by the [`BlockPool`](super::BlockPool) slot they occupy
/// and are reused for other positions on eviction.
///
/// # Dirty tracking
/// `dirty` is true iff `data` differs from the on-disk block at `position`.
/// Every mutable access through [`Block::data_mut`] sets it.
pub struct Block {
    /// The block content.
    data: Box<[u8]>,

    /// Which block is loaded, or [`BlockId::UNBOUND`].
    position: BlockId,

    /// Whether the block has been modified since loading.
    dirty: bool,
}

impl Block {
    /// Create a new unbound, zeroed block.
    pub fn new() -> Self {
        Self {
            data: vec![0u8; BLOCK_SIZE].into_boxed_slice(),
            position: BlockId::UNBOUND,
            dirty: false,
        }
    }

    // ========================================================================
    // Data access
    // ========================================================================

    /// Block content.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable block content. Marks the block dirty.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.data
    }

    /// Mutable content for (re)loading from disk; leaves the dirty flag alone.
    #[inline]
    pub(crate) fn load_buffer(&mut self) -> &mut [u8] {
        &mut self.data
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Position of the loaded block.
    #[inline]
    pub fn position(&self) -> BlockId {
        self.position
    }

    /// Bind the slot to another block position.
    #[inline]
    pub fn set_position(&mut self, position: BlockId) {
        self.position = position;
    }

    /// Check if the slot holds a block.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.position.is_valid()
    }

    /// Mark the block as modified.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clear the dirty flag.
    #[inline]
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Check if the block is dirty.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}
