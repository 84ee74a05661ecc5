//! Block Pool - the block caching layer.
//!
//! The [`BlockPool`] provides:
//! - A fixed number of cached blocks over one [`BlockFile`]
//! - Round-robin (clock) replacement without recency tracking
//! - Write-back of dirty blocks on eviction and flush

use std::sync::atomic::Ordering;

use tracing::trace;

use crate::buffer::{Block, PoolStats};
use crate::common::{BlockId, Result, SlotId};
use crate::storage::BlockFile;

/// Caches blocks of a single file in a fixed ring of slots.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────┐
/// │                     BlockPool                        │
/// │   cursor ──┐                                         │
/// │            ▼                                         │
/// │  [Slot0] [Slot1] [Slot2] ... [SlotN-1]   (Vec<Block>)│
/// │                                                      │
/// │  file: BlockFile          stats: PoolStats           │
/// └──────────────────────────────────────────────────────┘
/// ```
///
/// A lookup scans the ring starting at the slot of the previous hit. On a
/// miss the slot after it is replaced. Sequential access patterns therefore
/// keep their working set, while random access degrades to plain
/// round-robin.
///
/// # Thread Safety
/// The pool is single-threaded. Owners that share it across readers wrap it
/// in a lock (see [`DiskTable`](crate::table::DiskTable)).
pub struct BlockPool {
    /// Fixed ring of slots allocated at startup.
    blocks: Vec<Block>,

    /// Slot of the most recent acquire.
    cursor: usize,

    /// Handles all disk I/O.
    file: BlockFile,

    /// Performance statistics.
    stats: PoolStats,
}

impl BlockPool {
    /// Create a pool of `size` slots over `file`.
    ///
    /// # Panics
    /// Panics if `size` is 0.
    pub fn new(file: BlockFile, size: usize) -> Self {
        assert!(size > 0, "pool size must be > 0");

        Self {
            blocks: (0..size).map(|_| Block::new()).collect(),
            cursor: 0,
            file,
            stats: PoolStats::new(),
        }
    }

    // ========================================================================
    // Public API: block access
    // ========================================================================

    /// Return the slot holding `block`, loading it if it is not resident.
    ///
    /// # Errors
    /// I/O errors from writing back the evicted block or reading the new one.
    pub fn acquire(&mut self, block: BlockId) -> Result<SlotId> {
        let size = self.blocks.len();
        let start = self.cursor;
        let mut slot = start;
        loop {
            if self.blocks[slot].position() == block {
                self.cursor = slot;
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(SlotId::new(slot));
            }
            slot = (slot + 1) % size;
            if slot == start {
                break;
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let victim = (start + 1) % size;
        self.load(victim, block)?;
        self.cursor = victim;
        Ok(SlotId::new(victim))
    }

    /// Shared access to a slot returned by [`BlockPool::acquire`].
    #[inline]
    pub fn block(&self, slot: SlotId) -> &Block {
        &self.blocks[slot.0]
    }

    /// Exclusive access to a slot returned by [`BlockPool::acquire`].
    #[inline]
    pub fn block_mut(&mut self, slot: SlotId) -> &mut Block {
        &mut self.blocks[slot.0]
    }

    /// Acquire `block` and return its content.
    pub fn read(&mut self, block: BlockId) -> Result<&[u8]> {
        let slot = self.acquire(block)?;
        Ok(self.blocks[slot.0].data())
    }

    /// Acquire `block` and return its content for modification.
    pub fn write(&mut self, block: BlockId) -> Result<&mut [u8]> {
        let slot = self.acquire(block)?;
        Ok(self.blocks[slot.0].data_mut())
    }

    // ========================================================================
    // Public API: flushing
    // ========================================================================

    /// Write every dirty block back and apply the logical file length.
    ///
    /// # Errors
    /// I/O errors from disk writes.
    pub fn flush_all(&mut self) -> Result<()> {
        for index in 0..self.blocks.len() {
            self.write_back(index)?;
        }
        self.file.sync_len()?;
        self.file.sync()
    }

    // ========================================================================
    // Public API: file and info
    // ========================================================================

    /// Logical length of the underlying file.
    #[inline]
    pub fn len(&self) -> u64 {
        self.file.len()
    }

    /// Check if the underlying file is logically empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.file.is_empty()
    }

    /// Set the logical length of the underlying file.
    #[inline]
    pub fn set_len(&mut self, len: u64) {
        self.file.set_len(len);
    }

    /// Underlying file.
    #[inline]
    pub fn file(&self) -> &BlockFile {
        &self.file
    }

    /// Number of slots.
    #[inline]
    pub fn size(&self) -> usize {
        self.blocks.len()
    }

    /// Positions of all bound slots.
    pub fn resident(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|b| b.is_bound())
            .map(Block::position)
            .collect()
    }

    /// Check if a flush would change anything on disk.
    pub fn needs_flush(&self) -> bool {
        self.dirty_count() > 0 || self.file.len() != self.file.disk_len()
    }

    /// Number of dirty slots.
    pub fn dirty_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_dirty()).count()
    }

    /// Get pool statistics.
    #[inline]
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// Replace the content of slot `index` with `block`.
    fn load(&mut self, index: usize, block: BlockId) -> Result<()> {
        if self.blocks[index].is_bound() {
            trace!(
                evicted = %self.blocks[index].position(),
                loaded = %block,
                dirty = self.blocks[index].is_dirty(),
                "evicting block"
            );
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            self.write_back(index)?;
        }

        let slot = &mut self.blocks[index];
        // unbind first so a failed read never leaves stale data under `block`
        slot.set_position(BlockId::UNBOUND);
        self.file.read_block(block, slot.load_buffer())?;
        slot.set_position(block);
        slot.clear_dirty();
        self.stats.blocks_read.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    /// Write slot `index` to disk if it is dirty.
    fn write_back(&mut self, index: usize) -> Result<()> {
        let slot = &mut self.blocks[index];
        if slot.is_dirty() && slot.is_bound() {
            self.file.write_block(slot.position(), slot.data())?;
            slot.clear_dirty();
            self.stats.blocks_written.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::BLOCK_SIZE;
    use std::collections::HashSet;
    use tempfile::tempdir;

    /// Helper to create a pool over a temporary file.
    fn create_test_pool(size: usize) -> (BlockPool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let file = BlockFile::create(dir.path().join("test.blk")).unwrap();
        (BlockPool::new(file, size), dir)
    }

    #[test]
    fn test_acquire_loads_zeroed_block() {
        let (mut pool, _dir) = create_test_pool(4);

        let slot = pool.acquire(BlockId::new(3)).unwrap();
        assert_eq!(pool.block(slot).position(), BlockId::new(3));
        assert!(pool.block(slot).data().iter().all(|&b| b == 0));
        assert_eq!(pool.stats().counts().misses, 1);
    }

    #[test]
    fn test_cache_hit() {
        let (mut pool, _dir) = create_test_pool(4);

        let first = pool.acquire(BlockId::new(0)).unwrap();
        let second = pool.acquire(BlockId::new(0)).unwrap();
        assert_eq!(first, second);

        let counts = pool.stats().counts();
        assert_eq!(counts.hits, 1);
        assert_eq!(counts.misses, 1);
    }

    #[test]
    fn test_round_robin_eviction() {
        let (mut pool, _dir) = create_test_pool(2);

        let a = pool.acquire(BlockId::new(0)).unwrap();
        let b = pool.acquire(BlockId::new(1)).unwrap();
        assert_ne!(a, b);

        // the slot after the last used one is replaced
        let c = pool.acquire(BlockId::new(2)).unwrap();
        assert_eq!(c, a);
        assert_eq!(pool.stats().counts().evictions, 1);
        assert!(!pool.resident().contains(&BlockId::new(0)));
    }

    #[test]
    fn test_dirty_block_written_on_eviction() {
        let (mut pool, _dir) = create_test_pool(1);

        pool.write(BlockId::new(0)).unwrap()[0] = 0x42;
        pool.acquire(BlockId::new(1)).unwrap();
        assert_eq!(pool.stats().counts().blocks_written, 1);

        assert_eq!(pool.read(BlockId::new(0)).unwrap()[0], 0x42);
    }

    #[test]
    fn test_flush_all_clears_dirty() {
        let (mut pool, _dir) = create_test_pool(4);

        for i in 0..4u8 {
            pool.write(BlockId::new(i as u64)).unwrap()[0] = i;
        }
        assert_eq!(pool.dirty_count(), 4);

        pool.set_len(4 * BLOCK_SIZE as u64);
        pool.flush_all().unwrap();
        assert_eq!(pool.dirty_count(), 0);
        assert_eq!(pool.file().disk_len(), 4 * BLOCK_SIZE as u64);
    }

    #[test]
    fn test_resident_bound() {
        let (mut pool, _dir) = create_test_pool(3);

        for i in [0u64, 5, 1, 5, 9, 2, 0, 7, 7, 3] {
            pool.acquire(BlockId::new(i)).unwrap();
            let resident = pool.resident();
            let distinct: HashSet<_> = resident.iter().collect();
            assert!(resident.len() <= 3);
            assert_eq!(distinct.len(), resident.len());
        }
    }

    #[test]
    #[should_panic(expected = "pool size must be > 0")]
    fn test_zero_size_rejected() {
        let dir = tempdir().unwrap();
        let file = BlockFile::create(dir.path().join("test.blk")).unwrap();
        let _ = BlockPool::new(file, 0);
    }
}
