//! Block identifier type.

use std::fmt;

use crate::common::config::BLOCK_SIZE;

/// Identifies a block of a data file by its number.
///
/// Block `n` starts at file offset `n × BLOCK_SIZE`. Table pages and
/// byte store blocks share this addressing.
///
/// # Example
/// ```
/// use nodestore::BlockId;
///
/// let block = BlockId::new(3);
/// assert!(block.is_valid());
/// assert_eq!(block.offset(), 3 * 4096);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

impl BlockId {
    /// Marks a cache slot that is not bound to any block.
    pub const UNBOUND: BlockId = BlockId(u64::MAX);

    /// Create a new BlockId.
    #[inline]
    pub fn new(id: u64) -> Self {
        BlockId(id)
    }

    /// Block containing the given byte position.
    #[inline]
    pub fn containing(pos: u64) -> Self {
        BlockId(pos / BLOCK_SIZE as u64)
    }

    /// Check if this block ID is bound.
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::UNBOUND
    }

    /// Byte offset of the block start in its file.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.0 * BLOCK_SIZE as u64
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::UNBOUND {
            write!(f, "Block(UNBOUND)")
        } else {
            write!(f, "Block({})", self.0)
        }
    }
}
