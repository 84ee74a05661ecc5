//! Block cache.
//!
//! The block pool is the in-memory cache between the table and byte store
//! layers and their files. It manages a fixed ring of slots, each holding
//! one block.
//!
//! # Components
//! - [`BlockPool`] - The block cache with round-robin replacement
//! - [`Block`] - A slot holding block data + metadata
//! - [`PoolStats`] - Block cache counters, combined with page lookup
//!   counters in [`TableStats`]

mod block;
mod block_pool;
mod stats;

pub use block::Block;
pub use block_pool::BlockPool;
pub use stats::{CacheCounts, LookupStats, PoolStats, TableStats};
