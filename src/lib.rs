//! nodestore - storage layer of a native XML database.
//!
//! Documents are kept as a table of fixed-size node records in document
//! order, addressed by their pre value. Variable-length content (names,
//! texts, attribute values) lives in a separate byte store that the
//! records point into.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           nodestore                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Table Layer (table/)                        │   │
//! │  │   RecordTable  ←─  DiskTable (paged)  |  MemTable        │   │
//! │  │                    Directory + PageWindow                │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Block Cache (buffer/)                       │   │
//! │  │        BlockPool (clock ring) + Block + PoolStats        │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Storage Layer (storage/)                    │   │
//! │  │   BlockFile + ByteStore + FreePageBitmap + num + flock   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (BlockId, SlotId, Error, config)
//! - [`buffer`] - Block cache with round-robin replacement
//! - [`storage`] - File I/O, byte store, compressed integers, file locks
//! - [`table`] - Record tables on disk and in memory
//!
//! # Quick Start
//! ```no_run
//! use nodestore::{DiskTable, MemTable, RecordTable, TableConfig};
//!
//! // Build a table in memory and write it to disk
//! let mut mem = MemTable::new();
//! mem.insert(0, &[0u8; 64]).unwrap();
//! mem.write4(2, 0, 7).unwrap();
//!
//! let config = TableConfig::new("db").name("doc");
//! mem.persist(&config).unwrap();
//!
//! // Reopen it for updates
//! let mut table = DiskTable::open(&config, true).unwrap();
//! assert_eq!(table.read4(2, 0).unwrap(), 7);
//! table.delete(0, 1).unwrap();
//! table.close().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod storage;
pub mod table;

// Re-export commonly used items at crate root for convenience
pub use common::config::{BLOCK_SIZE, BUFFERS, ENTRIES, NODE_POWER, NODE_SIZE};
pub use common::{BlockId, Error, Result, SlotId, TableConfig};

pub use buffer::{BlockPool, CacheCounts, PoolStats, TableStats};
pub use storage::{BlockFile, ByteStore};
pub use table::{DiskTable, MemTable, PageWindow, RecordTable};
