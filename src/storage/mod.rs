//! Storage layer - files, codecs and the variable-length byte store.
//!
//! - [`BlockFile`] - Low-level block I/O with a lazily applied length
//! - [`ByteStore`] - Variable-length entries with tombstone reuse
//! - [`FileLock`] - Advisory shared/exclusive file locks
//! - [`FreePageBitmap`] - Physical page allocation map
//! - [`num`] - Compressed integer codec

mod bitmap;
mod block_file;
mod byte_store;
mod flock;
pub mod num;

pub use bitmap::FreePageBitmap;
pub use block_file::BlockFile;
pub use byte_store::{ByteStore, TOMBSTONE};
pub use flock::{FileLock, LockMode};
