//! Record tables.
//!
//! A table is a dense sequence of fixed-size records addressed by their
//! ordinal position, the *pre value*. Higher layers store node kinds,
//! sizes and byte store offsets in the record fields and never see the
//! physical layout.
//!
//! - [`RecordTable`] - The contract shared by all backends
//! - [`DiskTable`] - Paged table in a data file with a page directory
//! - [`MemTable`] - Table held in two in-memory arrays

mod directory;
mod disk_table;
mod mem_table;

pub use directory::{Directory, PageWindow};
pub use disk_table::DiskTable;
pub use mem_table::MemTable;

use crate::common::config::NODE_SIZE;
use crate::common::{Error, Result};

/// Operations every table backend provides.
///
/// Field accessors address `width` bytes at byte offset `off` inside the
/// record `pre`; values are big-endian. Backends implement the field
/// primitives plus `copy`, `insert` and `delete`; `replace`, `set` and the
/// fixed-width accessors are derived from them.
///
/// # Errors
/// A `pre` or range outside the table is an internal-consistency error and
/// is reported, never clamped. I/O errors leave the table in an unknown
/// state; it must be reopened.
///
/// # Thread Safety
/// Tables assume a single writer. Mutating methods take `&mut self`;
/// callers serialize them.
pub trait RecordTable {
    /// Number of records.
    fn size(&self) -> usize;

    /// Read a `width`-byte field of record `pre`.
    fn read_field(&self, pre: usize, off: usize, width: usize) -> Result<u64>;

    /// Write the low `width` bytes of `value` into a field of record `pre`.
    fn write_field(&mut self, pre: usize, off: usize, width: usize, value: u64) -> Result<()>;

    /// Overwrite records `pre..last` with the leading records of `entries`.
    fn copy(&mut self, entries: &[u8], pre: usize, last: usize) -> Result<()>;

    /// Insert the records in `entries` before record `pre`.
    fn insert(&mut self, pre: usize, entries: &[u8]) -> Result<()>;

    /// Remove `count` records starting at `pre`.
    fn delete(&mut self, pre: usize, count: usize) -> Result<()>;

    /// Persist dirty blocks; with `all`, persist the table metadata too.
    fn flush(&mut self, all: bool) -> Result<()>;

    /// Flush and release all resources.
    fn close(&mut self) -> Result<()>;

    /// Switch the file lock to exclusive (`write`) or shared mode.
    ///
    /// Returns `false` if an exclusive lock was requested but only a shared
    /// one could be obtained.
    ///
    /// # Errors
    /// `Error::Pinned` if not even a shared lock is available.
    fn lock(&mut self, write: bool) -> Result<bool>;

    // ========================================================================
    // Derived operations
    // ========================================================================

    /// Read a one-byte field.
    fn read1(&self, pre: usize, off: usize) -> Result<u8> {
        Ok(self.read_field(pre, off, 1)? as u8)
    }

    /// Read a two-byte field.
    fn read2(&self, pre: usize, off: usize) -> Result<u16> {
        Ok(self.read_field(pre, off, 2)? as u16)
    }

    /// Read a four-byte field.
    fn read4(&self, pre: usize, off: usize) -> Result<u32> {
        Ok(self.read_field(pre, off, 4)? as u32)
    }

    /// Read a five-byte field.
    fn read5(&self, pre: usize, off: usize) -> Result<u64> {
        self.read_field(pre, off, 5)
    }

    /// Write a one-byte field.
    fn write1(&mut self, pre: usize, off: usize, value: u8) -> Result<()> {
        self.write_field(pre, off, 1, value as u64)
    }

    /// Write a two-byte field.
    fn write2(&mut self, pre: usize, off: usize, value: u16) -> Result<()> {
        self.write_field(pre, off, 2, value as u64)
    }

    /// Write a four-byte field.
    fn write4(&mut self, pre: usize, off: usize, value: u32) -> Result<()> {
        self.write_field(pre, off, 4, value as u64)
    }

    /// Write the low five bytes of `value`.
    fn write5(&mut self, pre: usize, off: usize, value: u64) -> Result<()> {
        self.write_field(pre, off, 5, value)
    }

    /// Overwrite the records starting at `pre` with `entries`.
    fn set(&mut self, pre: usize, entries: &[u8]) -> Result<()> {
        let count = record_count(entries)?;
        self.copy(entries, pre, pre + count)
    }

    /// Replace the `count` records at `pre` with the records in `entries`.
    ///
    /// The overlapping records are overwritten in place; surplus new records
    /// are inserted behind them, surplus old records deleted.
    fn replace(&mut self, pre: usize, entries: &[u8], count: usize) -> Result<()> {
        let new_count = record_count(entries)?;
        check_range(pre, count, self.size())?;

        let common = new_count.min(count);
        let split = pre + common;
        self.copy(&entries[..common * NODE_SIZE], pre, split)?;

        if new_count > count {
            self.insert(split, &entries[common * NODE_SIZE..])
        } else if count > new_count {
            self.delete(split, count - new_count)
        } else {
            Ok(())
        }
    }
}

/// Number of whole records in `entries`.
pub(crate) fn record_count(entries: &[u8]) -> Result<usize> {
    if entries.len() % NODE_SIZE != 0 {
        return Err(Error::Misaligned(entries.len()));
    }
    Ok(entries.len() / NODE_SIZE)
}

/// Check that `pre..pre + count` lies inside a table of `size` records.
pub(crate) fn check_range(pre: usize, count: usize, size: usize) -> Result<()> {
    match pre.checked_add(count) {
        Some(last) if last <= size => Ok(()),
        _ => Err(Error::InvalidRange { pre, count, size }),
    }
}

/// Number of records in `pre..last`, which must lie inside a table of
/// `size` records.
pub(crate) fn check_span(pre: usize, last: usize, size: usize) -> Result<usize> {
    let count = last
        .checked_sub(pre)
        .ok_or(Error::InvalidRange { pre, count: 0, size })?;
    check_range(pre, count, size)?;
    Ok(count)
}

/// Check that a field lies inside one record.
pub(crate) fn check_field(off: usize, width: usize) -> Result<()> {
    if width == 0 || width > 8 || off + width > NODE_SIZE {
        return Err(Error::InvalidField { offset: off, width });
    }
    Ok(())
}
