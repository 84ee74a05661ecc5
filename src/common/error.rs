//! Error types for nodestore.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors raised by the storage layer.
///
/// None of them are retried internally. After an [`Error::Io`] or a
/// directory inconsistency the in-memory state of a table can no longer be
/// trusted and the table should be reopened.
#[derive(Debug, Error)]
pub enum Error {
    /// A read, write, seek or lock syscall failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The page directory does not cover the requested pre value.
    ///
    /// Signals directory corruption or a caller bug; never clamped.
    #[error(
        "data access out of bounds: pre {pre}, size {size}, used pages {used}, \
         total pages {total}, last page {page} ({low} > {high})"
    )]
    OutOfBounds {
        pre: usize,
        size: usize,
        used: usize,
        total: usize,
        page: usize,
        low: isize,
        high: isize,
    },

    /// A record range lies outside the current table.
    #[error("invalid record range: pre {pre}, count {count}, table size {size}")]
    InvalidRange { pre: usize, count: usize, size: usize },

    /// A field access does not fit into one record.
    #[error("invalid field access: offset {offset}, width {width}")]
    InvalidField { offset: usize, width: usize },

    /// A record buffer is not a whole number of records.
    #[error("record buffer of {0} bytes is not a multiple of the record size")]
    Misaligned(usize),

    /// A byte store entry header is not a valid length.
    #[error("corrupt byte store entry at position {0}")]
    CorruptEntry(u64),

    /// A byte store position lies at or behind the end of the store.
    #[error("byte store position {pos} is outside the store of {len} bytes")]
    InvalidPosition { pos: u64, len: u64 },

    /// The persisted page directory could not be parsed.
    #[error("corrupt directory file: {0}")]
    CorruptDirectory(String),

    /// Another handle holds an incompatible lock on the table file.
    #[error("table {} is pinned by another process", .0.display())]
    Pinned(PathBuf),

    /// The table was already closed.
    #[error("table is closed")]
    Closed,
}

impl Error {
    /// Returns `true` for lock contention, the only condition a caller can
    /// recover from by waiting.
    pub fn is_pinned(&self) -> bool {
        matches!(self, Error::Pinned(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidRange {
            pre: 10,
            count: 3,
            size: 11,
        };
        assert_eq!(
            format!("{}", err),
            "invalid record range: pre 10, count 3, table size 11"
        );

        let err = Error::Pinned(PathBuf::from("db/table.tbl"));
        assert_eq!(format!("{}", err), "table db/table.tbl is pinned by another process");
        assert!(err.is_pinned());

        let err = Error::InvalidPosition { pos: 12, len: 4 };
        assert_eq!(
            format!("{}", err),
            "byte store position 12 is outside the store of 4 bytes"
        );
    }

    #[test]
    fn test_out_of_bounds_reports_directory() {
        let err = Error::OutOfBounds {
            pre: 700,
            size: 600,
            used: 3,
            total: 4,
            page: 2,
            low: 3,
            high: 2,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("pre 700"));
        assert!(msg.contains("size 600"));
        assert!(msg.contains("used pages 3"));
        assert!(msg.contains("(3 > 2)"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
        assert!(!Error::Closed.is_pinned());
    }
}
