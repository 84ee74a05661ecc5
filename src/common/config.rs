//! Configuration for nodestore tables.
//!
//! The physical layout constants are fixed at compile time; everything that
//! varies per table (location, name, cache size) lives in [`TableConfig`].

use std::path::PathBuf;

/// Size of a block (and of a table page) in bytes.
///
/// Both the block cache and the data file work in units of this size.
pub const BLOCK_SIZE: usize = 4096;

/// Power of two of [`NODE_SIZE`].
pub const NODE_POWER: usize = 4;

/// Size of one table record in bytes.
pub const NODE_SIZE: usize = 1 << NODE_POWER;

/// Number of records that fit into one page.
pub const ENTRIES: usize = BLOCK_SIZE / NODE_SIZE;

/// Default number of slots in a block pool.
pub const BUFFERS: usize = 16;

/// Suffix of the table data file.
pub const DATA_SUFFIX: &str = "tbl";

/// Suffix of the table directory file.
pub const DIRECTORY_SUFFIX: &str = "tbli";

/// Location and tuning of one disk table.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Directory holding the table files.
    pub dir: PathBuf,

    /// Base name of the table files (default: "table").
    pub name: String,

    /// Number of block cache slots (default: [`BUFFERS`]).
    pub buffers: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            name: "table".to_string(),
            buffers: BUFFERS,
        }
    }
}

impl TableConfig {
    /// Create a config for tables stored in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set the base name of the table files.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the number of block cache slots.
    ///
    /// # Panics
    /// Panics if `buffers` is 0.
    pub fn buffers(mut self, buffers: usize) -> Self {
        assert!(buffers > 0, "buffers must be > 0");
        self.buffers = buffers;
        self
    }

    /// Path of the data file holding the record pages.
    pub fn data_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, DATA_SUFFIX))
    }

    /// Path of the directory file holding the page index.
    pub fn directory_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, DIRECTORY_SUFFIX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        assert!(BLOCK_SIZE.is_power_of_two());
        assert_eq!(NODE_SIZE, 16);
        assert_eq!(ENTRIES, 256);
        assert_eq!(BLOCK_SIZE % NODE_SIZE, 0);
    }

    #[test]
    fn test_config_paths() {
        let config = TableConfig::new("/tmp/db").name("doc");
        assert_eq!(config.data_path(), PathBuf::from("/tmp/db/doc.tbl"));
        assert_eq!(config.directory_path(), PathBuf::from("/tmp/db/doc.tbli"));
        assert_eq!(config.buffers, BUFFERS);
    }

    #[test]
    #[should_panic(expected = "buffers must be > 0")]
    fn test_zero_buffers_rejected() {
        let _ = TableConfig::default().buffers(0);
    }
}
