//! Block file - low-level file I/O in block units.
//!
//! The [`BlockFile`] handles all direct file operations of a block pool:
//! - Reading and writing whole blocks
//! - Tracking the logical file length separately from the on-disk length

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::config::BLOCK_SIZE;
use crate::common::{BlockId, Result};

/// A file addressed in blocks of [`BLOCK_SIZE`] bytes.
///
/// # File Layout
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┐
/// │ Block 0 │ Block 1 │  ...    │ Block N │
/// │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └─────────┴─────────┴─────────┴─────────┘
/// ```
///
/// # Length
/// Writers may move the logical end of the file (`len`) past or before the
/// physical end. The difference is applied with a single truncate/extend in
/// [`BlockFile::sync_len`], which the block pool calls on flush.
///
/// # Thread Safety
/// `BlockFile` is single-threaded; its owning pool serializes access.
pub struct BlockFile {
    file: File,
    path: PathBuf,
    /// Logical length in bytes.
    len: u64,
    /// Length of the file on disk.
    disk_len: u64,
}

impl BlockFile {
    /// Create a new, empty file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            len: 0,
            disk_len: 0,
        })
    }

    /// Open an existing file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let disk_len = file.metadata()?.len();

        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            len: disk_len,
            disk_len,
        })
    }

    /// Open an existing file, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Read a block into `buf`.
    ///
    /// Bytes beyond the on-disk end of the file read as zero, so blocks that
    /// were never written can be loaded like any other.
    pub fn read_block(&mut self, block: BlockId, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), BLOCK_SIZE);

        let offset = block.offset();
        let avail = if offset < self.disk_len {
            (self.disk_len - offset).min(BLOCK_SIZE as u64) as usize
        } else {
            0
        };

        if avail > 0 {
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.read_exact(&mut buf[..avail])?;
        }
        buf[avail..].fill(0);

        Ok(())
    }

    /// Write a whole block.
    ///
    /// Writing past the on-disk end grows the file; the logical length is
    /// left untouched.
    pub fn write_block(&mut self, block: BlockId, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), BLOCK_SIZE);

        let offset = block.offset();
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        self.disk_len = self.disk_len.max(offset + BLOCK_SIZE as u64);

        Ok(())
    }

    /// Logical length of the file in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Check if the file is logically empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the logical length. Applied to disk by [`BlockFile::sync_len`].
    #[inline]
    pub fn set_len(&mut self, len: u64) {
        self.len = len;
    }

    /// Truncate or extend the file on disk to its logical length.
    pub fn sync_len(&mut self) -> Result<()> {
        if self.disk_len != self.len {
            self.file.set_len(self.len)?;
            self.disk_len = self.len;
        }
        Ok(())
    }

    /// Flush written data to the storage device.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Length of the file on disk.
    #[inline]
    pub fn disk_len(&self) -> u64 {
        self.disk_len
    }

    /// Underlying file handle, used for advisory locking.
    #[inline]
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Path of the file.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.tbl");

        let file = BlockFile::create(&path).unwrap();
        assert_eq!(file.len(), 0);
        assert!(file.is_empty());
        assert!(BlockFile::create(&path).is_err());
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let dir = tempdir().unwrap();
        assert!(BlockFile::open(dir.path().join("missing.tbl")).is_err());
    }

    #[test]
    fn test_read_past_end_is_zero() {
        let dir = tempdir().unwrap();
        let mut file = BlockFile::create(dir.path().join("test.tbl")).unwrap();

        let mut buf = vec![0xAAu8; BLOCK_SIZE];
        file.read_block(BlockId::new(5), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_and_read_block() {
        let dir = tempdir().unwrap();
        let mut file = BlockFile::create(dir.path().join("test.tbl")).unwrap();

        let mut buf = vec![0u8; BLOCK_SIZE];
        buf[0] = 0xAB;
        buf[BLOCK_SIZE - 1] = 0xEF;
        file.write_block(BlockId::new(1), &buf).unwrap();
        assert_eq!(file.disk_len(), 2 * BLOCK_SIZE as u64);
        // logical length only moves on request
        assert_eq!(file.len(), 0);

        let mut read = vec![0u8; BLOCK_SIZE];
        file.read_block(BlockId::new(1), &mut read).unwrap();
        assert_eq!(read, buf);
    }

    #[test]
    fn test_partial_block_is_zero_filled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.tbl");
        std::fs::write(&path, [7u8; 10]).unwrap();

        let mut file = BlockFile::open(&path).unwrap();
        assert_eq!(file.len(), 10);

        let mut buf = vec![0xFFu8; BLOCK_SIZE];
        file.read_block(BlockId::new(0), &mut buf).unwrap();
        assert_eq!(&buf[..10], &[7u8; 10]);
        assert!(buf[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sync_len_truncates_and_extends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.tbl");
        let mut file = BlockFile::create(&path).unwrap();

        file.write_block(BlockId::new(0), &vec![1u8; BLOCK_SIZE]).unwrap();
        file.set_len(100);
        file.sync_len().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 100);

        file.set_len(3 * BLOCK_SIZE as u64);
        file.sync_len().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * BLOCK_SIZE as u64);
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.tbl");

        {
            let mut file = BlockFile::open_or_create(&path).unwrap();
            let mut buf = vec![0u8; BLOCK_SIZE];
            buf[0] = 0x42;
            file.write_block(BlockId::new(0), &buf).unwrap();
            file.sync().unwrap();
        }

        {
            let mut file = BlockFile::open_or_create(&path).unwrap();
            assert_eq!(file.len(), BLOCK_SIZE as u64);
            let mut buf = vec![0u8; BLOCK_SIZE];
            file.read_block(BlockId::new(0), &mut buf).unwrap();
            assert_eq!(buf[0], 0x42);
        }
    }
}
