//! Byte store - variable-length entries in a block-cached file.
//!
//! Node names, texts and attribute values are stored as entries of the form
//! `[compressed length][bytes]`; table records refer to them by byte offset.
//!
//! Entries are replaced through [`ByteStore::free`], a first-fit tombstone
//! allocator: freed bytes are overwritten with [`TOMBSTONE`] and may be
//! reused by a later entry written at the same position. Non-adjacent gaps
//! are never merged, so fragmentation accumulates until the file is
//! rewritten.

use std::path::Path;

use tracing::{debug, warn};

use crate::buffer::BlockPool;
use crate::common::config::{BLOCK_SIZE, BUFFERS};
use crate::common::{BlockId, Error, Result, SlotId};
use crate::storage::num::{num_len, put_num};
use crate::storage::BlockFile;

/// Filler byte of freed entry space.
///
/// No live entry starts with it: the widest length header starts with
/// `0xC0`.
pub const TOMBSTONE: u8 = 0xFF;

/// Positional and sequential access to a file of variable-length entries.
///
/// All accessors come in two forms: `read_num_at(pos)` moves the cursor to
/// `pos` first, `read_num()` continues at the cursor. Multi-byte integers
/// are big-endian.
///
/// # Example
/// ```no_run
/// use nodestore::ByteStore;
///
/// let mut store = ByteStore::create("names.dat").unwrap();
/// let pos = store.len();
/// store.write_token_at(pos, b"title").unwrap();
/// assert_eq!(store.read_token_at(pos).unwrap(), b"title");
/// store.close().unwrap();
/// ```
pub struct ByteStore {
    pool: BlockPool,
    /// Slot holding the cursor block.
    slot: SlotId,
    /// Block of the cursor.
    block: BlockId,
    /// Offset of the cursor inside `block`, `0..=BLOCK_SIZE`.
    off: usize,
}

impl ByteStore {
    /// Create a new, empty store file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_file(BlockFile::create(path)?, BUFFERS)
    }

    /// Open an existing store file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_file(BlockFile::open(path)?, BUFFERS)
    }

    /// Open a store file, creating it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_file(BlockFile::open_or_create(path)?, BUFFERS)
    }

    /// Wrap an opened file with a cache of `buffers` blocks.
    pub fn with_file(file: BlockFile, buffers: usize) -> Result<Self> {
        debug!(path = %file.path().display(), len = file.len(), "opening byte store");
        let mut pool = BlockPool::new(file, buffers);
        let block = BlockId::new(0);
        let slot = pool.acquire(block)?;
        Ok(Self {
            pool,
            slot,
            block,
            off: 0,
        })
    }

    // ========================================================================
    // Cursor
    // ========================================================================

    /// Move the cursor to byte position `pos`.
    pub fn cursor(&mut self, pos: u64) -> Result<()> {
        self.select(BlockId::containing(pos))?;
        self.off = (pos % BLOCK_SIZE as u64) as usize;
        Ok(())
    }

    /// Current cursor position.
    #[inline]
    pub fn position(&self) -> u64 {
        self.block.offset() + self.off as u64
    }

    /// Logical length of the store in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.pool.len()
    }

    /// Check if the store holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Check if the cursor is before the end of the store.
    #[inline]
    pub fn more(&self) -> bool {
        self.position() < self.len()
    }

    /// Size of an entry holding `len` payload bytes, header included.
    #[inline]
    pub fn entry_size(len: usize) -> usize {
        num_len(len as i32) + len
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Read one byte at the cursor.
    pub fn read1(&mut self) -> Result<u8> {
        self.next_block_if_full()?;
        let v = self.pool.block(self.slot).data()[self.off];
        self.off += 1;
        Ok(v)
    }

    /// Read one byte at `pos`.
    pub fn read1_at(&mut self, pos: u64) -> Result<u8> {
        self.cursor(pos)?;
        self.read1()
    }

    /// Read a four-byte integer at the cursor.
    pub fn read4(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_into(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Read a four-byte integer at `pos`.
    pub fn read4_at(&mut self, pos: u64) -> Result<u32> {
        self.cursor(pos)?;
        self.read4()
    }

    /// Read a five-byte integer at the cursor.
    pub fn read5(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_into(&mut buf[3..])?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Read a five-byte integer at `pos`.
    pub fn read5_at(&mut self, pos: u64) -> Result<u64> {
        self.cursor(pos)?;
        self.read5()
    }

    /// Read a compressed integer at the cursor.
    pub fn read_num(&mut self) -> Result<i32> {
        let v = self.read1()?;
        Ok(match v & 0xC0 {
            0x00 => v as i32,
            0x40 => ((v as i32 - 0x40) << 8) + self.read1()? as i32,
            0x80 => {
                let mut rest = [0u8; 3];
                self.read_into(&mut rest)?;
                ((v as i32 - 0x80) << 24)
                    + ((rest[0] as i32) << 16)
                    + ((rest[1] as i32) << 8)
                    + rest[2] as i32
            }
            _ => self.read4()? as i32,
        })
    }

    /// Read a compressed integer at `pos`.
    pub fn read_num_at(&mut self, pos: u64) -> Result<i32> {
        self.cursor(pos)?;
        self.read_num()
    }

    /// Read `len` raw bytes at the cursor.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    /// Read `len` raw bytes at `pos`.
    pub fn read_bytes_at(&mut self, pos: u64, len: usize) -> Result<Vec<u8>> {
        self.cursor(pos)?;
        self.read_bytes(len)
    }

    /// Read a length-prefixed entry at the cursor.
    pub fn read_token(&mut self) -> Result<Vec<u8>> {
        let start = self.position();
        let len = self.read_num()?;
        let len = usize::try_from(len).map_err(|_| Error::CorruptEntry(start))?;
        self.read_bytes(len)
    }

    /// Read a length-prefixed entry at `pos`.
    pub fn read_token_at(&mut self, pos: u64) -> Result<Vec<u8>> {
        self.cursor(pos)?;
        self.read_token()
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Write one byte at the cursor.
    pub fn write1(&mut self, v: u8) -> Result<()> {
        self.write_bytes(&[v])
    }

    /// Write one byte at `pos`.
    pub fn write1_at(&mut self, pos: u64, v: u8) -> Result<()> {
        self.cursor(pos)?;
        self.write1(v)
    }

    /// Write a four-byte integer at the cursor.
    pub fn write4(&mut self, v: u32) -> Result<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    /// Write a four-byte integer at `pos`.
    pub fn write4_at(&mut self, pos: u64, v: u32) -> Result<()> {
        self.cursor(pos)?;
        self.write4(v)
    }

    /// Write the low five bytes of `v` at the cursor.
    pub fn write5(&mut self, v: u64) -> Result<()> {
        self.write_bytes(&v.to_be_bytes()[3..])
    }

    /// Write the low five bytes of `v` at `pos`.
    pub fn write5_at(&mut self, pos: u64, v: u64) -> Result<()> {
        self.cursor(pos)?;
        self.write5(v)
    }

    /// Write a compressed integer at the cursor.
    pub fn write_num(&mut self, v: i32) -> Result<()> {
        let mut buf = [0u8; 5];
        let mut out = &mut buf[..];
        put_num(&mut out, v);
        self.write_bytes(&buf[..num_len(v)])
    }

    /// Write a compressed integer at `pos`.
    pub fn write_num_at(&mut self, pos: u64, v: i32) -> Result<()> {
        self.cursor(pos)?;
        self.write_num(v)
    }

    /// Write a length-prefixed array of compressed integers at `pos`.
    pub fn write_nums_at(&mut self, pos: u64, values: &[i32]) -> Result<()> {
        self.cursor(pos)?;
        self.write_num(values.len() as i32)?;
        values.iter().try_for_each(|&v| self.write_num(v))
    }

    /// Write a length-prefixed entry at the cursor.
    pub fn write_token(&mut self, token: &[u8]) -> Result<()> {
        self.write_num(token.len() as i32)?;
        self.write_bytes(token)
    }

    /// Write a length-prefixed entry at `pos`.
    pub fn write_token_at(&mut self, pos: u64, token: &[u8]) -> Result<()> {
        self.cursor(pos)?;
        self.write_token(token)
    }

    /// Write raw bytes at the cursor, growing the store if needed.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let mut n = 0;
        while n < bytes.len() {
            self.next_block_if_full()?;
            let chunk = (bytes.len() - n).min(BLOCK_SIZE - self.off);
            let data = self.pool.block_mut(self.slot).data_mut();
            data[self.off..self.off + chunk].copy_from_slice(&bytes[n..n + chunk]);
            self.off += chunk;
            n += chunk;
        }
        let end = self.position();
        if end > self.len() {
            self.pool.set_len(end);
        }
        Ok(())
    }

    // ========================================================================
    // Space reuse
    // ========================================================================

    /// Release the entry at `pos` and return where a replacement entry of
    /// `size` bytes (header included) is to be written.
    ///
    /// The available space is the old entry plus any tombstones directly
    /// behind it.
    /// - If that space reaches the end of the store, the store is truncated
    ///   to `pos` and `pos` is returned.
    /// - If the new entry fits, `pos` is returned and the unused rest of the
    ///   space is filled with tombstones.
    /// - Otherwise the whole space is filled with tombstones and the current
    ///   end of the store is returned.
    ///
    /// # Errors
    /// `Error::InvalidPosition` if `pos` is not inside the store.
    pub fn free(&mut self, pos: u64, size: usize) -> Result<u64> {
        let len = self.len();
        if pos >= len {
            return Err(Error::InvalidPosition { pos, len });
        }
        let declared = self.read_num_at(pos)?;
        let declared = u64::try_from(declared).map_err(|_| Error::CorruptEntry(pos))?;
        let mut avail = self.position() - pos + declared;

        if pos + avail < len {
            self.cursor(pos + avail)?;
            while pos + avail < len && self.read1()? == TOMBSTONE {
                avail += 1;
            }
        }

        if pos + avail >= len {
            self.pool.set_len(pos);
            return Ok(pos);
        }

        let size = size as u64;
        if size > avail {
            self.fill(pos, avail)?;
            Ok(len)
        } else {
            self.fill(pos + size, avail - size)?;
            Ok(pos)
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Write all dirty blocks and apply the logical length to the file.
    pub fn flush(&mut self) -> Result<()> {
        self.pool.flush_all()
    }

    /// Flush and close the store.
    pub fn close(mut self) -> Result<()> {
        debug!(path = %self.pool.file().path().display(), len = self.len(), "closing byte store");
        self.flush()
    }

    /// Underlying block pool, for statistics.
    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn select(&mut self, block: BlockId) -> Result<()> {
        self.slot = self.pool.acquire(block)?;
        self.block = block;
        Ok(())
    }

    fn next_block_if_full(&mut self) -> Result<()> {
        if self.off == BLOCK_SIZE {
            self.select(BlockId::new(self.block.0 + 1))?;
            self.off = 0;
        }
        Ok(())
    }

    fn read_into(&mut self, out: &mut [u8]) -> Result<()> {
        let mut n = 0;
        while n < out.len() {
            self.next_block_if_full()?;
            let chunk = (out.len() - n).min(BLOCK_SIZE - self.off);
            let data = self.pool.block(self.slot).data();
            out[n..n + chunk].copy_from_slice(&data[self.off..self.off + chunk]);
            self.off += chunk;
            n += chunk;
        }
        Ok(())
    }

    /// Overwrite `count` bytes at `pos` with tombstones.
    fn fill(&mut self, pos: u64, count: u64) -> Result<()> {
        self.cursor(pos)?;
        let mut left = count as usize;
        while left > 0 {
            self.next_block_if_full()?;
            let chunk = left.min(BLOCK_SIZE - self.off);
            let data = self.pool.block_mut(self.slot).data_mut();
            data[self.off..self.off + chunk].fill(TOMBSTONE);
            self.off += chunk;
            left -= chunk;
        }
        Ok(())
    }
}

impl Drop for ByteStore {
    fn drop(&mut self) {
        if self.pool.needs_flush() {
            if let Err(e) = self.pool.flush_all() {
                warn!(path = %self.pool.file().path().display(), error = %e, "failed to flush byte store on drop");
            }
        }
    }
}
