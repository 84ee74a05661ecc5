//! Main-memory table.

use crate::common::config::NODE_SIZE;
use crate::common::{Error, Result, TableConfig};
use crate::table::{check_field, check_range, check_span, record_count, DiskTable, RecordTable};

/// Bytes of a record held in each half.
const HALF: usize = NODE_SIZE / 2;

/// A [`RecordTable`] held in memory.
///
/// Each record is split into two big-endian words: bytes `0..8` in `low`,
/// bytes `8..16` in `high`. Fields inside one half are read with a shift
/// and a mask; fields crossing the middle fall back to single bytes.
///
/// Flushing, closing and locking are no-ops. Use [`MemTable::persist`] to
/// turn the table into a [`DiskTable`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemTable {
    low: Vec<u64>,
    high: Vec<u64>,
}

impl MemTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table with room for `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            low: Vec::with_capacity(capacity),
            high: Vec::with_capacity(capacity),
        }
    }

    /// Create a table holding `entries`.
    pub fn from_records(entries: &[u8]) -> Result<Self> {
        let mut table = Self::with_capacity(record_count(entries)?);
        table.insert(0, entries)?;
        Ok(table)
    }

    /// All records, serialized.
    pub fn records(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.low.len() * NODE_SIZE);
        for (low, high) in self.low.iter().zip(&self.high) {
            out.extend_from_slice(&low.to_be_bytes());
            out.extend_from_slice(&high.to_be_bytes());
        }
        out
    }

    /// Write the table to disk as a new [`DiskTable`].
    pub fn persist(&self, config: &TableConfig) -> Result<()> {
        DiskTable::build(config, &self.records())
    }

    fn check_pre(&self, pre: usize) -> Result<()> {
        check_range(pre, 1, self.low.len())
    }

    #[inline]
    fn half(&self, pre: usize, off: usize) -> u64 {
        if off < HALF {
            self.low[pre]
        } else {
            self.high[pre]
        }
    }

    #[inline]
    fn half_mut(&mut self, pre: usize, off: usize) -> &mut u64 {
        if off < HALF {
            &mut self.low[pre]
        } else {
            &mut self.high[pre]
        }
    }

    /// Bit shift and mask of a field that lies in one half.
    #[inline]
    fn layout(off: usize, width: usize) -> (usize, u64) {
        let end = off % HALF + width;
        let mask = if width == HALF {
            u64::MAX
        } else {
            (1u64 << (width * 8)) - 1
        };
        ((HALF - end) * 8, mask)
    }

    #[inline]
    fn byte(&self, pre: usize, off: usize) -> u8 {
        (self.half(pre, off) >> ((HALF - 1 - off % HALF) * 8)) as u8
    }

    #[inline]
    fn set_byte(&mut self, pre: usize, off: usize, value: u8) {
        let shift = (HALF - 1 - off % HALF) * 8;
        let word = self.half_mut(pre, off);
        *word = (*word & !(0xFF << shift)) | ((value as u64) << shift);
    }
}

impl RecordTable for MemTable {
    #[inline]
    fn size(&self) -> usize {
        self.low.len()
    }

    fn read_field(&self, pre: usize, off: usize, width: usize) -> Result<u64> {
        check_field(off, width)?;
        self.check_pre(pre)?;
        if off < HALF && off + width > HALF {
            return Ok((off..off + width).fold(0, |v, i| (v << 8) | self.byte(pre, i) as u64));
        }
        let (shift, mask) = Self::layout(off, width);
        Ok((self.half(pre, off) >> shift) & mask)
    }

    fn write_field(&mut self, pre: usize, off: usize, width: usize, value: u64) -> Result<()> {
        check_field(off, width)?;
        self.check_pre(pre)?;
        if off < HALF && off + width > HALF {
            for i in 0..width {
                self.set_byte(pre, off + i, (value >> ((width - 1 - i) * 8)) as u8);
            }
            return Ok(());
        }
        let (shift, mask) = Self::layout(off, width);
        let word = self.half_mut(pre, off);
        *word = (*word & !(mask << shift)) | ((value & mask) << shift);
        Ok(())
    }

    fn copy(&mut self, entries: &[u8], pre: usize, last: usize) -> Result<()> {
        let count = check_span(pre, last, self.low.len())?;
        if entries.len() < count * NODE_SIZE {
            return Err(Error::Misaligned(entries.len()));
        }

        let records = entries.chunks_exact(NODE_SIZE).take(count);
        for (i, record) in records.enumerate() {
            let (low, high) = record.split_at(HALF);
            self.low[pre + i] = word(low);
            self.high[pre + i] = word(high);
        }
        Ok(())
    }

    fn insert(&mut self, pre: usize, entries: &[u8]) -> Result<()> {
        let count = record_count(entries)?;
        check_range(pre, 0, self.low.len())?;

        self.low.splice(pre..pre, std::iter::repeat(0).take(count));
        self.high.splice(pre..pre, std::iter::repeat(0).take(count));
        self.copy(entries, pre, pre + count)
    }

    fn delete(&mut self, pre: usize, count: usize) -> Result<()> {
        check_range(pre, count, self.low.len())?;
        self.low.drain(pre..pre + count);
        self.high.drain(pre..pre + count);
        Ok(())
    }

    fn flush(&mut self, _all: bool) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn lock(&mut self, _write: bool) -> Result<bool> {
        Ok(true)
    }
}

/// Big-endian word of eight bytes.
#[inline]
fn word(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |v, &b| (v << 8) | b as u64)
}
