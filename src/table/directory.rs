//! Page directory of a disk table.
//!
//! The directory maps logical pages to the records they hold and to the
//! physical blocks backing them:
//!
//! ```text
//! logical page   0      1      2
//! first_pre    [ 0  ,  256 ,  400 ]      size = 530
//! pages        [ 0  ,   3  ,   1  ]      (physical block numbers)
//! next_pre       256    400    530
//! ```
//!
//! # File format
//! ```text
//! num   total pages
//! num   used pages
//! nums  first_pre   (length-prefixed, `total` entries)
//! nums  pages       (length-prefixed, `total` entries)
//! num   bitmap word count, followed by big-endian u64 words
//! num   table size  (absent in legacy files)
//! ```
//! A word count of 0 means the bitmap was not stored and is rebuilt from the
//! used pages.

use std::path::Path;

use bytes::{Buf, BufMut};
use tracing::trace;

use crate::common::config::{ENTRIES, NODE_SIZE};
use crate::common::{BlockId, Error, Result};
use crate::storage::num::{get_num, get_nums, put_num, put_nums};
use crate::storage::FreePageBitmap;

/// Records held by one logical page, as seen by a single lookup.
///
/// Windows are plain values: a caller keeps the last one and passes it back
/// as a hint, so no lookup state is shared between callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageWindow {
    /// Logical page index.
    pub page: usize,
    /// First pre value on the page.
    pub first_pre: usize,
    /// First pre value of the following page (or the table size).
    pub next_pre: usize,
}

impl PageWindow {
    /// Check if record `pre` is on this page.
    #[inline]
    pub fn contains(&self, pre: usize) -> bool {
        self.first_pre <= pre && pre < self.next_pre
    }

    /// Byte offset of record `pre` inside the page.
    #[inline]
    pub fn offset(&self, pre: usize) -> usize {
        (pre - self.first_pre) * NODE_SIZE
    }

    /// Number of records on the page.
    #[inline]
    pub fn records(&self) -> usize {
        self.next_pre - self.first_pre
    }
}

/// Page directory plus free-page bitmap of a disk table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    /// First pre value of each used page, strictly ascending.
    first_pre: Vec<usize>,
    /// Physical page backing each used page.
    pages: Vec<usize>,
    /// Physical pages in use.
    free: FreePageBitmap,
    /// Number of physical pages in the data file.
    total: usize,
    /// Number of records.
    size: usize,
}

impl Directory {
    /// Create the directory of an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory of `size` records stored densely in pages `0, 1, 2, ...`.
    pub fn packed(size: usize) -> Self {
        let used = size.div_ceil(ENTRIES);
        let mut free = FreePageBitmap::new();
        (0..used).for_each(|p| free.set(p));
        Self {
            first_pre: (0..used).map(|p| p * ENTRIES).collect(),
            pages: (0..used).collect(),
            free,
            total: used,
            size,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Number of records.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of pages holding records.
    #[inline]
    pub fn used_pages(&self) -> usize {
        self.first_pre.len()
    }

    /// Number of physical pages in the data file.
    #[inline]
    pub fn total_pages(&self) -> usize {
        self.total
    }

    /// First pre value of every used page.
    #[inline]
    pub fn first_pres(&self) -> &[usize] {
        &self.first_pre
    }

    /// Physical page of every used page.
    #[inline]
    pub fn pages(&self) -> &[usize] {
        &self.pages
    }

    /// Check if physical page `page` backs a used page.
    #[inline]
    pub fn is_allocated(&self, page: usize) -> bool {
        self.free.get(page)
    }

    /// First pre value of page `i`.
    #[inline]
    pub fn first_pre(&self, i: usize) -> usize {
        self.first_pre[i]
    }

    /// First pre value after page `i`.
    #[inline]
    pub fn next_pre(&self, i: usize) -> usize {
        if i + 1 < self.used_pages() {
            self.first_pre[i + 1]
        } else {
            self.size
        }
    }

    /// Number of records on page `i`.
    #[inline]
    pub fn occupied(&self, i: usize) -> usize {
        self.next_pre(i) - self.first_pre[i]
    }

    /// Physical page of page `i`.
    #[inline]
    pub fn physical(&self, i: usize) -> usize {
        self.pages[i]
    }

    /// Block holding page `i`.
    #[inline]
    pub fn block(&self, i: usize) -> BlockId {
        BlockId::new(self.pages[i] as u64)
    }

    /// Window of page `i`.
    #[inline]
    pub fn window(&self, i: usize) -> PageWindow {
        PageWindow {
            page: i,
            first_pre: self.first_pre[i],
            next_pre: self.next_pre(i),
        }
    }

    /// Find the page holding record `pre`.
    ///
    /// Binary search over the used pages, starting at page `hint`; a hint
    /// on the right page answers in O(1).
    ///
    /// # Errors
    /// `Error::OutOfBounds` if no page holds `pre`.
    pub fn locate(&self, pre: usize, hint: usize) -> Result<PageWindow> {
        let used = self.used_pages();
        if used == 0 {
            return Err(self.out_of_bounds(pre, 0, 0, -1));
        }

        let mut low = 0isize;
        let mut high = used as isize - 1;
        let mut page = hint.min(used - 1);
        loop {
            let window = self.window(page);
            if pre < window.first_pre {
                high = page as isize - 1;
            } else if pre >= window.next_pre {
                low = page as isize + 1;
            } else {
                return Ok(window);
            }
            if low > high {
                return Err(self.out_of_bounds(pre, page, low, high));
            }
            page = ((low + high) / 2) as usize;
        }
    }

    fn out_of_bounds(&self, pre: usize, page: usize, low: isize, high: isize) -> Error {
        Error::OutOfBounds {
            pre,
            size: self.size,
            used: self.used_pages(),
            total: self.total,
            page,
            low,
            high,
        }
    }

    // ========================================================================
    // Updates
    // ========================================================================

    /// Claim the first free physical page.
    pub fn allocate(&mut self) -> usize {
        let page = self.free.next_free(0);
        self.free.set(page);
        self.total = self.total.max(page + 1);
        trace!(page, total = self.total, "allocated page");
        page
    }

    /// Return physical page `page` to the free pool.
    pub fn release(&mut self, page: usize) {
        self.free.clear(page);
        trace!(page, "released page");
    }

    /// Register `(first_pre, physical page)` entries before page `at`.
    pub fn insert_pages(&mut self, at: usize, entries: &[(usize, usize)]) {
        self.first_pre.reserve(entries.len());
        self.pages.reserve(entries.len());
        self.first_pre
            .splice(at..at, entries.iter().map(|&(fp, _)| fp));
        self.pages.splice(at..at, entries.iter().map(|&(_, p)| p));
    }

    /// Remove pages `at..at + count` from the directory.
    pub fn remove_pages(&mut self, at: usize, count: usize) {
        self.first_pre.drain(at..at + count);
        self.pages.drain(at..at + count);
    }

    /// Set the first pre value of page `i`.
    #[inline]
    pub fn set_first_pre(&mut self, i: usize, pre: usize) {
        self.first_pre[i] = pre;
    }

    /// Account for `count` records added on page `i`.
    pub fn grow(&mut self, i: usize, count: usize) {
        for fp in self.first_pre.iter_mut().skip(i + 1) {
            *fp += count;
        }
        self.size += count;
    }

    /// Account for `count` records removed up to page `i`.
    pub fn shrink(&mut self, i: usize, count: usize) {
        for fp in self.first_pre.iter_mut().skip(i + 1) {
            *fp -= count;
        }
        self.size -= count;
    }

    // ========================================================================
    // Consistency
    // ========================================================================

    /// Check the directory invariants.
    ///
    /// - `first_pre` starts at 0 and is strictly ascending
    /// - the last page ends before the table size
    /// - every used page is allocated in the bitmap and exists in the file
    /// - the bitmap holds no other pages
    pub fn verify(&self) -> Result<()> {
        let used = self.used_pages();
        if used == 0 {
            if self.size != 0 {
                return Err(corrupt(format!("{} records but no pages", self.size)));
            }
        } else {
            if self.first_pre[0] != 0 {
                return Err(corrupt(format!("first page starts at {}", self.first_pre[0])));
            }
            if let Some(i) = (0..used).find(|&i| self.first_pre[i] >= self.next_pre(i)) {
                return Err(corrupt(format!(
                    "page {} is empty or out of order ({} >= {})",
                    i,
                    self.first_pre[i],
                    self.next_pre(i)
                )));
            }
        }
        if let Some(&p) = self.pages.iter().find(|&&p| p >= self.total || !self.free.get(p)) {
            return Err(corrupt(format!("page {} is not allocated", p)));
        }
        if self.free.count() != used {
            return Err(corrupt(format!(
                "{} allocated pages for {} used pages",
                self.free.count(),
                used
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Serialize the directory.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let total = self.total;
        put_num(&mut buf, total as i32);
        put_num(&mut buf, self.used_pages() as i32);

        let padded = |values: &[usize]| -> Vec<i32> {
            let mut out: Vec<i32> = values.iter().map(|&v| v as i32).collect();
            out.resize(total, 0);
            out
        };
        put_nums(&mut buf, &padded(&self.first_pre));
        put_nums(&mut buf, &padded(&self.pages));

        let words = self.free.to_words(total);
        put_num(&mut buf, words.len() as i32);
        for w in words {
            buf.put_u64(w);
        }
        put_num(&mut buf, self.size as i32);
        buf
    }

    /// Parse a serialized directory.
    ///
    /// `size` supplies the table size for legacy files that do not store it;
    /// it is ignored when the file has its own.
    pub fn from_bytes(mut buf: &[u8], size: Option<usize>) -> Result<Self> {
        let total = to_count(get_num(&mut buf)?, "total pages")?;
        let used = to_count(get_num(&mut buf)?, "used pages")?;
        let first_pre = to_counts(get_nums(&mut buf)?, "first pre")?;
        let pages = to_counts(get_nums(&mut buf)?, "page")?;
        if used > total || first_pre.len() < used || pages.len() < used {
            return Err(corrupt(format!(
                "{} used pages, {} total, {} first pre values, {} page numbers",
                used,
                total,
                first_pre.len(),
                pages.len()
            )));
        }

        let words = to_count(get_num(&mut buf)?, "bitmap words")?;
        let free = if words == 0 {
            let mut free = FreePageBitmap::new();
            pages[..used].iter().for_each(|&p| free.set(p));
            free
        } else {
            if buf.remaining() < words * 8 {
                return Err(corrupt("truncated page bitmap".to_string()));
            }
            FreePageBitmap::from_words((0..words).map(|_| buf.get_u64()).collect())
        };

        let size = if buf.has_remaining() {
            to_count(get_num(&mut buf)?, "table size")?
        } else {
            size.ok_or_else(|| corrupt("table size is not stored".to_string()))?
        };

        let dir = Self {
            first_pre: first_pre[..used].to_vec(),
            pages: pages[..used].to_vec(),
            free,
            total,
            size,
        };
        dir.verify()?;
        Ok(dir)
    }

    /// Read a directory file.
    pub fn read(path: &Path, size: Option<usize>) -> Result<Self> {
        Self::from_bytes(&std::fs::read(path)?, size)
    }

    /// Write the directory file.
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }
}

fn corrupt(msg: String) -> Error {
    Error::CorruptDirectory(msg)
}

fn to_count(v: i32, what: &str) -> Result<usize> {
    usize::try_from(v).map_err(|_| corrupt(format!("negative {}: {}", what, v)))
}

fn to_counts(values: Vec<i32>, what: &str) -> Result<Vec<usize>> {
    values.into_iter().map(|v| to_count(v, what)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Directory with three pages: [0, 256), [256, 400), [400, 530).
    fn three_pages() -> Directory {
        let mut dir = Directory::new();
        let pages: Vec<usize> = (0..3).map(|_| dir.allocate()).collect();
        dir.insert_pages(0, &[(0, pages[0]), (256, pages[1]), (400, pages[2])]);
        dir.size = 530;
        dir
    }

    #[test]
    fn test_packed() {
        let dir = Directory::packed(ENTRIES * 2 + 1);
        assert_eq!(dir.used_pages(), 3);
        assert_eq!(dir.first_pres(), &[0, ENTRIES, ENTRIES * 2]);
        assert_eq!(dir.occupied(2), 1);
        dir.verify().unwrap();

        let empty = Directory::packed(0);
        assert_eq!(empty.used_pages(), 0);
        empty.verify().unwrap();
    }

    #[test]
    fn test_locate() {
        let dir = three_pages();
        for hint in 0..5 {
            assert_eq!(dir.locate(0, hint).unwrap().page, 0);
            assert_eq!(dir.locate(255, hint).unwrap().page, 0);
            assert_eq!(dir.locate(256, hint).unwrap().page, 1);
            assert_eq!(dir.locate(529, hint).unwrap().page, 2);
        }

        let window = dir.locate(300, 0).unwrap();
        assert_eq!(
            window,
            PageWindow {
                page: 1,
                first_pre: 256,
                next_pre: 400
            }
        );
        assert_eq!(window.offset(300), 44 * NODE_SIZE);
        assert_eq!(window.records(), 144);
    }

    #[test]
    fn test_locate_out_of_bounds() {
        let dir = three_pages();
        match dir.locate(530, 1) {
            Err(Error::OutOfBounds { pre, size, used, .. }) => {
                assert_eq!((pre, size, used), (530, 530, 3));
            }
            other => panic!("expected OutOfBounds, got {:?}", other),
        }
        assert!(Directory::new().locate(0, 0).is_err());
    }

    #[test]
    fn test_grow_and_shrink() {
        let mut dir = three_pages();
        dir.grow(0, 10);
        assert_eq!(dir.first_pres(), &[0, 266, 410]);
        assert_eq!(dir.size(), 540);

        dir.shrink(1, 10);
        assert_eq!(dir.first_pres(), &[0, 266, 400]);
        assert_eq!(dir.size(), 530);
    }

    #[test]
    fn test_allocate_reuses_holes() {
        let mut dir = three_pages();
        assert_eq!(dir.total_pages(), 3);

        dir.release(1);
        assert!(!dir.is_allocated(1));
        assert_eq!(dir.allocate(), 1);
        assert_eq!(dir.allocate(), 3);
        assert_eq!(dir.total_pages(), 4);
    }

    #[test]
    fn test_verify_rejects_bad_order() {
        let mut dir = three_pages();
        dir.set_first_pre(2, 256);
        assert!(matches!(dir.verify(), Err(Error::CorruptDirectory(_))));
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut dir = three_pages();
        dir.release(dir.physical(1));
        dir.remove_pages(1, 1);
        dir.shrink(0, 144);
        dir.set_first_pre(1, 256);
        dir.verify().unwrap();

        let restored = Directory::from_bytes(&dir.to_bytes(), None).unwrap();
        assert_eq!(restored, dir);
        assert_eq!(restored.total_pages(), 3);
    }

    #[test]
    fn test_legacy_format() {
        // total 2, used 2, first_pre [0, 256], pages [1, 0], no bitmap, no size
        let mut buf = Vec::new();
        put_num(&mut buf, 2);
        put_num(&mut buf, 2);
        put_nums(&mut buf, &[0, 256]);
        put_nums(&mut buf, &[1, 0]);
        put_num(&mut buf, 0);

        assert!(Directory::from_bytes(&buf, None).is_err());

        let dir = Directory::from_bytes(&buf, Some(300)).unwrap();
        assert_eq!(dir.size(), 300);
        assert_eq!(dir.pages(), &[1, 0]);
        assert!(dir.is_allocated(0));
        assert!(dir.is_allocated(1));
        assert_eq!(dir.occupied(1), 44);
    }

    #[test]
    fn test_truncated_file() {
        let bytes = three_pages().to_bytes();
        assert!(Directory::from_bytes(&bytes[..bytes.len() / 2], None).is_err());
    }
}
