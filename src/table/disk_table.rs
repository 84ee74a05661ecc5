//! Disk table - records in a paged data file.
//!
//! Records live in pages of [`ENTRIES`] records, one page per block of the
//! data file (`<name>.tbl`). Pages need not be full and need not be in
//! order on disk: the [`Directory`] (`<name>.tbli`) maps every logical page
//! to its first pre value and its physical block. Inserting and deleting
//! records only touches the affected pages and shifts the directory
//! entries behind them; no record is ever moved across the whole file.

use std::fs::{self, File};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::buffer::{BlockPool, LookupStats, TableStats};
use crate::common::config::{BLOCK_SIZE, ENTRIES, NODE_SIZE};
use crate::common::{BlockId, Error, Result, TableConfig};
use crate::storage::{BlockFile, FileLock, LockMode};
use crate::table::{check_field, check_range, check_span, record_count, Directory, PageWindow, RecordTable};

/// A [`RecordTable`] backed by a block-cached data file.
///
/// # Concurrency
/// Reads take `&self`: the block pool sits behind a mutex and the page of
/// the last lookup is kept in an atomic hint, so concurrent readers only
/// serialize on the pool itself. Structural updates take `&mut self`.
///
/// Across handles, the data file carries an advisory lock: exclusive for
/// writers, shared for readers.
///
/// # Example
/// ```no_run
/// use nodestore::{DiskTable, RecordTable, TableConfig};
///
/// let config = TableConfig::new("db").name("doc");
/// let mut table = DiskTable::create(&config).unwrap();
/// table.insert(0, &[0u8; 32]).unwrap();
/// table.write4(1, 4, 42).unwrap();
/// assert_eq!(table.read4(1, 4).unwrap(), 42);
/// table.close().unwrap();
/// ```
pub struct DiskTable {
    config: TableConfig,
    pool: Mutex<BlockPool>,
    dir: Directory,
    /// Logical page of the most recent lookup.
    hint: AtomicUsize,
    lookups: LookupStats,
    lock: FileLock,
    /// Directory changed since the last full flush.
    dirty: bool,
    closed: bool,
}

impl DiskTable {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create an empty table and open it for writing.
    ///
    /// # Errors
    /// Fails if the data file already exists.
    pub fn create(config: &TableConfig) -> Result<Self> {
        Self::build(config, &[])?;
        Self::open(config, true)
    }

    /// Write `entries` as a new table with densely packed pages.
    ///
    /// # Errors
    /// Fails if the data file already exists or `entries` is not a whole
    /// number of records.
    pub fn build(config: &TableConfig, entries: &[u8]) -> Result<()> {
        let size = record_count(entries)?;
        fs::create_dir_all(&config.dir)?;

        let mut file = BlockFile::create(config.data_path())?;
        let mut buf = vec![0u8; BLOCK_SIZE];
        for (i, chunk) in entries.chunks(BLOCK_SIZE).enumerate() {
            buf[..chunk.len()].copy_from_slice(chunk);
            buf[chunk.len()..].fill(0);
            file.write_block(BlockId::new(i as u64), &buf)?;
        }
        file.sync()?;

        let dir = Directory::packed(size);
        dir.write(&config.directory_path())?;
        debug!(
            path = %config.data_path().display(),
            size,
            pages = dir.total_pages(),
            "built table"
        );
        Ok(())
    }

    /// Open an existing table, locking it exclusively for `write`.
    ///
    /// # Errors
    /// `Error::Pinned` if another handle holds an incompatible lock.
    pub fn open(config: &TableConfig, write: bool) -> Result<Self> {
        Self::open_with(config, None, write)
    }

    /// Open a table whose directory file does not store the table size.
    ///
    /// `size` is used only if the directory file lacks it.
    pub fn open_sized(config: &TableConfig, size: usize, write: bool) -> Result<Self> {
        Self::open_with(config, Some(size), write)
    }

    fn open_with(config: &TableConfig, size: Option<usize>, write: bool) -> Result<Self> {
        let path = config.data_path();
        let file = BlockFile::open(&path)?;
        let mode = if write {
            LockMode::Exclusive
        } else {
            LockMode::Shared
        };
        let lock = FileLock::try_lock(file.file(), mode)?.ok_or_else(|| Error::Pinned(path.clone()))?;

        let dir = Directory::read(&config.directory_path(), size)?;
        debug!(
            path = %path.display(),
            size = dir.size(),
            used = dir.used_pages(),
            total = dir.total_pages(),
            ?mode,
            "opened table"
        );

        Ok(Self {
            config: config.clone(),
            pool: Mutex::new(BlockPool::new(file, config.buffers)),
            dir,
            hint: AtomicUsize::new(0),
            lookups: LookupStats::default(),
            lock,
            dirty: false,
            closed: false,
        })
    }

    /// Check if another handle holds a lock on the table of `config`.
    pub fn is_pinned(config: &TableConfig) -> Result<bool> {
        let path = config.data_path();
        if !path.exists() {
            return Ok(false);
        }
        let file = File::open(&path)?;
        Ok(FileLock::try_lock(&file, LockMode::Exclusive)?.is_none())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Page directory.
    #[inline]
    pub fn directory(&self) -> &Directory {
        &self.dir
    }

    /// Table configuration.
    #[inline]
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Block cache and page lookup counters since the table was opened.
    pub fn stats(&self) -> TableStats {
        let cache = self.pool.lock().stats().counts();
        TableStats::new(cache, &self.lookups)
    }

    /// Window of the page holding `pre`.
    ///
    /// A `hint` from an earlier call is returned as is while it still
    /// matches the directory and holds `pre`; otherwise the search starts at
    /// its page.
    pub fn window(&self, pre: usize, hint: Option<PageWindow>) -> Result<PageWindow> {
        if let Some(w) = hint {
            if w.contains(pre) && w.page < self.dir.used_pages() && self.dir.window(w.page) == w {
                return Ok(w);
            }
        }
        self.dir.locate(pre, hint.map_or(0, |w| w.page))
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Find the page of `pre`, starting at the last page found.
    fn locate(&self, pre: usize) -> Result<PageWindow> {
        let hint = self.hint.load(Ordering::Relaxed);
        let window = self.dir.locate(pre, hint)?;
        self.lookups.record(window.page == hint);
        self.hint.store(window.page, Ordering::Relaxed);
        Ok(window)
    }
}

impl RecordTable for DiskTable {
    #[inline]
    fn size(&self) -> usize {
        self.dir.size()
    }

    fn read_field(&self, pre: usize, off: usize, width: usize) -> Result<u64> {
        self.check_open()?;
        check_field(off, width)?;
        let window = self.locate(pre)?;
        let pos = window.offset(pre) + off;

        let mut pool = self.pool.lock();
        let data = pool.read(self.dir.block(window.page))?;
        Ok(data[pos..pos + width]
            .iter()
            .fold(0u64, |v, &b| (v << 8) | b as u64))
    }

    fn write_field(&mut self, pre: usize, off: usize, width: usize, value: u64) -> Result<()> {
        self.check_open()?;
        check_field(off, width)?;
        let window = self.locate(pre)?;
        let pos = window.offset(pre) + off;

        let data = self.pool.get_mut().write(self.dir.block(window.page))?;
        for (i, b) in data[pos..pos + width].iter_mut().enumerate() {
            *b = (value >> ((width - 1 - i) * 8)) as u8;
        }
        Ok(())
    }

    fn copy(&mut self, entries: &[u8], pre: usize, last: usize) -> Result<()> {
        self.check_open()?;
        let count = check_span(pre, last, self.dir.size())?;
        if entries.len() < count * NODE_SIZE {
            return Err(Error::Misaligned(entries.len()));
        }

        let mut pre = pre;
        let mut src = 0;
        while pre < last {
            let window = self.locate(pre)?;
            let end = last.min(window.next_pre);
            let len = (end - pre) * NODE_SIZE;
            let pos = window.offset(pre);

            let data = self.pool.get_mut().write(self.dir.block(window.page))?;
            data[pos..pos + len].copy_from_slice(&entries[src..src + len]);
            src += len;
            pre = end;
        }
        Ok(())
    }

    fn insert(&mut self, pre: usize, entries: &[u8]) -> Result<()> {
        self.check_open()?;
        let count = record_count(entries)?;
        if count == 0 {
            return Ok(());
        }
        let size = self.dir.size();
        if pre > size {
            return Err(Error::InvalidRange { pre, count, size });
        }
        self.dirty = true;

        // active page and byte offset of the insertion point
        let (window, split) = if self.dir.used_pages() == 0 {
            let page = self.dir.allocate();
            self.dir.insert_pages(0, &[(0, page)]);
            (self.dir.window(0), 0)
        } else if pre > 0 {
            let window = self.locate(pre - 1)?;
            (window, window.offset(pre - 1) + NODE_SIZE)
        } else {
            (self.locate(0)?, 0)
        };

        let pool = self.pool.get_mut();
        let used = window.records() * NODE_SIZE;
        let data = pool.write(self.dir.block(window.page))?;

        if used + entries.len() <= BLOCK_SIZE {
            data.copy_within(split..used, split + entries.len());
            data[split..split + entries.len()].copy_from_slice(entries);
            self.dir.grow(window.page, count);
            *self.hint.get_mut() = window.page;
            return Ok(());
        }

        // new records followed by the displaced tail of the active page
        let mut all = Vec::with_capacity(entries.len() + used - split);
        all.extend_from_slice(entries);
        all.extend_from_slice(&data[split..used]);

        let filled = BLOCK_SIZE - split;
        data[split..].copy_from_slice(&all[..filled]);

        let rest = all.len() - filled;
        let mut needed = rest / BLOCK_SIZE;
        let remain = rest % BLOCK_SIZE;
        let mut end = all.len();

        if remain > 0 {
            // the last partial chunk goes to the front of the next page if it fits
            let next = window.page + 1;
            let next_used = if next < self.dir.used_pages() {
                self.dir.occupied(next) * NODE_SIZE
            } else {
                BLOCK_SIZE
            };
            if next_used + remain <= BLOCK_SIZE {
                let data = pool.write(self.dir.block(next))?;
                data.copy_within(0..next_used, remain);
                data[..remain].copy_from_slice(&all[end - remain..]);
                let first = self.dir.first_pre(next);
                self.dir.set_first_pre(next, first - remain / NODE_SIZE);
                end -= remain;
            } else {
                needed += 1;
            }
        }

        let mut added = Vec::with_capacity(needed);
        let mut first = window.first_pre;
        let mut src = filled;
        for _ in 0..needed {
            let page = self.dir.allocate();
            let len = (end - src).min(BLOCK_SIZE);
            let data = pool.write(BlockId::new(page as u64))?;
            data[..len].copy_from_slice(&all[src..src + len]);
            src += len;
            first += ENTRIES;
            added.push((first, page));
        }
        self.dir.insert_pages(window.page + 1, &added);

        let last = window.page + needed;
        self.dir.grow(last, count);
        *self.hint.get_mut() = last;
        trace!(pre, count, page = window.page, added = needed, "split page");
        Ok(())
    }

    fn delete(&mut self, pre: usize, count: usize) -> Result<()> {
        self.check_open()?;
        check_range(pre, count, self.dir.size())?;
        if count == 0 {
            return Ok(());
        }
        self.dirty = true;

        let window = self.locate(pre)?;
        let last = pre + count;
        let pool = self.pool.get_mut();

        if last <= window.next_pre {
            let from = window.offset(pre);
            let data = pool.write(self.dir.block(window.page))?;
            data.copy_within(from + count * NODE_SIZE..window.records() * NODE_SIZE, from);
            self.dir.shrink(window.page, count);

            if self.dir.occupied(window.page) == 0 {
                let page = self.dir.physical(window.page);
                self.dir.release(page);
                self.dir.remove_pages(window.page, 1);
                trace!(pre, page = window.page, "removed empty page");
            }
            *self.hint.get_mut() = window.page.min(self.dir.used_pages().saturating_sub(1));
            return Ok(());
        }

        // pages emptied completely are released and dropped from the directory
        let mut page = window.page;
        let mut from = pre - window.first_pre;
        let mut unused = 0;
        while self.dir.next_pre(page) < last {
            if from == 0 {
                let physical = self.dir.physical(page);
                self.dir.release(physical);
                unused += 1;
            }
            page += 1;
            from = 0;
        }

        let first = self.dir.first_pre(page);
        let next = self.dir.next_pre(page);
        if next == last {
            let physical = self.dir.physical(page);
            self.dir.release(physical);
            unused += 1;
            page += 1;
        } else {
            let data = pool.write(self.dir.block(page))?;
            data.copy_within((last - first) * NODE_SIZE..(next - first) * NODE_SIZE, 0);
        }

        let start = page - unused;
        self.dir.remove_pages(start, unused);
        if start < self.dir.used_pages() {
            self.dir.set_first_pre(start, pre);
        }
        self.dir.shrink(start, count);
        *self.hint.get_mut() = start.min(self.dir.used_pages().saturating_sub(1));
        trace!(pre, count, removed = unused, "deleted across pages");
        Ok(())
    }

    fn flush(&mut self, all: bool) -> Result<()> {
        self.check_open()?;
        let pool = self.pool.get_mut();
        pool.set_len((self.dir.total_pages() * BLOCK_SIZE) as u64);
        pool.flush_all()?;

        if all && self.dirty {
            self.dir.write(&self.config.directory_path())?;
            self.dirty = false;
            debug!(
                path = %self.config.directory_path().display(),
                size = self.dir.size(),
                used = self.dir.used_pages(),
                "wrote directory"
            );
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let flushed = self.flush(true);
        self.closed = true;
        self.lock.release()?;
        debug!(path = %self.config.data_path().display(), "closed table");
        flushed
    }

    fn lock(&mut self, write: bool) -> Result<bool> {
        self.check_open()?;
        if write {
            if self.lock.acquire(LockMode::Exclusive)? {
                return Ok(true);
            }
            if self.lock.acquire(LockMode::Shared)? {
                return Ok(false);
            }
        } else if self.lock.acquire(LockMode::Shared)? {
            return Ok(true);
        }
        Err(Error::Pinned(self.config.data_path()))
    }
}

impl Drop for DiskTable {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.config.data_path().display(), error = %e, "failed to close table");
        }
    }
}
