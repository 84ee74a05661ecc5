//! Cache and page lookup counters.
//!
//! [`PoolStats`] counts what the block pool does, [`LookupStats`] counts
//! how often the page of the last lookup already held the next requested
//! pre value. A [`TableStats`] combines both for one disk table.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of a block pool.
///
/// Counters are atomic so they can be read through a shared reference
/// while the pool itself sits behind a lock.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Acquires served by a resident block.
    pub hits: AtomicU64,

    /// Acquires that had to load a block.
    pub misses: AtomicU64,

    /// Bound blocks replaced by another position.
    pub evictions: AtomicU64,

    /// Blocks read from disk.
    pub blocks_read: AtomicU64,

    /// Blocks written to disk.
    pub blocks_written: AtomicU64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter values.
    pub fn counts(&self) -> CacheCounts {
        CacheCounts {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            blocks_read: self.blocks_read.load(Ordering::Relaxed),
            blocks_written: self.blocks_written.load(Ordering::Relaxed),
        }
    }
}

/// Block pool counters at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounts {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub blocks_read: u64,
    pub blocks_written: u64,
}

/// Counters of the page directory lookups of a disk table.
#[derive(Debug, Default)]
pub struct LookupStats {
    /// Lookups answered by the page of the previous lookup.
    pub hinted: AtomicU64,

    /// Lookups that had to search the directory.
    pub searched: AtomicU64,
}

impl LookupStats {
    /// Count one lookup; `hinted` if the previous page held `pre`.
    #[inline]
    pub fn record(&self, hinted: bool) {
        let counter = if hinted { &self.hinted } else { &self.searched };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Block cache and page lookup counters of one disk table.
///
/// # Example
/// ```no_run
/// use nodestore::{DiskTable, RecordTable, TableConfig};
///
/// let table = DiskTable::open(&TableConfig::new("db"), false).unwrap();
/// for pre in 0..table.size() {
///     table.read1(pre, 0).unwrap();
/// }
/// println!("{}", table.stats());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub cache: CacheCounts,
    /// Lookups answered by the page of the previous lookup.
    pub hinted: u64,
    /// Lookups that searched the page directory.
    pub searched: u64,
}

impl TableStats {
    pub(crate) fn new(cache: CacheCounts, lookups: &LookupStats) -> Self {
        Self {
            cache,
            hinted: lookups.hinted.load(Ordering::Relaxed),
            searched: lookups.searched.load(Ordering::Relaxed),
        }
    }

    /// Share of block acquires served from the cache.
    pub fn cache_hit_rate(&self) -> f64 {
        ratio(self.cache.hits, self.cache.misses)
    }

    /// Share of page lookups answered without a directory search.
    pub fn hint_rate(&self) -> f64 {
        ratio(self.hinted, self.searched)
    }
}

fn ratio(good: u64, bad: u64) -> f64 {
    match good + bad {
        0 => 0.0,
        total => good as f64 / total as f64,
    }
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "blocks {}/{} cached ({:.1}%), {} evicted, {} read, {} written; \
             pages {}/{} hinted ({:.1}%)",
            self.cache.hits,
            self.cache.hits + self.cache.misses,
            self.cache_hit_rate() * 100.0,
            self.cache.evictions,
            self.cache.blocks_read,
            self.cache.blocks_written,
            self.hinted,
            self.hinted + self.searched,
            self.hint_rate() * 100.0
        )
    }
}
