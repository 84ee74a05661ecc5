//! Free-page bitmap.

/// One bit per physical page of a table data file.
///
/// A bit is set iff the page currently backs an entry of the page
/// directory. Cleared bits are holes that are reused before the file grows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreePageBitmap {
    words: Vec<u64>,
}

impl FreePageBitmap {
    /// Create an empty bitmap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a bitmap from its persisted words.
    pub fn from_words(words: Vec<u64>) -> Self {
        Self { words }
    }

    /// Check if page `page` is in use.
    #[inline]
    pub fn get(&self, page: usize) -> bool {
        self.words
            .get(page >> 6)
            .is_some_and(|w| w & (1 << (page & 63)) != 0)
    }

    /// Mark page `page` as used.
    pub fn set(&mut self, page: usize) {
        let word = page >> 6;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (page & 63);
    }

    /// Mark page `page` as free.
    pub fn clear(&mut self, page: usize) {
        if let Some(w) = self.words.get_mut(page >> 6) {
            *w &= !(1 << (page & 63));
        }
    }

    /// First free page at or after `from`.
    pub fn next_free(&self, from: usize) -> usize {
        let mut word = from >> 6;
        let mut mask = !0u64 << (from & 63);
        while let Some(&w) = self.words.get(word) {
            let free = !w & mask;
            if free != 0 {
                return (word << 6) + free.trailing_zeros() as usize;
            }
            word += 1;
            mask = !0;
        }
        from.max(word << 6)
    }

    /// Number of used pages.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Words covering the first `pages` pages, for persistence.
    pub fn to_words(&self, pages: usize) -> Vec<u64> {
        let mut words = self.words.clone();
        words.resize(pages.div_ceil(64), 0);
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_clear_get() {
        let mut bits = FreePageBitmap::new();
        assert!(!bits.get(0));
        assert!(!bits.get(1000));

        bits.set(0);
        bits.set(65);
        assert!(bits.get(0));
        assert!(bits.get(65));
        assert!(!bits.get(64));
        assert_eq!(bits.count(), 2);

        bits.clear(0);
        assert!(!bits.get(0));
        // clearing beyond the end is a no-op
        bits.clear(5000);
        assert_eq!(bits.count(), 1);
    }

    #[test]
    fn test_next_free() {
        let mut bits = FreePageBitmap::new();
        assert_eq!(bits.next_free(0), 0);

        for p in 0..3 {
            bits.set(p);
        }
        assert_eq!(bits.next_free(0), 3);

        bits.clear(1);
        assert_eq!(bits.next_free(0), 1);
        assert_eq!(bits.next_free(2), 3);
    }

    #[test]
    fn test_next_free_across_words() {
        let mut bits = FreePageBitmap::new();
        for p in 0..64 {
            bits.set(p);
        }
        assert_eq!(bits.next_free(0), 64);
        assert_eq!(bits.next_free(10), 64);
        assert_eq!(bits.next_free(200), 200);
    }

    #[test]
    fn test_words_round_trip() {
        let mut bits = FreePageBitmap::new();
        bits.set(3);
        bits.set(70);

        let words = bits.to_words(130);
        assert_eq!(words.len(), 3);
        let restored = FreePageBitmap::from_words(words);
        assert!(restored.get(3));
        assert!(restored.get(70));
        assert_eq!(restored.count(), 2);
    }
}
