//! Growable bit vector backing the free-space bitmap.

const WORD_BITS: u64 = 64;

/// Bit-per-block vector stored in 64-bit words
///
/// Bits past the end of `words` read as clear. Setting grows the vector;
/// clearing never does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits currently backed by storage
    pub fn capacity(&self) -> u64 {
        self.words.len() as u64 * WORD_BITS
    }

    pub fn get(&self, index: u64) -> bool {
        let word = (index / WORD_BITS) as usize;
        match self.words.get(word) {
            Some(w) => w & (1u64 << (index % WORD_BITS)) != 0,
            None => false,
        }
    }

    /// Set bits `[start, end)`, growing as needed
    pub fn set_range(&mut self, start: u64, end: u64) {
        if end <= start {
            return;
        }
        let needed = end.div_ceil(WORD_BITS) as usize;
        if self.words.len() < needed {
            self.words.resize(needed, 0);
        }
        Self::for_each_word(start, end, |word, mask| self.words[word] |= mask);
    }

    /// Clear bits `[start, end)`; bits beyond capacity are already clear
    pub fn clear_range(&mut self, start: u64, end: u64) {
        let end = end.min(self.capacity());
        if end <= start {
            return;
        }
        Self::for_each_word(start, end, |word, mask| self.words[word] &= !mask);
    }

    /// Count set bits in `[start, end)`
    pub fn count_ones(&self, start: u64, end: u64) -> u64 {
        let end = end.min(self.capacity());
        if end <= start {
            return 0;
        }
        let mut count = 0u64;
        Self::for_each_word(start, end, |word, mask| {
            count += (self.words[word] & mask).count_ones() as u64;
        });
        count
    }

    /// Index of the first clear bit at or after `from`
    pub fn next_clear(&self, from: u64) -> u64 {
        let mut word = (from / WORD_BITS) as usize;
        if word >= self.words.len() {
            return from;
        }
        let mut bits = !self.words[word] & (!0u64 << (from % WORD_BITS));
        loop {
            if bits != 0 {
                return word as u64 * WORD_BITS + bits.trailing_zeros() as u64;
            }
            word += 1;
            if word >= self.words.len() {
                return self.capacity();
            }
            bits = !self.words[word];
        }
    }

    /// Index of the first set bit at or after `from`, if any
    pub fn next_set(&self, from: u64) -> Option<u64> {
        let mut word = (from / WORD_BITS) as usize;
        if word >= self.words.len() {
            return None;
        }
        let mut bits = self.words[word] & (!0u64 << (from % WORD_BITS));
        loop {
            if bits != 0 {
                return Some(word as u64 * WORD_BITS + bits.trailing_zeros() as u64);
            }
            word += 1;
            if word >= self.words.len() {
                return None;
            }
            bits = self.words[word];
        }
    }

    /// Drop all storage; every bit reads as clear afterwards
    pub fn reset(&mut self) {
        self.words.clear();
    }

    /// Visit each word overlapping `[start, end)` with the mask of covered bits
    fn for_each_word(start: u64, end: u64, mut f: impl FnMut(usize, u64)) {
        let first = start / WORD_BITS;
        let last = (end - 1) / WORD_BITS;
        for word in first..=last {
            let lo = if word == first { start % WORD_BITS } else { 0 };
            let hi = if word == last { (end - 1) % WORD_BITS + 1 } else { WORD_BITS };
            let mask = if hi - lo == WORD_BITS {
                !0u64
            } else {
                ((1u64 << (hi - lo)) - 1) << lo
            };
            f(word as usize, mask);
        }
    }
}
