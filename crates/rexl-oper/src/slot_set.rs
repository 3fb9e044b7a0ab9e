//! Bitsets indexed by argument slot.

use std::fmt;

const WORD_BITS: usize = 64;

/// A set of slot indices.
///
/// Stored as 64-bit words with trailing zero words trimmed, so two sets with
/// the same members are always `==` and hash the same.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct SlotSet {
    words: Vec<u64>,
}

impl SlotSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The set `{lo, lo + 1, .., hi - 1}`.
    pub fn range(lo: usize, hi: usize) -> Self {
        (lo..hi).collect()
    }

    pub fn single(slot: usize) -> Self {
        let mut set = Self::new();
        set.insert(slot);
        set
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.words
            .get(slot / WORD_BITS)
            .is_some_and(|w| w & (1u64 << (slot % WORD_BITS)) != 0)
    }

    pub fn insert(&mut self, slot: usize) {
        let word = slot / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (slot % WORD_BITS);
    }

    pub fn remove(&mut self, slot: usize) {
        if let Some(w) = self.words.get_mut(slot / WORD_BITS) {
            *w &= !(1u64 << (slot % WORD_BITS));
            self.trim();
        }
    }

    /// A copy of this set with `slot` added.
    pub fn with(mut self, slot: usize) -> Self {
        self.insert(slot);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Largest member, if any.
    pub fn max_slot(&self) -> Option<usize> {
        let last = self.words.last()?;
        let top = WORD_BITS - 1 - last.leading_zeros() as usize;
        Some((self.words.len() - 1) * WORD_BITS + top)
    }

    /// Whether every member is below `limit`.
    pub fn is_below(&self, limit: usize) -> bool {
        self.max_slot().is_none_or(|max| max < limit)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| wi * WORD_BITS + bit)
        })
    }

    pub fn union(&self, other: &SlotSet) -> SlotSet {
        let len = self.words.len().max(other.words.len());
        let words = (0..len)
            .map(|i| self.word(i) | other.word(i))
            .collect();
        Self::from_words(words)
    }

    pub fn intersection(&self, other: &SlotSet) -> SlotSet {
        let len = self.words.len().min(other.words.len());
        let words = (0..len).map(|i| self.word(i) & other.word(i)).collect();
        Self::from_words(words)
    }

    pub fn difference(&self, other: &SlotSet) -> SlotSet {
        let words = (0..self.words.len())
            .map(|i| self.word(i) & !other.word(i))
            .collect();
        Self::from_words(words)
    }

    pub fn is_subset(&self, other: &SlotSet) -> bool {
        (0..self.words.len()).all(|i| self.word(i) & !other.word(i) == 0)
    }

    pub fn is_disjoint(&self, other: &SlotSet) -> bool {
        self.intersection(other).is_empty()
    }

    fn word(&self, i: usize) -> u64 {
        self.words.get(i).copied().unwrap_or(0)
    }

    fn from_words(words: Vec<u64>) -> Self {
        let mut set = Self { words };
        set.trim();
        set
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl FromIterator<usize> for SlotSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = Self::new();
        for slot in iter {
            set.insert(slot);
        }
        set
    }
}

impl fmt::Debug for SlotSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
