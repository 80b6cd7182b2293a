//! Compact set of field indices

/// Bitset over field indices
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldMask {
    words: Vec<u64>,
}

impl FieldMask {
    /// Empty mask sized for `fields` indices
    pub fn with_capacity(fields: usize) -> Self {
        Self {
            words: vec![0; fields.div_ceil(64)],
        }
    }

    /// Mark `index`
    pub fn insert(&mut self, index: usize) {
        let word = index / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (index % 64);
    }

    /// Unmark `index`
    pub fn remove(&mut self, index: usize) {
        if let Some(w) = self.words.get_mut(index / 64) {
            *w &= !(1 << (index % 64));
        }
    }

    /// Whether `index` is marked
    pub fn contains(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .is_some_and(|w| w & (1 << (index % 64)) != 0)
    }

    /// Number of marked indices
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether nothing is marked
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Unmark everything
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Marked indices in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            (0..64).filter(move |bit| word & (1 << bit) != 0).map(move |bit| wi * 64 + bit)
        })
    }
}
