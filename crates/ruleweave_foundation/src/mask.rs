//! Bitsets tagged by the index space that produced their bits.
//!
//! Every mask in the engine is built from one index function: in-rule fact
//! type positions, alpha condition indices, memory address indices, and so
//! on. The marker parameter keeps masks from different index spaces apart at
//! compile time, so an alpha-condition mask can never be intersected with a
//! memory-address mask.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Marker trait for an index space.
pub trait MaskIndex: 'static {
    /// Short label used in debug output.
    const LABEL: &'static str;
}

/// Bits index fact-type positions within one rule.
#[derive(Debug, Clone, Copy)]
pub struct FactTypeBits;

/// Bits index alpha conditions of one active type.
#[derive(Debug, Clone, Copy)]
pub struct AlphaConditionBits;

/// Bits index memory addresses (key buckets) of a runtime.
#[derive(Debug, Clone, Copy)]
pub struct MemoryAddressBits;

/// Bits index active types of a runtime.
#[derive(Debug, Clone, Copy)]
pub struct TypeBits;

impl MaskIndex for FactTypeBits {
    const LABEL: &'static str = "fact-types";
}

impl MaskIndex for AlphaConditionBits {
    const LABEL: &'static str = "alpha";
}

impl MaskIndex for MemoryAddressBits {
    const LABEL: &'static str = "memory";
}

impl MaskIndex for TypeBits {
    const LABEL: &'static str = "types";
}

const WORD_BITS: usize = 64;

/// A growable bitset keyed by index space `K`.
pub struct Mask<K: MaskIndex> {
    words: Vec<u64>,
    _index: PhantomData<fn() -> K>,
}

impl<K: MaskIndex> Mask<K> {
    /// Creates an empty mask.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            words: Vec::new(),
            _index: PhantomData,
        }
    }

    /// Creates a mask with the given bits set.
    #[must_use]
    pub fn from_bits(bits: impl IntoIterator<Item = usize>) -> Self {
        let mut mask = Self::new();
        for bit in bits {
            mask.set(bit);
        }
        mask
    }

    /// Sets a bit.
    pub fn set(&mut self, bit: usize) {
        let word = bit / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (bit % WORD_BITS);
    }

    /// Sets a bit to the given value.
    pub fn assign(&mut self, bit: usize, value: bool) {
        if value {
            self.set(bit);
        } else {
            self.clear_bit(bit);
        }
    }

    /// Clears a bit.
    pub fn clear_bit(&mut self, bit: usize) {
        if let Some(w) = self.words.get_mut(bit / WORD_BITS) {
            *w &= !(1 << (bit % WORD_BITS));
        }
    }

    /// Returns true if the bit is set.
    #[must_use]
    pub fn get(&self, bit: usize) -> bool {
        self.words
            .get(bit / WORD_BITS)
            .is_some_and(|w| w & (1 << (bit % WORD_BITS)) != 0)
    }

    /// Clears every bit.
    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Returns true if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Returns the number of set bits.
    #[must_use]
    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns true if the two masks share at least one bit.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .any(|(a, b)| a & b != 0)
    }

    /// Returns true if every bit of `other` is also set in `self`.
    #[must_use]
    pub fn contains_all(&self, other: &Self) -> bool {
        other.words.iter().enumerate().all(|(i, b)| {
            let a = self.words.get(i).copied().unwrap_or(0);
            a & b == *b
        })
    }

    /// Returns true if, on every bit of `scope`, `self` agrees with `expected`.
    ///
    /// This is the alpha-address test: `scope` names the conditions an
    /// address involves and `expected` their required outcomes.
    #[must_use]
    pub fn agrees_on(&self, scope: &Self, expected: &Self) -> bool {
        scope.words.iter().enumerate().all(|(i, s)| {
            let a = self.words.get(i).copied().unwrap_or(0);
            let e = expected.words.get(i).copied().unwrap_or(0);
            (a ^ e) & s == 0
        })
    }

    /// Adds every bit of `other` to `self`.
    pub fn union_with(&mut self, other: &Self) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    /// Returns the union of two masks.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.union_with(other);
        out
    }

    /// Iterates over set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &w)| {
            (0..WORD_BITS)
                .filter(move |b| w & (1 << b) != 0)
                .map(move |b| i * WORD_BITS + b)
        })
    }

    fn significant_words(&self) -> &[u64] {
        let len = self
            .words
            .iter()
            .rposition(|w| *w != 0)
            .map_or(0, |p| p + 1);
        &self.words[..len]
    }
}

impl<K: MaskIndex> Default for Mask<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MaskIndex> Clone for Mask<K> {
    fn clone(&self) -> Self {
        Self {
            words: self.words.clone(),
            _index: PhantomData,
        }
    }
}

// Trailing zero words do not change a mask's identity
impl<K: MaskIndex> PartialEq for Mask<K> {
    fn eq(&self, other: &Self) -> bool {
        self.significant_words() == other.significant_words()
    }
}

impl<K: MaskIndex> Eq for Mask<K> {}

impl<K: MaskIndex> Hash for Mask<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant_words().hash(state);
    }
}

impl<K: MaskIndex> fmt::Debug for Mask<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", K::LABEL)?;
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K: MaskIndex> FromIterator<usize> for Mask<K> {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::from_bits(iter)
    }
}
