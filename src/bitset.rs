//! Arbitrary-width bitmask used to represent splits over a taxon namespace.
//!
//! # Overview
//! Each taxon owns one bit position. A split (the leaf set below an edge) is the
//! OR of the bits of its taxa.
//!
//! # Example
//! For taxa [A, B, C, D] mapped to bit positions [0, 1, 2, 3]:
//! - Split {A, C} → bitset `0b0101` (bits 0 and 2 set)
//! - Split {B, C, D} → bitset `0b1110` (bits 1, 2, 3 set)
//!
//! Words are stored little-endian and trailing zero words are always trimmed,
//! so two bitsets with the same bits compare, hash and order identically no
//! matter how many words were used to build them.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor};

use crate::error::SplitError;

/// A compact bitset for representing which taxa fall below an edge.
///
/// Internally stores bits in `Vec<u64>` words to support arbitrarily large
/// taxon namespaces. Each u64 word holds 64 taxon indices.
///
/// # Memory efficiency
/// - Traditional HashSet<usize>: ~24 bytes per element + overhead
/// - Bitset: 1 bit per possible element (8 bytes per 64 taxa)
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Bitset(Vec<u64>);

impl Bitset {
    /// The empty bitset (numeric value 0).
    pub fn zero() -> Self {
        Bitset(Vec::new())
    }

    /// A bitset with only bit `idx` set.
    ///
    /// # Example
    /// ```
    /// # use tree_splits::bitset::Bitset;
    /// assert_eq!(Bitset::singleton(5), Bitset::from(0b100000u64));
    /// ```
    pub fn singleton(idx: usize) -> Self {
        let mut bs = Bitset::zero();
        bs.set(idx);
        bs
    }

    /// Builds a bitset from bit positions.
    pub fn from_indices<I: IntoIterator<Item = usize>>(indices: I) -> Self {
        let mut bs = Bitset::zero();
        for idx in indices {
            bs.set(idx);
        }
        bs
    }

    /// The raw little-endian words, without trailing zero words.
    pub fn words(&self) -> &[u64] {
        &self.0
    }

    /// Sets the bit at the given index to 1.
    ///
    /// # Example
    /// ```
    /// # use tree_splits::bitset::Bitset;
    /// let mut bs = Bitset::zero();
    /// bs.set(0);  // Mark taxon 0 as present
    /// bs.set(5);  // Mark taxon 5 as present
    /// assert_eq!(bs.words()[0], 0b00100001);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6; // Equivalent to idx / 64
        let bit = idx & 63; // Equivalent to idx % 64
        if self.0.len() <= word {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= 1u64 << bit;
    }

    /// Whether bit `idx` is set.
    #[inline]
    pub fn test(&self, idx: usize) -> bool {
        let word = idx >> 6;
        word < self.0.len() && (self.0[word] >> (idx & 63)) & 1 == 1
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    /// Performs bitwise OR with another bitset (union operation).
    ///
    /// # Example
    /// ```
    /// # use tree_splits::bitset::Bitset;
    /// let mut left = Bitset::singleton(0);   // {0}
    /// let right = Bitset::singleton(1);      // {1}
    /// left.or_assign(&right);                // {0} ∪ {1} = {0, 1}
    /// assert_eq!(left.words()[0], 0b11);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        if self.0.len() < other.0.len() {
            self.0.resize(other.0.len(), 0);
        }
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Counts the number of set bits (population count).
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// `self & !other`.
    pub fn and_not(&self, other: &Bitset) -> Bitset {
        let words = self
            .0
            .iter()
            .enumerate()
            .map(|(i, w)| w & !other.0.get(i).copied().unwrap_or(0))
            .collect();
        Bitset(words).trimmed()
    }

    /// Complement of `self` restricted to the bits of `mask`.
    ///
    /// # Example
    /// ```
    /// # use tree_splits::bitset::Bitset;
    /// let ab = Bitset::from(0b0011u64);
    /// assert_eq!(ab.complement_within(&Bitset::from(0b1111u64)), Bitset::from(0b1100u64));
    /// ```
    pub fn complement_within(&self, mask: &Bitset) -> Bitset {
        mask.and_not(self)
    }

    /// Every bit of `self` is also set in `other`.
    pub fn is_subset_of(&self, other: &Bitset) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a & !b == 0)
    }

    /// At least one bit is set in both.
    pub fn intersects(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).any(|(a, b)| a & b != 0)
    }

    /// Position of the lowest set bit.
    pub fn lowest_bit(&self) -> Option<usize> {
        self.0
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| i * 64 + w.trailing_zeros() as usize)
    }

    /// Position of the highest set bit.
    pub fn highest_bit(&self) -> Option<usize> {
        self.0
            .last()
            .map(|w| (self.0.len() - 1) * 64 + 63 - w.leading_zeros() as usize)
    }

    /// Position of the first set bit at or after `from`.
    pub fn next_set_bit(&self, from: usize) -> Option<usize> {
        let mut word = from >> 6;
        let mut bits = *self.0.get(word)? & (!0u64 << (from & 63));
        loop {
            if bits != 0 {
                return Some(word * 64 + bits.trailing_zeros() as usize);
            }
            word += 1;
            bits = *self.0.get(word)?;
        }
    }

    /// Positions of all set bits, lowest first.
    pub fn iter_ones(&self) -> Ones<'_> {
        Ones {
            words: &self.0,
            word_idx: 0,
            current: self.0.first().copied().unwrap_or(0),
        }
    }

    /// Numeric value if it fits in 128 bits.
    pub fn to_u128(&self) -> Option<u128> {
        match self.0.as_slice() {
            [] => Some(0),
            [lo] => Some(*lo as u128),
            [lo, hi] => Some((*hi as u128) << 64 | *lo as u128),
            _ => None,
        }
    }

    fn trimmed(mut self) -> Self {
        while self.0.last() == Some(&0) {
            self.0.pop();
        }
        self
    }
}

/// Iterator over the set bit positions of a [`Bitset`].
#[derive(Clone, Debug)]
pub struct Ones<'a> {
    words: &'a [u64],
    word_idx: usize,
    current: u64,
}

impl Iterator for Ones<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.current == 0 {
            self.word_idx += 1;
            self.current = *self.words.get(self.word_idx)?;
        }
        let bit = self.current.trailing_zeros() as usize;
        self.current &= self.current - 1;
        Some(self.word_idx * 64 + bit)
    }
}

impl From<u64> for Bitset {
    fn from(value: u64) -> Self {
        Bitset(vec![value]).trimmed()
    }
}

impl From<u128> for Bitset {
    fn from(value: u128) -> Self {
        Bitset(vec![value as u64, (value >> 64) as u64]).trimmed()
    }
}

impl TryFrom<i128> for Bitset {
    type Error = SplitError;

    fn try_from(value: i128) -> Result<Self, Self::Error> {
        if value < 0 {
            return Err(SplitError::InvalidArgument(format!(
                "negative bitmask: {value}"
            )));
        }
        Ok(Bitset::from(value as u128))
    }
}

impl TryFrom<i64> for Bitset {
    type Error = SplitError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Bitset::try_from(value as i128)
    }
}

impl TryFrom<i32> for Bitset {
    type Error = SplitError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Bitset::try_from(value as i128)
    }
}

impl TryFrom<f64> for Bitset {
    type Error = SplitError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value.fract() != 0.0 {
            return Err(SplitError::InvalidArgument(format!(
                "non-integer bitmask: {value}"
            )));
        }
        if value < 0.0 {
            return Err(SplitError::InvalidArgument(format!(
                "negative bitmask: {value}"
            )));
        }
        if value >= u128::MAX as f64 {
            return Err(SplitError::InvalidArgument(format!(
                "bitmask out of range: {value}"
            )));
        }
        Ok(Bitset::from(value as u128))
    }
}

impl TryFrom<&Bitset> for Bitset {
    type Error = SplitError;

    fn try_from(value: &Bitset) -> Result<Self, Self::Error> {
        Ok(value.clone())
    }
}

impl BitAnd for &Bitset {
    type Output = Bitset;

    fn bitand(self, rhs: &Bitset) -> Bitset {
        let words = self.0.iter().zip(&rhs.0).map(|(a, b)| a & b).collect();
        Bitset(words).trimmed()
    }
}

impl BitOr for &Bitset {
    type Output = Bitset;

    fn bitor(self, rhs: &Bitset) -> Bitset {
        let mut out = self.clone();
        out.or_assign(rhs);
        out
    }
}

impl BitXor for &Bitset {
    type Output = Bitset;

    fn bitxor(self, rhs: &Bitset) -> Bitset {
        let len = self.0.len().max(rhs.0.len());
        let words = (0..len)
            .map(|i| self.0.get(i).copied().unwrap_or(0) ^ rhs.0.get(i).copied().unwrap_or(0))
            .collect();
        Bitset(words).trimmed()
    }
}

impl BitOrAssign<&Bitset> for Bitset {
    fn bitor_assign(&mut self, rhs: &Bitset) {
        self.or_assign(rhs);
    }
}

impl BitAndAssign<&Bitset> for Bitset {
    fn bitand_assign(&mut self, rhs: &Bitset) {
        *self = &*self & rhs;
    }
}

/// Numeric ordering: more significant words decide first.
impl Ord for Bitset {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.iter().rev().cmp(other.0.iter().rev()))
    }
}

impl PartialOrd for Bitset {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Binary rendering, most significant bit first, no padding.
impl fmt::Display for Bitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.split_last() {
            None => f.write_str("0"),
            Some((top, rest)) => {
                write!(f, "{top:b}")?;
                for w in rest.iter().rev() {
                    write!(f, "{w:064b}")?;
                }
                Ok(())
            }
        }
    }
}
