//! Pure functions over split bitmasks.
//!
//! A split is a [`Bitset`] over the taxon namespace. Most functions take a
//! `mask` with one bit per taxon present in the context of interest (a tree,
//! or the whole namespace) and only look at bits inside it.

use crate::bitset::Bitset;
use crate::error::Result;

/// Lazy iterator over the set positions of `split & mask`.
///
/// Created by [`iter_split_indices`]. A clone taken before iteration replays
/// the same sequence.
#[derive(Clone, Debug)]
pub struct SplitIndices<'a> {
    masked: Bitset,
    mask: Option<&'a Bitset>,
    next_pos: usize,
    offset: usize,
    ordination_in_mask: bool,
}

impl Iterator for SplitIndices<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let pos = self.masked.next_set_bit(self.next_pos)?;
        self.next_pos = pos + 1;
        let index = match (self.ordination_in_mask, self.mask) {
            // rank of this bit among the bits of the mask
            (true, Some(mask)) => mask.iter_ones().take_while(|&b| b < pos).count(),
            _ => pos,
        };
        Some(index + self.offset)
    }
}

/// Returns the index of each bit that is on in both `split` and `mask`.
///
/// - `mask = None` considers every bit.
/// - `one_based` reports the lowest bit as 1 instead of 0.
/// - `ordination_in_mask` counts only positions where `mask` has a bit, i.e.
///   the index of the taxon within the masked subset of taxa.
///
/// # Example
/// ```
/// # use tree_splits::bitset::Bitset;
/// # use tree_splits::splits::iter_split_indices;
/// let split = Bitset::from(0b10100u64);
/// let mask = Bitset::from(0b10110u64);
/// let absolute: Vec<_> = iter_split_indices(&split, Some(&mask), false, false).collect();
/// assert_eq!(absolute, vec![2, 4]);
/// let in_mask: Vec<_> = iter_split_indices(&split, Some(&mask), false, true).collect();
/// assert_eq!(in_mask, vec![1, 2]);
/// ```
pub fn iter_split_indices<'a>(
    split: &Bitset,
    mask: Option<&'a Bitset>,
    one_based: bool,
    ordination_in_mask: bool,
) -> SplitIndices<'a> {
    let masked = match mask {
        Some(m) => split & m,
        None => split.clone(),
    };
    SplitIndices {
        masked,
        mask,
        next_pos: 0,
        offset: usize::from(one_based),
        ordination_in_mask,
    }
}

/// Collects [`iter_split_indices`] into a vector.
pub fn split_to_list(
    split: &Bitset,
    mask: Option<&Bitset>,
    one_based: bool,
    ordination_in_mask: bool,
) -> Vec<usize> {
    iter_split_indices(split, mask, one_based, ordination_in_mask).collect()
}

/// True if the split cannot distinguish any nontrivial bipartition of `mask`:
/// it is empty, it is the whole mask, or fewer than two taxa sit on one side.
pub fn is_trivial_split(split: &Bitset, mask: &Bitset) -> bool {
    if split.is_zero() || split == mask {
        return true;
    }
    let masked = split & mask;
    if masked.count_ones() <= 1 {
        return true;
    }
    split.complement_within(mask).count_ones() <= 1
}

/// Negation of [`is_trivial_split`].
pub fn is_non_singleton_split(split: &Bitset, mask: &Bitset) -> bool {
    !is_trivial_split(split, mask)
}

/// Two splits can coexist in one tree iff, restricted to `mask`, one of the
/// four intersections of {split1, ¬split1} × {split2, ¬split2} is empty.
pub fn is_compatible(split1: &Bitset, split2: &Bitset, mask: &Bitset) -> bool {
    let m1 = split1 & mask;
    let m2 = split2 & mask;
    if !m1.intersects(&m2) {
        return true;
    }
    let c2 = mask.and_not(split2);
    if !m1.intersects(&c2) {
        return true;
    }
    let c1 = mask.and_not(split1);
    if !c1.intersects(&m2) {
        return true;
    }
    !c1.intersects(&c2)
}

/// Isolates the lowest set bit (`split & (split - 1) ^ split`); zero stays zero.
pub fn lowest_bit_only(split: &Bitset) -> Bitset {
    split
        .lowest_bit()
        .map(Bitset::singleton)
        .unwrap_or_else(Bitset::zero)
}

/// Population count of an integer-like split value.
///
/// Fails with [`SplitError::InvalidArgument`](crate::error::SplitError) for
/// negative or non-integral input.
///
/// # Example
/// ```
/// # use tree_splits::splits::count_bits;
/// assert_eq!(count_bits(7i64).unwrap(), 3);
/// assert!(count_bits(-1i64).is_err());
/// assert!(count_bits(1.5f64).is_err());
/// ```
pub fn count_bits<S>(split: S) -> Result<usize>
where
    S: TryInto<Bitset, Error = crate::error::SplitError>,
{
    Ok(split.try_into()?.count_ones())
}

/// Binary rendering left-padded with zeros to `width`, optionally replacing
/// `'0'` by `symbol0` and `'1'` by `symbol1`.
pub fn split_as_string(
    split: &Bitset,
    width: usize,
    symbol0: Option<char>,
    symbol1: Option<char>,
) -> String {
    let raw = split.to_string();
    let padded = format!("{raw:0>width$}");
    padded
        .chars()
        .map(|c| match c {
            '0' => symbol0.unwrap_or('0'),
            '1' => symbol1.unwrap_or('1'),
            other => other,
        })
        .collect()
}

/// [`split_as_string`] reversed so the first taxon is leftmost (PAUP* style),
/// with `.` for absent and `*` for present taxa.
///
/// # Example
/// ```
/// # use tree_splits::bitset::Bitset;
/// # use tree_splits::splits::split_as_string_rev;
/// assert_eq!(split_as_string_rev(&Bitset::from(0b0011u64), 5), "**...");
/// ```
pub fn split_as_string_rev(split: &Bitset, width: usize) -> String {
    split_as_string_rev_with(split, width, '.', '*')
}

/// [`split_as_string_rev`] with custom symbols.
pub fn split_as_string_rev_with(split: &Bitset, width: usize, symbol0: char, symbol1: char) -> String {
    split_as_string(split, width, Some(symbol0), Some(symbol1))
        .chars()
        .rev()
        .collect()
}

/// Canonical unrooted representation of `split` within `mask`: the side that
/// does not contain the lowest taxon of `mask`.
///
/// # Example
/// ```text
/// mask = 0b1111 (A, B, C, D)
/// {A,B} = 0b0011 contains A → flip to {C,D} = 0b1100
/// {C,D} = 0b1100 no A       → keep 0b1100
/// ```
pub fn normalize_split(split: &Bitset, mask: &Bitset) -> Bitset {
    match mask.lowest_bit() {
        Some(low) if split.test(low) => split.complement_within(mask),
        _ => split & mask,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn bs(v: u64) -> Bitset {
        Bitset::from(v)
    }

    #[test]
    fn test_trivial_split_scenarios() {
        let mask = bs(15);
        assert!(is_trivial_split(&bs(1), &mask)); // singleton
        assert!(!is_trivial_split(&bs(3), &mask));
        assert!(is_trivial_split(&bs(15), &mask)); // root
        assert!(is_trivial_split(&bs(14), &mask)); // complement is a singleton
        assert!(is_trivial_split(&bs(0), &mask));
        assert!(is_non_singleton_split(&bs(6), &mask));
    }

    #[test]
    fn test_trivial_split_matches_bit_counts() {
        let mask = bs(0b11111);
        for s in 1..32u64 {
            let split = bs(s);
            let expected = (&split & &mask).count_ones() <= 1
                || split.complement_within(&mask).count_ones() <= 1;
            assert_eq!(is_trivial_split(&split, &mask), expected, "split {s:b}");
        }
    }

    #[test]
    fn test_count_bits() {
        assert_eq!(count_bits(7i64).unwrap(), 3);
        assert_eq!(count_bits(0i64).unwrap(), 0);
        assert!(count_bits(-1i64).is_err());
        assert!(count_bits(0.5f64).is_err());
        assert_eq!(count_bits(&Bitset::from_indices([1, 90, 200])).unwrap(), 3);
    }

    #[test]
    fn test_compatibility_symmetric() {
        let mask = bs(0b111111);
        for (a, b) in (1..64u64).tuple_combinations() {
            assert_eq!(
                is_compatible(&bs(a), &bs(b), &mask),
                is_compatible(&bs(b), &bs(a), &mask)
            );
        }
    }

    #[test]
    fn test_compatibility_cases() {
        let mask = bs(0b11111);
        // {A,B} and {A,B,C} nest
        assert!(is_compatible(&bs(0b00011), &bs(0b00111), &mask));
        // {A,B} and {C,D} disjoint
        assert!(is_compatible(&bs(0b00011), &bs(0b01100), &mask));
        // {A,B} and {B,C} overlap partially
        assert!(!is_compatible(&bs(0b00011), &bs(0b00110), &mask));
        // {A,B,C} and {C,D,E} cover the mask together
        assert!(is_compatible(&bs(0b00111), &bs(0b11100), &mask));
    }

    #[test]
    fn test_lowest_bit_only() {
        assert_eq!(lowest_bit_only(&bs(0b101000)), bs(0b1000));
        assert_eq!(lowest_bit_only(&bs(1)), bs(1));
        assert_eq!(lowest_bit_only(&Bitset::zero()), Bitset::zero());
        assert_eq!(
            lowest_bit_only(&Bitset::from_indices([70, 100])),
            Bitset::singleton(70)
        );
    }

    #[test]
    fn test_split_indices() {
        let split = bs(0b1101);
        assert_eq!(split_to_list(&split, None, false, false), vec![0, 2, 3]);
        assert_eq!(split_to_list(&split, None, true, false), vec![1, 3, 4]);
        // mask drops taxon 1 and 2 → bit 3 is the 2nd taxon of the mask
        let mask = bs(0b1001);
        assert_eq!(split_to_list(&split, Some(&mask), false, true), vec![0, 1]);
        assert_eq!(split_to_list(&split, Some(&mask), true, true), vec![1, 2]);

        let iter = iter_split_indices(&split, None, false, false);
        let replay = iter.clone();
        assert_eq!(iter.count(), 3);
        assert_eq!(replay.collect::<Vec<_>>(), vec![0, 2, 3]);
    }

    #[test]
    fn test_split_strings() {
        assert_eq!(split_as_string(&bs(0b101), 5, None, None), "00101");
        assert_eq!(split_as_string(&bs(0b101), 5, Some('.'), Some('*')), "..*.*");
        assert_eq!(split_as_string_rev(&bs(0b101), 5), "*.*..");
        assert_eq!(split_as_string_rev_with(&bs(0b110), 3, '-', '+'), "-++");
    }

    #[test]
    fn test_normalize_split() {
        let mask = bs(0b1111);
        assert_eq!(normalize_split(&bs(0b0011), &mask), bs(0b1100));
        assert_eq!(normalize_split(&bs(0b1100), &mask), bs(0b1100));
        // tree without taxon 0: lowest taxon of the mask is B
        let partial = bs(0b1110);
        assert_eq!(normalize_split(&bs(0b0110), &partial), bs(0b1000));
    }
}
