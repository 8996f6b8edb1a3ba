use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use tree_splits::bitset::Bitset;
use tree_splits::consensus::tree_from_splits;
use tree_splits::encode::{EncodeOptions, encode_splits};
use tree_splits::splits::{count_bits, is_compatible, is_trivial_split, lowest_bit_only};
use tree_splits::taxon::{TaxonId, TaxonNamespace};
use tree_splits::tree::{Node, Tree};

/// Random tree: taxon `i` hangs below an existing internal node picked by
/// `choices[i].0`, inside a fresh internal node when `choices[i].1` is set.
fn build_tree(choices: &[(usize, bool)], rooted: bool) -> Tree {
    let ns = Arc::new(TaxonNamespace::from_labels(
        (0..choices.len()).map(|i| format!("t{i}")),
    ));
    let mut tree = Tree::new(ns);
    tree.is_rooted = rooted;
    let mut internals = vec![tree.root().expect("new tree has a root")];
    for (i, &(pick, nest)) in choices.iter().enumerate() {
        let mut parent = internals[pick % internals.len()];
        if nest {
            parent = tree.new_child(parent, Node::internal(Some(1.0)));
            internals.push(parent);
        }
        tree.new_child(parent, Node::leaf(TaxonId(i), Some(1.0)));
    }
    tree
}

fn tree_choices() -> impl Strategy<Value = Vec<(usize, bool)>> {
    proptest::collection::vec((0usize..64, any::<bool>()), 1..12)
}

proptest! {
    #[test]
    fn compatibility_is_symmetric(s1 in any::<u16>(), s2 in any::<u16>(), mask in any::<u16>()) {
        let (s1, s2, mask) = (Bitset::from(s1 as u64), Bitset::from(s2 as u64), Bitset::from(mask as u64));
        prop_assert_eq!(is_compatible(&s1, &s2, &mask), is_compatible(&s2, &s1, &mask));
    }

    #[test]
    fn lowest_bit_only_is_minimal(value in 1u64..) {
        let split = Bitset::from(value);
        let low = lowest_bit_only(&split);
        prop_assert_eq!(low.count_ones(), 1, "must be a power of two");
        prop_assert!(low.is_subset_of(&split));
        prop_assert_eq!(low, Bitset::from(value & value.wrapping_neg()));
    }

    #[test]
    fn triviality_matches_side_sizes(split in any::<u16>(), mask in any::<u16>()) {
        let (s, m) = (split as i64, mask as i64);
        let expected = count_bits(s & m).unwrap() <= 1 || count_bits(!s & m).unwrap() <= 1;
        let (split, mask) = (Bitset::from(split as u64), Bitset::from(mask as u64));
        prop_assert_eq!(is_trivial_split(&split, &mask), expected);
    }

    #[test]
    fn encoded_splits_are_unions_of_children(choices in tree_choices(), rooted in any::<bool>()) {
        let mut tree = build_tree(&choices, rooted);
        encode_splits(&mut tree, EncodeOptions::default());

        let ns = tree.taxon_namespace().clone();
        let root = tree.root().expect("root survives encoding");
        prop_assert_eq!(&tree.node(root).edge.split_bitmask, &ns.all_taxa_bitmask());
        for id in tree.preorder() {
            let node = tree.node(id);
            if let Some(taxon) = node.taxon {
                prop_assert_eq!(&node.edge.split_bitmask, &ns.taxon_bitmask(taxon));
                continue;
            }
            if id != root {
                prop_assert_ne!(tree.children(id).len(), 1, "out-degree-one node left");
            }
            let mut union = Bitset::zero();
            for &child in tree.children(id) {
                union |= &tree.node(child).edge.split_bitmask;
            }
            prop_assert_eq!(&node.edge.split_bitmask, &union);
        }
    }

    #[test]
    fn rooted_split_sets_round_trip(choices in tree_choices()) {
        let mut original = build_tree(&choices, true);
        encode_splits(&mut original, EncodeOptions::default());
        let splits = original.edge_splits();

        let mut rebuilt = tree_from_splits(&splits, original.taxon_namespace().clone(), None, true)
            .expect("splits of one tree are compatible");
        encode_splits(&mut rebuilt, EncodeOptions::default());

        let before: HashSet<Bitset> = splits.into_iter().collect();
        let after: HashSet<Bitset> = rebuilt.edge_splits().into_iter().collect();
        prop_assert_eq!(before, after);
    }
}
