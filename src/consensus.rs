//! Build trees back from split sets.
//!
//! [`tree_from_splits`] starts from a star tree and inserts splits greedily, in
//! the order given; each split is realized as a new internal node unless it
//! conflicts with structure inserted before it. Fed with splits in order of
//! descending frequency, this is the extended majority-rule consensus
//! ([`majority_rule_consensus`]).
//!
//! ```text
//!  star (A,B,C,D) + {C,D}:        root              attach = first ancestor of
//!                                /  |  \            the lowest leaf (C) whose
//!                               A   B   new         split contains {C,D}
//!                                      /   \
//!                                     C     D
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::bitset::Bitset;
use crate::distribution::SplitDistribution;
use crate::encode::{EncodeOptions, encode_splits};
use crate::error::{Result, SplitError};
use crate::taxon::TaxonNamespace;
use crate::tree::{Node, NodeId, Tree};

/// Builds a tree realizing as many of `splits` as are compatible with the
/// ones before them.
///
/// The full taxa mask and singleton splits carry no topology and are ignored.
/// For unrooted output a split and its complement are the same bipartition;
/// the side without the namespace's first taxon is inserted, and splits
/// separating a single taxon from the rest are ignored as well.
///
/// Edge lengths are looked up in `split_edge_lengths` under the inserted form
/// of the split first, then under the split as given.
///
/// # Errors
/// [`SplitError::InvariantViolation`] if an existing child already carries
/// the split being inserted, which can only happen on a corrupted tree.
pub fn tree_from_splits(
    splits: &[Bitset],
    taxon_namespace: Arc<TaxonNamespace>,
    split_edge_lengths: Option<&HashMap<Bitset, f64>>,
    is_rooted: bool,
) -> Result<Tree> {
    let taxa_mask = taxon_namespace.all_taxa_bitmask();
    let mut tree = Tree::star(taxon_namespace);
    tree.is_rooted = is_rooted;
    encode_splits(&mut tree, EncodeOptions::default());

    let Some(root) = tree.root() else {
        return Ok(tree);
    };
    let leaf_of: HashMap<usize, NodeId> = tree
        .leaves()
        .into_iter()
        .filter_map(|id| tree.node(id).taxon.map(|taxon| (taxon.0, id)))
        .collect();

    let mut inserted = 0usize;
    for (given, split) in candidate_splits(splits, &taxa_mask, is_rooted) {
        if !split.is_subset_of(&tree.node(root).edge.split_bitmask) {
            trace!(split = %split, "split outside the tree's taxa");
            continue;
        }
        let Some(&leaf) = split.lowest_bit().and_then(|bit| leaf_of.get(&bit)) else {
            continue;
        };
        let Some(attach) = attachment_point(&tree, leaf, &split) else {
            continue;
        };
        if tree.node(attach).edge.split_bitmask == split {
            continue;
        }

        // Collect the children to regroup; nothing is detached until the
        // regrouping is known to realize exactly `split`.
        let mut adopted = Vec::new();
        let mut gathered = Bitset::zero();
        for &child in tree.children(attach) {
            let child_split = &tree.node(child).edge.split_bitmask;
            if !child_split.intersects(&split) {
                continue;
            }
            if *child_split == split {
                return Err(SplitError::InvariantViolation(format!(
                    "node {child} already realizes split {split} below node {attach}"
                )));
            }
            gathered |= child_split;
            adopted.push(child);
        }
        if gathered != split {
            trace!(split = %split, "incompatible split dropped");
            continue;
        }

        let length = split_edge_lengths
            .and_then(|lengths| lengths.get(&split).or_else(|| lengths.get(given)))
            .copied();
        let node = tree.new_child(attach, Node::internal(length));
        for child in adopted {
            tree.add_child(node, child);
        }
        tree.node_mut(node).edge.split_bitmask = split.clone();
        tree.split_edge_map.insert(&split, node);
        inserted += 1;
    }
    debug!(candidates = splits.len(), inserted, "built tree from splits");
    Ok(tree)
}

/// Extended majority-rule consensus of the trees counted in `dist`: splits
/// with frequency at least `min_freq`, most frequent first (ties keep
/// first-seen order), with their mean sampled edge lengths.
pub fn majority_rule_consensus(
    dist: &mut SplitDistribution,
    min_freq: f64,
    is_rooted: bool,
) -> Result<Tree> {
    let freqs = dist.split_frequencies().clone();
    let mut ranked: Vec<(Bitset, f64)> = dist
        .splits()
        .iter()
        .filter_map(|split| {
            let freq = freqs.get(split).copied()?;
            (freq >= min_freq).then(|| (split.clone(), freq))
        })
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let splits: Vec<Bitset> = ranked.into_iter().map(|(split, _)| split).collect();
    let lengths = dist.mean_edge_lengths();
    tree_from_splits(
        &splits,
        dist.taxon_namespace().clone(),
        Some(&lengths),
        is_rooted,
    )
}

/// Informative splits paired with the form to insert.
fn candidate_splits<'a>(
    splits: &'a [Bitset],
    taxa_mask: &Bitset,
    is_rooted: bool,
) -> Vec<(&'a Bitset, Bitset)> {
    let mut candidates = Vec::new();
    for given in splits {
        let masked = given & taxa_mask;
        if masked == *taxa_mask || masked.count_ones() < 2 {
            continue;
        }
        if is_rooted {
            candidates.push((given, masked));
            continue;
        }
        let complement = masked.complement_within(taxa_mask);
        if complement.count_ones() < 2 {
            continue;
        }
        let canonical = if masked.test(0) { complement } else { masked };
        candidates.push((given, canonical));
    }
    candidates
}

/// First node on the path from `leaf` to the root whose split contains
/// `split`.
fn attachment_point(tree: &Tree, leaf: NodeId, split: &Bitset) -> Option<NodeId> {
    let mut current = Some(leaf);
    while let Some(id) = current {
        if split.is_subset_of(&tree.node(id).edge.split_bitmask) {
            return Some(id);
        }
        current = tree.parent(id);
    }
    None
}
