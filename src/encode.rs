//! Annotate every edge of a tree with its split bitmask.
//!
//! # Algorithm
//! Encoding runs as two passes over the arena so that the tree is never
//! mutated while a traversal of it is in flight:
//!
//! 1. **Structural pass** (optional): collapse nodes with a single child.
//!    - an unrooted tree whose root has two children is derooted
//!    - while the root has exactly one internal child, that child is merged
//!      into the root
//!    - every other node with one child is spliced out, its child taking its
//!      position and inheriting its edge length
//! 2. **Bitmask pass**: postorder; a leaf gets its taxon's bit, an internal
//!    node the OR of its children.
//!
//! The split → edge map is rebuilt from scratch: raw keys for rooted trees,
//! keys normalized against the tree's realized leaf set for unrooted ones.
//!
//! ```text
//!  input (unrooted):  ((A,B),(C,(D)))      after encoding:  (A,B,(C,D))
//!                                           {C,D}: 0b1100, normalized key 0b1100
//! ```

use tracing::debug;

use crate::bitset::Bitset;
use crate::tree::{NodeId, SplitEdgeMap, Tree, merge_lengths};

/// Switches for [`encode_splits`].
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// Rebuild `tree.split_edge_map`.
    pub create_dict: bool,
    /// Collapse out-degree-one nodes before computing bitmasks.
    pub delete_outdegree_one: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            create_dict: true,
            delete_outdegree_one: true,
        }
    }
}

/// Computes `split_bitmask` for every edge of `tree` and (optionally) its
/// split → edge map. A tree without a root is left untouched apart from an
/// emptied map.
///
/// Note that collapsing changes topology as seen by Newick: an unrooted
/// `(A,(B,C))` becomes `(A,B,C)`.
pub fn encode_splits(tree: &mut Tree, options: EncodeOptions) {
    if options.create_dict {
        tree.split_edge_map = SplitEdgeMap::rooted();
    }
    let Some(root) = tree.root() else {
        return;
    };

    if options.delete_outdegree_one {
        delete_outdegree_one(tree);
    }

    let namespace = tree.taxon_namespace().clone();
    let order = tree.postorder();
    for &id in &order {
        let split = if tree.is_leaf(id) {
            tree.node(id)
                .taxon
                .map(|taxon| namespace.taxon_bitmask(taxon))
                .unwrap_or_default()
        } else {
            let mut split = Bitset::zero();
            for &child in tree.children(id) {
                split.or_assign(&tree.node(child).edge.split_bitmask);
            }
            split
        };
        tree.node_mut(id).edge.split_bitmask = split;
    }

    if !options.create_dict {
        return;
    }
    // Normalize against the leaves actually on the tree, which may be fewer
    // than the namespace holds.
    let mut map = if tree.is_rooted {
        SplitEdgeMap::rooted()
    } else {
        SplitEdgeMap::normalized(tree.node(root).edge.split_bitmask.clone())
    };
    for &id in &order {
        map.insert(&tree.node(id).edge.split_bitmask, id);
    }
    tree.split_edge_map = map;
}

/// Structural half of [`encode_splits`]: removes out-degree-one nodes without
/// touching bitmasks or the split map.
pub fn delete_outdegree_one(tree: &mut Tree) {
    let Some(root) = tree.root() else {
        return;
    };
    if !tree.is_rooted && tree.children(root).len() == 2 {
        tree.deroot();
    }

    while tree.children(root).len() == 1 {
        let child = tree.children(root)[0];
        if tree.is_leaf(child) {
            break;
        }
        let merged = merge_lengths(
            tree.node(root).edge.length,
            tree.node(child).edge.length,
        );
        tree.node_mut(root).edge.length = merged;
        tree.splice_out(child);
        debug!(node = child, "collapsed single child of root");
    }

    let mut collapsed = 0usize;
    for id in tree.postorder() {
        if id == root || tree.children(id).len() != 1 {
            continue;
        }
        let child = tree.children(id)[0];
        let merged = merge_lengths(tree.node(child).edge.length, tree.node(id).edge.length);
        tree.node_mut(child).edge.length = merged;
        tree.splice_out(id);
        collapsed += 1;
    }
    if collapsed > 0 {
        debug!(collapsed, "removed out-degree-one nodes");
    }
}

/// Searches the subtree below `start` for the edge whose split, restricted to
/// `mask`, equals `split_to_find`. Splits are rooted here: no complementing.
///
/// Bits only accumulate towards the root, so a node whose split does not
/// contain `split_to_find` rules out its entire subtree. Logarithmic on
/// balanced trees, linear in the worst case.
pub fn find_edge_from_split(
    tree: &Tree,
    start: NodeId,
    split_to_find: &Bitset,
    mask: Option<&Bitset>,
) -> Option<NodeId> {
    let split = &tree.node(start).edge.split_bitmask;
    if !split_to_find.is_subset_of(split) {
        return None;
    }
    let masked = match mask {
        Some(m) => split & m,
        None => split.clone(),
    };
    if &masked == split_to_find {
        return Some(start);
    }
    tree.children(start)
        .iter()
        .find_map(|&child| find_edge_from_split(tree, child, split_to_find, mask))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxon::TaxonNamespace;
    use std::sync::Arc;

    fn abcde() -> Arc<TaxonNamespace> {
        Arc::new(TaxonNamespace::from_labels(["A", "B", "C", "D", "E"]))
    }

    fn parse(newick: &str, rooted: bool) -> Tree {
        let mut tree = Tree::from_newick(newick, abcde()).unwrap();
        tree.is_rooted = rooted;
        tree
    }

    fn bs(v: u64) -> Bitset {
        Bitset::from(v)
    }

    /// Asymmetric rooted tree
    ///
    /// ```text
    ///              root
    ///             /    \
    ///         node1     E
    ///         /   \
    ///     node2    D
    ///     /   \
    ///    A    node3
    ///         /   \
    ///        B     C
    /// ```
    ///
    /// | Node  | Leaves Below | Raw Bitset |
    /// |-------|--------------|------------|
    /// | node3 | {B, C}       | 0b00110    |
    /// | node2 | {A, B, C}    | 0b00111    |
    /// | node1 | {A,B,C,D}    | 0b01111    |
    /// | root  | {A..E}       | 0b11111    |
    #[test]
    fn test_rooted_encoding_keeps_raw_keys() {
        let mut tree = parse("(((A,(B,C)),D),E);", true);
        encode_splits(&mut tree, EncodeOptions::default());

        let root = tree.root().unwrap();
        assert_eq!(tree.node(root).edge.split_bitmask, bs(0b11111));
        for id in tree.preorder() {
            if tree.is_leaf(id) {
                continue;
            }
            let mut or = Bitset::zero();
            for &c in tree.children(id) {
                or |= &tree.node(c).edge.split_bitmask;
            }
            assert_eq!(tree.node(id).edge.split_bitmask, or);
        }
        for raw in [0b00110u64, 0b00111, 0b01111, 0b11111, 0b1, 0b10000] {
            assert!(tree.split_edge_map.contains(&bs(raw)), "missing {raw:b}");
        }
        assert!(!tree.split_edge_map.contains(&bs(0b11000)));
        assert_eq!(tree.split_edge_map.len(), 9);
    }

    #[test]
    fn test_unrooted_encoding_normalizes_keys() {
        let mut tree = parse("(((A,(B,C)),D),E);", false);
        encode_splits(&mut tree, EncodeOptions::default());

        // bifurcating root removed: ((A,(B,C)),D,E)
        let root = tree.root().unwrap();
        assert_eq!(tree.children(root).len(), 3);
        // {A,B,C} | {D,E} is reachable both ways
        let edge = tree.split_edge_map.get(&bs(0b00111)).unwrap();
        assert_eq!(tree.split_edge_map.get(&bs(0b11000)), Some(edge));
        assert_eq!(tree.node(edge).edge.split_bitmask, bs(0b00111));
        // keys never contain A
        assert!(tree.split_edge_map.keys().all(|k| !k.test(0)));
    }

    #[test]
    fn test_normalization_uses_tree_leaf_set() {
        // A is in the namespace but not on the tree
        let mut tree = parse("((B,C),D,E);", false);
        encode_splits(&mut tree, EncodeOptions::default());
        assert_eq!(
            tree.split_edge_map.normalization_mask(),
            Some(&bs(0b11110))
        );
        // {B,C} contains B, the lowest taxon on the tree → stored as {D,E}
        assert!(tree.split_edge_map.keys().any(|k| *k == bs(0b11000)));
        assert!(tree.split_edge_map.contains(&bs(0b00110)));
    }

    #[test]
    fn test_outdegree_one_nodes_are_spliced() {
        let mut tree = parse("((A:1,((B:1):2,C:1):1):1,(D:1,E:1):1);", true);
        encode_splits(&mut tree, EncodeOptions::default());
        assert_eq!(tree.to_newick(), "((A:1,(B:3,C:1):1):1,(D:1,E:1):1);");
        assert!(tree.preorder().iter().all(|&id| tree.children(id).len() != 1));
    }

    #[test]
    fn test_root_chain_collapsed() {
        let mut tree = parse("(((A,B,C)));", true);
        delete_outdegree_one(&mut tree);
        let root = tree.root().unwrap();
        assert_eq!(tree.children(root).len(), 3);
        assert_eq!(tree.to_newick(), "(A,B,C);");
    }

    #[test]
    fn test_without_collapse_map_holds_parent_edge() {
        let mut tree = parse("((A,(B)),C);", true);
        encode_splits(
            &mut tree,
            EncodeOptions {
                create_dict: true,
                delete_outdegree_one: false,
            },
        );
        let holder = tree.split_edge_map.get(&bs(0b010)).unwrap();
        // (B) and B share a split; the later (parent) edge wins
        assert!(!tree.is_leaf(holder));
    }

    #[test]
    fn test_find_edge_from_split() {
        let mut tree = parse("(((A,(B,C)),D),E);", true);
        encode_splits(&mut tree, EncodeOptions::default());
        let root = tree.root().unwrap();
        let found = find_edge_from_split(&tree, root, &bs(0b00110), None).unwrap();
        assert_eq!(tree.node(found).edge.split_bitmask, bs(0b00110));
        assert_eq!(find_edge_from_split(&tree, root, &bs(0b01100), None), None);
        // with a mask hiding B, {A,C} matches the {A,B,C} edge
        let masked = find_edge_from_split(&tree, root, &bs(0b00101), Some(&bs(0b11101))).unwrap();
        assert_eq!(tree.node(masked).edge.split_bitmask, bs(0b00111));
    }

    #[test]
    fn test_empty_tree_is_noop() {
        let mut tree = Tree::empty(abcde());
        encode_splits(&mut tree, EncodeOptions::default());
        assert!(tree.split_edge_map.is_empty());
    }
}
