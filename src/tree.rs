//! Arena representation of a phylogenetic tree with split-annotated edges.
//!
//! Nodes live in one `Vec` and are referenced by [`NodeId`]. Every node owns
//! the edge leading to it from its parent, so an edge is identified by its
//! head node. Nodes detached by tree surgery stay in the arena but become
//! unreachable: every traversal starts at the root.
//!
//! ```text
//!           root            split_bitmask per edge (A=0, B=1, C=2, D=3):
//!          /    \
//!      node1     D          node1: {A, B, C} → 0b0111
//!      /   \                node2: {B, C}    → 0b0110
//!     A    node2            root:  {A..D}    → 0b1111
//!          /   \
//!         B     C
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;

use crate::bitset::Bitset;
use crate::error::{Result, SplitError};
use crate::splits::normalize_split;
use crate::taxon::{TaxonId, TaxonNamespace};

/// Index of a node in the tree arena.
pub type NodeId = usize;

/// The edge leading into a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Edge {
    pub length: Option<f64>,
    /// Leaves below this edge; filled by [`crate::encode::encode_splits`].
    pub split_bitmask: Bitset,
}

#[derive(Debug, Clone, Default)]
pub struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    pub taxon: Option<TaxonId>,
    pub label: Option<String>,
    pub edge: Edge,
    /// Distance to the tips; filled by [`Tree::calc_node_ages`].
    pub age: Option<f64>,
}

impl Node {
    pub fn leaf(taxon: TaxonId, length: Option<f64>) -> Self {
        Node {
            taxon: Some(taxon),
            edge: Edge {
                length,
                ..Edge::default()
            },
            ..Node::default()
        }
    }

    pub fn internal(length: Option<f64>) -> Self {
        Node {
            edge: Edge {
                length,
                ..Edge::default()
            },
            ..Node::default()
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Split → edge lookup of one tree.
///
/// Rooted trees key edges by their raw split. Unrooted trees carry a
/// normalization mask (the leaves realized on the tree) and every key is
/// normalized on insertion and lookup, so `{A|BCD}` and `{BCD|A}` hit the same
/// entry. Iteration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct SplitEdgeMap {
    normalization_mask: Option<Bitset>,
    entries: Vec<(Bitset, NodeId)>,
    index: HashMap<Bitset, usize>,
}

impl SplitEdgeMap {
    /// Map with raw keys.
    pub fn rooted() -> Self {
        Self::default()
    }

    /// Map normalizing keys against `mask`.
    pub fn normalized(mask: Bitset) -> Self {
        SplitEdgeMap {
            normalization_mask: Some(mask),
            ..Self::default()
        }
    }

    pub fn normalization_mask(&self) -> Option<&Bitset> {
        self.normalization_mask.as_ref()
    }

    /// The key `split` is stored under.
    pub fn key_for(&self, split: &Bitset) -> Bitset {
        match &self.normalization_mask {
            Some(mask) => normalize_split(split, mask),
            None => split.clone(),
        }
    }

    /// Inserts or replaces; a replaced key keeps its original position.
    pub fn insert(&mut self, split: &Bitset, node: NodeId) {
        let key = self.key_for(split);
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 = node,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, node));
            }
        }
    }

    pub fn get(&self, split: &Bitset) -> Option<NodeId> {
        let key = self.key_for(split);
        self.index.get(&key).map(|&pos| self.entries[pos].1)
    }

    pub fn contains(&self, split: &Bitset) -> bool {
        self.get(split).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bitset, NodeId)> + '_ {
        self.entries.iter().map(|(k, n)| (k, *n))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Bitset> + '_ {
        self.entries.iter().map(|(k, _)| k)
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    pub is_rooted: bool,
    /// Sampling weight of this tree; `None` counts as 1.0.
    pub weight: Option<f64>,
    pub label: Option<String>,
    pub split_edge_map: SplitEdgeMap,
    taxon_namespace: Arc<TaxonNamespace>,
}

impl Tree {
    /// A tree holding only a root node.
    pub fn new(taxon_namespace: Arc<TaxonNamespace>) -> Self {
        Tree {
            nodes: vec![Node::default()],
            root: Some(0),
            is_rooted: false,
            weight: None,
            label: None,
            split_edge_map: SplitEdgeMap::default(),
            taxon_namespace,
        }
    }

    /// A tree without any node.
    pub fn empty(taxon_namespace: Arc<TaxonNamespace>) -> Self {
        Tree {
            nodes: Vec::new(),
            root: None,
            ..Tree::new(taxon_namespace)
        }
    }

    /// Star tree: one leaf per taxon of the namespace, in namespace order.
    pub fn star(taxon_namespace: Arc<TaxonNamespace>) -> Self {
        let mut tree = Tree::new(taxon_namespace.clone());
        let root = 0;
        for (id, _) in taxon_namespace.iter() {
            tree.new_child(root, Node::leaf(id, None));
        }
        tree
    }

    pub fn taxon_namespace(&self) -> &Arc<TaxonNamespace> {
        &self.taxon_namespace
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id].children.is_empty()
    }

    /// Adds a detached node to the arena.
    pub fn new_node(&mut self, node: Node) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            ..node
        });
        id
    }

    /// Adds `node` as last child of `parent`.
    pub fn new_child(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.new_node(node);
        self.add_child(parent, id);
        id
    }

    /// Makes `child` the last child of `parent`, detaching it from any previous
    /// parent first.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        let pos = self.nodes[parent].children.len();
        self.insert_child(parent, pos, child);
    }

    /// Makes `child` the `pos`-th child of `parent` (positions refer to the
    /// child list after `child` was detached from its previous parent).
    pub fn insert_child(&mut self, parent: NodeId, pos: usize, child: NodeId) {
        if let Some(old) = self.nodes[child].parent {
            self.remove_child(old, child);
        }
        let children = &mut self.nodes[parent].children;
        let pos = pos.min(children.len());
        children.insert(pos, child);
        self.nodes[child].parent = Some(parent);
    }

    /// Detaches `child` from `parent`, returning its former position.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Option<usize> {
        let pos = self.nodes[parent].children.iter().position(|&c| c == child)?;
        self.nodes[parent].children.remove(pos);
        self.nodes[child].parent = None;
        Some(pos)
    }

    /// Node ids reachable from the root, parents before children.
    pub fn preorder(&self) -> Vec<NodeId> {
        match self.root {
            Some(root) => self.preorder_from(root),
            None => Vec::new(),
        }
    }

    pub fn preorder_from(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    /// Node ids reachable from the root, children before parents.
    pub fn postorder(&self) -> Vec<NodeId> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let mut order = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
            } else {
                stack.push((id, true));
                for &child in self.nodes[id].children.iter().rev() {
                    stack.push((child, false));
                }
            }
        }
        order
    }

    pub fn preorder_internal(&self) -> Vec<NodeId> {
        self.preorder().into_iter().filter(|&id| !self.is_leaf(id)).collect()
    }

    pub fn postorder_internal(&self) -> Vec<NodeId> {
        self.postorder().into_iter().filter(|&id| !self.is_leaf(id)).collect()
    }

    pub fn leaves(&self) -> Vec<NodeId> {
        self.preorder().into_iter().filter(|&id| self.is_leaf(id)).collect()
    }

    /// Number of nodes reachable from the root.
    pub fn len(&self) -> usize {
        self.preorder().len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Collapses a bifurcating root: the first internal child of the root is
    /// removed, its children take its place, and its edge length is added to
    /// the sibling's edge. Marks the tree unrooted.
    pub fn deroot(&mut self) {
        self.is_rooted = false;
        let Some(root) = self.root else {
            return;
        };
        if self.nodes[root].children.len() != 2 {
            return;
        }
        let pair = [self.nodes[root].children[0], self.nodes[root].children[1]];
        let Some(idx) = pair.iter().position(|&c| !self.is_leaf(c)) else {
            return;
        };
        let (collapse, sibling) = (pair[idx], pair[1 - idx]);
        let merged = merge_lengths(
            self.nodes[sibling].edge.length,
            self.nodes[collapse].edge.length,
        );
        self.nodes[sibling].edge.length = merged;
        self.splice_out(collapse);
    }

    /// Replaces `id` in its parent's child list by its own children, in order.
    pub(crate) fn splice_out(&mut self, id: NodeId) {
        let Some(parent) = self.nodes[id].parent else {
            return;
        };
        let Some(pos) = self.remove_child(parent, id) else {
            return;
        };
        let grandchildren = std::mem::take(&mut self.nodes[id].children);
        for (offset, gc) in grandchildren.into_iter().enumerate() {
            self.nodes[gc].parent = None;
            self.insert_child(parent, pos + offset, gc);
        }
    }

    /// Sets `age` on every node: leaves are 0, internal nodes are the age of
    /// a child plus that child's edge length (missing lengths count as 0).
    ///
    /// # Errors
    /// [`SplitError::NotUltrametric`] if two children of a node imply ages
    /// differing by more than `precision`.
    pub fn calc_node_ages(&mut self, precision: f64) -> Result<()> {
        for id in self.postorder() {
            if self.is_leaf(id) {
                self.nodes[id].age = Some(0.0);
                continue;
            }
            let mut age: Option<f64> = None;
            for &child in &self.nodes[id].children {
                let node = &self.nodes[child];
                let through = node.age.unwrap_or(0.0) + node.edge.length.unwrap_or(0.0);
                match age {
                    None => age = Some(through),
                    Some(expected) if (expected - through).abs() > precision => {
                        return Err(SplitError::NotUltrametric {
                            node: id,
                            expected,
                            found: through,
                            precision,
                        });
                    }
                    Some(_) => {}
                }
            }
            self.nodes[id].age = age;
        }
        Ok(())
    }

    /// Deepest node whose edge split contains every bit of `split`.
    /// Requires encoded splits.
    pub fn mrca(&self, split: &Bitset) -> Option<NodeId> {
        let mut current = self.root?;
        if !split.is_subset_of(&self.nodes[current].edge.split_bitmask) {
            return None;
        }
        'descend: loop {
            for &child in &self.nodes[current].children {
                if split.is_subset_of(&self.nodes[child].edge.split_bitmask) {
                    current = child;
                    continue 'descend;
                }
            }
            return Some(current);
        }
    }

    /// Encoded split of every reachable edge, in preorder.
    pub fn edge_splits(&self) -> Vec<Bitset> {
        self.preorder()
            .into_iter()
            .map(|id| self.nodes[id].edge.split_bitmask.clone())
            .collect()
    }

    /// Newick string with taxon labels and edge lengths.
    pub fn to_newick(&self) -> String {
        match self.root {
            Some(root) => format!("{};", self.newick_node(root)),
            None => ";".to_string(),
        }
    }

    fn newick_node(&self, id: NodeId) -> String {
        let node = &self.nodes[id];
        let mut out = if node.children.is_empty() {
            String::new()
        } else {
            format!(
                "({})",
                node.children.iter().map(|&c| self.newick_node(c)).join(",")
            )
        };
        match (node.taxon, &node.label) {
            (Some(taxon), _) => out.push_str(self.taxon_namespace.label(taxon)),
            (None, Some(label)) => out.push_str(label),
            (None, None) => {}
        }
        if Some(id) != self.root {
            if let Some(length) = node.edge.length {
                out.push_str(&format!(":{length}"));
            }
        }
        out
    }
}

/// Sum of two optional lengths; a missing side contributes nothing.
pub(crate) fn merge_lengths(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abcd() -> Arc<TaxonNamespace> {
        Arc::new(TaxonNamespace::from_labels(["A", "B", "C", "D"]))
    }

    /// ((A:1,B:1):1,(C:1,D:1):1);
    fn balanced() -> Tree {
        let ns = abcd();
        let mut tree = Tree::new(ns);
        tree.is_rooted = true;
        let ab = tree.new_child(0, Node::internal(Some(1.0)));
        let cd = tree.new_child(0, Node::internal(Some(1.0)));
        tree.new_child(ab, Node::leaf(TaxonId(0), Some(1.0)));
        tree.new_child(ab, Node::leaf(TaxonId(1), Some(1.0)));
        tree.new_child(cd, Node::leaf(TaxonId(2), Some(1.0)));
        tree.new_child(cd, Node::leaf(TaxonId(3), Some(1.0)));
        tree
    }

    #[test]
    fn test_traversals() {
        let tree = balanced();
        assert_eq!(tree.preorder(), vec![0, 1, 3, 4, 2, 5, 6]);
        assert_eq!(tree.postorder(), vec![3, 4, 1, 5, 6, 2, 0]);
        assert_eq!(tree.preorder_internal(), vec![0, 1, 2]);
        assert_eq!(tree.postorder_internal(), vec![1, 2, 0]);
        assert_eq!(tree.leaves(), vec![3, 4, 5, 6]);
        assert_eq!(tree.len(), 7);
    }

    #[test]
    fn test_mrca() {
        let mut tree = balanced();
        crate::encode::encode_splits(&mut tree, crate::encode::EncodeOptions::default());
        assert_eq!(tree.mrca(&Bitset::from(0b0011u64)), Some(1));
        assert_eq!(tree.mrca(&Bitset::from(0b1100u64)), Some(2));
        assert_eq!(tree.mrca(&Bitset::from(0b0101u64)), Some(0));
        // a single taxon resolves to its leaf
        assert_eq!(tree.mrca(&Bitset::from(0b0100u64)), Some(5));
        // bit 4 names no taxon on this tree
        assert_eq!(tree.mrca(&Bitset::from(0b1_0000u64)), None);
    }

    #[test]
    fn test_newick_output() {
        let tree = balanced();
        assert_eq!(tree.to_newick(), "((A:1,B:1):1,(C:1,D:1):1);");
        let star = Tree::star(abcd());
        assert_eq!(star.to_newick(), "(A,B,C,D);");
    }

    #[test]
    fn test_child_surgery() {
        let mut tree = balanced();
        // move C under (A,B)
        tree.add_child(1, 5);
        assert_eq!(tree.children(1), &[3, 4, 5]);
        assert_eq!(tree.children(2), &[6]);
        assert_eq!(tree.parent(5), Some(1));
        tree.insert_child(1, 0, 6);
        assert_eq!(tree.children(1), &[6, 3, 4, 5]);
        assert!(tree.is_leaf(2));
        assert_eq!(tree.remove_child(1, 4), Some(2));
        assert_eq!(tree.parent(4), None);
    }

    #[test]
    fn test_deroot_collapses_first_internal_child() {
        let mut tree = balanced();
        tree.deroot();
        assert!(!tree.is_rooted);
        assert_eq!(tree.children(0), &[3, 4, 2]);
        assert_eq!(tree.node(2).edge.length, Some(2.0));
        assert_eq!(tree.to_newick(), "(A:1,B:1,(C:1,D:1):2);");
    }

    #[test]
    fn test_node_ages() {
        let mut tree = balanced();
        tree.calc_node_ages(1e-7).unwrap();
        assert_eq!(tree.node(0).age, Some(2.0));
        assert_eq!(tree.node(1).age, Some(1.0));
        assert_eq!(tree.node(3).age, Some(0.0));

        tree.node_mut(6).edge.length = Some(1.5);
        let err = tree.calc_node_ages(1e-7).unwrap_err();
        assert!(matches!(err, SplitError::NotUltrametric { node: 2, .. }));
    }

    #[test]
    fn test_split_edge_map_normalizes_unrooted_keys() {
        let mut map = SplitEdgeMap::normalized(Bitset::from(15u64));
        map.insert(&Bitset::from(0b0011u64), 7);
        assert_eq!(map.get(&Bitset::from(0b1100u64)), Some(7));
        assert_eq!(map.keys().next(), Some(&Bitset::from(0b1100u64)));
        map.insert(&Bitset::from(0b1100u64), 8);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&Bitset::from(0b0011u64)), Some(8));

        let mut raw = SplitEdgeMap::rooted();
        raw.insert(&Bitset::from(0b0011u64), 1);
        assert!(!raw.contains(&Bitset::from(0b1100u64)));
    }

    #[test]
    fn test_merge_lengths() {
        assert_eq!(merge_lengths(Some(1.0), Some(2.0)), Some(3.0));
        assert_eq!(merge_lengths(None, Some(2.0)), Some(2.0));
        assert_eq!(merge_lengths(Some(1.0), None), Some(1.0));
        assert_eq!(merge_lengths(None, None), None);
    }
}
