//! Shared, ordered registry of taxa with stable bit assignment.
//!
//! Taxon `i` owns bit `i`. Once built, a namespace is shared between trees and
//! distributions behind an `Arc` and never mutated.
//!
//! # Why sort labels
//! Node ids differ between parsed trees, taxon labels do not. Building the
//! namespace from alphabetically sorted labels makes identical taxa map to
//! identical bits across files.

use std::collections::HashMap;

use crate::bitset::Bitset;

/// Index of a taxon in its namespace (and its bit position).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaxonId(pub usize);

#[derive(Debug, Clone, Default)]
pub struct TaxonNamespace {
    labels: Vec<String>,
    index: HashMap<String, TaxonId>,
}

impl TaxonNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace with one taxon per label, in the given order. Duplicates are
    /// registered once.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ns = TaxonNamespace::new();
        for label in labels {
            ns.add_taxon(label);
        }
        ns
    }

    /// Registers `label` (if new) and returns its id.
    pub fn add_taxon<S: Into<String>>(&mut self, label: S) -> TaxonId {
        let label = label.into();
        if let Some(id) = self.index.get(&label) {
            return *id;
        }
        let id = TaxonId(self.labels.len());
        self.index.insert(label.clone(), id);
        self.labels.push(label);
        id
    }

    pub fn get(&self, label: &str) -> Option<TaxonId> {
        self.index.get(label).copied()
    }

    pub fn label(&self, id: TaxonId) -> &str {
        &self.labels[id.0]
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// All taxa in stable (registration) order.
    pub fn iter(&self) -> impl Iterator<Item = (TaxonId, &str)> + '_ {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, l)| (TaxonId(i), l.as_str()))
    }

    /// Single-bit mask of one taxon.
    pub fn taxon_bitmask(&self, id: TaxonId) -> Bitset {
        Bitset::singleton(id.0)
    }

    /// OR of all taxon masks.
    pub fn all_taxa_bitmask(&self) -> Bitset {
        Bitset::from_indices(0..self.labels.len())
    }

    /// Labels of the taxa whose bits are set in `split`.
    pub fn labels_in(&self, split: &Bitset) -> Vec<&str> {
        split
            .iter_ones()
            .filter_map(|i| self.labels.get(i).map(String::as_str))
            .collect()
    }
}
