//! Split occurrence accounting across many trees.
//!
//! A [`SplitDistribution`] accumulates, per split, how many trees contained it,
//! the summed weight of those trees, and the edge lengths / node ages observed
//! on the corresponding edges. Frequencies and summaries are derived lazily
//! and cached; every cache is tagged with the generation of the distribution
//! it was computed from, and every mutation starts a new generation.
//!
//! # Keys
//! Unrooted trees are counted under normalized splits (see
//! [`crate::splits::normalize_split`]), rooted trees under their raw edge
//! splits. The two key spaces do not mix: counting rooted and unrooted trees
//! into one distribution makes their counts incomparable, which
//! [`SplitDistribution::is_mixed_rootings_counted`] reports.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::bitset::Bitset;
use crate::encode::{EncodeOptions, encode_splits};
use crate::error::{Result, SplitError};
use crate::splits::is_non_singleton_split;
use crate::stats::{SummaryStatistics, summarize};
use crate::taxon::TaxonNamespace;
use crate::tree::{NodeId, Tree};

/// What gets sampled per split occurrence.
#[derive(Debug, Clone)]
pub struct DistributionConfig {
    pub ignore_edge_lengths: bool,
    /// Node ages require ultrametric trees, so they are off by default.
    pub ignore_node_ages: bool,
    /// Tolerance of the ultrametricity check when ages are computed.
    pub ultrametricity_precision: f64,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        DistributionConfig {
            ignore_edge_lengths: false,
            ignore_node_ages: true,
            ultrametricity_precision: 1e-7,
        }
    }
}

/// Node visiting order of [`SplitDistribution::split_support_iter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalStrategy {
    #[default]
    Preorder,
    Postorder,
}

impl FromStr for TraversalStrategy {
    type Err = SplitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "preorder" => Ok(TraversalStrategy::Preorder),
            "postorder" => Ok(TraversalStrategy::Postorder),
            other => Err(SplitError::UnknownTraversal(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SupportOptions {
    /// Trust the tree's current encoding instead of re-encoding it.
    pub is_splits_encoded: bool,
    /// Also report leaf edges.
    pub include_external_splits: bool,
    pub traversal: TraversalStrategy,
}

/// Result of [`SplitDistribution::splits_considered`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitsConsidered {
    /// Split occurrences over all trees.
    pub total: u64,
    pub unique: usize,
    pub nontrivial_total: u64,
    pub nontrivial_unique: usize,
}

#[derive(Debug, Clone)]
struct Cached<T> {
    generation: u64,
    value: T,
}

/// Returns the cached value, recomputing it if it belongs to an older
/// generation.
fn refresh<T>(slot: &mut Option<Cached<T>>, generation: u64, compute: impl FnOnce() -> T) -> &T {
    if slot.as_ref().is_some_and(|c| c.generation != generation) {
        *slot = None;
    }
    &slot
        .get_or_insert_with(|| Cached {
            generation,
            value: compute(),
        })
        .value
}

#[derive(Debug, Clone)]
pub struct SplitDistribution {
    taxon_namespace: Arc<TaxonNamespace>,
    pub config: DistributionConfig,
    /// Distinct splits in first-seen order.
    splits: Vec<Bitset>,
    split_counts: HashMap<Bitset, u64>,
    weighted_split_counts: HashMap<Bitset, f64>,
    split_edge_lengths: HashMap<Bitset, Vec<f64>>,
    split_node_ages: HashMap<Bitset, Vec<f64>>,
    total_trees_counted: usize,
    sum_of_tree_weights: f64,
    tree_rooting_types_counted: BTreeSet<bool>,
    generation: u64,
    split_freqs: Option<Cached<HashMap<Bitset, f64>>>,
    weighted_split_freqs: Option<Cached<HashMap<Bitset, f64>>>,
    edge_length_summaries: Option<Cached<HashMap<Bitset, SummaryStatistics>>>,
    node_age_summaries: Option<Cached<HashMap<Bitset, SummaryStatistics>>>,
}

impl SplitDistribution {
    pub fn new(taxon_namespace: Arc<TaxonNamespace>) -> Self {
        Self::with_config(taxon_namespace, DistributionConfig::default())
    }

    pub fn with_config(taxon_namespace: Arc<TaxonNamespace>, config: DistributionConfig) -> Self {
        SplitDistribution {
            taxon_namespace,
            config,
            splits: Vec::new(),
            split_counts: HashMap::new(),
            weighted_split_counts: HashMap::new(),
            split_edge_lengths: HashMap::new(),
            split_node_ages: HashMap::new(),
            total_trees_counted: 0,
            sum_of_tree_weights: 0.0,
            tree_rooting_types_counted: BTreeSet::new(),
            generation: 0,
            split_freqs: None,
            weighted_split_freqs: None,
            edge_length_summaries: None,
            node_age_summaries: None,
        }
    }

    /// Distribution seeded with every split of `split_set` counted once.
    pub fn from_split_set<'a, I>(taxon_namespace: Arc<TaxonNamespace>, split_set: I) -> Self
    where
        I: IntoIterator<Item = &'a Bitset>,
    {
        let mut dist = Self::new(taxon_namespace);
        for split in split_set {
            dist.add_split_count(split, 1);
        }
        dist
    }

    pub fn taxon_namespace(&self) -> &Arc<TaxonNamespace> {
        &self.taxon_namespace
    }

    pub fn splits(&self) -> &[Bitset] {
        &self.splits
    }

    pub fn split_count(&self, split: &Bitset) -> u64 {
        self.split_counts.get(split).copied().unwrap_or(0)
    }

    pub fn split_counts(&self) -> &HashMap<Bitset, u64> {
        &self.split_counts
    }

    pub fn weighted_split_counts(&self) -> &HashMap<Bitset, f64> {
        &self.weighted_split_counts
    }

    pub fn split_edge_lengths(&self) -> &HashMap<Bitset, Vec<f64>> {
        &self.split_edge_lengths
    }

    pub fn split_node_ages(&self) -> &HashMap<Bitset, Vec<f64>> {
        &self.split_node_ages
    }

    pub fn total_trees_counted(&self) -> usize {
        self.total_trees_counted
    }

    pub fn sum_of_tree_weights(&self) -> f64 {
        self.sum_of_tree_weights
    }

    pub fn tree_rooting_types_counted(&self) -> &BTreeSet<bool> {
        &self.tree_rooting_types_counted
    }

    fn touch(&mut self) {
        self.generation += 1;
    }

    /// Adds `count` occurrences of `split`, registering it if unseen.
    pub fn add_split_count(&mut self, split: &Bitset, count: u64) {
        self.touch();
        match self.split_counts.get_mut(split) {
            Some(c) => *c += count,
            None => {
                self.splits.push(split.clone());
                self.split_counts.insert(split.clone(), count);
            }
        }
    }

    /// Merges another distribution into this one: counts, weights and totals
    /// are summed, samples concatenated, rooting observations united. Splits
    /// unseen here are appended in the other distribution's order.
    pub fn update(&mut self, other: &SplitDistribution) {
        self.touch();
        self.total_trees_counted += other.total_trees_counted;
        self.sum_of_tree_weights += other.sum_of_tree_weights;
        self.tree_rooting_types_counted
            .extend(other.tree_rooting_types_counted.iter().copied());
        for split in &other.splits {
            let count = other.split_count(split);
            match self.split_counts.get_mut(split) {
                Some(c) => *c += count,
                None => {
                    self.splits.push(split.clone());
                    self.split_counts.insert(split.clone(), count);
                }
            }
            if let Some(w) = other.weighted_split_counts.get(split) {
                *self.weighted_split_counts.entry(split.clone()).or_insert(0.0) += w;
            }
            if let Some(lengths) = other.split_edge_lengths.get(split) {
                self.split_edge_lengths
                    .entry(split.clone())
                    .or_default()
                    .extend_from_slice(lengths);
            }
            if let Some(ages) = other.split_node_ages.get(split) {
                self.split_node_ages
                    .entry(split.clone())
                    .or_default()
                    .extend_from_slice(ages);
            }
        }
    }

    /// Adds every split of `tree` to the distribution.
    ///
    /// The tree's weight (1.0 if unset) is added to the weighted counts of its
    /// splits and to the total weight. Unless disabled in [`DistributionConfig`],
    /// the edge length and node age of each split's edge are sampled.
    ///
    /// Rooted trees are counted under the raw edge split even when their map
    /// was built with normalized keys.
    ///
    /// # Errors
    /// - [`SplitError::TaxonNamespaceMismatch`] if `tree` uses another namespace.
    /// - [`SplitError::NotUltrametric`] when node ages are sampled and the tree
    ///   is not ultrametric; the distribution is left unchanged.
    pub fn count_splits_on_tree(&mut self, tree: &mut Tree, is_splits_encoded: bool) -> Result<()> {
        self.check_namespace(tree)?;
        self.prepare_tree(tree, !is_splits_encoded)?;
        self.record_tree(tree);
        Ok(())
    }

    /// Counts a batch of trees: ages and encoding are computed in parallel,
    /// accounting runs sequentially in input order, so split order stays
    /// deterministic.
    ///
    /// Namespaces are checked and every tree is prepared before the first one
    /// is counted, so a failing batch counts nothing. Trees prepared before
    /// the failure stay encoded.
    pub fn count_splits_on_trees(&mut self, trees: &mut [Tree]) -> Result<()> {
        for tree in trees.iter() {
            self.check_namespace(tree)?;
        }
        let this = &*self;
        trees
            .par_iter_mut()
            .try_for_each(|tree| this.prepare_tree(tree, true))?;
        for tree in trees.iter() {
            self.record_tree(tree);
        }
        debug!(
            trees = trees.len(),
            unique_splits = self.splits.len(),
            "counted splits"
        );
        Ok(())
    }

    fn check_namespace(&self, tree: &Tree) -> Result<()> {
        if Arc::ptr_eq(tree.taxon_namespace(), &self.taxon_namespace) {
            Ok(())
        } else {
            Err(SplitError::TaxonNamespaceMismatch)
        }
    }

    /// Ages go first: encoding may deroot the tree, which merges the two
    /// basal edges and breaks tip-to-root distances.
    fn prepare_tree(&self, tree: &mut Tree, encode: bool) -> Result<()> {
        if !self.config.ignore_node_ages {
            tree.calc_node_ages(self.config.ultrametricity_precision)?;
        }
        if encode {
            encode_splits(tree, EncodeOptions::default());
        }
        Ok(())
    }

    /// Accounting half of [`Self::count_splits_on_tree`] on a prepared tree.
    fn record_tree(&mut self, tree: &Tree) {
        self.touch();
        self.total_trees_counted += 1;
        let weight = tree.weight.unwrap_or(1.0);
        self.sum_of_tree_weights += weight;

        let was_mixed = self.is_mixed_rootings_counted();
        self.tree_rooting_types_counted.insert(tree.is_rooted);
        if !was_mixed && self.is_mixed_rootings_counted() {
            warn!("counting rooted and unrooted trees into one split distribution");
        }

        let occurrences: Vec<(Bitset, NodeId)> = tree
            .split_edge_map
            .iter()
            .map(|(key, node)| {
                let split = if tree.is_rooted {
                    tree.node(node).edge.split_bitmask.clone()
                } else {
                    key.clone()
                };
                (split, node)
            })
            .collect();

        for (split, node) in occurrences {
            match self.split_counts.get_mut(&split) {
                Some(c) => *c += 1,
                None => {
                    self.splits.push(split.clone());
                    self.split_counts.insert(split.clone(), 1);
                }
            }
            *self.weighted_split_counts.entry(split.clone()).or_insert(0.0) += weight;
            if !self.config.ignore_edge_lengths {
                let samples = self.split_edge_lengths.entry(split.clone()).or_default();
                if let Some(length) = tree.node(node).edge.length {
                    samples.push(length);
                }
            }
            if !self.config.ignore_node_ages {
                let samples = self.split_node_ages.entry(split).or_default();
                if let Some(age) = tree.node(node).age {
                    samples.push(age);
                }
            }
        }
    }

    /// Occurrence statistics, triviality judged against the full namespace.
    pub fn splits_considered(&self) -> SplitsConsidered {
        let taxa_mask = self.taxon_namespace.all_taxa_bitmask();
        let mut considered = SplitsConsidered {
            total: 0,
            unique: 0,
            nontrivial_total: 0,
            nontrivial_unique: 0,
        };
        for (split, &count) in &self.split_counts {
            considered.unique += 1;
            considered.total += count;
            if is_non_singleton_split(split, &taxa_mask) {
                considered.nontrivial_unique += 1;
                considered.nontrivial_total += count;
            }
        }
        considered
    }

    /// Split → count / trees counted. Before any tree is counted every known
    /// split has frequency 1.0.
    pub fn split_frequencies(&mut self) -> &HashMap<Bitset, f64> {
        let counts = &self.split_counts;
        let total = self.total_trees_counted;
        refresh(&mut self.split_freqs, self.generation, || {
            counts
                .iter()
                .map(|(split, &count)| {
                    let freq = if total == 0 {
                        1.0
                    } else {
                        count as f64 / total as f64
                    };
                    (split.clone(), freq)
                })
                .collect()
        })
    }

    /// Split → weighted count / summed tree weight (divisor 1.0 when no
    /// weight has been accumulated).
    pub fn weighted_split_frequencies(&mut self) -> &HashMap<Bitset, f64> {
        let counts = &self.weighted_split_counts;
        let total = if self.sum_of_tree_weights == 0.0 {
            1.0
        } else {
            self.sum_of_tree_weights
        };
        refresh(&mut self.weighted_split_freqs, self.generation, || {
            counts
                .iter()
                .map(|(split, &w)| (split.clone(), w / total))
                .collect()
        })
    }

    /// Frequency of one split, 0.0 if never seen.
    pub fn frequency(&mut self, split: &Bitset) -> f64 {
        self.split_frequencies().get(split).copied().unwrap_or(0.0)
    }

    /// Summary of sampled edge lengths per split. Splits whose samples cannot
    /// be summarized (e.g. a single sample) are left out.
    pub fn split_edge_length_summaries(&mut self) -> &HashMap<Bitset, SummaryStatistics> {
        let samples = &self.split_edge_lengths;
        refresh(&mut self.edge_length_summaries, self.generation, || {
            summarize_samples(samples, "edge length")
        })
    }

    /// Summary of sampled node ages per split, same omission rule as
    /// [`Self::split_edge_length_summaries`].
    pub fn split_node_age_summaries(&mut self) -> &HashMap<Bitset, SummaryStatistics> {
        let samples = &self.split_node_ages;
        refresh(&mut self.node_age_summaries, self.generation, || {
            summarize_samples(samples, "node age")
        })
    }

    /// Mean sampled edge length per split that has at least one sample.
    pub fn mean_edge_lengths(&self) -> HashMap<Bitset, f64> {
        self.split_edge_lengths
            .iter()
            .filter(|(_, lengths)| !lengths.is_empty())
            .map(|(split, lengths)| {
                (split.clone(), lengths.iter().sum::<f64>() / lengths.len() as f64)
            })
            .collect()
    }

    pub fn is_mixed_rootings_counted(&self) -> bool {
        self.tree_rooting_types_counted.contains(&true)
            && self.tree_rooting_types_counted.contains(&false)
    }

    pub fn is_all_counted_trees_rooted(&self) -> bool {
        self.tree_rooting_types_counted.contains(&true) && self.tree_rooting_types_counted.len() == 1
    }

    pub fn is_all_counted_trees_strictly_unrooted(&self) -> bool {
        self.tree_rooting_types_counted.contains(&false) && self.tree_rooting_types_counted.len() == 1
    }

    pub fn is_all_counted_trees_treated_as_unrooted(&self) -> bool {
        !self.tree_rooting_types_counted.contains(&true)
    }

    /// Frequency, under this distribution, of the split of every node of
    /// `tree` (internal nodes only unless `include_external_splits`), in the
    /// requested traversal order. Unseen splits report 0.0.
    ///
    /// The tree's splits are looked up the way [`Self::count_splits_on_tree`]
    /// keys them: raw for rooted trees, normalized for unrooted ones.
    pub fn split_support_iter<'a>(
        &'a mut self,
        tree: &'a mut Tree,
        options: SupportOptions,
    ) -> impl Iterator<Item = f64> + 'a {
        if !options.is_splits_encoded {
            encode_splits(tree, EncodeOptions::default());
        }
        let tree: &'a Tree = tree;
        let nodes = match (options.traversal, options.include_external_splits) {
            (TraversalStrategy::Preorder, true) => tree.preorder(),
            (TraversalStrategy::Preorder, false) => tree.preorder_internal(),
            (TraversalStrategy::Postorder, true) => tree.postorder(),
            (TraversalStrategy::Postorder, false) => tree.postorder_internal(),
        };
        let freqs = self.split_frequencies();
        nodes.into_iter().map(move |id| {
            let split = &tree.node(id).edge.split_bitmask;
            let key = if tree.is_rooted {
                split.clone()
            } else {
                tree.split_edge_map.key_for(split)
            };
            freqs.get(&key).copied().unwrap_or(0.0)
        })
    }

    /// Log of the product of split supports over the tree (zero supports are
    /// skipped). The highest-scoring tree of a sample is its maximum
    /// credibility tree.
    pub fn product_of_split_support_on_tree(
        &mut self,
        tree: &mut Tree,
        is_splits_encoded: bool,
        include_external_splits: bool,
    ) -> f64 {
        let options = SupportOptions {
            is_splits_encoded,
            include_external_splits,
            traversal: TraversalStrategy::Preorder,
        };
        self.split_support_iter(tree, options)
            .filter(|&support| support > 0.0)
            .map(f64::ln)
            .sum()
    }

    /// Sum of split supports over the tree.
    pub fn sum_of_split_support_on_tree(
        &mut self,
        tree: &mut Tree,
        is_splits_encoded: bool,
        include_external_splits: bool,
    ) -> f64 {
        let options = SupportOptions {
            is_splits_encoded,
            include_external_splits,
            traversal: TraversalStrategy::Preorder,
        };
        self.split_support_iter(tree, options).sum()
    }

    /// Index of the tree with the highest clade credibility (log product of
    /// supports when `use_product`, sum otherwise); first wins on ties.
    pub fn maximum_credibility_tree(&mut self, trees: &mut [Tree], use_product: bool) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, tree) in trees.iter_mut().enumerate() {
            let score = if use_product {
                self.product_of_split_support_on_tree(tree, false, false)
            } else {
                self.sum_of_split_support_on_tree(tree, false, false)
            };
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((idx, score));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

fn summarize_samples(
    samples: &HashMap<Bitset, Vec<f64>>,
    what: &str,
) -> HashMap<Bitset, SummaryStatistics> {
    let mut summaries = HashMap::new();
    for (split, values) in samples {
        if values.is_empty() {
            continue;
        }
        match summarize(values) {
            Ok(summary) => {
                summaries.insert(split.clone(), summary);
            }
            Err(e) => debug!(split = %split, "skipping {what} summary: {e}"),
        }
    }
    summaries
}
