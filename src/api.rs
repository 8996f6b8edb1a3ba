//! Python binding layer for split frequencies and consensus trees.
//!
//! Provides Python functions that read BEAST/NEXUS tree files, count their
//! splits and build majority-rule consensus trees.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rayon::prelude::*;
use std::sync::Arc;

use crate::consensus::majority_rule_consensus;
use crate::distribution::SplitDistribution;
use crate::io::{read_beast_trees, taxon_namespace_from_trees};
use crate::splits::split_as_string_rev;
use crate::tree::Tree;

/// Count splits over the trees of one or more files.
///
/// Args:
///     paths: List of file paths to BEAST/NEXUS tree files
///     burnin_trees: Number of trees to skip at the beginning of each file (default: 0)
///     burnin_states: Minimum STATE value to keep trees (default: 0)
///     use_real_taxa: Use TRANSLATE block for taxon names when available (default: True)
///     rooted: Treat trees as rooted (default: False)
///
/// Returns:
///     A tuple of (taxa, splits) where:
///     - taxa is the sorted list of taxon labels (bit i is taxa[i])
///     - splits is a list of (split_string, count, frequency) in first-seen
///       order, the split string marking member taxa with '*', lowest taxon
///       rightmost
///
/// Raises:
///     ValueError: If no trees are found or a file cannot be read
#[pyfunction]
#[pyo3(signature = (paths, burnin_trees=0, burnin_states=0, use_real_taxa=true, rooted=false))]
fn split_frequencies(
    paths: Vec<String>,
    burnin_trees: usize,
    burnin_states: usize,
    use_real_taxa: bool,
    rooted: bool,
) -> PyResult<(Vec<String>, Vec<(String, u64, f64)>)> {
    let mut dist = count_all_trees(&paths, burnin_trees, burnin_states, use_real_taxa, rooted)?;
    let taxa: Vec<String> = dist
        .taxon_namespace()
        .iter()
        .map(|(_, label)| label.to_string())
        .collect();
    let width = taxa.len();
    let splits = dist.splits().to_vec();
    let freqs = dist.split_frequencies().clone();
    let rows = splits
        .iter()
        .map(|split| {
            (
                split_as_string_rev(split, width),
                dist.split_count(split),
                freqs.get(split).copied().unwrap_or(0.0),
            )
        })
        .collect();
    Ok((taxa, rows))
}

/// Majority-rule consensus tree of one or more files, as Newick.
///
/// Args:
///     paths: List of file paths to BEAST/NEXUS tree files
///     min_freq: Minimum split frequency to be included (default: 0.5)
///     burnin_trees: Number of trees to skip at the beginning of each file (default: 0)
///     burnin_states: Minimum STATE value to keep trees (default: 0)
///     use_real_taxa: Use TRANSLATE block for taxon names when available (default: True)
///     rooted: Build a rooted consensus (default: False)
///
/// Raises:
///     ValueError: If no trees are found or a file cannot be read
#[pyfunction]
#[pyo3(signature = (paths, min_freq=0.5, burnin_trees=0, burnin_states=0, use_real_taxa=true, rooted=false))]
fn consensus_newick(
    paths: Vec<String>,
    min_freq: f64,
    burnin_trees: usize,
    burnin_states: usize,
    use_real_taxa: bool,
    rooted: bool,
) -> PyResult<String> {
    let mut dist = count_all_trees(&paths, burnin_trees, burnin_states, use_real_taxa, rooted)?;
    let tree = majority_rule_consensus(&mut dist, min_freq, rooted)
        .map_err(|e| PyValueError::new_err(format!("Failed to build consensus: {e}")))?;
    Ok(tree.to_newick())
}

/// Reads every file (in parallel) and counts all trees over one namespace.
fn count_all_trees(
    paths: &[String],
    burnin_trees: usize,
    burnin_states: usize,
    use_real_taxa: bool,
    rooted: bool,
) -> PyResult<SplitDistribution> {
    let per_file = paths
        .par_iter()
        .map(|path| {
            read_beast_trees(path, burnin_trees, burnin_states, use_real_taxa)
                .map(|(_taxons, trees)| trees)
                .map_err(|e| PyValueError::new_err(format!("Failed to read '{path}': {e}")))
        })
        .collect::<PyResult<Vec<_>>>()?;

    for (path, trees) in paths.iter().zip(&per_file) {
        if trees.is_empty() {
            return Err(PyValueError::new_err(format!(
                "No trees found in file '{path}' after burnin removal"
            )));
        }
    }

    let phylo_trees: Vec<_> = per_file.into_iter().flatten().map(|(_, t)| t).collect();
    if phylo_trees.is_empty() {
        return Err(PyValueError::new_err("No trees found in any of the provided files"));
    }

    let namespace = Arc::new(taxon_namespace_from_trees(&phylo_trees));
    let mut trees = phylo_trees
        .iter()
        .map(|phylo| {
            let mut tree = Tree::from_phylotree(phylo, namespace.clone())?;
            tree.is_rooted = rooted;
            Ok(tree)
        })
        .collect::<crate::Result<Vec<_>>>()
        .map_err(|e| PyValueError::new_err(format!("Failed to convert tree: {e}")))?;

    let mut dist = SplitDistribution::new(namespace);
    dist.count_splits_on_trees(&mut trees)
        .map_err(|e| PyValueError::new_err(format!("Failed to count splits: {e}")))?;
    Ok(dist)
}

/// Python module definition
#[pymodule]
fn tree_splits(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(split_frequencies, m)?)?;
    m.add_function(wrap_pyfunction!(consensus_newick, m)?)?;
    Ok(())
}
