//! Reading BEAST/NEXUS and Newick trees into split-ready [`Tree`]s, and
//! writing split tables and consensus trees.
//!
//! Parsing is delegated to `phylotree`; its trees are then converted to the
//! arena [`Tree`] with leaves resolved against a shared [`TaxonNamespace`].

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use flate2::Compression;
use flate2::write::GzEncoder;
use phylotree::tree::Tree as PhyloTree;
use tracing::{debug, warn};

use crate::bitset::Bitset;
use crate::distribution::SplitDistribution;
use crate::error::{Result, SplitError};
use crate::splits::split_as_string_rev;
use crate::taxon::TaxonNamespace;
use crate::tree::{Node, NodeId, Tree};

/// Drops `[&...]` comments from a tree body. BEAST puts them between the
/// colon and the length (`:[&rate=0.5]1.0`), and the lengths are the edge
/// length samples of the split distribution, so only the comment may go.
/// Plain `[...]` comments are left for the Newick parser.
fn strip_beast_annotations(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut in_annotation = false;
    let mut chars = newick.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '[' && chars.peek() == Some(&'&') {
            in_annotation = true;
        } else if ch == ']' && in_annotation {
            in_annotation = false;
        } else if !in_annotation {
            result.push(ch);
        }
    }

    result
}

/// Reads the TREE lines of a BEAST `.trees` file.
///
/// Trees are named `<file stem>_tree_STATE<n>`. Burn-in drops the first
/// `burnin_trees` trees or, by state, keeps trees with `STATE_ > burnin_states`;
/// both zero keeps everything. Trees that fail to parse are skipped with a
/// warning. With `use_real_taxa`, leaf ids are renamed through the TRANSLATE
/// block.
///
/// Returns the TRANSLATE map and the named trees.
pub fn read_beast_trees<P: AsRef<Path>>(
    path: P,
    burnin_trees: usize,
    burnin_states: usize,
    use_real_taxa: bool,
) -> Result<(HashMap<String, String>, Vec<(String, PhyloTree)>)> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;

    let base_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_end_matches(".trees"))
        .unwrap_or("unknown");

    let taxons = parse_taxon_block(&content);

    let trees = collect_tree_blocks(&content)
        .into_iter()
        .enumerate()
        .map(|(idx, tree)| {
            let state = extract_state(tree.header);
            (idx, tree, state, format!("{base_name}_tree_STATE{state}"))
        })
        .filter(|(idx, _tree, state, _name)| {
            (burnin_trees == 0 && burnin_states == 0)
                || (burnin_trees > 0 && *idx >= burnin_trees)
                || (burnin_states > 0 && *state > burnin_states)
        })
        .filter_map(|(idx, tree, _state, name)| {
            let newick = strip_beast_annotations(&tree.body);
            let mut phylo_tree = match PhyloTree::from_newick(&newick) {
                Ok(t) => t,
                Err(e) => {
                    warn!(file = %path.display(), index = idx, "failed to parse tree: {e}");
                    return None;
                }
            };
            if use_real_taxa {
                rename_leaf_nodes(&mut phylo_tree, &taxons);
            }
            Some((name, phylo_tree))
        })
        .collect::<Vec<_>>();

    debug!(file = %path.display(), trees = trees.len(), taxa = taxons.len(), "read BEAST trees");
    Ok((taxons, trees))
}

/// MCMC state of a `tree STATE_<n>` header, the key of burn-in by state.
/// Headers without a state count as state 0, which any state burn-in drops.
fn extract_state(header: &str) -> usize {
    let upper = header.to_ascii_uppercase();
    upper
        .find("STATE_")
        .map(|start| &upper[start + "STATE_".len()..])
        .and_then(|rest| {
            let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            rest[..end].parse().ok()
        })
        .unwrap_or(0)
}

/// One sampled tree: header (`tree STATE_0`) and Newick body.
struct TreeBlock<'a> {
    header: &'a str,
    body: String,
}

/// Tree lines from the first `tree ` line up to `End;`, in file order, so
/// indices line up with burn-in by count. Lines without ` = ` are skipped.
fn collect_tree_blocks(content: &str) -> Vec<TreeBlock<'_>> {
    content
        .lines()
        .skip_while(|line| !line.trim_start().to_ascii_uppercase().starts_with("TREE "))
        .take_while(|line| !line.trim().to_ascii_uppercase().starts_with("END;"))
        .filter_map(|line| {
            let mut parts = line.splitn(2, " = ");
            let header = parts.next()?.trim();
            let body = parts.next()?.trim().to_string();
            Some(TreeBlock { header, body })
        })
        .collect()
}

/// Leaf id → taxon label from the TRANSLATE block (`1 'Alpha',` entries up
/// to the closing `;`). Empty when the file has none, in which case the
/// namespace is built over the raw leaf ids.
fn parse_taxon_block(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TRANSLATE"))
        .skip(1)
        .take_while(|line| !line.trim().starts_with(';'))
        .filter_map(|line| {
            let line = line.trim().trim_end_matches(',');
            let mut parts = line.split_whitespace();
            let id = parts.next()?.to_string();
            let label = parts.next()?.trim_matches('\'').to_string();
            Some((id, label))
        })
        .collect::<HashMap<_, _>>()
}

/// Renames leaves through `translate`; leaves missing from it keep their name.
pub fn rename_leaf_nodes(phylo_tree: &mut PhyloTree, translate: &HashMap<String, String>) {
    for leaf_id in phylo_tree.get_leaves() {
        if let Ok(node) = phylo_tree.get_mut(&leaf_id) {
            if let Some(label) = node.name.as_ref().and_then(|n| translate.get(n)) {
                node.name = Some(label.clone());
            }
        }
    }
}

/// Namespace over the sorted, de-duplicated leaf names of `trees`, so that
/// taxa map to the same bits whatever order files list them in.
pub fn taxon_namespace_from_trees<'a, I>(trees: I) -> TaxonNamespace
where
    I: IntoIterator<Item = &'a PhyloTree>,
{
    let labels: BTreeSet<String> = trees
        .into_iter()
        .flat_map(|tree| {
            tree.get_leaves()
                .into_iter()
                .filter_map(|id| tree.get(&id).ok()?.name.clone())
                .collect::<Vec<_>>()
        })
        .collect();
    TaxonNamespace::from_labels(labels)
}

impl Tree {
    /// Converts a parsed `phylotree` tree. Leaves are bound to the taxon of
    /// the same name; internal names become node labels. Rootedness follows
    /// `phylotree` (bifurcating root).
    ///
    /// # Errors
    /// [`SplitError::UnknownTaxon`] for a leaf whose name is missing from
    /// the namespace (an unnamed leaf reports an empty name).
    pub fn from_phylotree(phylo: &PhyloTree, taxon_namespace: Arc<TaxonNamespace>) -> Result<Tree> {
        let phylo_root = phylo.get_root()?;
        let mut tree = Tree::new(taxon_namespace);
        tree.is_rooted = phylo.is_rooted()?;

        let root = tree.root().unwrap_or_default();
        let mut stack: Vec<(usize, NodeId)> = vec![(phylo_root, root)];
        while let Some((phylo_id, id)) = stack.pop() {
            let phylo_node = phylo.get(&phylo_id)?;
            if phylo_node.children.is_empty() {
                let name = phylo_node.name.clone().unwrap_or_default();
                let taxon = tree
                    .taxon_namespace()
                    .get(&name)
                    .ok_or(SplitError::UnknownTaxon(name))?;
                tree.node_mut(id).taxon = Some(taxon);
            } else {
                tree.node_mut(id).label = phylo_node.name.clone();
                for &phylo_child in &phylo_node.children {
                    let length = phylo.get(&phylo_child)?.parent_edge;
                    let child = tree.new_child(id, Node::internal(length));
                    stack.push((phylo_child, child));
                }
            }
        }
        Ok(tree)
    }

    /// Parses a Newick string against `taxon_namespace`.
    pub fn from_newick(newick: &str, taxon_namespace: Arc<TaxonNamespace>) -> Result<Tree> {
        let phylo =
            PhyloTree::from_newick(newick).map_err(|e| SplitError::Newick(e.to_string()))?;
        Tree::from_phylotree(&phylo, taxon_namespace)
    }
}

/// Writes all splits of `dist` as TSV, in first-seen order: the split string
/// (`*` marks member taxa, lowest taxon rightmost), count, frequency,
/// weighted frequency and mean edge length (empty when never sampled).
/// A path ending in `.gz` is gzip-compressed.
pub fn write_split_table_tsv<P: AsRef<Path>>(path: P, dist: &mut SplitDistribution) -> Result<()> {
    let mut out = create_output(path.as_ref())?;
    let width = dist.taxon_namespace().len();
    let splits: Vec<Bitset> = dist.splits().to_vec();
    let counts = dist.split_counts().clone();
    let mean_lengths = dist.mean_edge_lengths();
    let weighted = dist.weighted_split_frequencies().clone();
    let freqs = dist.split_frequencies();

    writeln!(out, "split\tcount\tfrequency\tweighted_frequency\tmean_edge_length")?;
    for split in &splits {
        write!(
            out,
            "{}\t{}\t{}\t{}\t",
            split_as_string_rev(split, width),
            counts.get(split).copied().unwrap_or(0),
            freqs.get(split).copied().unwrap_or(0.0),
            weighted.get(split).copied().unwrap_or(0.0),
        )?;
        if let Some(length) = mean_lengths.get(split) {
            write!(out, "{length}")?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

/// Writes `tree` as a single Newick line (gzip for `.gz` paths).
pub fn write_newick<P: AsRef<Path>>(path: P, tree: &Tree) -> Result<()> {
    let mut out = create_output(path.as_ref())?;
    writeln!(out, "{}", tree.to_newick())?;
    out.flush()?;
    Ok(())
}

fn create_output(path: &Path) -> Result<Box<dyn Write>> {
    let file = File::create(path)?;
    let out: Box<dyn Write> = if path.to_string_lossy().ends_with(".gz") {
        Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
    } else {
        Box::new(BufWriter::new(file))
    };
    Ok(out)
}
