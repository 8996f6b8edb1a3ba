use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tree_splits::bitset::Bitset;
use tree_splits::consensus::majority_rule_consensus;
use tree_splits::distribution::SplitDistribution;
use tree_splits::error::SplitError;
use tree_splits::io::{
    read_beast_trees, taxon_namespace_from_trees, write_newick, write_split_table_tsv,
};
use tree_splits::tree::Tree;

const BEAST_FILE: &str = "#NEXUS

Begin trees;
\tTranslate
\t\t1 Alpha,
\t\t2 Beta,
\t\t3 Gamma,
\t\t4 Delta
\t\t;
tree STATE_0 = ((1:[&rate=0.5]1.0,2:1.0):1.0,(3:1.0,4:1.0):1.0);
tree STATE_1000 = ((1:1.0,2:1.0):3.0,(3:1.0,4:1.0):1.0);
tree STATE_2000 = ((1:1.0,3:1.0):1.0,(2:1.0,4:1.0):1.0);
End;
";

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("tree_splits_{}_{name}", std::process::id()))
}

fn write_fixture(name: &str) -> PathBuf {
    let path = scratch_path(name);
    fs::write(&path, BEAST_FILE).expect("fixture written");
    path
}

fn load(path: &PathBuf, burnin_trees: usize, burnin_states: usize) -> (SplitDistribution, Vec<Tree>) {
    let (_taxa, named) = read_beast_trees(path, burnin_trees, burnin_states, true).unwrap();
    let ns = Arc::new(taxon_namespace_from_trees(named.iter().map(|(_, t)| t)));
    let trees = named
        .iter()
        .map(|(_, t)| Tree::from_phylotree(t, ns.clone()).unwrap())
        .collect();
    (SplitDistribution::new(ns), trees)
}

#[test]
fn beast_file_burnin_and_names() {
    let path = write_fixture("burnin.trees");
    let (taxa, all) = read_beast_trees(&path, 0, 0, true).unwrap();
    assert_eq!(taxa.len(), 4);
    assert_eq!(all.len(), 3);
    assert!(all[1].0.ends_with("_tree_STATE1000"));

    let (_, by_count) = read_beast_trees(&path, 1, 0, true).unwrap();
    assert_eq!(by_count.len(), 2);
    let (_, by_state) = read_beast_trees(&path, 0, 1000, true).unwrap();
    assert_eq!(by_state.len(), 1);
    assert!(by_state[0].0.ends_with("STATE2000"));

    let missing = read_beast_trees(scratch_path("missing.trees"), 0, 0, true);
    assert!(matches!(missing, Err(SplitError::Io(_))));
    fs::remove_file(path).ok();
}

#[test]
fn frequencies_and_consensus_from_file() {
    let path = write_fixture("consensus.trees");
    let (mut dist, mut trees) = load(&path, 0, 0);
    for tree in &mut trees {
        tree.is_rooted = false;
    }
    dist.count_splits_on_trees(&mut trees).unwrap();

    // sorted namespace: Alpha, Beta, Delta, Gamma; {Alpha,Beta} | {Delta,Gamma}
    let cd = Bitset::from(0b1100u64);
    assert_eq!(dist.split_count(&cd), 2);
    assert!((dist.frequency(&cd) - 2.0 / 3.0).abs() < 1e-12);
    assert!(dist.is_all_counted_trees_strictly_unrooted());

    let consensus = majority_rule_consensus(&mut dist, 0.5, false).unwrap();
    // bifurcating roots were collapsed: lengths 1+1 and 3+1
    assert_eq!(consensus.to_newick(), "(Alpha,Beta,(Delta,Gamma):3);");

    let newick_path = scratch_path("consensus.tre");
    write_newick(&newick_path, &consensus).unwrap();
    assert_eq!(
        fs::read_to_string(&newick_path).unwrap(),
        "(Alpha,Beta,(Delta,Gamma):3);\n"
    );
    fs::remove_file(newick_path).ok();
    fs::remove_file(path).ok();
}

#[test]
fn split_table_plain_and_gzipped() {
    let path = write_fixture("table.trees");
    let (mut dist, mut trees) = load(&path, 0, 0);
    for tree in &mut trees {
        tree.is_rooted = true;
    }
    dist.count_splits_on_trees(&mut trees).unwrap();

    let tsv = scratch_path("splits.tsv");
    write_split_table_tsv(&tsv, &mut dist).unwrap();
    let plain = fs::read_to_string(&tsv).unwrap();
    let mut lines = plain.lines();
    assert_eq!(
        lines.next(),
        Some("split\tcount\tfrequency\tweighted_frequency\tmean_edge_length")
    );
    // rooted: {Alpha,Beta} is its own clade, seen twice with lengths 1 and 3
    let ab = plain
        .lines()
        .find(|l| l.starts_with("**..\t"))
        .expect("row for {Alpha,Beta}");
    let fields: Vec<&str> = ab.split('\t').collect();
    assert_eq!(fields[1], "2");
    assert_eq!(fields[4], "2");
    assert_eq!(plain.lines().count(), dist.splits().len() + 1);

    let gz = scratch_path("splits.tsv.gz");
    write_split_table_tsv(&gz, &mut dist).unwrap();
    let mut decoded = String::new();
    GzDecoder::new(fs::File::open(&gz).unwrap())
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, plain);

    for p in [tsv, gz, path] {
        fs::remove_file(p).ok();
    }
}

#[test]
fn trees_from_other_namespaces_are_rejected() {
    let path = write_fixture("mismatch.trees");
    let (mut dist, _) = load(&path, 0, 0);
    let (_, mut foreign) = load(&path, 0, 0);
    let err = dist.count_splits_on_trees(&mut foreign).unwrap_err();
    assert!(matches!(err, SplitError::TaxonNamespaceMismatch));
    fs::remove_file(path).ok();
}
