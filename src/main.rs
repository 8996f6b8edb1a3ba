use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tree_splits::consensus::majority_rule_consensus;
use tree_splits::distribution::SplitDistribution;
use tree_splits::io::{read_beast_trees, taxon_namespace_from_trees, write_newick, write_split_table_tsv};
use tree_splits::tree::Tree;

/// Count splits over the trees of a BEAST/NEXUS file and write their
/// frequencies (TSV), optionally with a majority-rule consensus tree.
#[derive(Parser, Debug)]
#[command(name = "tree-splits", version, about = "Split frequencies and consensus trees for BEAST trees")]
struct Args {
    /// Path to BEAST .trees (NEXUS) file
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Burn-in by number of trees (drop first N trees)
    #[arg(short = 't', long = "burnin-trees", default_value_t = 0)]
    burnin_trees: usize,

    /// Burn-in by state (keep trees with STATE_ > value)
    #[arg(short = 's', long = "burnin-states", default_value_t = 0)]
    burnin_states: usize,

    /// Output path for the split table (TSV, gzip if it ends in .gz)
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Also write the majority-rule consensus tree (Newick) to this path
    #[arg(long = "consensus")]
    consensus: Option<PathBuf>,

    /// Minimum split frequency for the consensus tree
    #[arg(long = "min-freq", default_value_t = 0.5)]
    min_freq: f64,

    /// Treat trees as rooted
    #[arg(long = "rooted", default_value_t = false)]
    rooted: bool,

    /// Use TRANSLATE block to map taxon IDs to labels when available
    #[arg(long = "use-real-taxa", default_value_t = false)]
    use_real_taxa: bool,

    /// Quiet mode: only warnings and errors are logged
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.quiet);
    if let Err(e) = run(&args) {
        error!("{e}");
        process::exit(2);
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> tree_splits::Result<()> {
    let t0 = Instant::now();
    let (taxons, named_trees) = read_beast_trees(
        &args.input,
        args.burnin_trees,
        args.burnin_states,
        args.use_real_taxa,
    )?;
    if named_trees.is_empty() {
        return Err(tree_splits::SplitError::InvalidArgument(format!(
            "no trees parsed from {}",
            args.input.display()
        )));
    }
    info!(
        secs = t0.elapsed().as_secs_f64(),
        translated = taxons.len(),
        trees = named_trees.len(),
        "read trees"
    );

    let t1 = Instant::now();
    let namespace = Arc::new(taxon_namespace_from_trees(named_trees.iter().map(|(_, t)| t)));
    let mut trees = named_trees
        .iter()
        .map(|(_, phylo)| {
            let mut tree = Tree::from_phylotree(phylo, namespace.clone())?;
            tree.is_rooted = args.rooted;
            Ok(tree)
        })
        .collect::<tree_splits::Result<Vec<_>>>()?;

    let mut dist = SplitDistribution::new(namespace);
    dist.count_splits_on_trees(&mut trees)?;
    let considered = dist.splits_considered();
    info!(
        secs = t1.elapsed().as_secs_f64(),
        unique = considered.unique,
        nontrivial = considered.nontrivial_unique,
        "counted splits"
    );

    let t2 = Instant::now();
    write_split_table_tsv(&args.output, &mut dist)?;
    info!(
        secs = t2.elapsed().as_secs_f64(),
        path = %args.output.display(),
        "wrote split table"
    );

    if let Some(path) = &args.consensus {
        let tree = majority_rule_consensus(&mut dist, args.min_freq, args.rooted)?;
        write_newick(path, &tree)?;
        info!(path = %path.display(), min_freq = args.min_freq, "wrote consensus tree");
    }
    Ok(())
}
