//! Error type shared by the split encoder, distribution and consensus builder.

use phylotree::tree::TreeError;
use thiserror::Error;

/// Everything that can go wrong while encoding, counting or rebuilding splits.
#[derive(Debug, Error)]
pub enum SplitError {
    /// A bitmask value that cannot be interpreted as a split.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Traversal strategy name other than `preorder` / `postorder`.
    #[error("traversal strategy not supported: '{0}'")]
    UnknownTraversal(String),

    /// Root-to-tip distances disagree when computing node ages.
    #[error(
        "tree is not ultrametric: node {node} has age {found} through one child but {expected} through another (precision {precision})"
    )]
    NotUltrametric {
        node: usize,
        expected: f64,
        found: f64,
        precision: f64,
    },

    /// A tree was counted against a distribution built on another namespace.
    #[error("tree does not share the taxon namespace of the split distribution")]
    TaxonNamespaceMismatch,

    /// A leaf label that is not registered in the taxon namespace.
    #[error("taxon '{0}' is not part of the taxon namespace")]
    UnknownTaxon(String),

    /// Not enough (or degenerate) values to summarize.
    #[error("cannot summarize samples: {0}")]
    InsufficientData(String),

    /// Internal construction invariant broken, e.g. by a malformed split set.
    #[error("split invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Newick text rejected by the parser.
    #[error("invalid newick: {0}")]
    Newick(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SplitError>;
