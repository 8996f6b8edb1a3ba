//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `bitset`: arbitrary-width bitsets used as split masks.
//! - `splits`: split predicates and formatting (triviality, compatibility, normalization).
//! - `taxon`: taxon namespace with stable bit assignment.
//! - `tree`: arena tree whose edges carry split bitmasks.
//! - `encode`: split encoding and out-degree-one collapse.
//! - `stats`: summary statistics of sampled edge lengths and node ages.
//! - `distribution`: split frequencies across a sample of trees.
//! - `consensus`: trees rebuilt from split sets, majority-rule consensus.
//! - `io`: reading BEAST/NEXUS tree files, writing split tables and Newick.
//! - `error`: the crate error type.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod consensus;
pub mod distribution;
pub mod encode;
pub mod error;
pub mod io;
pub mod splits;
pub mod stats;
pub mod taxon;
pub mod tree;

#[cfg(feature = "python")]
pub mod api;

pub use bitset::Bitset;
pub use consensus::{majority_rule_consensus, tree_from_splits};
pub use distribution::{DistributionConfig, SplitDistribution, SupportOptions, TraversalStrategy};
pub use encode::{EncodeOptions, encode_splits};
pub use error::{Result, SplitError};
pub use io::{read_beast_trees, write_newick, write_split_table_tsv};
pub use taxon::{TaxonId, TaxonNamespace};
pub use tree::Tree;
