//! Treeload entity model
//!
//! Everything the ingestion strategies need to know about the data they load:
//!
//! - **Entities**: one filesystem object (directory or file) with a stable
//!   inode-derived `id` and a pure variable handle `n{id}`
//! - **Trees**: an immutable `EntityTree`, frozen from an index-addressed
//!   arena (`TreeBuilder`) after a scan, a synthetic generation or a snapshot load
//! - **Cases**: the static registry of dataset size classes
//! - **Commands**: typed, dialect-agnostic store command fragments grouped
//!   into `Batch`es
//!
//! Nothing in this crate talks to a store.

pub mod case;
pub mod command;
pub mod entity;
pub mod scan;
pub mod snapshot;
pub mod synthetic;
pub mod tree;

use std::path::PathBuf;

pub use case::{find_case, Case, CASES};
pub use command::{Batch, BulkPass, Command, RecordSet, Submission, PARENT_OF};
pub use entity::{new_entity, var_ref, Entity, EntityKey, EntityKind, RawStat};
pub use scan::{scan, scan_with, ScanOptions, ScanReport, SkippedEntry};
pub use snapshot::{load_snapshot, save_snapshot};
pub use synthetic::synthesize;
pub use tree::{display_tree, EntityTree, KindCounts, TreeBuilder};

/// Errors raised while building or loading entity trees.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A source entry could not be turned into an entity. Scans skip the
    /// entry and keep going.
    #[error("invalid source {path}: {reason}")]
    InvalidSource { path: PathBuf, reason: String },

    #[error("snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown case `{name}` (valid cases: {valid})")]
    UnknownCase { name: String, valid: String },

    #[error("malformed tree: {reason}")]
    MalformedTree { reason: String },
}

pub type Result<T> = std::result::Result<T, ModelError>;
