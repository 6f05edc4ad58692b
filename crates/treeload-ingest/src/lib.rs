//! Treeload ingestion engine
//!
//! Turns an [`EntityTree`](treeload_model::EntityTree) into a lazy sequence
//! of [`Batch`](treeload_model::Batch)es under one of four strategies, and
//! benchmarks those strategies against a [`GraphStore`](treeload_store::GraphStore).
//!
//! | label | strategy | shape |
//! |---|---|---|
//! | `i1` | gulp | one batch: every create, then every edge |
//! | `i2` | bounded | size-bounded batches split between directory groups |
//! | `i4` | merge | idempotent upserts with stub parents |
//! | `i6` | bulk | per-kind record sets loaded and linked in bulk |
//!
//! Boundary safety lives in [`assembler`]; everything that talks to a store
//! lives in [`harness`].

pub mod assembler;
pub mod config;
pub mod harness;
pub mod render;
pub mod report;
pub mod strategy;

pub use assembler::{BatchAssembler, BatchBound};
pub use config::{BenchConfig, ConfigError, FixtureSource, RunPlan};
pub use harness::{CaseReport, Harness, IterationOutcome, Phase, Validation};
pub use strategy::Strategy;

use treeload_model::ModelError;
use treeload_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// An atomic group cannot be placed in any batch under the configured
    /// bound. Signals a misconfiguration, not a data problem.
    #[error(
        "boundary violation: group of {group_len} lines at entity {anchor} \
         does not fit a batch bound of {ceiling} lines"
    )]
    BoundaryViolation {
        group_len: usize,
        ceiling: usize,
        anchor: u64,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
