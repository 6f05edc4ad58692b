//! Treeload store adapters
//!
//! The ingestion core only needs a narrow contract from a graph store:
//!
//! - open a scoped **session** (released on drop, on every exit path)
//! - **execute** a batch inside that session
//! - **reset** to an empty baseline (no nodes, edges or constraints)
//! - **ensure** / **drop** a uniqueness constraint on `id` per kind
//! - **count** entities per kind and edges, for validation
//!
//! Two implementations live here:
//!
//! - [`MemoryGraph`]: an in-process property graph (interned strings,
//!   columnar properties, roaring-bitmap label index) that executes typed
//!   commands directly. It is the reference store for tests and for
//!   benchmarking the renderers without a server.
//! - [`cypher`]: the Cypher dialect used by network adapters, rendering typed
//!   commands to statement text at the adapter boundary.

pub mod cypher;
pub mod memory;

pub use memory::{GraphCensus, MemoryGraph, MemorySession, NodeView, PropertyValue};

use treeload_model::{Batch, EntityKind, KindCounts};

/// Any failure reported by, or while talking to, a store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("store error: {message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::new(format!("transport: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A scoped unit of store interaction. Variables bound by one batch stay
/// visible to later batches of the same session.
pub trait StoreSession {
    fn execute(&mut self, batch: &Batch<'_>) -> Result<()>;
}

/// The operations the ingestion core needs from a graph store.
pub trait GraphStore {
    type Session<'s>: StoreSession
    where
        Self: 's;

    /// Acquire a session. It is released when dropped.
    fn open_session(&mut self) -> Result<Self::Session<'_>>;

    /// Remove every entity, edge and constraint.
    fn reset_state(&mut self) -> Result<()>;

    /// Establish a uniqueness constraint on `id` for each kind.
    fn ensure_constraints(&mut self, kinds: &[EntityKind]) -> Result<()>;

    /// Drop the `id` constraints; dropping a missing constraint is not an error.
    fn drop_constraints(&mut self, kinds: &[EntityKind]) -> Result<()>;

    fn count_by_kind(&self) -> Result<KindCounts>;

    fn count_edges(&self) -> Result<usize>;
}
