//! Typed store command fragments.
//!
//! Renderers produce these; store adapters turn them into their own concrete
//! syntax (or execute them directly). Commands borrow entities from the tree
//! they were rendered from.

use std::collections::HashSet;
use std::sync::Arc;

use crate::entity::{Entity, EntityKey, EntityKind};

/// The only relationship type: parent directory -> child.
pub const PARENT_OF: &str = "PARENT_OF";

/// Which half of a bulk load a command performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkPass {
    /// Create every record of the set.
    Create,
    /// Link every record with a `parent_id` to its parent, stubbing the
    /// parent if it has not been loaded.
    Link,
}

/// A homogeneous, flat set of records for a bulk loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet<'a> {
    pub kind: EntityKind,
    /// Stable name for the external record source, e.g. `directory_0003`.
    pub name: String,
    pub rows: Vec<&'a Entity>,
}

impl RecordSet<'_> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// Create a node with all properties, binding its variable.
    CreateEntity(&'a Entity),
    /// Match by `(kind, id)` or create, then overwrite every property.
    UpsertEntity(&'a Entity),
    /// Match by id or create a key-only placeholder, binding its variable.
    MergeParentStub(EntityKey),
    /// Create a `PARENT_OF` edge between two bound variables.
    CreateEdge { parent: EntityKey, child: EntityKey },
    /// Create a `PARENT_OF` edge between two bound variables unless it exists.
    MergeEdge { parent: EntityKey, child: EntityKey },
    /// One pass of a bulk load over an external record set.
    BulkLoadRef {
        records: Arc<RecordSet<'a>>,
        pass: BulkPass,
    },
}

impl Command<'_> {
    /// Entity id whose variable this command binds, if any.
    pub fn declares(&self) -> Option<u64> {
        match self {
            Command::CreateEntity(e) | Command::UpsertEntity(e) => Some(e.id),
            Command::MergeParentStub(key) => Some(key.id),
            _ => None,
        }
    }

    /// Entity ids whose variables this command needs to be bound already.
    pub fn references(&self) -> Vec<u64> {
        match self {
            Command::CreateEdge { parent, child } | Command::MergeEdge { parent, child } => {
                vec![parent.id, child.id]
            }
            _ => Vec::new(),
        }
    }

    /// Number of entity records this command touches.
    pub fn record_count(&self) -> usize {
        match self {
            Command::BulkLoadRef { records, .. } => records.len(),
            Command::CreateEdge { .. } | Command::MergeEdge { .. } => 0,
            _ => 1,
        }
    }
}

/// Whether a batch can be submitted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Every variable the batch references is declared inside it.
    Standalone,
    /// Valid only after the earlier batches of the same session.
    SessionScoped,
}

/// An ordered group of commands, consumed once by a store session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<'a> {
    pub commands: Vec<Command<'a>>,
    pub submission: Submission,
}

impl<'a> Batch<'a> {
    pub fn new(commands: Vec<Command<'a>>) -> Self {
        let submission = submission_of(&commands);
        Self {
            commands,
            submission,
        }
    }

    /// Command count; the unit batch bounds are expressed in.
    pub fn lines(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn is_standalone(&self) -> bool {
        self.submission == Submission::Standalone
    }
}

fn submission_of(commands: &[Command<'_>]) -> Submission {
    let mut declared: HashSet<u64> = HashSet::new();
    let mut standalone = true;
    for command in commands {
        if command.references().iter().any(|id| !declared.contains(id)) {
            standalone = false;
        }
        if let Some(id) = command.declares() {
            declared.insert(id);
        }
    }
    if standalone {
        Submission::Standalone
    } else {
        Submission::SessionScoped
    }
}
