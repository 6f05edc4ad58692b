//! Bulk columnar rendering.
//!
//! Entities are partitioned by kind into flat record sets of at most
//! `bound.target` rows. Every create pass is emitted before any link pass,
//! so links find their parents whenever the data is complete; a parent that
//! never loads is stubbed by the link pass instead.

use std::sync::Arc;

use treeload_model::{Batch, BulkPass, Command, Entity, EntityKind, EntityTree, RecordSet};

use super::entities;
use crate::assembler::BatchBound;
use crate::{IngestError, Result};

/// Per-kind record sets, directories first.
pub fn record_sets(tree: &EntityTree, rows_per_set: usize) -> Vec<Arc<RecordSet<'_>>> {
    let mut by_kind: [Vec<&Entity>; 2] = [Vec::new(), Vec::new()];
    for entity in entities(tree) {
        let slot = match entity.kind {
            EntityKind::Directory => 0,
            EntityKind::File => 1,
        };
        by_kind[slot].push(entity);
    }

    let mut sets = Vec::new();
    for (kind, rows) in EntityKind::ALL.into_iter().zip(by_kind) {
        let prefix = kind.label().to_lowercase();
        for (i, chunk) in rows.chunks(rows_per_set.max(1)).enumerate() {
            sets.push(Arc::new(RecordSet {
                kind,
                name: format!("{prefix}_{i:04}"),
                rows: chunk.to_vec(),
            }));
        }
    }
    sets
}

pub fn render(
    tree: &EntityTree,
    bound: BatchBound,
) -> Box<dyn Iterator<Item = Result<Batch<'_>>> + '_> {
    if bound.target == 0 {
        return Box::new(std::iter::once(Err(IngestError::BoundaryViolation {
            group_len: 1,
            ceiling: 0,
            anchor: tree.me.id,
        })));
    }
    let sets = record_sets(tree, bound.target);
    let creates: Vec<_> = sets
        .iter()
        .map(|records| (records.clone(), BulkPass::Create))
        .collect();
    let links = sets.into_iter().map(|records| (records, BulkPass::Link));
    Box::new(
        creates
            .into_iter()
            .chain(links)
            .map(|(records, pass)| Ok(Batch::new(vec![Command::BulkLoadRef { records, pass }]))),
    )
}
