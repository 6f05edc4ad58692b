//! Size-bounded batching.
//!
//! One atomic group per directory: the directory's create and incoming edge,
//! then each of its files with its edge. Variables stay bound for the whole
//! session, so a group's edge to its parent directory may reference a
//! variable declared in an earlier batch. Batches after the first are
//! therefore session-scoped.

use treeload_model::{Batch, Command, Entity, EntityTree};

use super::parent_edge;
use crate::assembler::{BatchAssembler, BatchBound};
use crate::Result;

fn push_with_edge<'a>(group: &mut Vec<Command<'a>>, entity: &'a Entity) {
    group.push(Command::CreateEntity(entity));
    if let Some((parent, child)) = parent_edge(entity) {
        group.push(Command::CreateEdge { parent, child });
    }
}

/// The atomic groups, in pre-order.
pub fn groups(tree: &EntityTree) -> impl Iterator<Item = Vec<Command<'_>>> {
    tree.subtrees().map(|dir| {
        let mut group = Vec::with_capacity(2 + dir.files.len() * 2);
        push_with_edge(&mut group, &dir.me);
        for file in &dir.files {
            push_with_edge(&mut group, file);
        }
        group
    })
}

pub fn render(tree: &EntityTree, bound: BatchBound) -> impl Iterator<Item = Result<Batch<'_>>> {
    BatchAssembler::new(groups(tree), bound)
}
