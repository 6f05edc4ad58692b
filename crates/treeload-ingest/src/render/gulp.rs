//! Single-shot rendering: the whole tree as one batch.

use std::iter;

use treeload_model::{Batch, Command, EntityTree};

use super::{entities, parent_edge};
use crate::Result;

/// Every create in pre-order, then every edge. One commit; the store must
/// hold the whole tree in a single unit of work.
pub fn render(tree: &EntityTree) -> impl Iterator<Item = Result<Batch<'_>>> {
    let mut commands = Vec::with_capacity(tree.len() * 2);
    commands.extend(entities(tree).map(Command::CreateEntity));
    for entity in entities(tree) {
        if let Some((parent, child)) = parent_edge(entity) {
            commands.push(Command::CreateEdge { parent, child });
        }
    }
    iter::once(Ok(Batch::new(commands)))
}
