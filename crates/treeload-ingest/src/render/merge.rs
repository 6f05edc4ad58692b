//! Idempotent merge rendering.
//!
//! Each entity is its own group: an upsert by `(kind, id)`, a stub merge of
//! its parent directory, and a merged edge. Groups declare everything they
//! reference, so every batch is standalone, delivery order does not matter,
//! and re-running the output against a populated store changes nothing.

use treeload_model::{Batch, Command, Entity, EntityTree};

use super::{entities, parent_edge};
use crate::assembler::{BatchAssembler, BatchBound};
use crate::Result;

pub fn group(entity: &Entity) -> Vec<Command<'_>> {
    let mut group = vec![Command::UpsertEntity(entity)];
    if let Some((parent, child)) = parent_edge(entity) {
        group.push(Command::MergeParentStub(parent));
        group.push(Command::MergeEdge { parent, child });
    }
    group
}

/// Render a tree in pre-order.
pub fn render(tree: &EntityTree, bound: BatchBound) -> impl Iterator<Item = Result<Batch<'_>>> {
    BatchAssembler::new(entities(tree).map(group), bound)
}

/// Render an arbitrary delivery sequence. Entities may arrive in any order,
/// more than once, and with a parent after its children.
pub fn render_deliveries<'a, I>(
    deliveries: I,
    bound: BatchBound,
) -> impl Iterator<Item = Result<Batch<'a>>>
where
    I: IntoIterator<Item = &'a Entity>,
{
    BatchAssembler::new(deliveries.into_iter().map(group), bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use treeload_model::{find_case, synthesize};

    #[test]
    fn test_every_batch_is_standalone() {
        let tree = synthesize(find_case("100").unwrap(), 4).unwrap();
        let batches: Vec<_> = render(&tree, BatchBound::soft(10))
            .collect::<Result<_>>()
            .unwrap();
        assert!(batches.iter().all(Batch::is_standalone));
        // Root: one upsert. Everyone else: upsert, stub, edge.
        assert_eq!(batches.iter().map(Batch::lines).sum::<usize>(), 1 + 96 * 3);
    }

    #[test]
    fn test_upserts_follow_directory_files_order() {
        let tree = synthesize(find_case("100").unwrap(), 4).unwrap();
        let upserted: Vec<u64> = render(&tree, BatchBound::soft(10))
            .flat_map(|b| b.unwrap().commands)
            .filter_map(|c| match c {
                Command::UpsertEntity(entity) => Some(entity.id),
                _ => None,
            })
            .collect();
        let expected: Vec<u64> = tree
            .subtrees()
            .flat_map(|dir| std::iter::once(&dir.me).chain(dir.files.iter()))
            .map(|e| e.id)
            .collect();
        assert_eq!(upserted, expected);
    }

    #[test]
    fn test_root_group_has_no_edge() {
        let tree = synthesize(find_case("100").unwrap(), 4).unwrap();
        assert_eq!(group(&tree.me), vec![Command::UpsertEntity(&tree.me)]);
    }
}
