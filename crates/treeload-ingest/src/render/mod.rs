//! Strategy renderers.
//!
//! Every renderer walks the tree read-only and yields batches lazily.
//! Directories come before anything beneath them, and at each level a
//! directory's files come before its child directories.

pub mod bounded;
pub mod bulk;
pub mod gulp;
pub mod merge;

use std::iter;

use treeload_model::{Entity, EntityKey, EntityTree};

/// Entities in render order: each directory, then its files, then its
/// child directories.
pub(crate) fn entities(tree: &EntityTree) -> impl Iterator<Item = &Entity> {
    tree.subtrees().flat_map(|dir| iter::once(&dir.me).chain(dir.files.iter()))
}

/// `(parent, child)` keys for an entity's incoming `PARENT_OF` edge.
pub(crate) fn parent_edge(entity: &Entity) -> Option<(EntityKey, EntityKey)> {
    entity
        .parent_id
        .map(|parent_id| (EntityKey::directory(parent_id), entity.key()))
}
