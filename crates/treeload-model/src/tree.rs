//! Immutable entity trees and the arena they are frozen from.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::entity::{Entity, EntityKind};
use crate::{ModelError, Result};

/// Per-kind entity counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub directories: usize,
    pub files: usize,
}

impl KindCounts {
    pub fn total(&self) -> usize {
        self.directories + self.files
    }

    pub fn get(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Directory => self.directories,
            EntityKind::File => self.files,
        }
    }

    pub fn add(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Directory => self.directories += 1,
            EntityKind::File => self.files += 1,
        }
    }
}

/// One directory with its files and child directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTree {
    pub me: Entity,
    pub files: Vec<Entity>,
    pub dirs: Vec<EntityTree>,
}

impl EntityTree {
    pub fn leaf(me: Entity) -> Self {
        Self {
            me,
            files: Vec::new(),
            dirs: Vec::new(),
        }
    }

    /// Every entity exactly once: this directory, each child subtree in
    /// order, then this directory's files.
    pub fn iter(&self) -> Entities<'_> {
        Entities {
            stack: vec![Frame::Tree(self)],
        }
    }

    /// Every directory node in pre-order, parents before children.
    pub fn subtrees(&self) -> Subtrees<'_> {
        Subtrees { stack: vec![self] }
    }

    pub fn count(&self) -> KindCounts {
        let mut counts = KindCounts::default();
        for tree in self.subtrees() {
            counts.directories += 1;
            counts.files += tree.files.len();
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.count().total()
    }

    /// Never true: a tree always has its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Maximum nesting depth; a lone root has depth 1.
    pub fn depth(&self) -> usize {
        1 + self.dirs.iter().map(EntityTree::depth).max().unwrap_or(0)
    }
}

enum Frame<'a> {
    Tree(&'a EntityTree),
    Files(std::slice::Iter<'a, Entity>),
}

/// Lazy pre-order entity traversal, see [`EntityTree::iter`].
pub struct Entities<'a> {
    stack: Vec<Frame<'a>>,
}

impl<'a> Iterator for Entities<'a> {
    type Item = &'a Entity;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.stack.pop()? {
                Frame::Tree(tree) => {
                    self.stack.push(Frame::Files(tree.files.iter()));
                    self.stack.extend(tree.dirs.iter().rev().map(Frame::Tree));
                    return Some(&tree.me);
                }
                Frame::Files(mut files) => {
                    if let Some(file) = files.next() {
                        self.stack.push(Frame::Files(files));
                        return Some(file);
                    }
                }
            }
        }
    }
}

/// Lazy pre-order directory traversal, see [`EntityTree::subtrees`].
pub struct Subtrees<'a> {
    stack: Vec<&'a EntityTree>,
}

impl<'a> Iterator for Subtrees<'a> {
    type Item = &'a EntityTree;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.stack.pop()?;
        self.stack.extend(tree.dirs.iter().rev());
        Some(tree)
    }
}

/// Indented listing, one entity per line.
pub fn display_tree(tree: &EntityTree) -> String {
    fn walk(tree: &EntityTree, indent: usize, out: &mut String) {
        let _ = writeln!(out, "{:indent$}{}", "", tree.me.path, indent = indent);
        for dir in &tree.dirs {
            walk(dir, indent + 2, out);
        }
        for file in &tree.files {
            let _ = writeln!(out, "{:indent$}{}", "", file.path, indent = indent + 2);
        }
    }
    let mut out = String::new();
    walk(tree, 0, &mut out);
    out
}

// ============================================================================
// Arena construction
// ============================================================================

struct Slot {
    entity: Entity,
    files: Vec<usize>,
    dirs: Vec<usize>,
}

/// Index-addressed scratch space for building a tree in any order.
///
/// Entities are pushed with their `parent_id`; [`TreeBuilder::freeze`]
/// assembles the immutable [`EntityTree`] bottom-up once everything is in.
#[derive(Default)]
pub struct TreeBuilder {
    slots: Vec<Slot>,
    by_id: HashMap<u64, usize>,
    root: Option<usize>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn push(&mut self, entity: Entity) -> Result<()> {
        if self.by_id.contains_key(&entity.id) {
            return Err(ModelError::MalformedTree {
                reason: format!("duplicate entity id {}", entity.id),
            });
        }
        if entity.parent_id.is_none() {
            if let Some(existing) = self.root {
                return Err(ModelError::MalformedTree {
                    reason: format!(
                        "second root {} (root is already {})",
                        entity.id, self.slots[existing].entity.id
                    ),
                });
            }
            if !entity.is_dir() {
                return Err(ModelError::MalformedTree {
                    reason: format!("root {} is not a directory", entity.id),
                });
            }
            self.root = Some(self.slots.len());
        }
        self.by_id.insert(entity.id, self.slots.len());
        self.slots.push(Slot {
            entity,
            files: Vec::new(),
            dirs: Vec::new(),
        });
        Ok(())
    }

    /// Link children to parents and build the immutable tree.
    pub fn freeze(mut self) -> Result<EntityTree> {
        let root = self.root.ok_or_else(|| ModelError::MalformedTree {
            reason: "no root entity".to_string(),
        })?;

        for idx in 0..self.slots.len() {
            let Some(parent_id) = self.slots[idx].entity.parent_id else {
                continue;
            };
            let parent = *self
                .by_id
                .get(&parent_id)
                .ok_or_else(|| ModelError::MalformedTree {
                    reason: format!(
                        "entity {} names missing parent {parent_id}",
                        self.slots[idx].entity.id
                    ),
                })?;
            if !self.slots[parent].entity.is_dir() {
                return Err(ModelError::MalformedTree {
                    reason: format!("parent {parent_id} is not a directory"),
                });
            }
            if self.slots[idx].entity.is_dir() {
                self.slots[parent].dirs.push(idx);
            } else {
                self.slots[parent].files.push(idx);
            }
        }

        // Post-order over the arena: children are assembled before the
        // directory that holds them.
        let mut taken: Vec<Option<Slot>> = self.slots.into_iter().map(Some).collect();
        let mut built: HashMap<usize, EntityTree> = HashMap::new();
        let mut stack = vec![(root, false)];
        while let Some((idx, expanded)) = stack.pop() {
            if !expanded {
                stack.push((idx, true));
                if let Some(slot) = taken[idx].as_ref() {
                    stack.extend(slot.dirs.iter().map(|&d| (d, false)));
                }
                continue;
            }
            let Some(slot) = taken[idx].take() else {
                continue;
            };
            let files = slot
                .files
                .iter()
                .filter_map(|&f| taken[f].take())
                .map(|file| file.entity)
                .collect();
            let dirs = slot.dirs.iter().filter_map(|d| built.remove(d)).collect();
            built.insert(
                idx,
                EntityTree {
                    me: slot.entity,
                    files,
                    dirs,
                },
            );
        }

        if let Some(orphan) = taken.iter().flatten().next() {
            return Err(ModelError::MalformedTree {
                reason: format!("entity {} is not reachable from the root", orphan.entity.id),
            });
        }
        built.remove(&root).ok_or_else(|| ModelError::MalformedTree {
            reason: "root was not assembled".to_string(),
        })
    }
}
