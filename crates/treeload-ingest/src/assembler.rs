//! Boundary-safe batch assembly.
//!
//! Renderers hand the assembler a lazy sequence of atomic groups; it packs
//! whole groups into batches. A batch is closed as soon as it reaches the
//! target size, so it overshoots the target by less than one group. With a
//! ceiling set, a batch is also closed early when the next group would push
//! it past the ceiling.

use tracing::debug;
use treeload_model::{Batch, Command};

use crate::{IngestError, Result};

/// Batch size limits, in commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchBound {
    /// Soft bound: a batch is closed once it holds at least this many lines.
    pub target: usize,
    /// Hard cap on a single batch, if any.
    pub ceiling: Option<usize>,
}

impl BatchBound {
    pub fn soft(target: usize) -> Self {
        Self {
            target,
            ceiling: None,
        }
    }

    pub fn with_ceiling(self, ceiling: usize) -> Self {
        Self {
            ceiling: Some(ceiling),
            ..self
        }
    }
}

/// Packs atomic command groups into batches. Yields at most one error, then
/// stops.
pub struct BatchAssembler<'a, I> {
    groups: I,
    bound: BatchBound,
    pending: Vec<Command<'a>>,
    emitted: usize,
    done: bool,
}

impl<'a, I> BatchAssembler<'a, I>
where
    I: Iterator<Item = Vec<Command<'a>>>,
{
    pub fn new(groups: I, bound: BatchBound) -> Self {
        Self {
            groups,
            bound,
            pending: Vec::new(),
            emitted: 0,
            done: false,
        }
    }

    fn emit(&mut self) -> Batch<'a> {
        self.emitted += 1;
        let batch = Batch::new(std::mem::take(&mut self.pending));
        debug!(
            batch = self.emitted,
            lines = batch.lines(),
            standalone = batch.is_standalone(),
            "assembled batch"
        );
        batch
    }

    fn violation(&mut self, group: &[Command<'a>], ceiling: usize) -> IngestError {
        self.done = true;
        IngestError::BoundaryViolation {
            group_len: group.len(),
            ceiling,
            anchor: group.iter().find_map(Command::declares).unwrap_or_default(),
        }
    }
}

impl<'a, I> Iterator for BatchAssembler<'a, I>
where
    I: Iterator<Item = Vec<Command<'a>>>,
{
    type Item = Result<Batch<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if !self.pending.is_empty() && self.pending.len() >= self.bound.target {
                return Some(Ok(self.emit()));
            }

            let Some(group) = self.groups.next() else {
                self.done = true;
                if self.pending.is_empty() {
                    return None;
                }
                return Some(Ok(self.emit()));
            };

            if self.bound.target == 0 {
                return Some(Err(self.violation(&group, 0)));
            }
            if group.is_empty() {
                continue;
            }

            if let Some(ceiling) = self.bound.ceiling {
                if group.len() > ceiling {
                    return Some(Err(self.violation(&group, ceiling)));
                }
                if self.pending.len() + group.len() > ceiling {
                    let batch = self.emit();
                    self.pending = group;
                    return Some(Ok(batch));
                }
            }

            self.pending.extend(group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treeload_model::{Entity, EntityKey, EntityKind};

    fn entities(n: u64) -> Vec<Entity> {
        (1..=n)
            .map(|id| Entity {
                id,
                parent_id: if id == 1 { None } else { Some(1) },
                kind: EntityKind::File,
                name: String::new(),
                stem: String::new(),
                extension: String::new(),
                path: String::new(),
                size: 0,
                owner: 0,
                group: 0,
                created: 0,
                accessed: 0,
                modified: 0,
            })
            .collect()
    }

    /// One group per entity, `size` commands long.
    fn groups(entities: &[Entity], size: usize) -> Vec<Vec<Command<'_>>> {
        entities
            .iter()
            .map(|e| {
                let mut group = vec![Command::CreateEntity(e)];
                while group.len() < size {
                    group.push(Command::MergeParentStub(EntityKey::directory(1)));
                }
                group
            })
            .collect()
    }

    #[test]
    fn test_batches_close_at_target() {
        let es = entities(10);
        let batches: Vec<_> = BatchAssembler::new(groups(&es, 3).into_iter(), BatchBound::soft(5))
            .collect::<Result<_>>()
            .unwrap();
        // 3 + 3 = 6 >= 5, five times.
        assert_eq!(batches.len(), 5);
        assert!(batches.iter().all(|b| b.lines() == 6));
    }

    #[test]
    fn test_no_empty_trailing_batch() {
        let es = entities(4);
        let batches: Vec<_> = BatchAssembler::new(groups(&es, 2).into_iter(), BatchBound::soft(4))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| !b.is_empty()));
    }

    #[test]
    fn test_ceiling_closes_batch_early() {
        let es = entities(3);
        let bound = BatchBound::soft(100).with_ceiling(5);
        let batches: Vec<_> = BatchAssembler::new(groups(&es, 3).into_iter(), bound)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(batches.iter().map(Batch::lines).collect::<Vec<_>>(), vec![3, 3, 3]);
    }

    #[test]
    fn test_group_over_ceiling_is_boundary_violation() {
        let es = entities(3);
        let bound = BatchBound::soft(2).with_ceiling(3);
        let mut sizes = vec![2, 4, 1].into_iter();
        let shaped: Vec<Vec<Command<'_>>> = groups(&es, 1)
            .into_iter()
            .map(|mut g| {
                let size = sizes.next().unwrap_or(1);
                while g.len() < size {
                    g.push(Command::MergeParentStub(EntityKey::directory(1)));
                }
                g
            })
            .collect();
        let mut assembler = BatchAssembler::new(shaped.into_iter(), bound);
        assert_eq!(assembler.next().unwrap().unwrap().lines(), 2);
        match assembler.next() {
            Some(Err(IngestError::BoundaryViolation {
                group_len,
                ceiling,
                anchor,
            })) => {
                assert_eq!((group_len, ceiling, anchor), (4, 3, 2));
            }
            other => panic!("expected boundary violation, got {other:?}"),
        }
        assert!(assembler.next().is_none());
    }

    #[test]
    fn test_zero_target_is_boundary_violation() {
        let es = entities(1);
        let mut assembler = BatchAssembler::new(groups(&es, 1).into_iter(), BatchBound::soft(0));
        assert!(matches!(
            assembler.next(),
            Some(Err(IngestError::BoundaryViolation { ceiling: 0, .. }))
        ));
        assert!(assembler.next().is_none());
    }
}
