//! Filesystem scanning into an [`EntityTree`].
//!
//! Unreadable entries are an expected part of real scans: they are logged,
//! counted in the [`ScanReport`] and skipped. An unreadable directory takes
//! its whole subtree with it, since its children would have no parent.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::entity::{new_entity, RawStat};
use crate::tree::{EntityTree, TreeBuilder};
use crate::{ModelError, Result};

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Directory names to skip (exact match), e.g. a database volume that
    /// lives inside the scanned tree.
    pub exclude_dir_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub entities: usize,
    pub skipped: Vec<SkippedEntry>,
}

/// Scan `root` using the real filesystem metadata.
pub fn scan(root: &Path, options: &ScanOptions) -> Result<(EntityTree, ScanReport)> {
    scan_with(root, options, RawStat::read)
}

/// Scan `root`, reading metadata through `stat`.
pub fn scan_with<F>(
    root: &Path,
    options: &ScanOptions,
    mut stat: F,
) -> Result<(EntityTree, ScanReport)>
where
    F: FnMut(&Path) -> io::Result<RawStat>,
{
    let root_entity = new_entity(root, None, stat(root))?;
    if !root_entity.is_dir() {
        return Err(ModelError::InvalidSource {
            path: root.to_path_buf(),
            reason: "scan root is not a directory".to_string(),
        });
    }

    let mut report = ScanReport::default();
    let mut builder = TreeBuilder::new();
    let mut dir_ids: HashMap<PathBuf, u64> = HashMap::new();
    dir_ids.insert(root.to_path_buf(), root_entity.id);
    builder.push(root_entity)?;
    report.entities += 1;

    let mut walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && options
                    .exclude_dir_names
                    .iter()
                    .any(|name| entry.file_name().to_string_lossy() == name.as_str()))
        });

    while let Some(next) = walker.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                report.skipped.push(SkippedEntry {
                    path,
                    reason: err.to_string(),
                });
                continue;
            }
        };
        let path = entry.path();
        let is_walk_dir = entry.file_type().is_dir();

        let Some(parent_id) = path.parent().and_then(|p| dir_ids.get(p)).copied() else {
            // Parent was skipped; walkdir should not have descended, but be strict.
            if is_walk_dir {
                walker.skip_current_dir();
            }
            continue;
        };

        let entity = match new_entity(path, Some(parent_id), stat(path)) {
            Ok(entity) => entity,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping entry");
                report.skipped.push(SkippedEntry {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                });
                if is_walk_dir {
                    walker.skip_current_dir();
                }
                continue;
            }
        };

        if builder.contains(entity.id) {
            warn!(path = %path.display(), id = entity.id, "skipping duplicate inode");
            report.skipped.push(SkippedEntry {
                path: path.to_path_buf(),
                reason: format!("duplicate inode {}", entity.id),
            });
            if is_walk_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        if entity.is_dir() {
            dir_ids.insert(path.to_path_buf(), entity.id);
        }
        builder.push(entity)?;
        report.entities += 1;
    }

    debug!(
        root = %root.display(),
        entities = report.entities,
        skipped = report.skipped.len(),
        "scan complete"
    );
    Ok((builder.freeze()?, report))
}
