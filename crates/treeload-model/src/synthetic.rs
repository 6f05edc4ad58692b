//! Deterministic synthetic fixtures.
//!
//! Produces a tree whose directory and file counts match a [`Case`] exactly,
//! so benchmark runs do not need a real filesystem snapshot.

use crate::case::Case;
use crate::entity::{Entity, EntityKind};
use crate::tree::{EntityTree, TreeBuilder};
use crate::{ModelError, Result};

/// First id handed out; keeps ids in the same range as real inode numbers.
pub const SYNTHETIC_ID_BASE: u64 = 9_700_000;

const EXTENSIONS: &[&str] = &["py", "rs", "md", "txt", "json", "c", "sh", "toml", ""];
const EPOCH: i64 = 1_560_000_000;

#[derive(Debug, Clone)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub fn new(seed: u64) -> Self {
        // Avoid the degenerate all-zero state.
        let state = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        // xorshift64* (simple, fast, deterministic).
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    pub fn gen_range_usize(&mut self, upper: usize) -> usize {
        if upper == 0 {
            return 0;
        }
        (self.next_u64() % (upper as u64)) as usize
    }
}

struct DirInfo {
    id: u64,
    path: String,
}

/// Build a tree with exactly `case.dir_count` directories and
/// `case.file_count` files. The same `(case, seed)` always yields the same tree.
pub fn synthesize(case: &Case, seed: u64) -> Result<EntityTree> {
    if case.dir_count == 0 {
        return Err(ModelError::MalformedTree {
            reason: format!("{} has no root directory", case.name),
        });
    }
    let mut rng = XorShift64::new(seed);
    let mut builder = TreeBuilder::new();
    let mut next_id = SYNTHETIC_ID_BASE;
    let mut dirs: Vec<DirInfo> = Vec::with_capacity(case.dir_count);

    let root_path = format!("/{}", case.name);
    builder.push(make(
        &mut rng,
        next_id,
        None,
        EntityKind::Directory,
        case.name.to_string(),
        String::new(),
        root_path.clone(),
    ))?;
    dirs.push(DirInfo {
        id: next_id,
        path: root_path,
    });
    next_id += 1;

    for i in 1..case.dir_count {
        // Mostly uniform attachment (logarithmic depth), with a nudge towards
        // recent directories so some branches run deeper.
        let window = dirs.len().min(8);
        let parent_idx = if rng.gen_range_usize(4) == 0 {
            dirs.len() - 1 - rng.gen_range_usize(window)
        } else {
            rng.gen_range_usize(dirs.len())
        };
        let name = format!("dir_{i}");
        let path = format!("{}/{}", dirs[parent_idx].path, name);
        let parent_id = dirs[parent_idx].id;
        builder.push(make(
            &mut rng,
            next_id,
            Some(parent_id),
            EntityKind::Directory,
            name,
            String::new(),
            path.clone(),
        ))?;
        dirs.push(DirInfo { id: next_id, path });
        next_id += 1;
    }

    for i in 0..case.file_count {
        let parent = &dirs[rng.gen_range_usize(dirs.len())];
        let extension = EXTENSIONS[rng.gen_range_usize(EXTENSIONS.len())].to_string();
        let name = if extension.is_empty() {
            format!("file_{i}")
        } else {
            format!("file_{i}.{extension}")
        };
        let path = format!("{}/{}", parent.path, name);
        let parent_id = parent.id;
        builder.push(make(
            &mut rng,
            next_id,
            Some(parent_id),
            EntityKind::File,
            name,
            extension,
            path,
        ))?;
        next_id += 1;
    }

    builder.freeze()
}

fn make(
    rng: &mut XorShift64,
    id: u64,
    parent_id: Option<u64>,
    kind: EntityKind,
    name: String,
    extension: String,
    path: String,
) -> Entity {
    let stem = match name.rsplit_once('.') {
        Some((stem, _)) if !extension.is_empty() => stem.to_string(),
        _ => name.clone(),
    };
    let created = EPOCH + rng.gen_range_usize(30_000_000) as i64;
    let modified = created + rng.gen_range_usize(1_000_000) as i64;
    let accessed = modified + rng.gen_range_usize(1_000_000) as i64;
    Entity {
        id,
        parent_id,
        kind,
        name,
        stem,
        extension,
        path,
        size: match kind {
            EntityKind::Directory => 64 * (1 + rng.gen_range_usize(16) as u64),
            EntityKind::File => rng.gen_range_usize(1 << 20) as u64,
        },
        owner: 501,
        group: 20,
        created,
        accessed,
        modified,
    }
}
