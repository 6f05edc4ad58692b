//! JSON snapshots of scanned trees.
//!
//! Snapshots store the flat entity list rather than the nested tree, so
//! loading goes through the same arena as a scan and deep trees never hit
//! a parser recursion limit.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use crate::entity::Entity;
use crate::tree::{EntityTree, TreeBuilder};
use crate::{ModelError, Result};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    entities: Vec<&'a Entity>,
}

#[derive(Deserialize)]
struct SnapshotIn {
    version: u32,
    entities: Vec<Entity>,
}

pub fn save_snapshot(tree: &EntityTree, path: &Path) -> Result<()> {
    let snapshot_err = |source: io::Error| ModelError::Snapshot {
        path: path.to_path_buf(),
        source,
    };
    let file = fs::File::create(path).map_err(snapshot_err)?;
    let mut writer = BufWriter::new(file);
    let snapshot = SnapshotOut {
        version: SNAPSHOT_VERSION,
        entities: tree.iter().collect(),
    };
    serde_json::to_writer(&mut writer, &snapshot).map_err(|e| snapshot_err(io::Error::from(e)))?;
    writer.flush().map_err(snapshot_err)
}

pub fn load_snapshot(path: &Path) -> Result<EntityTree> {
    let snapshot_err = |source: io::Error| ModelError::Snapshot {
        path: path.to_path_buf(),
        source,
    };
    let file = fs::File::open(path).map_err(snapshot_err)?;
    let snapshot: SnapshotIn = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| snapshot_err(io::Error::from(e)))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(snapshot_err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported snapshot version {}", snapshot.version),
        )));
    }

    let mut builder = TreeBuilder::new();
    for entity in snapshot.entities {
        builder.push(entity)?;
    }
    builder.freeze()
}
