//! Filesystem-derived entities and their command fragments.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::path::Path;

use crate::{ModelError, Result};

/// Kind of filesystem object. Doubles as the graph label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Directory,
    File,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Directory, EntityKind::File];

    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Directory => "Directory",
            EntityKind::File => "File",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Directory" => Some(EntityKind::Directory),
            "File" => Some(EntityKind::File),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Variable handle for an entity id. The same id always yields the same
/// handle, whichever batch or session it is rendered in.
pub fn var_ref(id: u64) -> String {
    format!("n{id}")
}

/// The minimal identity of an entity: enough to match it or stub it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub id: u64,
    pub kind: EntityKind,
}

impl EntityKey {
    pub fn new(id: u64, kind: EntityKind) -> Self {
        Self { id, kind }
    }

    /// Parents are always directories.
    pub fn directory(id: u64) -> Self {
        Self::new(id, EntityKind::Directory)
    }

    pub fn var(&self) -> String {
        var_ref(self.id)
    }

    /// `(n12:Directory {id: 12})`
    pub fn render(&self) -> String {
        format!("({}:{} {{id: {}}})", self.var(), self.kind.label(), self.id)
    }
}

/// One filesystem object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub kind: EntityKind,
    pub name: String,
    pub stem: String,
    pub extension: String,
    pub path: String,
    pub size: u64,
    pub owner: u32,
    pub group: u32,
    pub created: i64,
    pub accessed: i64,
    pub modified: i64,
}

/// A property value as it appears in a command fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropValue<'a> {
    Int(i64),
    Str(&'a str),
}

impl fmt::Display for PropValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Int(v) => write!(f, "{v}"),
            PropValue::Str(s) => {
                f.write_char('\'')?;
                for c in s.chars() {
                    match c {
                        '\\' => f.write_str("\\\\")?,
                        '\'' => f.write_str("\\'")?,
                        c => f.write_char(c)?,
                    }
                }
                f.write_char('\'')
            }
        }
    }
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.id, self.kind)
    }

    pub fn var(&self) -> String {
        var_ref(self.id)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntityKind::Directory
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Properties in rendering order. `parent_id` is left out for the root.
    pub fn properties(&self) -> Vec<(&'static str, PropValue<'_>)> {
        let mut props = Vec::with_capacity(12);
        props.push(("id", PropValue::Int(self.id as i64)));
        if let Some(parent_id) = self.parent_id {
            props.push(("parent_id", PropValue::Int(parent_id as i64)));
        }
        props.push(("name", PropValue::Str(&self.name)));
        props.push(("stem", PropValue::Str(&self.stem)));
        props.push(("extension", PropValue::Str(&self.extension)));
        props.push(("path", PropValue::Str(&self.path)));
        props.push(("size", PropValue::Int(self.size as i64)));
        props.push(("owner", PropValue::Int(i64::from(self.owner))));
        props.push(("group", PropValue::Int(i64::from(self.group))));
        props.push(("created", PropValue::Int(self.created)));
        props.push(("accessed", PropValue::Int(self.accessed)));
        props.push(("modified", PropValue::Int(self.modified)));
        props
    }

    /// A completely specified node: `(n7:File {id: 7, parent_id: 3, name: 'a.txt', ...})`
    pub fn render_full(&self) -> String {
        let args = self
            .properties()
            .into_iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("({}:{} {{{}}})", self.var(), self.kind.label(), args)
    }

    /// A minimally specified node for matching: `(n7:File {id: 7})`
    pub fn render_key(&self) -> String {
        self.key().render()
    }

    /// Property assignments as used by `SET`: `n7.id = 7, n7.name = 'a.txt', ...`
    pub fn render_assignments(&self) -> String {
        let var = self.var();
        self.properties()
            .into_iter()
            .map(|(k, v)| format!("{var}.{k} = {v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_full())
    }
}

/// OS metadata for one filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawStat {
    pub inode: u64,
    pub is_dir: bool,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub ctime: i64,
    pub atime: i64,
    pub mtime: i64,
}

impl RawStat {
    /// Read metadata without following symlinks, so a link never aliases
    /// the inode of its target.
    #[cfg(unix)]
    pub fn read(path: &Path) -> std::io::Result<Self> {
        use std::os::unix::fs::MetadataExt;

        let meta = std::fs::symlink_metadata(path)?;
        Ok(Self {
            inode: meta.ino(),
            is_dir: meta.is_dir(),
            size: meta.size(),
            uid: meta.uid(),
            gid: meta.gid(),
            ctime: meta.ctime(),
            atime: meta.atime(),
            mtime: meta.mtime(),
        })
    }

    #[cfg(not(unix))]
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let _ = std::fs::symlink_metadata(path)?;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "inode identity is only available on unix",
        ))
    }
}

/// Build an entity from a path and the outcome of reading its metadata.
///
/// Fails with [`ModelError::InvalidSource`] when the metadata could not be
/// read; callers are expected to skip the entry and carry on.
pub fn new_entity(
    path: &Path,
    parent_id: Option<u64>,
    stat: std::io::Result<RawStat>,
) -> Result<Entity> {
    let stat = stat.map_err(|e| ModelError::InvalidSource {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let full = path.to_string_lossy().to_string();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| full.clone());
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.clone());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(Entity {
        id: stat.inode,
        parent_id,
        kind: if stat.is_dir {
            EntityKind::Directory
        } else {
            EntityKind::File
        },
        name,
        stem,
        extension,
        path: full,
        size: stat.size,
        owner: stat.uid,
        group: stat.gid,
        created: stat.ctime,
        accessed: stat.atime,
        modified: stat.mtime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> Entity {
        Entity {
            id: 7,
            parent_id: Some(3),
            kind: EntityKind::File,
            name: "a.txt".to_string(),
            stem: "a".to_string(),
            extension: "txt".to_string(),
            path: "/data/a.txt".to_string(),
            size: 120,
            owner: 501,
            group: 20,
            created: 1_600_000_000,
            accessed: 1_600_000_100,
            modified: 1_600_000_200,
        }
    }

    #[test]
    fn test_render_full_is_exact_and_ordered() {
        assert_eq!(
            file().render_full(),
            "(n7:File {id: 7, parent_id: 3, name: 'a.txt', stem: 'a', extension: 'txt', \
             path: '/data/a.txt', size: 120, owner: 501, group: 20, created: 1600000000, \
             accessed: 1600000100, modified: 1600000200})"
        );
    }

    #[test]
    fn test_render_key() {
        assert_eq!(file().render_key(), "(n7:File {id: 7})");
        assert_eq!(EntityKey::directory(3).render(), "(n3:Directory {id: 3})");
    }

    #[test]
    fn test_root_omits_parent_id() {
        let mut root = file();
        root.parent_id = None;
        root.kind = EntityKind::Directory;
        let text = root.render_full();
        assert!(text.starts_with("(n7:Directory {id: 7, name: 'a.txt',"));
        assert!(!text.contains("parent_id"));
    }

    #[test]
    fn test_assignments() {
        let text = file().render_assignments();
        assert!(text.starts_with("n7.id = 7, n7.parent_id = 3, n7.name = 'a.txt'"));
        assert!(text.ends_with("n7.modified = 1600000200"));
    }

    #[test]
    fn test_quotes_are_escaped() {
        let mut e = file();
        e.name = r"it's\here".to_string();
        assert!(e.render_full().contains(r"name: 'it\'s\\here'"));
    }

    #[test]
    fn test_var_is_pure_function_of_id() {
        assert_eq!(var_ref(9775512), "n9775512");
        assert_eq!(file().var(), file().key().var());
    }

    #[test]
    fn test_new_entity_reports_invalid_source() {
        let err = new_entity(
            Path::new("/nope/secret"),
            Some(1),
            Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied)),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::InvalidSource { .. }));
    }

    #[test]
    fn test_new_entity_splits_name() {
        let stat = RawStat {
            inode: 42,
            is_dir: false,
            size: 10,
            uid: 1,
            gid: 2,
            ctime: 3,
            atime: 4,
            mtime: 5,
        };
        let e = new_entity(Path::new("/x/archive.tar.gz"), Some(1), Ok(stat)).unwrap();
        assert_eq!(e.name, "archive.tar.gz");
        assert_eq!(e.stem, "archive.tar");
        assert_eq!(e.extension, "gz");
        assert_eq!(e.kind, EntityKind::File);
        assert_eq!(e.parent_id, Some(1));
    }
}
