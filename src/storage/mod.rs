//! Snapshot persistence.
//!
//! A snapshot is either one JSON document (the canonical form) or a directory
//! tree with one file per hierarchy object. Both carry `file_version` and
//! only [`FILE_VERSION`] is accepted on read.

mod dir;
mod file;

use std::path::Path;

use catalog_types::{EnvironmentSnapshot, FILE_VERSION};
use serde_json::Value;
use tracing::info;

use crate::error::{Result, ToolkitError};

pub use dir::{read_dir, write_dir};
pub use file::{read_file, write_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum SnapshotFormat {
    #[default]
    File,
    Directory,
}

/// Read either layout; a directory path selects the directory layout.
pub fn read_snapshot(path: &Path) -> Result<EnvironmentSnapshot> {
    if path.is_dir() {
        read_dir(path)
    } else {
        read_file(path)
    }
}

pub fn write_snapshot(
    snapshot: &EnvironmentSnapshot,
    path: &Path,
    format: SnapshotFormat,
) -> Result<()> {
    match format {
        SnapshotFormat::File => write_file(snapshot, path),
        SnapshotFormat::Directory => write_dir(snapshot, path),
    }
}

/// Single file to directory tree.
pub fn explode(file: &Path, dir: &Path) -> Result<()> {
    let snapshot = read_file(file)?;
    write_dir(&snapshot, dir)?;
    info!(from = %file.display(), to = %dir.display(), "Snapshot exploded");
    Ok(())
}

/// Directory tree to single file.
pub fn implode(dir: &Path, file: &Path) -> Result<()> {
    let snapshot = read_dir(dir)?;
    write_file(&snapshot, file)?;
    info!(from = %dir.display(), to = %file.display(), "Snapshot imploded");
    Ok(())
}

fn check_version(document: &Value) -> Result<()> {
    match document.get("file_version").and_then(Value::as_str) {
        Some(FILE_VERSION) => Ok(()),
        Some(other) => Err(ToolkitError::UnsupportedFileVersion {
            found: other.to_string(),
            expected: FILE_VERSION,
        }),
        None => Err(ToolkitError::UnsupportedFileVersion {
            found: String::new(),
            expected: FILE_VERSION,
        }),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use catalog_types::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    pub fn entity(value: serde_json::Value) -> Entity {
        serde_json::from_value(value).unwrap()
    }

    /// A small environment: one home, one space with a folder and two
    /// views, one source, plus attachments.
    pub fn sample_snapshot() -> EnvironmentSnapshot {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let mut s = EnvironmentSnapshot::at("http://source:9047/", ts);
        s.containers = serde_json::from_value(json!([
            {"id": "h1", "path": ["@alice"], "type": "CONTAINER", "containerType": "HOME"},
            {"id": "s1", "path": ["My Space"], "type": "CONTAINER", "containerType": "SPACE"},
            {"id": "src1", "path": ["lake"], "type": "CONTAINER", "containerType": "SOURCE"}
        ]))
        .unwrap();
        s.homes.push(entity(json!({"entityType": "home", "id": "h1", "name": "@alice"})));
        s.spaces.push(entity(json!({
            "entityType": "space", "id": "s1", "name": "My Space",
            "accessControlList": {"users": [{"id": "u1", "permissions": ["SELECT"]}]}
        })));
        s.sources.push(entity(json!({
            "entityType": "source", "id": "src1", "name": "lake", "type": "S3",
            "config": {"bucket": "b"}
        })));
        s.folders.push(entity(json!({
            "entityType": "folder", "id": "f1", "path": ["My Space", "staging"]
        })));
        s.folders.push(entity(json!({
            "entityType": "folder", "id": "f2", "path": ["@alice", "scratch"]
        })));
        s.vds.push(entity(json!({
            "entityType": "dataset", "type": "VIRTUAL_DATASET", "id": "v1",
            "path": ["My Space", "staging", "orders"], "sql": "SELECT * FROM lake.orders",
            "sqlContext": ["lake"]
        })));
        s.vds.push(entity(json!({
            "entityType": "dataset", "type": "VIRTUAL_DATASET", "id": "v2",
            "path": ["My Space", "summary"], "sql": "SELECT count(*) FROM orders",
            "sqlContext": ["My Space", "staging"]
        })));
        s.vds_parents.push(VdsDependency::new(
            Some("v2".into()),
            CatalogPath::new(["My Space", "summary"]),
            vec![CatalogPath::new(["My Space", "staging", "orders"])],
        ));
        s.wikis.push(serde_json::from_value(json!({
            "text": "# Space docs", "version": 0, "entity_id": "s1", "path": ["My Space"]
        })).unwrap());
        s.referenced_users.push(Principal::new("u1", "alice"));
        s
    }
}
