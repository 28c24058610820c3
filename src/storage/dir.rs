//! Directory layout: one file per hierarchy object.
//!
//! ```text
//! <root>/@snapshot.json            version, endpoint, timestamp, flat lists
//! <root>/spaces/<space>/@self.json
//! <root>/spaces/<space>/<folder>/@self.json
//! <root>/spaces/<space>/<folder>/<vds>.json
//! <root>/homes/...   <root>/sources/...
//! ```
//!
//! Segments are form-urlencoded, which maps `@` to `%40`, so an encoded
//! segment can never be mistaken for a sentinel file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use catalog_types::{
    CatalogPath, CatalogRef, Entity, EntityKind, EnvironmentSnapshot, Principal, Reflection, Tags,
    VdsDependency, Vote, Wiki, WlmQueue, WlmRule,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::form_urlencoded;

use super::check_version;
use crate::error::{Result, ToolkitError};

const MANIFEST_FILE: &str = "@snapshot.json";
const SELF_FILE: &str = "@self.json";
const HOMES_DIR: &str = "homes";
const SPACES_DIR: &str = "spaces";
const SOURCES_DIR: &str = "sources";

/// Everything in a snapshot that is not part of the container hierarchy.
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    file_version: String,
    #[serde(default)]
    endpoint: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    containers: Vec<CatalogRef>,
    #[serde(default)]
    vds_parents: Vec<VdsDependency>,
    #[serde(default)]
    reflections: Vec<Reflection>,
    #[serde(default)]
    queues: Vec<WlmQueue>,
    #[serde(default)]
    rules: Vec<WlmRule>,
    #[serde(default)]
    votes: Vec<Vote>,
    #[serde(default)]
    tags: Vec<Tags>,
    #[serde(default)]
    wikis: Vec<Wiki>,
    #[serde(default)]
    referenced_users: Vec<Principal>,
    #[serde(default)]
    referenced_groups: Vec<Principal>,
    #[serde(default)]
    referenced_roles: Vec<Principal>,
}

// ── Write ─────────────────────────────────────────────────────

pub fn write_dir(snapshot: &EnvironmentSnapshot, root: &Path) -> Result<()> {
    if root.exists() {
        let mut entries = fs::read_dir(root).map_err(|e| ToolkitError::io(root, e))?;
        if entries.next().is_some() {
            return Err(ToolkitError::Snapshot {
                path: root.to_path_buf(),
                message: "target directory is not empty".to_string(),
            });
        }
    }
    fs::create_dir_all(root).map_err(|e| ToolkitError::io(root, e))?;

    let manifest = Manifest {
        file_version: snapshot.file_version.clone(),
        endpoint: snapshot.endpoint.clone(),
        timestamp: snapshot.timestamp,
        containers: snapshot.containers.clone(),
        vds_parents: snapshot.vds_parents.clone(),
        reflections: snapshot.reflections.clone(),
        queues: snapshot.queues.clone(),
        rules: snapshot.rules.clone(),
        votes: snapshot.votes.clone(),
        tags: snapshot.tags.clone(),
        wikis: snapshot.wikis.clone(),
        referenced_users: snapshot.referenced_users.clone(),
        referenced_groups: snapshot.referenced_groups.clone(),
        referenced_roles: snapshot.referenced_roles.clone(),
    };
    write_json(&root.join(MANIFEST_FILE), &manifest)?;

    // Container name -> tree directory, so folders land under their root.
    let mut trees: HashMap<&str, &'static str> = HashMap::new();
    for (tree, containers) in [
        (HOMES_DIR, &snapshot.homes),
        (SPACES_DIR, &snapshot.spaces),
        (SOURCES_DIR, &snapshot.sources),
    ] {
        for container in containers {
            let path = container.path();
            if let Some(name) = container.name() {
                trees.insert(name, tree);
            }
            let dir = entity_dir(root, tree, &path);
            write_json(&dir.join(SELF_FILE), container)?;
        }
    }

    for folder in &snapshot.folders {
        let path = folder.path();
        let dir = entity_dir(root, tree_for(&trees, &path), &path);
        write_json(&dir.join(SELF_FILE), folder)?;
    }

    for vds in &snapshot.vds {
        let path = vds.path();
        let (Some(parent), Some(name)) = (path.parent(), path.name()) else {
            warn!(vds = %path, "VDS without parent path, not written");
            continue;
        };
        let dir = entity_dir(root, tree_for(&trees, &path), &parent);
        write_json(&dir.join(format!("{}.json", encode(name))), vds)?;
    }

    debug!(root = %root.display(), "Snapshot directory written");
    Ok(())
}

fn tree_for(trees: &HashMap<&str, &'static str>, path: &CatalogPath) -> &'static str {
    match path.root() {
        Some(root) => trees.get(root).copied().unwrap_or(if path.is_personal() {
            HOMES_DIR
        } else {
            SPACES_DIR
        }),
        None => SPACES_DIR,
    }
}

fn entity_dir(root: &Path, tree: &str, path: &CatalogPath) -> PathBuf {
    let mut dir = root.join(tree);
    for segment in path.segments() {
        dir.push(encode(segment));
    }
    dir
}

fn encode(segment: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(segment.as_bytes()).collect();
    if !encoded.is_empty() && encoded.chars().all(|c| c == '.') {
        // "." and ".." are not usable as directory names
        encoded.replace('.', "%2E")
    } else {
        encoded
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ToolkitError::io(parent, e))?;
    }
    let text = serde_json::to_string_pretty(value).map_err(|e| ToolkitError::json(path, e))?;
    fs::write(path, text).map_err(|e| ToolkitError::io(path, e))
}

// ── Read ──────────────────────────────────────────────────────

pub fn read_dir(root: &Path) -> Result<EnvironmentSnapshot> {
    let manifest_path = root.join(MANIFEST_FILE);
    let document: Value = read_json(&manifest_path)?;
    check_version(&document)?;
    let manifest: Manifest =
        serde_json::from_value(document).map_err(|e| ToolkitError::json(&manifest_path, e))?;

    let mut snapshot = EnvironmentSnapshot::at(manifest.endpoint, manifest.timestamp);
    snapshot.file_version = manifest.file_version;
    snapshot.containers = manifest.containers;
    snapshot.vds_parents = manifest.vds_parents;
    snapshot.reflections = manifest.reflections;
    snapshot.queues = manifest.queues;
    snapshot.rules = manifest.rules;
    snapshot.votes = manifest.votes;
    snapshot.tags = manifest.tags;
    snapshot.wikis = manifest.wikis;
    snapshot.referenced_users = manifest.referenced_users;
    snapshot.referenced_groups = manifest.referenced_groups;
    snapshot.referenced_roles = manifest.referenced_roles;

    for tree in [HOMES_DIR, SPACES_DIR, SOURCES_DIR] {
        let tree_root = root.join(tree);
        if tree_root.is_dir() {
            read_tree(&tree_root, &mut snapshot)?;
        }
    }
    debug!(
        root = %root.display(),
        entities = snapshot.entity_count(),
        "Snapshot directory read"
    );
    Ok(snapshot)
}

/// Depth-first walk of one tree. Entries are visited in name order, a
/// directory's own entity before anything below it.
fn read_tree(tree_root: &Path, snapshot: &mut EnvironmentSnapshot) -> Result<()> {
    let mut stack: Vec<PathBuf> = sorted_entries(tree_root)?
        .into_iter()
        .filter(|p| p.is_dir())
        .rev()
        .collect();

    while let Some(dir) = stack.pop() {
        let self_file = dir.join(SELF_FILE);
        if self_file.is_file() {
            let entity: Entity = read_json(&self_file)?;
            match entity.kind() {
                EntityKind::Home => snapshot.homes.push(entity),
                EntityKind::Space => snapshot.spaces.push(entity),
                EntityKind::Source => snapshot.sources.push(entity),
                EntityKind::Folder => snapshot.folders.push(entity),
                other => {
                    return Err(ToolkitError::Snapshot {
                        path: self_file,
                        message: format!("unexpected {other} entity in directory sentinel"),
                    })
                }
            }
        }

        let mut subdirs = Vec::new();
        for entry in sorted_entries(&dir)? {
            if entry.is_dir() {
                subdirs.push(entry);
                continue;
            }
            let is_dataset_file = entry.extension().is_some_and(|ext| ext == "json")
                && entry.file_name().is_some_and(|name| name != SELF_FILE);
            if is_dataset_file {
                let entity: Entity = read_json(&entry)?;
                snapshot.vds.push(entity);
            }
        }
        stack.extend(subdirs.into_iter().rev());
    }
    Ok(())
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| ToolkitError::io(dir, e))? {
        let entry = entry.map_err(|e| ToolkitError::io(dir, e))?;
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| ToolkitError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| ToolkitError::json(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::sample_snapshot;

    #[test]
    fn layout_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("snap");
        write_dir(&sample_snapshot(), &root).unwrap();

        assert!(root.join(MANIFEST_FILE).is_file());
        assert!(root.join("spaces/My+Space/@self.json").is_file());
        assert!(root.join("spaces/My+Space/staging/@self.json").is_file());
        assert!(root.join("spaces/My+Space/staging/orders.json").is_file());
        assert!(root.join("spaces/My+Space/summary.json").is_file());
        assert!(root.join("homes/%40alice/@self.json").is_file());
        assert!(root.join("homes/%40alice/scratch/@self.json").is_file());
        assert!(root.join("sources/lake/@self.json").is_file());
    }

    #[test]
    fn sentinel_names_cannot_collide() {
        assert_eq!(encode("@self.json"), "%40self.json");
        assert_eq!(encode(".."), "%2E%2E");
        assert_eq!(encode("a/b"), "a%2Fb");
    }

    #[test]
    fn refuses_non_empty_target() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("existing.txt"), "x").unwrap();
        let err = write_dir(&sample_snapshot(), tmp.path()).unwrap_err();
        assert!(matches!(err, ToolkitError::Snapshot { .. }));
    }

    #[test]
    fn parents_are_read_before_children() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("snap");
        write_dir(&sample_snapshot(), &root).unwrap();
        let snapshot = read_dir(&root).unwrap();

        let folder_paths: Vec<String> = snapshot.folders.iter().map(|f| f.path().to_string()).collect();
        assert_eq!(folder_paths, vec!["@alice/scratch", "My Space/staging"]);
        assert_eq!(snapshot.vds_parents.len(), 1);
        assert_eq!(snapshot.referenced_users[0].name, "alice");
    }

    #[test]
    fn missing_manifest_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(read_dir(tmp.path()), Err(ToolkitError::Io { .. })));
    }
}
