//! Catalog entities.
//!
//! The catalog API speaks loosely-typed JSON discriminated by `entityType`.
//! [`Entity`] is the typed sum over the kinds the toolkit handles; every
//! variant shares [`EntityBase`] and keeps unknown attributes in
//! `EntityBase::extra` so nothing is dropped between read and write.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::acl::{AccessControlList, Owner};
use crate::path::CatalogPath;

// ── Shared record ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityBase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Optimistic-concurrency token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<CatalogRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_control_list: Option<AccessControlList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityBase {
    /// Drop everything the server maintains on its own.
    pub fn strip_server_fields(&mut self) {
        self.id = None;
        self.tag = None;
        self.created_at = None;
        self.children = None;
    }
}

// ── Variants ──────────────────────────────────────────────────

/// Home, space or source: addressed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(flatten)]
    pub base: EntityBase,
}

/// Folder or file: addressed by full path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathEntity {
    pub path: CatalogPath,
    #[serde(flatten)]
    pub base: EntityBase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetType {
    VirtualDataset,
    PhysicalDataset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub path: CatalogPath,
    #[serde(rename = "type")]
    pub dataset_type: DatasetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_context: Option<CatalogPath>,
    #[serde(flatten)]
    pub base: EntityBase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entityType", rename_all = "lowercase")]
pub enum Entity {
    Home(Container),
    Space(Container),
    Source(Container),
    Folder(PathEntity),
    Dataset(Dataset),
    File(PathEntity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Home,
    Space,
    Source,
    Folder,
    VirtualDataset,
    PhysicalDataset,
    File,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Space => "space",
            Self::Source => "source",
            Self::Folder => "folder",
            Self::VirtualDataset => "vds",
            Self::PhysicalDataset => "pds",
            Self::File => "file",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Home(_) => EntityKind::Home,
            Self::Space(_) => EntityKind::Space,
            Self::Source(_) => EntityKind::Source,
            Self::Folder(_) => EntityKind::Folder,
            Self::Dataset(d) => match d.dataset_type {
                DatasetType::VirtualDataset => EntityKind::VirtualDataset,
                DatasetType::PhysicalDataset => EntityKind::PhysicalDataset,
            },
            Self::File(_) => EntityKind::File,
        }
    }

    pub fn base(&self) -> &EntityBase {
        match self {
            Self::Home(c) | Self::Space(c) | Self::Source(c) => &c.base,
            Self::Folder(p) | Self::File(p) => &p.base,
            Self::Dataset(d) => &d.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut EntityBase {
        match self {
            Self::Home(c) | Self::Space(c) | Self::Source(c) => &mut c.base,
            Self::Folder(p) | Self::File(p) => &mut p.base,
            Self::Dataset(d) => &mut d.base,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.base().id.as_deref()
    }

    /// Name for top-level containers, `None` for path-addressed entities.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Home(c) | Self::Space(c) | Self::Source(c) => Some(&c.name),
            _ => None,
        }
    }

    /// Full catalog path. Top-level containers are the single-segment path
    /// of their name.
    pub fn path(&self) -> CatalogPath {
        match self {
            Self::Home(c) | Self::Space(c) | Self::Source(c) => CatalogPath::new([c.name.clone()]),
            Self::Folder(p) | Self::File(p) => p.path.clone(),
            Self::Dataset(d) => d.path.clone(),
        }
    }

    pub fn is_personal(&self) -> bool {
        self.path().is_personal()
    }

    pub fn as_dataset(&self) -> Option<&Dataset> {
        match self {
            Self::Dataset(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_virtual_dataset(&self) -> bool {
        self.kind() == EntityKind::VirtualDataset
    }

    pub fn is_physical_dataset(&self) -> bool {
        self.kind() == EntityKind::PhysicalDataset
    }

    pub fn sql_context(&self) -> Option<&CatalogPath> {
        self.as_dataset().and_then(|d| d.sql_context.as_ref())
    }

    pub fn strip_server_fields(&mut self) {
        self.base_mut().strip_server_fields();
    }

    /// `kind:path` label used in logs and reports.
    pub fn label(&self) -> String {
        format!("{}:{}", self.kind(), self.path())
    }
}

// ── References ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefType {
    Container,
    Dataset,
    File,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerType {
    Home,
    Space,
    Source,
    Folder,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefDatasetType {
    Virtual,
    Promoted,
    Direct,
    #[serde(other)]
    Other,
}

/// Lightweight pointer returned by container listings and `children`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub path: CatalogPath,
    #[serde(rename = "type")]
    pub ref_type: RefType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_type: Option<ContainerType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_type: Option<RefDatasetType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dataset_round_trips_unknown_fields() {
        let wire = json!({
            "entityType": "dataset",
            "type": "VIRTUAL_DATASET",
            "id": "d1",
            "path": ["Sales", "orders_v"],
            "tag": "t0",
            "sql": "SELECT * FROM orders",
            "sqlContext": ["Source1"],
            "fields": [{"name": "a", "type": {"name": "INTEGER"}}],
            "accessControlList": {"users": [{"id": "u1", "permissions": ["SELECT"]}]}
        });
        let entity: Entity = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(entity.kind(), EntityKind::VirtualDataset);
        assert_eq!(entity.sql_context(), Some(&CatalogPath::new(["Source1"])));
        assert!(entity.base().extra.contains_key("fields"));
        assert!(!entity.base().extra.contains_key("entityType"));

        let back = serde_json::to_value(&entity).unwrap();
        assert_eq!(back, wire);
    }

    #[test]
    fn containers_are_addressed_by_name() {
        let entity: Entity = serde_json::from_value(json!({
            "entityType": "space",
            "id": "s1",
            "name": "Sales",
            "children": [
                {"id": "f1", "path": ["Sales", "f"], "type": "CONTAINER", "containerType": "FOLDER"}
            ]
        }))
        .unwrap();
        assert_eq!(entity.name(), Some("Sales"));
        assert_eq!(entity.path(), CatalogPath::new(["Sales"]));
        let children = entity.base().children.as_ref().unwrap();
        assert_eq!(children[0].container_type, Some(ContainerType::Folder));
    }

    #[test]
    fn strip_server_fields_keeps_user_data() {
        let mut entity: Entity = serde_json::from_value(json!({
            "entityType": "folder",
            "id": "f1",
            "tag": "x",
            "createdAt": "2023-01-01",
            "path": ["@alice", "scratch"],
            "children": [],
            "accessControlList": {}
        }))
        .unwrap();
        entity.strip_server_fields();
        let base = entity.base();
        assert!(base.id.is_none() && base.tag.is_none());
        assert!(base.created_at.is_none() && base.children.is_none());
        assert!(base.access_control_list.is_some());
        assert!(entity.is_personal());
    }

    #[test]
    fn unknown_ref_types_do_not_fail() {
        let r: CatalogRef = serde_json::from_value(json!({
            "id": "x", "path": ["a"], "type": "CONTAINER", "containerType": "FUNCTION"
        }))
        .unwrap();
        assert_eq!(r.container_type, Some(ContainerType::Other));
    }
}
