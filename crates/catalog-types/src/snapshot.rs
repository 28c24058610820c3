//! The environment snapshot aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaboration::{Tags, Wiki};
use crate::entity::{CatalogRef, Entity};
use crate::lineage::VdsDependency;
use crate::path::CatalogPath;
use crate::principal::{push_unique, Principal, PrincipalKind};
use crate::reflection::Reflection;
use crate::wlm::{Vote, WlmQueue, WlmRule};

/// The only snapshot format this toolkit reads and writes.
pub const FILE_VERSION: &str = "2.0";

/// Everything captured from one environment at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub file_version: String,
    #[serde(default)]
    pub endpoint: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub containers: Vec<CatalogRef>,
    #[serde(default)]
    pub homes: Vec<Entity>,
    #[serde(default)]
    pub sources: Vec<Entity>,
    #[serde(default)]
    pub spaces: Vec<Entity>,
    #[serde(default)]
    pub folders: Vec<Entity>,
    #[serde(default)]
    pub vds: Vec<Entity>,
    #[serde(default)]
    pub vds_parents: Vec<VdsDependency>,
    #[serde(default)]
    pub reflections: Vec<Reflection>,
    #[serde(default)]
    pub queues: Vec<WlmQueue>,
    #[serde(default)]
    pub rules: Vec<WlmRule>,
    #[serde(default)]
    pub votes: Vec<Vote>,
    #[serde(default)]
    pub tags: Vec<Tags>,
    #[serde(default)]
    pub wikis: Vec<Wiki>,
    #[serde(default)]
    pub referenced_users: Vec<Principal>,
    #[serde(default)]
    pub referenced_groups: Vec<Principal>,
    #[serde(default)]
    pub referenced_roles: Vec<Principal>,
}

impl EnvironmentSnapshot {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::at(endpoint, Utc::now())
    }

    pub fn at(endpoint: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            file_version: FILE_VERSION.to_string(),
            endpoint: endpoint.into(),
            timestamp,
            containers: Vec::new(),
            homes: Vec::new(),
            sources: Vec::new(),
            spaces: Vec::new(),
            folders: Vec::new(),
            vds: Vec::new(),
            vds_parents: Vec::new(),
            reflections: Vec::new(),
            queues: Vec::new(),
            rules: Vec::new(),
            votes: Vec::new(),
            tags: Vec::new(),
            wikis: Vec::new(),
            referenced_users: Vec::new(),
            referenced_groups: Vec::new(),
            referenced_roles: Vec::new(),
        }
    }

    pub fn referenced(&self, kind: PrincipalKind) -> &[Principal] {
        match kind {
            PrincipalKind::User => &self.referenced_users,
            PrincipalKind::Group => &self.referenced_groups,
            PrincipalKind::Role => &self.referenced_roles,
        }
    }

    pub fn add_referenced(&mut self, kind: PrincipalKind, principal: Principal) {
        let list = match kind {
            PrincipalKind::User => &mut self.referenced_users,
            PrincipalKind::Group => &mut self.referenced_groups,
            PrincipalKind::Role => &mut self.referenced_roles,
        };
        push_unique(list, principal);
    }

    /// Name of a referenced principal, looked up by its id in this snapshot.
    pub fn principal_name(&self, kind: PrincipalKind, id: &str) -> Option<&str> {
        self.referenced(kind)
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.name.as_str())
    }

    pub fn dependency_of(&self, vds_path: &CatalogPath) -> Option<&VdsDependency> {
        self.vds_parents.iter().find(|d| &d.path == vds_path)
    }

    pub fn has_vds(&self, path: &CatalogPath) -> bool {
        self.vds.iter().any(|v| &v.path() == path)
    }

    /// Append a VDS unless one with the same path is already present.
    pub fn push_vds(&mut self, vds: Entity) -> bool {
        if self.has_vds(&vds.path()) {
            return false;
        }
        self.vds.push(vds);
        true
    }

    pub fn entity_count(&self) -> usize {
        self.homes.len() + self.sources.len() + self.spaces.len() + self.folders.len() + self.vds.len()
    }
}
