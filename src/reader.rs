//! Catalog reader: walks one environment into an [`EnvironmentSnapshot`].
//!
//! Containers are listed first and every type must be recognised before
//! anything is read. Homes and spaces are walked depth-first through their
//! `children` references; sources are captured but never descended.

use std::collections::{HashMap, HashSet};

use catalog_client::CatalogClient;
use catalog_types::{
    CatalogPath, CatalogRef, ContainerType, Entity, EntityKind, EnvironmentSnapshot,
    PrincipalKind, RefType, VdsDependency,
};
use tracing::{debug, info, warn};

use crate::error::{Result, ToolkitError};
use crate::report::ExceptionReport;

/// What part of the environment to read.
#[derive(Debug, Clone)]
pub struct ReadScope {
    /// Restrict the read to these spaces. Sources are always read; homes
    /// only when no restriction is given.
    pub spaces: Option<Vec<String>>,
    /// Follow VDS lineage out of the selected spaces.
    pub collect_dependencies: bool,
}

impl Default for ReadScope {
    fn default() -> Self {
        Self {
            spaces: None,
            collect_dependencies: true,
        }
    }
}

impl ReadScope {
    pub fn spaces<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            spaces: Some(names.into_iter().map(Into::into).collect()),
            collect_dependencies: true,
        }
    }

    pub fn without_dependencies(mut self) -> Self {
        self.collect_dependencies = false;
        self
    }

    fn is_restricted(&self) -> bool {
        self.spaces.is_some()
    }

    fn includes_space(&self, name: &str) -> bool {
        self.spaces
            .as_ref()
            .map(|names| names.iter().any(|n| n == name))
            .unwrap_or(true)
    }
}

/// Read the environment behind `client`.
///
/// Fatal: the container listing is unavailable or contains a type other
/// than home, space or source. Everything else that cannot be read ends up
/// in the returned report.
pub async fn read_environment(
    client: &dyn CatalogClient,
    scope: &ReadScope,
) -> Result<(EnvironmentSnapshot, ExceptionReport)> {
    let mut reader = CatalogReader {
        client,
        scope,
        snapshot: EnvironmentSnapshot::new(client.endpoint()),
        report: ExceptionReport::new(),
        seen_principals: HashSet::new(),
        dataset_paths: HashMap::new(),
    };
    reader.read().await?;
    info!(
        endpoint = client.endpoint(),
        entities = reader.snapshot.entity_count(),
        vds = reader.snapshot.vds.len(),
        errors = reader.report.len(),
        "Environment read"
    );
    Ok((reader.snapshot, reader.report))
}

/// Every top-level container must be a home, space or source.
pub fn check_container_types(containers: &[CatalogRef]) -> Result<()> {
    for container in containers {
        match container.container_type {
            Some(ContainerType::Home | ContainerType::Space | ContainerType::Source) => {}
            other => {
                return Err(ToolkitError::UnknownContainer {
                    path: container.path.to_string(),
                    container_type: other
                        .map(|t| format!("{t:?}"))
                        .unwrap_or_else(|| "none".to_string()),
                })
            }
        }
    }
    Ok(())
}

struct CatalogReader<'a> {
    client: &'a dyn CatalogClient,
    scope: &'a ReadScope,
    snapshot: EnvironmentSnapshot,
    report: ExceptionReport,
    seen_principals: HashSet<(PrincipalKind, String)>,
    /// Dataset id -> path, for attaching paths to reflections.
    dataset_paths: HashMap<String, CatalogPath>,
}

impl CatalogReader<'_> {
    async fn read(&mut self) -> Result<()> {
        let containers = self
            .client
            .list_containers()
            .await?
            .ok_or_else(|| ToolkitError::ContainersUnavailable(self.client.endpoint().to_string()))?;
        check_container_types(&containers)?;

        for container in containers {
            let name = container.path.root().unwrap_or_default().to_string();
            let wanted = match container.container_type {
                Some(ContainerType::Home) => !self.scope.is_restricted(),
                Some(ContainerType::Space) => self.scope.includes_space(&name),
                _ => true,
            };
            if !wanted {
                debug!(container = %container.path, "Container outside read scope");
                continue;
            }
            self.read_container(&container).await?;
            self.snapshot.containers.push(container);
        }

        if self.scope.is_restricted() && self.scope.collect_dependencies {
            self.collect_dependencies().await?;
        }
        self.read_reflections().await?;

        self.snapshot.queues = self.client.list_queues().await?.unwrap_or_default();
        self.snapshot.rules = self.client.list_rules().await?.unwrap_or_default();
        self.snapshot.votes = self.client.list_votes().await?.unwrap_or_default();
        Ok(())
    }

    async fn fetch(&self, reference: &CatalogRef) -> Result<Option<Entity>> {
        match reference.id.as_deref() {
            Some(id) => Ok(self.client.get_entity_by_id(id).await?),
            None => Ok(self.client.get_entity_by_path(&reference.path).await?),
        }
    }

    async fn read_container(&mut self, container: &CatalogRef) -> Result<()> {
        let Some(entity) = self.fetch(container).await? else {
            self.report
                .record("container", &container.path, "Unable to read container");
            return Ok(());
        };
        debug!(container = %entity.label(), "Reading container");
        self.collect_principals(&entity).await?;
        self.read_wiki(&entity).await?;

        let children = entity.base().children.clone().unwrap_or_default();
        let kind = entity.kind();
        match kind {
            EntityKind::Home => self.snapshot.homes.push(entity),
            EntityKind::Space => self.snapshot.spaces.push(entity),
            EntityKind::Source => {
                self.snapshot.sources.push(entity);
                return Ok(());
            }
            other => {
                self.report.record(
                    "container",
                    &container.path,
                    format!("Listed as a container but read as {other}"),
                );
                return Ok(());
            }
        }
        self.walk(children, kind == EntityKind::Space).await
    }

    /// Depth-first walk below a home or space.
    async fn walk(&mut self, children: Vec<CatalogRef>, in_space: bool) -> Result<()> {
        let mut stack: Vec<CatalogRef> = children.into_iter().rev().collect();
        while let Some(child) = stack.pop() {
            match child.ref_type {
                RefType::Container => {
                    let Some(folder) = self.fetch(&child).await? else {
                        self.report.record("folder", &child.path, "Unable to read folder");
                        continue;
                    };
                    self.collect_principals(&folder).await?;
                    self.read_wiki(&folder).await?;
                    let grandchildren = folder.base().children.clone().unwrap_or_default();
                    stack.extend(grandchildren.into_iter().rev());
                    self.snapshot.folders.push(folder);
                }
                RefType::Dataset => {
                    let Some(dataset) = self.fetch(&child).await? else {
                        self.report.record("dataset", &child.path, "Unable to read dataset");
                        continue;
                    };
                    match dataset.kind() {
                        EntityKind::VirtualDataset => self.read_vds(dataset).await?,
                        _ if in_space => self.report.record(
                            "dataset",
                            &child.path,
                            "Physical dataset found in a space",
                        ),
                        _ => debug!(dataset = %child.path, "Physical dataset in home skipped"),
                    }
                }
                RefType::File => warn!(file = %child.path, "File entries are not captured"),
                RefType::Other => warn!(entry = %child.path, "Unrecognised catalog entry skipped"),
            }
        }
        Ok(())
    }

    async fn read_vds(&mut self, vds: Entity) -> Result<()> {
        let path = vds.path();
        self.collect_principals(&vds).await?;
        self.read_wiki(&vds).await?;
        self.read_tags(&vds).await?;

        match vds.id() {
            Some(id) => match self.client.get_lineage(id).await? {
                Some(lineage) => self.snapshot.vds_parents.push(VdsDependency::new(
                    Some(id.to_string()),
                    path.clone(),
                    lineage.parent_paths(),
                )),
                None => warn!(vds = %path, "Lineage unavailable, VDS cannot be ordered on push"),
            },
            None => warn!(vds = %path, "VDS without id, lineage not read"),
        }
        if let Some(id) = vds.id() {
            self.dataset_paths.insert(id.to_string(), path);
        }
        self.snapshot.push_vds(vds);
        Ok(())
    }

    // ── Attachments ───────────────────────────────────────────

    async fn collect_principals(&mut self, entity: &Entity) -> Result<()> {
        let base = entity.base();
        let mut wanted: Vec<(PrincipalKind, String)> = Vec::new();
        if let Some(acl) = &base.access_control_list {
            for kind in PrincipalKind::ALL {
                wanted.extend(acl.grants(kind).iter().map(|g| (kind, g.id.clone())));
            }
        }
        if let Some(owner) = &base.owner {
            wanted.push((owner.owner_type, owner.owner_id.clone()));
        }

        for (kind, id) in wanted {
            if !self.seen_principals.insert((kind, id.clone())) {
                continue;
            }
            match self.client.get_principal_by_id(kind, &id).await? {
                Some(principal) => self.snapshot.add_referenced(kind, principal),
                None => warn!(%kind, %id, entity = %entity.label(), "Unable to resolve principal"),
            }
        }
        Ok(())
    }

    async fn read_wiki(&mut self, entity: &Entity) -> Result<()> {
        let Some(id) = entity.id() else {
            return Ok(());
        };
        if let Some(mut wiki) = self.client.get_wiki(id).await? {
            wiki.entity_id = Some(id.to_string());
            wiki.path = entity.path();
            self.snapshot.wikis.push(wiki);
        }
        Ok(())
    }

    async fn read_tags(&mut self, entity: &Entity) -> Result<()> {
        let Some(id) = entity.id() else {
            return Ok(());
        };
        if let Some(mut tags) = self.client.get_tags(id).await? {
            if tags.tags.is_empty() {
                return Ok(());
            }
            tags.entity_id = Some(id.to_string());
            tags.path = entity.path();
            self.snapshot.tags.push(tags);
        }
        Ok(())
    }

    // ── Scope extension ───────────────────────────────────────

    /// Pull in virtual parents living outside the selected spaces, along
    /// with the containers and folders that hold them. Transitive.
    async fn collect_dependencies(&mut self) -> Result<()> {
        let mut pending: Vec<CatalogPath> = self
            .snapshot
            .vds_parents
            .iter()
            .flat_map(|d| d.parents.iter().cloned())
            .collect();
        let mut visited: HashSet<CatalogPath> = HashSet::new();

        while let Some(path) = pending.pop() {
            if !visited.insert(path.clone()) || self.snapshot.has_vds(&path) {
                continue;
            }
            let Some(entity) = self.client.get_entity_by_path(&path).await? else {
                debug!(dependency = %path, "Dependency not readable, left to target resolution");
                continue;
            };
            if !entity.is_virtual_dataset() {
                continue;
            }
            info!(dependency = %path, "Adding VDS dependency outside read scope");
            self.ensure_ancestors(&path).await?;
            let before = self.snapshot.vds_parents.len();
            self.read_vds(entity).await?;
            for dependency in &self.snapshot.vds_parents[before..] {
                pending.extend(dependency.parents.iter().cloned());
            }
        }
        Ok(())
    }

    async fn ensure_ancestors(&mut self, path: &CatalogPath) -> Result<()> {
        let segments = path.segments();
        for depth in 1..segments.len() {
            let ancestor = CatalogPath::new(segments[..depth].iter().cloned());
            if self.holds(&ancestor) {
                continue;
            }
            let Some(entity) = self.client.get_entity_by_path(&ancestor).await? else {
                self.report
                    .record("folder", &ancestor, "Unable to read ancestor of a dependency");
                return Ok(());
            };
            self.collect_principals(&entity).await?;
            self.read_wiki(&entity).await?;
            let mut entity = entity;
            entity.base_mut().children = None;
            match entity.kind() {
                EntityKind::Space => self.snapshot.spaces.push(entity),
                EntityKind::Home => self.snapshot.homes.push(entity),
                EntityKind::Source => self.snapshot.sources.push(entity),
                EntityKind::Folder => self.snapshot.folders.push(entity),
                other => debug!(%ancestor, kind = %other, "Unexpected ancestor kind"),
            }
        }
        Ok(())
    }

    fn holds(&self, path: &CatalogPath) -> bool {
        let snapshot = &self.snapshot;
        if path.len() == 1 {
            snapshot
                .homes
                .iter()
                .chain(&snapshot.spaces)
                .chain(&snapshot.sources)
                .any(|c| &c.path() == path)
        } else {
            snapshot.folders.iter().any(|f| &f.path() == path)
        }
    }

    // ── Reflections ───────────────────────────────────────────

    async fn read_reflections(&mut self) -> Result<()> {
        let Some(reflections) = self.client.list_reflections().await? else {
            warn!("Unable to list reflections");
            return Ok(());
        };
        for mut reflection in reflections {
            let Some(dataset_id) = reflection.dataset_id.clone() else {
                debug!(reflection = %reflection.name, "Reflection without dataset id skipped");
                continue;
            };
            let path = match self.dataset_paths.get(&dataset_id) {
                Some(path) => Some(path.clone()),
                None => {
                    let path = self
                        .client
                        .get_entity_by_id(&dataset_id)
                        .await?
                        .map(|dataset| dataset.path());
                    if let Some(path) = &path {
                        self.dataset_paths.insert(dataset_id.clone(), path.clone());
                    }
                    path
                }
            };
            let Some(path) = path else {
                warn!(reflection = %reflection.name, %dataset_id, "Reflected dataset not readable");
                continue;
            };
            if self.scope.is_restricted() && !self.in_scope(&path) {
                continue;
            }
            reflection.path = Some(path);
            self.snapshot.reflections.push(reflection);
        }
        Ok(())
    }

    fn in_scope(&self, path: &CatalogPath) -> bool {
        let Some(root) = path.root() else {
            return false;
        };
        let root = CatalogPath::new([root]);
        self.holds(&root)
    }
}
