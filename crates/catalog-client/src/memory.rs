//! In-memory catalog environment.
//!
//! Behaves like a small catalog server: writes are checked against the
//! concurrency tag and ACL version, principals in ACLs and owners must exist,
//! and a VDS can only be created once every dataset it depends on exists.
//! Test suites seed it, run the toolkit against it and inspect the result.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use catalog_types::{
    CatalogPath, CatalogRef, ContainerType, Dataset, DatasetType, Entity, EntityKind, JobHandle,
    JobResults, JobState, JobStatus, Lineage, Principal, PrincipalKind, RefDatasetType, RefType,
    Reflection, Tags, Vote, Wiki, WlmQueue, WlmRule,
};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::{CatalogClient, Result};

/// Number of successful mutating calls, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub creates: usize,
    pub updates: usize,
    pub promotions: usize,
    pub reflection_creates: usize,
    pub reflection_updates: usize,
    pub wiki_writes: usize,
    pub tag_writes: usize,
    pub sql_submissions: usize,
}

impl CallCounts {
    /// All catalog mutations. SQL submissions are not counted.
    pub fn writes(&self) -> usize {
        self.creates
            + self.updates
            + self.promotions
            + self.reflection_creates
            + self.reflection_updates
            + self.wiki_writes
            + self.tag_writes
    }
}

struct Job {
    status: JobStatus,
    rows: Vec<Map<String, Value>>,
}

#[derive(Default)]
struct State {
    entities: Vec<Entity>,
    principals: HashMap<PrincipalKind, Vec<Principal>>,
    reflections: Vec<Reflection>,
    wikis: HashMap<String, Wiki>,
    tags: HashMap<String, Tags>,
    dependencies: HashMap<CatalogPath, Vec<CatalogPath>>,
    queues: Vec<WlmQueue>,
    rules: Vec<WlmRule>,
    votes: Vec<Vote>,
    jobs: HashMap<String, Job>,
    sql_results: Vec<(String, Vec<Map<String, Value>>)>,
    failing_sql: Vec<String>,
    sql_log: Vec<String>,
    rejected_paths: HashSet<CatalogPath>,
    counts: CallCounts,
    next_tag: u64,
}

impl State {
    fn fresh_tag(&mut self) -> String {
        self.next_tag += 1;
        format!("tag-{}", self.next_tag)
    }

    fn find_by_path(&self, path: &CatalogPath) -> Option<usize> {
        self.entities.iter().position(|e| &e.path() == path)
    }

    fn find_by_id(&self, id: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.id() == Some(id))
    }

    fn knows(&self, kind: PrincipalKind, id: &str) -> bool {
        self.principals
            .get(&kind)
            .map(|list| list.iter().any(|p| p.id == id))
            .unwrap_or(false)
    }

    /// Every ACL grant and the owner must name a principal of this catalog.
    fn principals_valid(&self, entity: &Entity) -> bool {
        let base = entity.base();
        if let Some(acl) = &base.access_control_list {
            for kind in PrincipalKind::ALL {
                if acl.grants(kind).iter().any(|g| !self.knows(kind, &g.id)) {
                    return false;
                }
            }
        }
        match &base.owner {
            Some(owner) => self.knows(owner.owner_type, &owner.owner_id),
            None => true,
        }
    }

    fn with_children(&self, entity: &Entity) -> Entity {
        let mut entity = entity.clone();
        if !matches!(entity, Entity::Dataset(_) | Entity::File(_)) {
            let path = entity.path();
            let children = self
                .entities
                .iter()
                .filter(|e| e.path().parent().as_ref() == Some(&path))
                .map(entity_ref)
                .collect();
            entity.base_mut().children = Some(children);
        }
        entity
    }

    fn insert(&mut self, mut entity: Entity) -> Entity {
        let tag = self.fresh_tag();
        let base = entity.base_mut();
        if base.id.is_none() {
            base.id = Some(Uuid::new_v4().to_string());
        }
        base.tag = Some(tag);
        base.children = None;
        self.entities.push(entity.clone());
        entity
    }
}

pub struct InMemoryCatalog {
    endpoint: String,
    state: Mutex<State>,
}

impl InMemoryCatalog {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Seeding ────────────────────────────────────────────────

    pub fn add_principal(&self, kind: PrincipalKind, id: &str, name: &str) {
        self.state()
            .principals
            .entry(kind)
            .or_default()
            .push(Principal::new(id, name));
    }

    /// Store an entity as-is, assigning an id when it has none. Returns the id.
    pub fn seed_entity(&self, entity: Entity) -> String {
        let stored = self.state().insert(entity);
        stored.id().map(str::to_string).unwrap_or_default()
    }

    /// Parents reported by lineage for `vds`, and required to exist before
    /// the VDS can be created.
    pub fn declare_dependencies(&self, vds: CatalogPath, parents: Vec<CatalogPath>) {
        self.state().dependencies.insert(vds, parents);
    }

    pub fn seed_reflection(&self, mut reflection: Reflection) -> String {
        let mut state = self.state();
        let id = reflection
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        reflection.id = Some(id.clone());
        reflection.tag = Some(state.fresh_tag());
        state.reflections.push(reflection);
        id
    }

    pub fn seed_wiki(&self, entity_id: &str, text: &str) {
        let mut wiki = Wiki::new(text);
        wiki.version = Some(Value::from(0));
        self.state().wikis.insert(entity_id.to_string(), wiki);
    }

    pub fn seed_tags(&self, entity_id: &str, tags: &[&str]) {
        let mut record = Tags::new(tags.iter().copied());
        record.version = Some(Value::from("0"));
        self.state().tags.insert(entity_id.to_string(), record);
    }

    pub fn seed_queue(&self, queue: WlmQueue) {
        self.state().queues.push(queue);
    }

    pub fn seed_rule(&self, rule: WlmRule) {
        self.state().rules.push(rule);
    }

    pub fn seed_vote(&self, vote: Vote) {
        self.state().votes.push(vote);
    }

    /// Rows returned by any statement containing `needle`.
    pub fn set_sql_result(&self, needle: &str, rows: Vec<Map<String, Value>>) {
        self.state().sql_results.push((needle.to_string(), rows));
    }

    /// Jobs for statements containing `needle` end in `FAILED`.
    pub fn fail_sql(&self, needle: &str) {
        self.state().failing_sql.push(needle.to_string());
    }

    /// Creates and updates of `path` are rejected.
    pub fn reject_writes_to(&self, path: CatalogPath) {
        self.state().rejected_paths.insert(path);
    }

    // ── Inspection ─────────────────────────────────────────────

    pub fn counts(&self) -> CallCounts {
        self.state().counts
    }

    pub fn reset_counts(&self) {
        self.state().counts = CallCounts::default();
    }

    pub fn entity_at(&self, path: &CatalogPath) -> Option<Entity> {
        let state = self.state();
        state.find_by_path(path).map(|i| state.entities[i].clone())
    }

    pub fn entity_paths(&self) -> Vec<CatalogPath> {
        self.state().entities.iter().map(Entity::path).collect()
    }

    pub fn reflections(&self) -> Vec<Reflection> {
        self.state().reflections.clone()
    }

    pub fn wiki_of(&self, path: &CatalogPath) -> Option<Wiki> {
        let state = self.state();
        let id = state.find_by_path(path).and_then(|i| state.entities[i].id())?;
        state.wikis.get(id).cloned()
    }

    pub fn tags_of(&self, path: &CatalogPath) -> Option<Tags> {
        let state = self.state();
        let id = state.find_by_path(path).and_then(|i| state.entities[i].id())?;
        state.tags.get(id).cloned()
    }

    pub fn sql_log(&self) -> Vec<String> {
        self.state().sql_log.clone()
    }
}

fn entity_ref(entity: &Entity) -> CatalogRef {
    let (ref_type, container_type, dataset_type) = match entity.kind() {
        EntityKind::Home => (RefType::Container, Some(ContainerType::Home), None),
        EntityKind::Space => (RefType::Container, Some(ContainerType::Space), None),
        EntityKind::Source => (RefType::Container, Some(ContainerType::Source), None),
        EntityKind::Folder => (RefType::Container, Some(ContainerType::Folder), None),
        EntityKind::VirtualDataset => (RefType::Dataset, None, Some(RefDatasetType::Virtual)),
        EntityKind::PhysicalDataset => (RefType::Dataset, None, Some(RefDatasetType::Promoted)),
        EntityKind::File => (RefType::File, None, None),
    };
    CatalogRef {
        id: entity.id().map(str::to_string),
        path: entity.path(),
        ref_type,
        container_type,
        dataset_type,
        tag: entity.base().tag.clone(),
        created_at: None,
    }
}

fn next_version(current: Option<&Value>) -> Value {
    match current {
        Some(Value::Number(n)) => Value::from(n.as_u64().unwrap_or(0) + 1),
        Some(Value::String(s)) => Value::from((s.parse::<u64>().unwrap_or(0) + 1).to_string()),
        _ => Value::from(0),
    }
}

#[async_trait]
impl CatalogClient for InMemoryCatalog {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn lookup_principal_by_name(
        &self,
        kind: PrincipalKind,
        name: &str,
    ) -> Result<Option<Principal>> {
        Ok(self
            .state()
            .principals
            .get(&kind)
            .and_then(|list| list.iter().find(|p| p.name == name).cloned()))
    }

    async fn get_principal_by_id(
        &self,
        kind: PrincipalKind,
        id: &str,
    ) -> Result<Option<Principal>> {
        Ok(self
            .state()
            .principals
            .get(&kind)
            .and_then(|list| list.iter().find(|p| p.id == id).cloned()))
    }

    async fn list_containers(&self) -> Result<Option<Vec<CatalogRef>>> {
        let state = self.state();
        Ok(Some(
            state
                .entities
                .iter()
                .filter(|e| {
                    matches!(
                        e.kind(),
                        EntityKind::Home | EntityKind::Space | EntityKind::Source
                    )
                })
                .map(entity_ref)
                .collect(),
        ))
    }

    async fn get_entity_by_path(&self, path: &CatalogPath) -> Result<Option<Entity>> {
        let state = self.state();
        Ok(state
            .find_by_path(path)
            .map(|i| state.with_children(&state.entities[i])))
    }

    async fn get_entity_by_id(&self, id: &str) -> Result<Option<Entity>> {
        if let Some(path) = id.strip_prefix("dremio:") {
            let path: CatalogPath = path.parse().unwrap_or_default();
            return self.get_entity_by_path(&path).await;
        }
        let state = self.state();
        Ok(state
            .find_by_id(id)
            .map(|i| state.with_children(&state.entities[i])))
    }

    async fn create_entity(&self, entity: &Entity) -> Result<Option<Entity>> {
        let mut state = self.state();
        let path = entity.path();
        if state.rejected_paths.contains(&path) {
            debug!(%path, "create rejected by failure injection");
            return Ok(None);
        }
        if state.find_by_path(&path).is_some() {
            debug!(%path, "create conflicts with an existing entity");
            return Ok(None);
        }
        if let Some(parent) = path.parent() {
            if state.find_by_path(&parent).is_none() {
                debug!(%path, "create under a missing parent");
                return Ok(None);
            }
        }
        if entity.is_virtual_dataset() {
            if let Some(parents) = state.dependencies.get(&path) {
                let missing = parents.iter().find(|p| {
                    state
                        .find_by_path(p)
                        .map(|i| state.entities[i].as_dataset().is_none())
                        .unwrap_or(true)
                });
                if let Some(missing) = missing {
                    debug!(%path, %missing, "VDS depends on a dataset that does not exist");
                    return Ok(None);
                }
            }
        }
        if !state.principals_valid(entity) {
            debug!(%path, "create references unknown principals");
            return Ok(None);
        }

        let mut stored = entity.clone();
        stored.base_mut().id = None;
        if let Some(acl) = stored.base_mut().access_control_list.as_mut() {
            acl.version = Some("0".to_string());
        }
        let created = state.insert(stored);
        state.counts.creates += 1;
        Ok(Some(created))
    }

    async fn update_entity(&self, id: &str, entity: &Entity) -> Result<Option<Entity>> {
        let mut state = self.state();
        let Some(index) = state.find_by_id(id) else {
            return Ok(None);
        };
        let current = state.entities[index].clone();
        let path = current.path();
        if state.rejected_paths.contains(&path) {
            debug!(%path, "update rejected by failure injection");
            return Ok(None);
        }
        if entity.path() != path || entity.kind() != current.kind() {
            debug!(%path, "update may not move or retype an entity");
            return Ok(None);
        }
        if entity.base().tag != current.base().tag {
            debug!(%path, "stale concurrency tag");
            return Ok(None);
        }
        let current_acl_version = current
            .base()
            .access_control_list
            .as_ref()
            .and_then(|acl| acl.version.clone());
        if let Some(acl) = &entity.base().access_control_list {
            if current_acl_version.is_some() && acl.version != current_acl_version {
                debug!(%path, "stale ACL version");
                return Ok(None);
            }
        }
        if !state.principals_valid(entity) {
            debug!(%path, "update references unknown principals");
            return Ok(None);
        }

        let mut updated = entity.clone();
        let tag = state.fresh_tag();
        {
            let base = updated.base_mut();
            base.id = Some(id.to_string());
            base.tag = Some(tag);
            base.children = None;
            base.created_at = current.base().created_at.clone();
            if let Some(acl) = base.access_control_list.as_mut() {
                let bumped = current_acl_version
                    .as_deref()
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(|v| v + 1)
                    .unwrap_or(0);
                acl.version = Some(bumped.to_string());
            }
        }
        state.entities[index] = updated.clone();
        state.counts.updates += 1;
        Ok(Some(updated))
    }

    async fn promote_physical_dataset(&self, dataset: &Entity) -> Result<Option<Entity>> {
        let mut state = self.state();
        let path = dataset.path();
        let Some(index) = state.find_by_path(&path) else {
            return Ok(None);
        };
        if !matches!(state.entities[index], Entity::Folder(_) | Entity::File(_)) {
            debug!(%path, "only folders and files can be promoted");
            return Ok(None);
        }
        let mut base = dataset.base().clone();
        base.id = Some(Uuid::new_v4().to_string());
        base.tag = Some(state.fresh_tag());
        base.children = None;
        let promoted = Entity::Dataset(Dataset {
            path,
            dataset_type: DatasetType::PhysicalDataset,
            sql: None,
            sql_context: None,
            base,
        });
        state.entities[index] = promoted.clone();
        state.counts.promotions += 1;
        Ok(Some(promoted))
    }

    async fn get_lineage(&self, entity_id: &str) -> Result<Option<Lineage>> {
        let state = self.state();
        let Some(index) = state.find_by_id(entity_id) else {
            return Ok(None);
        };
        let path = state.entities[index].path();
        let parents = state
            .dependencies
            .get(&path)
            .map(|parents| {
                parents
                    .iter()
                    .map(|p| match state.find_by_path(p) {
                        Some(i) => entity_ref(&state.entities[i]),
                        None => CatalogRef {
                            id: None,
                            path: p.clone(),
                            ref_type: RefType::Dataset,
                            container_type: None,
                            dataset_type: None,
                            tag: None,
                            created_at: None,
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(Lineage {
            parents,
            children: Vec::new(),
        }))
    }

    async fn list_reflections(&self) -> Result<Option<Vec<Reflection>>> {
        Ok(Some(self.state().reflections.clone()))
    }

    async fn create_reflection(&self, reflection: &Reflection) -> Result<Option<Reflection>> {
        let mut state = self.state();
        let dataset_known = reflection
            .dataset_id
            .as_deref()
            .map(|id| state.find_by_id(id).is_some())
            .unwrap_or(false);
        if !dataset_known {
            return Ok(None);
        }
        let mut stored = reflection.clone();
        stored.id = Some(Uuid::new_v4().to_string());
        stored.tag = Some(state.fresh_tag());
        state.reflections.push(stored.clone());
        state.counts.reflection_creates += 1;
        Ok(Some(stored))
    }

    async fn update_reflection(
        &self,
        id: &str,
        reflection: &Reflection,
    ) -> Result<Option<Reflection>> {
        let mut state = self.state();
        let Some(index) = state.reflections.iter().position(|r| r.id.as_deref() == Some(id))
        else {
            return Ok(None);
        };
        if reflection.tag != state.reflections[index].tag {
            return Ok(None);
        }
        let mut stored = reflection.clone();
        stored.id = Some(id.to_string());
        stored.tag = Some(state.fresh_tag());
        state.reflections[index] = stored.clone();
        state.counts.reflection_updates += 1;
        Ok(Some(stored))
    }

    async fn get_wiki(&self, entity_id: &str) -> Result<Option<Wiki>> {
        Ok(self.state().wikis.get(entity_id).cloned())
    }

    async fn update_wiki(&self, entity_id: &str, wiki: &Wiki) -> Result<Option<Wiki>> {
        let mut state = self.state();
        if state.find_by_id(entity_id).is_none() {
            return Ok(None);
        }
        let current = state.wikis.get(entity_id).and_then(|w| w.version.clone());
        if current.is_some() && wiki.version != current {
            return Ok(None);
        }
        let mut stored = Wiki::new(wiki.text.clone());
        stored.version = Some(match current {
            Some(v) => next_version(Some(&v)),
            None => Value::from(0),
        });
        state.wikis.insert(entity_id.to_string(), stored.clone());
        state.counts.wiki_writes += 1;
        Ok(Some(stored))
    }

    async fn get_tags(&self, entity_id: &str) -> Result<Option<Tags>> {
        Ok(self.state().tags.get(entity_id).cloned())
    }

    async fn update_tags(&self, entity_id: &str, tags: &Tags) -> Result<Option<Tags>> {
        let mut state = self.state();
        if state.find_by_id(entity_id).is_none() {
            return Ok(None);
        }
        let current = state.tags.get(entity_id).and_then(|t| t.version.clone());
        if current.is_some() && tags.version != current {
            return Ok(None);
        }
        let mut stored = Tags::new(tags.tags.iter().cloned());
        stored.version = Some(match current {
            Some(v) => next_version(Some(&v)),
            None => Value::from("0"),
        });
        state.tags.insert(entity_id.to_string(), stored.clone());
        state.counts.tag_writes += 1;
        Ok(Some(stored))
    }

    async fn list_queues(&self) -> Result<Option<Vec<WlmQueue>>> {
        Ok(Some(self.state().queues.clone()))
    }

    async fn list_rules(&self) -> Result<Option<Vec<WlmRule>>> {
        Ok(Some(self.state().rules.clone()))
    }

    async fn list_votes(&self) -> Result<Option<Vec<Vote>>> {
        Ok(Some(self.state().votes.clone()))
    }

    async fn submit_sql(
        &self,
        sql: &str,
        _context: Option<&CatalogPath>,
    ) -> Result<Option<JobHandle>> {
        let mut state = self.state();
        state.sql_log.push(sql.to_string());
        state.counts.sql_submissions += 1;

        let failed = state.failing_sql.iter().any(|needle| sql.contains(needle));
        let rows = state
            .sql_results
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        let mut status = JobStatus::new(if failed {
            JobState::Failed
        } else {
            JobState::Completed
        });
        status.row_count = Some(rows.len() as u64);
        if failed {
            status.error_message = Some("statement failed".to_string());
        }

        let id = Uuid::new_v4().to_string();
        state.jobs.insert(id.clone(), Job { status, rows });
        Ok(Some(JobHandle { id }))
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<JobStatus>> {
        Ok(self.state().jobs.get(job_id).map(|job| job.status.clone()))
    }

    async fn get_job_results(
        &self,
        job_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Option<JobResults>> {
        let state = self.state();
        Ok(state.jobs.get(job_id).map(|job| JobResults {
            row_count: job.rows.len() as u64,
            rows: job.rows.iter().skip(offset).take(limit).cloned().collect(),
        }))
    }
}
