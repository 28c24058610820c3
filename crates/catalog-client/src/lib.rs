//! CatalogClient trait: the only boundary between the toolkit and a catalog
//! environment. The toolkit depends on this crate, never on HTTP directly.

pub mod error;
pub mod http;
pub mod memory;

use async_trait::async_trait;
use catalog_types::{
    CatalogPath, CatalogRef, Entity, JobHandle, JobResults, JobStatus, Lineage, Principal,
    PrincipalKind, Reflection, Tags, Vote, Wiki, WlmQueue, WlmRule,
};

pub use error::ClientError;
pub use http::{ClientConfig, RestCatalogClient};
pub use memory::{CallCounts, InMemoryCatalog};

pub type Result<T> = std::result::Result<T, ClientError>;

/// Read and write access to one catalog environment.
///
/// `Ok(None)` means the remote call failed in a way the caller is expected
/// to absorb. `Err` is reserved for authentication failures and responses
/// whose shape the client does not understand.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Base URL (or label) of the environment.
    fn endpoint(&self) -> &str;

    // ── Principals ─────────────────────────────────────────────

    async fn lookup_principal_by_name(
        &self,
        kind: PrincipalKind,
        name: &str,
    ) -> Result<Option<Principal>>;

    async fn get_principal_by_id(&self, kind: PrincipalKind, id: &str)
        -> Result<Option<Principal>>;

    // ── Catalog ────────────────────────────────────────────────

    async fn list_containers(&self) -> Result<Option<Vec<CatalogRef>>>;

    async fn get_entity_by_path(&self, path: &CatalogPath) -> Result<Option<Entity>>;

    async fn get_entity_by_id(&self, id: &str) -> Result<Option<Entity>>;

    async fn create_entity(&self, entity: &Entity) -> Result<Option<Entity>>;

    /// Update by id. The payload must carry the current concurrency tag.
    async fn update_entity(&self, id: &str, entity: &Entity) -> Result<Option<Entity>>;

    /// Register a folder or file of a file-based source as a physical
    /// dataset. The payload carries the id of the folder or file.
    async fn promote_physical_dataset(&self, dataset: &Entity) -> Result<Option<Entity>>;

    async fn get_lineage(&self, entity_id: &str) -> Result<Option<Lineage>>;

    // ── Reflections ────────────────────────────────────────────

    async fn list_reflections(&self) -> Result<Option<Vec<Reflection>>>;

    async fn create_reflection(&self, reflection: &Reflection) -> Result<Option<Reflection>>;

    async fn update_reflection(
        &self,
        id: &str,
        reflection: &Reflection,
    ) -> Result<Option<Reflection>>;

    // ── Collaboration ──────────────────────────────────────────

    async fn get_wiki(&self, entity_id: &str) -> Result<Option<Wiki>>;

    /// Creates the wiki when the payload has no version, updates otherwise.
    async fn update_wiki(&self, entity_id: &str, wiki: &Wiki) -> Result<Option<Wiki>>;

    async fn get_tags(&self, entity_id: &str) -> Result<Option<Tags>>;

    async fn update_tags(&self, entity_id: &str, tags: &Tags) -> Result<Option<Tags>>;

    // ── Workload management ────────────────────────────────────

    async fn list_queues(&self) -> Result<Option<Vec<WlmQueue>>>;

    async fn list_rules(&self) -> Result<Option<Vec<WlmRule>>>;

    async fn list_votes(&self) -> Result<Option<Vec<Vote>>>;

    // ── SQL ────────────────────────────────────────────────────

    /// Submit without waiting for completion.
    async fn submit_sql(&self, sql: &str, context: Option<&CatalogPath>)
        -> Result<Option<JobHandle>>;

    async fn get_job(&self, job_id: &str) -> Result<Option<JobStatus>>;

    async fn get_job_results(
        &self,
        job_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Option<JobResults>>;
}
