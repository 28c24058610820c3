//! Catalog snapshot model shared by the client and the toolkit.
//!
//! Every record keeps the attributes it does not name in a flattened map, so
//! a read, persist and push cycle loses nothing the server sent.

pub mod acl;
pub mod collaboration;
pub mod entity;
pub mod lineage;
pub mod path;
pub mod principal;
pub mod reflection;
pub mod snapshot;
pub mod sql;
pub mod wlm;

pub use acl::{AccessControlList, AclGrant, Owner};
pub use collaboration::{Tags, Wiki};
pub use entity::{
    CatalogRef, Container, ContainerType, Dataset, DatasetType, Entity, EntityBase, EntityKind,
    PathEntity, RefDatasetType, RefType,
};
pub use lineage::{Lineage, VdsDependency};
pub use path::CatalogPath;
pub use principal::{Principal, PrincipalKind};
pub use reflection::Reflection;
pub use snapshot::{EnvironmentSnapshot, FILE_VERSION};
pub use sql::{JobHandle, JobResults, JobState, JobStatus, SqlRequest};
pub use wlm::{Vote, WlmQueue, WlmRule};
