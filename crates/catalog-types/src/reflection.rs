//! Reflections (materialized accelerations of a dataset).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::path::CatalogPath;

/// Attributes the server maintains; never sent back on write.
pub const SERVER_FIELDS: &[&str] = &[
    "createdAt",
    "updatedAt",
    "currentSizeBytes",
    "totalSizeBytes",
    "status",
    "canView",
    "canAlter",
];

/// Attributes that define a reflection. Two reflections agreeing on all of
/// these are the same materialization and must not be rewritten.
pub const DEFINING_FIELDS: &[&str] = &[
    "partitionDistributionStrategy",
    "measureFields",
    "dimensionFields",
    "displayFields",
    "sortFields",
    "partitionFields",
    "distributionFields",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reflection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub reflection_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    /// Path of the reflected dataset, attached when the snapshot is taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<CatalogPath>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reflection {
    /// Remove identity and server-maintained attributes, keeping only what a
    /// create or update request may carry.
    pub fn strip_server_fields(&mut self) {
        self.id = None;
        self.tag = None;
        self.path = None;
        for field in SERVER_FIELDS {
            self.extra.remove(*field);
        }
    }

    /// True when both reflections agree on type, name and every defining
    /// field. A field missing on both sides counts as equal.
    pub fn is_equivalent(&self, other: &Reflection) -> bool {
        self.reflection_type == other.reflection_type
            && self.name == other.name
            && DEFINING_FIELDS
                .iter()
                .all(|field| self.extra.get(*field) == other.extra.get(*field))
    }
}
