use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The three kinds of principal an ACL or owner can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalKind {
    User,
    Group,
    Role,
}

impl PrincipalKind {
    pub const ALL: [PrincipalKind; 3] = [Self::User, Self::Group, Self::Role];

    /// Path segment used by the REST API (`user`, `group`, `role`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Role => "role",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user, group or role record as returned by the catalog.
///
/// Only `id` and `name` matter for reconciliation; everything else the
/// server returns is kept in `extra` so snapshots stay faithful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Principal {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// Append `principal` unless a record with the same id is already present.
pub fn push_unique(list: &mut Vec<Principal>, principal: Principal) {
    if !list.iter().any(|p| p.id == principal.id) {
        list.push(principal);
    }
}
