//! Access control lists and ownership.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::principal::PrincipalKind;

/// One principal's grant on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclGrant {
    pub id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl AclGrant {
    pub fn new<I, S>(id: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlList {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<AclGrant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<AclGrant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<AclGrant>,
    /// Concurrency counter. Older servers send it as a number, newer ones as
    /// a string; it is kept as a string either way.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_string_or_number"
    )]
    pub version: Option<String>,
}

impl AccessControlList {
    pub fn grants(&self, kind: PrincipalKind) -> &[AclGrant] {
        match kind {
            PrincipalKind::User => &self.users,
            PrincipalKind::Group => &self.groups,
            PrincipalKind::Role => &self.roles,
        }
    }

    pub fn grants_mut(&mut self, kind: PrincipalKind) -> &mut Vec<AclGrant> {
        match kind {
            PrincipalKind::User => &mut self.users,
            PrincipalKind::Group => &mut self.groups,
            PrincipalKind::Role => &mut self.roles,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty() && self.roles.is_empty()
    }

    /// Grant-wise equality, ignoring the version counter and grant order.
    pub fn same_grants(&self, other: &AccessControlList) -> bool {
        PrincipalKind::ALL.iter().all(|kind| {
            let mut mine: Vec<_> = self.grants(*kind).iter().map(normalized).collect();
            let mut theirs: Vec<_> = other.grants(*kind).iter().map(normalized).collect();
            mine.sort();
            theirs.sort();
            mine == theirs
        })
    }
}

fn normalized(grant: &AclGrant) -> (String, Vec<String>) {
    let mut permissions = grant.permissions.clone();
    permissions.sort();
    (grant.id.clone(), permissions)
}

/// Entity owner reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub owner_id: String,
    pub owner_type: PrincipalKind,
}

fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
