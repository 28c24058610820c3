//! Cross-environment principal resolution.
//!
//! Principal ids are only meaningful inside the environment that issued
//! them. Before anything is written, every principal the snapshot references
//! is looked up by name in the target and the source id is mapped to the
//! target id.

use std::collections::HashMap;

use catalog_client::CatalogClient;
use catalog_types::{AccessControlList, EnvironmentSnapshot, Owner, PrincipalKind};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::report::ExceptionReport;

#[derive(Debug, Default, Clone)]
pub struct PrincipalMap {
    ids: HashMap<(PrincipalKind, String), String>,
}

impl PrincipalMap {
    /// One lookup per referenced principal, no retries. Unresolved users and
    /// groups are warned about; an unresolved role is an object failure since
    /// roles must exist in the target beforehand.
    pub async fn resolve(
        snapshot: &EnvironmentSnapshot,
        target: &dyn CatalogClient,
        report: &mut ExceptionReport,
    ) -> Result<Self> {
        let mut map = Self::default();
        for kind in PrincipalKind::ALL {
            for principal in snapshot.referenced(kind) {
                match target.lookup_principal_by_name(kind, &principal.name).await? {
                    Some(found) => {
                        debug!(%kind, name = %principal.name, source_id = %principal.id, target_id = %found.id, "Principal resolved");
                        map.insert(kind, &principal.id, found.id);
                    }
                    None if kind == PrincipalKind::Role => report.record(
                        kind.as_str(),
                        &principal.name,
                        "Unable to resolve role in target environment",
                    ),
                    None => warn!(%kind, name = %principal.name, "Principal not found in target, grants dropped"),
                }
            }
        }
        info!(resolved = map.len(), "Principals resolved");
        Ok(map)
    }

    pub fn insert(&mut self, kind: PrincipalKind, source_id: &str, target_id: impl Into<String>) {
        self.ids
            .insert((kind, source_id.to_string()), target_id.into());
    }

    pub fn target_id(&self, kind: PrincipalKind, source_id: &str) -> Option<&str> {
        self.ids
            .get(&(kind, source_id.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Rewrite every grant to its target id, dropping unresolved ones. The
    /// version is cleared; the caller sets it for create or update.
    pub fn remap_acl(&self, acl: &AccessControlList) -> AccessControlList {
        let mut remapped = AccessControlList::default();
        for kind in PrincipalKind::ALL {
            for grant in acl.grants(kind) {
                match self.target_id(kind, &grant.id) {
                    Some(target_id) => {
                        let mut grant = grant.clone();
                        grant.id = target_id.to_string();
                        remapped.grants_mut(kind).push(grant);
                    }
                    None => debug!(%kind, id = %grant.id, "Unresolved grant dropped"),
                }
            }
        }
        remapped
    }

    /// `None` lets the target assign its default owner.
    pub fn remap_owner(&self, owner: &Owner) -> Option<Owner> {
        match self.target_id(owner.owner_type, &owner.owner_id) {
            Some(target_id) => Some(Owner {
                owner_id: target_id.to_string(),
                owner_type: owner.owner_type,
            }),
            None => {
                warn!(kind = %owner.owner_type, id = %owner.owner_id, "Owner not resolvable in target, default owner applies");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_client::InMemoryCatalog;
    use catalog_types::{AclGrant, Principal};
    use proptest::prelude::*;

    #[tokio::test]
    async fn resolves_by_name_and_reports_missing_roles() {
        let target = InMemoryCatalog::new("target");
        target.add_principal(PrincipalKind::User, "T-u1", "alice");
        target.add_principal(PrincipalKind::Role, "T-r1", "analysts");

        let mut snapshot = EnvironmentSnapshot::new("source");
        snapshot.add_referenced(PrincipalKind::User, Principal::new("S-u1", "alice"));
        snapshot.add_referenced(PrincipalKind::User, Principal::new("S-u2", "bob"));
        snapshot.add_referenced(PrincipalKind::Role, Principal::new("S-r1", "analysts"));
        snapshot.add_referenced(PrincipalKind::Role, Principal::new("S-r2", "auditors"));

        let mut report = ExceptionReport::new();
        let map = PrincipalMap::resolve(&snapshot, &target, &mut report)
            .await
            .unwrap();

        assert_eq!(map.target_id(PrincipalKind::User, "S-u1"), Some("T-u1"));
        assert_eq!(map.target_id(PrincipalKind::User, "S-u2"), None);
        assert_eq!(map.target_id(PrincipalKind::Role, "S-r1"), Some("T-r1"));
        assert_eq!(report.len(), 1);
        assert!(report.contains("role", "auditors"));
    }

    #[test]
    fn unresolved_owner_is_removed() {
        let map = PrincipalMap::default();
        let owner = Owner {
            owner_id: "S-u9".into(),
            owner_type: PrincipalKind::User,
        };
        assert_eq!(map.remap_owner(&owner), None);
    }

    fn kind_strategy() -> impl Strategy<Value = PrincipalKind> {
        prop_oneof![
            Just(PrincipalKind::User),
            Just(PrincipalKind::Group),
            Just(PrincipalKind::Role),
        ]
    }

    proptest! {
        /// Every grant that survives a remap names a target id.
        #[test]
        fn remapped_acl_only_contains_target_ids(
            grants in proptest::collection::vec((kind_strategy(), 0u8..8), 0..24),
            resolved in proptest::collection::hash_set(0u8..8, 0..8),
        ) {
            let mut map = PrincipalMap::default();
            for id in &resolved {
                for kind in PrincipalKind::ALL {
                    map.insert(kind, &format!("S-{id}"), format!("T-{id}"));
                }
            }
            let mut acl = AccessControlList { version: Some("4".into()), ..Default::default() };
            for (kind, id) in &grants {
                acl.grants_mut(*kind).push(AclGrant::new(format!("S-{id}"), ["SELECT"]));
            }

            let remapped = map.remap_acl(&acl);
            prop_assert!(remapped.version.is_none());
            for kind in PrincipalKind::ALL {
                for grant in remapped.grants(kind) {
                    prop_assert!(grant.id.starts_with("T-"));
                }
                let expected = acl
                    .grants(kind)
                    .iter()
                    .filter(|g| resolved.iter().any(|id| g.id == format!("S-{id}")))
                    .count();
                prop_assert_eq!(remapped.grants(kind).len(), expected);
            }
        }
    }
}
