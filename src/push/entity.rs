//! Create-or-update of a single catalog entity.

use catalog_client::CatalogClient;
use catalog_types::{CatalogPath, Dataset, DatasetType, Entity, EntityBase, EntityKind};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::principals::PrincipalMap;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    /// Target already matches the payload; nothing was sent.
    Unchanged,
    Failed,
}

impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Push one entity to the target.
///
/// The payload is stripped of server fields and its principals are remapped.
/// An absent entity is created with ACL version `"0"`; a present one is
/// updated under the target's id, tag and ACL version, unless every field
/// already matches. The caller's entity is never modified, so a failed
/// update leaves no borrowed id or tag behind. `Err` only for fatal client
/// errors.
pub async fn write_entity(
    client: &dyn CatalogClient,
    principals: &PrincipalMap,
    entity: &Entity,
) -> Result<WriteOutcome> {
    let mut payload = prepare_payload(principals, entity);
    let path = payload.path();

    let Some(existing) = get_existing(client, &path).await? else {
        if let Some(acl) = payload.base_mut().access_control_list.as_mut() {
            acl.version = Some("0".to_string());
        }
        return Ok(match client.create_entity(&payload).await? {
            Some(_) => {
                info!(entity = %payload.label(), "Created");
                WriteOutcome::Created
            }
            None => WriteOutcome::Failed,
        });
    };

    let Some(target_id) = existing.id().map(str::to_string) else {
        debug!(entity = %payload.label(), "Existing entity has no id");
        return Ok(WriteOutcome::Failed);
    };
    {
        let existing_base = existing.base();
        let base = payload.base_mut();
        base.id = Some(target_id.clone());
        base.tag = existing_base.tag.clone();
        if let Some(acl) = base.access_control_list.as_mut() {
            acl.version = existing_base
                .access_control_list
                .as_ref()
                .and_then(|current| current.version.clone());
        }
    }

    if is_unchanged(&payload, &existing) {
        debug!(entity = %payload.label(), "Unchanged");
        return Ok(WriteOutcome::Unchanged);
    }

    match client.update_entity(&target_id, &payload).await? {
        Some(_) => {
            info!(entity = %payload.label(), "Updated");
            Ok(WriteOutcome::Updated)
        }
        None => Ok(WriteOutcome::Failed),
    }
}

/// The target's entity at `path`, if any.
pub async fn get_existing(client: &dyn CatalogClient, path: &CatalogPath) -> Result<Option<Entity>> {
    Ok(client.get_entity_by_path(path).await?)
}

fn prepare_payload(principals: &PrincipalMap, entity: &Entity) -> Entity {
    let mut payload = entity.clone();
    payload.strip_server_fields();
    let personal = payload.is_personal();
    let base = payload.base_mut();
    base.access_control_list = match &base.access_control_list {
        Some(_) if personal => None,
        Some(acl) => Some(principals.remap_acl(acl)),
        None => None,
    };
    base.owner = base.owner.as_ref().and_then(|owner| principals.remap_owner(owner));
    payload
}

/// Every attribute the payload carries already has the same value in the
/// target. ACLs compare grant-wise.
fn is_unchanged(payload: &Entity, existing: &Entity) -> bool {
    let acl_same = match (
        &payload.base().access_control_list,
        &existing.base().access_control_list,
    ) {
        (Some(mine), Some(theirs)) => mine.same_grants(theirs),
        (Some(mine), None) => mine.is_empty(),
        (None, _) => true,
    };
    if !acl_same {
        return false;
    }

    let (Ok(Value::Object(mine)), Ok(Value::Object(theirs))) =
        (serde_json::to_value(payload), serde_json::to_value(existing))
    else {
        return false;
    };
    mine.iter()
        .filter(|(key, _)| !matches!(key.as_str(), "id" | "tag" | "accessControlList"))
        .all(|(key, value)| theirs.get(key) == Some(value))
}

// ── Physical dataset promotion ────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// Already a dataset in the target.
    NotNeeded,
    Promoted,
    NotFound,
    /// Exists but is neither a folder nor a file.
    NotPromotable(EntityKind),
    Failed,
}

/// Make sure a physical dataset referenced by some VDS exists in the target,
/// promoting the folder or file at its path when needed.
pub async fn promote_referenced_pds(
    client: &dyn CatalogClient,
    path: &CatalogPath,
) -> Result<Promotion> {
    let Some(found) = client.get_entity_by_path(path).await? else {
        return Ok(Promotion::NotFound);
    };
    let kind = found.kind();
    match kind {
        EntityKind::PhysicalDataset | EntityKind::VirtualDataset => return Ok(Promotion::NotNeeded),
        EntityKind::Folder | EntityKind::File => {}
        other => return Ok(Promotion::NotPromotable(other)),
    }

    let format = found
        .base()
        .extra
        .get("format")
        .cloned()
        .unwrap_or_else(|| json!({"type": "Parquet"}));
    let mut extra = Map::new();
    extra.insert("format".to_string(), format);
    let payload = Entity::Dataset(Dataset {
        path: path.clone(),
        dataset_type: DatasetType::PhysicalDataset,
        sql: None,
        sql_context: None,
        base: EntityBase {
            id: found.id().map(str::to_string),
            extra,
            ..Default::default()
        },
    });

    Ok(match client.promote_physical_dataset(&payload).await? {
        Some(_) => {
            info!(pds = %path, from = %kind, "Promoted to physical dataset");
            Promotion::Promoted
        }
        None => Promotion::Failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_client::InMemoryCatalog;
    use catalog_types::{AccessControlList, AclGrant, PrincipalKind};

    fn entity(value: Value) -> Entity {
        serde_json::from_value(value).unwrap()
    }

    fn target() -> InMemoryCatalog {
        let target = InMemoryCatalog::new("target");
        target.add_principal(PrincipalKind::User, "T-u1", "alice");
        target.seed_entity(entity(json!({"entityType": "space", "name": "Sales"})));
        target
    }

    fn principals() -> PrincipalMap {
        let mut map = PrincipalMap::default();
        map.insert(PrincipalKind::User, "S-u1", "T-u1");
        map
    }

    fn folder_with_acl() -> Entity {
        entity(json!({
            "entityType": "folder", "id": "S-f1", "tag": "S-tag", "path": ["Sales", "staging"],
            "accessControlList": {"users": [{"id": "S-u1", "permissions": ["SELECT"]}], "version": "9"}
        }))
    }

    #[tokio::test]
    async fn create_then_rewrite_is_idempotent() {
        let target = target();
        let map = principals();
        let folder = folder_with_acl();

        let first = write_entity(&target, &map, &folder).await.unwrap();
        assert_eq!(first, WriteOutcome::Created);
        let stored = target.entity_at(&folder.path()).unwrap();
        let acl = stored.base().access_control_list.as_ref().unwrap();
        assert_eq!(acl.version.as_deref(), Some("0"));
        assert_eq!(acl.users[0].id, "T-u1");
        let tag = stored.base().tag.clone();

        let second = write_entity(&target, &map, &folder).await.unwrap();
        assert_eq!(second, WriteOutcome::Unchanged);
        assert_eq!(target.entity_at(&folder.path()).unwrap().base().tag, tag);
        assert_eq!(target.counts().writes(), 1);
    }

    #[tokio::test]
    async fn changed_payload_updates_under_target_tag() {
        let target = target();
        let map = principals();
        write_entity(&target, &map, &folder_with_acl()).await.unwrap();

        let mut changed = folder_with_acl();
        changed.base_mut().access_control_list = Some(AccessControlList {
            users: vec![AclGrant::new("S-u1", ["SELECT", "ALTER"])],
            ..Default::default()
        });
        let outcome = write_entity(&target, &map, &changed).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Updated);

        let stored = target.entity_at(&changed.path()).unwrap();
        let acl = stored.base().access_control_list.as_ref().unwrap();
        assert_eq!(acl.version.as_deref(), Some("1"));
        assert_eq!(acl.users[0].permissions.len(), 2);
    }

    #[tokio::test]
    async fn personal_entities_never_carry_an_acl() {
        let target = InMemoryCatalog::new("target");
        target.seed_entity(entity(json!({"entityType": "home", "name": "@alice"})));
        let folder = entity(json!({
            "entityType": "folder", "path": ["@alice", "scratch"],
            "accessControlList": {"users": [{"id": "S-u1", "permissions": ["SELECT"]}]}
        }));
        let outcome = write_entity(&target, &principals(), &folder).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Created);
        let stored = target.entity_at(&folder.path()).unwrap();
        assert!(stored.base().access_control_list.is_none());
    }

    #[tokio::test]
    async fn rejected_write_is_a_failure_not_an_error() {
        let target = target();
        target.reject_writes_to(CatalogPath::new(["Sales", "staging"]));
        let outcome = write_entity(&target, &principals(), &folder_with_acl())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Failed);
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn promotes_folders_and_leaves_datasets_alone() {
        let target = InMemoryCatalog::new("target");
        target.seed_entity(entity(json!({"entityType": "source", "name": "Source1"})));
        target.seed_entity(entity(json!({"entityType": "folder", "path": ["Source1", "table1"]})));
        let path = CatalogPath::new(["Source1", "table1"]);

        assert_eq!(
            promote_referenced_pds(&target, &path).await.unwrap(),
            Promotion::Promoted
        );
        assert!(target.entity_at(&path).unwrap().is_physical_dataset());
        assert_eq!(
            promote_referenced_pds(&target, &path).await.unwrap(),
            Promotion::NotNeeded
        );
        assert_eq!(
            promote_referenced_pds(&target, &CatalogPath::new(["Source1", "nope"]))
                .await
                .unwrap(),
            Promotion::NotFound
        );
        assert_eq!(
            promote_referenced_pds(&target, &CatalogPath::new(["Source1"]))
                .await
                .unwrap(),
            Promotion::NotPromotable(EntityKind::Source)
        );
    }
}
