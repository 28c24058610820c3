//! Push engine scenarios against the in-memory catalog.
//!
//! Run with: cargo test --test push_snapshot

use std::sync::Arc;

use catalog_client::{CatalogClient, InMemoryCatalog};
use catalog_toolkit::push::{PushOutcome, SnapshotPusher};
use catalog_toolkit::report::EXIT_NON_FATAL;
use catalog_types::{
    CatalogPath, Entity, EnvironmentSnapshot, Principal, PrincipalKind, VdsDependency,
};
use serde_json::{json, Value};

fn entity(value: Value) -> Entity {
    serde_json::from_value(value).unwrap()
}

fn path(segments: &[&str]) -> CatalogPath {
    CatalogPath::from(segments)
}

async fn push(target: &Arc<InMemoryCatalog>, snapshot: EnvironmentSnapshot) -> PushOutcome {
    let client: Arc<dyn CatalogClient> = target.clone();
    SnapshotPusher::new(client).push(snapshot).await.unwrap()
}

/// Target with a file source holding one promotable folder.
fn target_with_source() -> Arc<InMemoryCatalog> {
    let target = Arc::new(InMemoryCatalog::new("http://target:9047"));
    target.add_principal(PrincipalKind::User, "T-u1", "alice");
    target.seed_entity(entity(json!({"entityType": "source", "name": "Source1", "type": "S3"})));
    target.seed_entity(entity(json!({"entityType": "folder", "path": ["Source1", "table1"]})));
    target
}

/// VDS A (unqualified `B` under sqlContext Sales) on top of VDS B, which
/// reads the physical dataset Source1/table1.
fn layered_snapshot() -> EnvironmentSnapshot {
    let mut snapshot = EnvironmentSnapshot::new("http://source:9047");
    snapshot.add_referenced(PrincipalKind::User, Principal::new("S-u1", "alice"));
    snapshot.spaces.push(entity(json!({
        "entityType": "space", "id": "S-sales", "name": "Sales",
        "accessControlList": {"users": [{"id": "S-u1", "permissions": ["SELECT"]}]}
    })));
    snapshot.vds.push(entity(json!({
        "entityType": "dataset", "type": "VIRTUAL_DATASET", "id": "S-a", "path": ["Sales", "A"],
        "sql": "SELECT * FROM B", "sqlContext": ["Sales"]
    })));
    snapshot.vds.push(entity(json!({
        "entityType": "dataset", "type": "VIRTUAL_DATASET", "id": "S-b", "path": ["Sales", "B"],
        "sql": "SELECT * FROM Source1.table1"
    })));
    snapshot.vds_parents = vec![
        VdsDependency::new(Some("S-a".into()), path(&["Sales", "A"]), vec![path(&["B"])]),
        VdsDependency::new(
            Some("S-b".into()),
            path(&["Sales", "B"]),
            vec![path(&["Source1", "table1"])],
        ),
    ];
    snapshot
}

fn declare_layering(target: &InMemoryCatalog) {
    target.declare_dependencies(path(&["Sales", "A"]), vec![path(&["Sales", "B"])]);
    target.declare_dependencies(path(&["Sales", "B"]), vec![path(&["Source1", "table1"])]);
}

#[tokio::test]
async fn dependent_views_are_written_after_their_parents() {
    let target = target_with_source();
    declare_layering(&target);

    let outcome = push(&target, layered_snapshot()).await;

    assert!(outcome.report.is_empty(), "{:?}", outcome.report.entries());
    assert!(target.entity_at(&path(&["Source1", "table1"])).unwrap().is_physical_dataset());
    assert!(target.entity_at(&path(&["Sales", "B"])).unwrap().is_virtual_dataset());
    assert!(target.entity_at(&path(&["Sales", "A"])).unwrap().is_virtual_dataset());
    let counts = target.counts();
    assert_eq!(counts.promotions, 1);
    assert_eq!(counts.creates, 3);
}

#[tokio::test]
async fn second_push_writes_nothing() {
    let target = target_with_source();
    declare_layering(&target);
    let mut snapshot = layered_snapshot();
    snapshot.wikis.push(serde_json::from_value(json!({"text": "sales docs", "path": ["Sales"]})).unwrap());
    snapshot.tags.push(serde_json::from_value(json!({"tags": ["gold"], "path": ["Sales", "A"]})).unwrap());
    snapshot.reflections.push(serde_json::from_value(json!({
        "name": "raw_a", "type": "RAW", "datasetId": "S-a", "path": ["Sales", "A"],
        "displayFields": [{"name": "x"}], "status": {"availability": "AVAILABLE"}
    })).unwrap());

    let first = push(&target, snapshot.clone()).await;
    assert!(first.report.is_empty(), "{:?}", first.report.entries());
    assert_eq!(target.counts().reflection_creates, 1);
    assert_eq!(target.counts().wiki_writes, 1);
    assert_eq!(target.counts().tag_writes, 1);

    let tag_of_a = target.entity_at(&path(&["Sales", "A"])).unwrap().base().tag.clone();
    target.reset_counts();
    let second = push(&target, snapshot).await;

    assert!(second.report.is_empty(), "{:?}", second.report.entries());
    assert_eq!(target.counts().writes(), 0);
    assert_eq!(second.counters.created + second.counters.updated, 0);
    assert_eq!(
        target.entity_at(&path(&["Sales", "A"])).unwrap().base().tag,
        tag_of_a
    );
}

#[tokio::test]
async fn unresolvable_owner_degrades_to_default() {
    let target = target_with_source();
    let mut snapshot = EnvironmentSnapshot::new("http://source:9047");
    snapshot.add_referenced(PrincipalKind::User, Principal::new("S-ghost", "ghost"));
    snapshot.spaces.push(entity(json!({"entityType": "space", "name": "Sales"})));
    snapshot.vds.push(entity(json!({
        "entityType": "dataset", "type": "VIRTUAL_DATASET", "path": ["Sales", "owned"],
        "sql": "SELECT 1", "owner": {"ownerId": "S-ghost", "ownerType": "USER"}
    })));
    snapshot.vds_parents.push(VdsDependency::new(None, path(&["Sales", "owned"]), vec![]));

    let outcome = push(&target, snapshot).await;

    assert!(outcome.report.is_empty(), "{:?}", outcome.report.entries());
    let stored = target.entity_at(&path(&["Sales", "owned"])).unwrap();
    assert!(stored.base().owner.is_none());
}

#[tokio::test]
async fn failures_are_isolated_and_reported() {
    let target = target_with_source();
    target.reject_writes_to(path(&["Sales", "broken"]));
    let mut snapshot = EnvironmentSnapshot::new("http://source:9047");
    snapshot.add_referenced(PrincipalKind::Role, Principal::new("S-r1", "auditors"));
    snapshot.spaces.push(entity(json!({"entityType": "space", "name": "Sales"})));
    snapshot.folders.push(entity(json!({"entityType": "folder", "path": ["Sales", "broken"]})));
    snapshot.folders.push(entity(json!({"entityType": "folder", "path": ["Sales", "fine"]})));
    for name in ["x", "y"] {
        snapshot.vds.push(entity(json!({
            "entityType": "dataset", "type": "VIRTUAL_DATASET", "path": ["Sales", name],
            "sql": "SELECT 1"
        })));
    }
    snapshot.vds.push(entity(json!({
        "entityType": "dataset", "type": "VIRTUAL_DATASET", "path": ["Sales", "broken", "v"],
        "sql": "SELECT 1"
    })));
    snapshot.vds_parents = vec![
        VdsDependency::new(None, path(&["Sales", "x"]), vec![path(&["Sales", "y"])]),
        VdsDependency::new(None, path(&["Sales", "y"]), vec![path(&["Sales", "x"])]),
        VdsDependency::new(None, path(&["Sales", "broken", "v"]), vec![]),
    ];

    let outcome = push(&target, snapshot).await;

    let report = &outcome.report;
    assert!(report.contains("role", "auditors"));
    assert!(report.contains("folder", "Sales/broken"));
    assert!(report.contains("vds", "Sales/x"));
    assert!(report.contains("vds", "Sales/y"));
    assert!(report.contains("vds", "Sales/broken/v"));
    assert_eq!(report.exit_status(), EXIT_NON_FATAL);
    assert!(target.entity_at(&path(&["Sales", "fine"])).is_some());
    assert!(target.entity_at(&path(&["Sales", "x"])).is_none());
}

#[tokio::test]
async fn views_without_lineage_are_written_best_effort() {
    let target = target_with_source();
    let mut snapshot = EnvironmentSnapshot::new("http://source:9047");
    snapshot.spaces.push(entity(json!({"entityType": "space", "name": "Sales"})));
    snapshot.folders.push(entity(json!({"entityType": "folder", "path": ["Sales", "f"]})));
    // The child is listed first and has no lineage; its parent folder
    // exists, so the first fallback pass succeeds.
    snapshot.vds.push(entity(json!({
        "entityType": "dataset", "type": "VIRTUAL_DATASET", "path": ["Sales", "f", "orphan"],
        "sql": "SELECT 1"
    })));

    let outcome = push(&target, snapshot).await;

    assert!(outcome.report.is_empty(), "{:?}", outcome.report.entries());
    assert!(target.entity_at(&path(&["Sales", "f", "orphan"])).is_some());
}

#[tokio::test]
async fn missing_physical_dataset_is_reported_not_fatal() {
    let target = target_with_source();
    let mut snapshot = EnvironmentSnapshot::new("http://source:9047");
    snapshot.spaces.push(entity(json!({"entityType": "space", "name": "Sales"})));
    snapshot.vds.push(entity(json!({
        "entityType": "dataset", "type": "VIRTUAL_DATASET", "path": ["Sales", "v"],
        "sql": "SELECT * FROM Source1.gone"
    })));
    snapshot.vds_parents.push(VdsDependency::new(
        None,
        path(&["Sales", "v"]),
        vec![path(&["Source1", "gone"])],
    ));

    let outcome = push(&target, snapshot).await;

    assert!(outcome.report.contains("pds", "Source1/gone"));
    assert!(target.entity_at(&path(&["Sales", "v"])).is_some());
}
