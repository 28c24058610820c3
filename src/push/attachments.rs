//! Reflections, wikis and tags.
//!
//! All three hang off a dataset (or container) that is addressed by path in
//! the snapshot and by id in the target, so each write starts by resolving
//! the owner in the target.

use std::collections::HashMap;

use catalog_client::CatalogClient;
use catalog_types::{CatalogPath, Reflection, Tags, Wiki};
use tracing::{debug, info};

use super::entity::WriteOutcome;
use crate::error::Result;
use crate::report::ExceptionReport;

/// Target reflections, listed once per push, with their dataset paths
/// resolved lazily.
#[derive(Debug, Default)]
pub struct ExistingReflections {
    reflections: Vec<Reflection>,
    paths: HashMap<String, Option<CatalogPath>>,
}

impl ExistingReflections {
    pub async fn load(client: &dyn CatalogClient) -> Result<Self> {
        let reflections = client.list_reflections().await?.unwrap_or_default();
        debug!(count = reflections.len(), "Existing reflections listed");
        Ok(Self {
            reflections,
            paths: HashMap::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.reflections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reflections.is_empty()
    }

    /// Track a reflection created during this push so a repeated entry
    /// finds it instead of creating it again.
    fn remember(&mut self, reflection: Reflection, path: CatalogPath) {
        if let Some(dataset_id) = reflection.dataset_id.clone() {
            self.paths.insert(dataset_id, Some(path));
        }
        self.reflections.push(reflection);
    }

    async fn dataset_path(
        &mut self,
        client: &dyn CatalogClient,
        dataset_id: &str,
    ) -> Result<Option<CatalogPath>> {
        if let Some(cached) = self.paths.get(dataset_id) {
            return Ok(cached.clone());
        }
        let path = client
            .get_entity_by_id(dataset_id)
            .await?
            .map(|dataset| dataset.path());
        self.paths.insert(dataset_id.to_string(), path.clone());
        Ok(path)
    }

    /// The target reflection with the same name on the dataset at `path`.
    async fn find(
        &mut self,
        client: &dyn CatalogClient,
        name: &str,
        path: &CatalogPath,
    ) -> Result<Option<Reflection>> {
        let candidates: Vec<(usize, String)> = self
            .reflections
            .iter()
            .enumerate()
            .filter(|(_, r)| r.name == name)
            .filter_map(|(i, r)| r.dataset_id.clone().map(|id| (i, id)))
            .collect();
        for (index, dataset_id) in candidates {
            if self.dataset_path(client, &dataset_id).await?.as_ref() == Some(path) {
                return Ok(Some(self.reflections[index].clone()));
            }
        }
        Ok(None)
    }
}

pub async fn write_reflection(
    client: &dyn CatalogClient,
    existing: &mut ExistingReflections,
    reflection: &Reflection,
    report: &mut ExceptionReport,
) -> Result<WriteOutcome> {
    let Some(path) = reflection.path.clone() else {
        report.record(
            "reflection",
            &reflection.name,
            "Reflection has no dataset path",
        );
        return Ok(WriteOutcome::Failed);
    };
    let identity = format!("{path}:{}", reflection.name);
    let Some(dataset_id) = resolve_id(client, &path).await? else {
        report.record("reflection", &identity, "Unable to resolve reflection's dataset");
        return Ok(WriteOutcome::Failed);
    };

    let mut payload = reflection.clone();
    payload.strip_server_fields();
    payload.dataset_id = Some(dataset_id);

    let outcome = match existing.find(client, &reflection.name, &path).await? {
        Some(current) if current.is_equivalent(&payload) => WriteOutcome::Unchanged,
        Some(current) => {
            let Some(id) = current.id.as_deref() else {
                report.record("reflection", &identity, "Existing reflection has no id");
                return Ok(WriteOutcome::Failed);
            };
            payload.tag = current.tag.clone();
            match client.update_reflection(id, &payload).await? {
                Some(_) => WriteOutcome::Updated,
                None => WriteOutcome::Failed,
            }
        }
        None => match client.create_reflection(&payload).await? {
            Some(mut created) => {
                if created.dataset_id.is_none() {
                    created.dataset_id = payload.dataset_id.clone();
                }
                existing.remember(created, path.clone());
                WriteOutcome::Created
            }
            None => WriteOutcome::Failed,
        },
    };
    log_outcome("reflection", &identity, outcome, report);
    Ok(outcome)
}

/// Create the wiki when the target has none, update it only when the text
/// differs.
pub async fn write_wiki(
    client: &dyn CatalogClient,
    wiki: &Wiki,
    report: &mut ExceptionReport,
) -> Result<WriteOutcome> {
    let Some(entity_id) = resolve_id(client, &wiki.path).await? else {
        report.record("wiki", &wiki.path, "Unable to resolve wiki's dataset");
        return Ok(WriteOutcome::Failed);
    };

    let mut payload = Wiki::new(wiki.text.clone());
    let outcome = match client.get_wiki(&entity_id).await? {
        Some(current) if current.text == wiki.text => WriteOutcome::Unchanged,
        Some(current) => {
            payload.version = current.version;
            written(client.update_wiki(&entity_id, &payload).await?.is_some(), WriteOutcome::Updated)
        }
        None => written(client.update_wiki(&entity_id, &payload).await?.is_some(), WriteOutcome::Created),
    };
    log_outcome("wiki", &wiki.path, outcome, report);
    Ok(outcome)
}

/// Create the tag set when the target has none, update it only when the
/// sets differ.
pub async fn write_tags(
    client: &dyn CatalogClient,
    tags: &Tags,
    report: &mut ExceptionReport,
) -> Result<WriteOutcome> {
    let Some(entity_id) = resolve_id(client, &tags.path).await? else {
        report.record("tags", &tags.path, "Unable to resolve tag's dataset");
        return Ok(WriteOutcome::Failed);
    };

    let mut payload = Tags::new(tags.tags.iter().cloned());
    let outcome = match client.get_tags(&entity_id).await? {
        Some(current) if current.same_tags(&tags.tags) => WriteOutcome::Unchanged,
        Some(current) => {
            payload.version = current.version;
            written(client.update_tags(&entity_id, &payload).await?.is_some(), WriteOutcome::Updated)
        }
        None => written(client.update_tags(&entity_id, &payload).await?.is_some(), WriteOutcome::Created),
    };
    log_outcome("tags", &tags.path, outcome, report);
    Ok(outcome)
}

async fn resolve_id(client: &dyn CatalogClient, path: &CatalogPath) -> Result<Option<String>> {
    if path.is_empty() {
        return Ok(None);
    }
    Ok(client
        .get_entity_by_path(path)
        .await?
        .and_then(|entity| entity.id().map(str::to_string)))
}

fn written(ok: bool, success: WriteOutcome) -> WriteOutcome {
    if ok {
        success
    } else {
        WriteOutcome::Failed
    }
}

fn log_outcome(
    object_type: &str,
    identity: &dyn std::fmt::Display,
    outcome: WriteOutcome,
    report: &mut ExceptionReport,
) {
    match outcome {
        WriteOutcome::Failed => {
            report.record(object_type, identity, format!("Unable to write {object_type}"))
        }
        WriteOutcome::Unchanged => debug!(%object_type, %identity, "Unchanged"),
        WriteOutcome::Created | WriteOutcome::Updated => {
            info!(%object_type, %identity, ?outcome, "Written")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_client::InMemoryCatalog;
    use catalog_types::Entity;
    use serde_json::json;

    fn target_with_dataset() -> (InMemoryCatalog, String) {
        let target = InMemoryCatalog::new("target");
        target.seed_entity(serde_json::from_value::<Entity>(json!({"entityType": "space", "name": "Sales"})).unwrap());
        let id = target.seed_entity(
            serde_json::from_value::<Entity>(json!({
                "entityType": "dataset", "type": "VIRTUAL_DATASET", "path": ["Sales", "orders"],
                "sql": "SELECT 1"
            }))
            .unwrap(),
        );
        (target, id)
    }

    fn reflection(value: serde_json::Value) -> Reflection {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn reflections_match_by_name_and_dataset_path() {
        let (target, dataset_id) = target_with_dataset();
        target.seed_reflection(reflection(json!({
            "name": "agg", "type": "AGGREGATION", "datasetId": dataset_id,
            "dimensionFields": [{"name": "region"}]
        })));
        let mut existing = ExistingReflections::load(&target).await.unwrap();
        let mut report = ExceptionReport::new();

        let same = reflection(json!({
            "id": "S-r1", "name": "agg", "type": "AGGREGATION", "datasetId": "S-d1",
            "path": ["Sales", "orders"], "dimensionFields": [{"name": "region"}],
            "status": {"availability": "AVAILABLE"}
        }));
        let outcome = write_reflection(&target, &mut existing, &same, &mut report).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Unchanged);

        let mut changed = same.clone();
        changed.extra.insert("dimensionFields".into(), json!([{"name": "country"}]));
        let outcome = write_reflection(&target, &mut existing, &changed, &mut report).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Updated);

        let mut other = same.clone();
        other.name = "raw".into();
        let outcome = write_reflection(&target, &mut existing, &other, &mut report).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Created);

        assert!(report.is_empty());
        let counts = target.counts();
        assert_eq!((counts.reflection_creates, counts.reflection_updates), (1, 1));
        assert!(target
            .reflections()
            .iter()
            .all(|r| !r.extra.contains_key("status")));
    }

    #[tokio::test]
    async fn repeated_reflection_is_created_once() {
        let (target, _) = target_with_dataset();
        let mut existing = ExistingReflections::load(&target).await.unwrap();
        let mut report = ExceptionReport::new();
        let raw = reflection(json!({
            "name": "raw", "type": "RAW", "datasetId": "S-d1",
            "path": ["Sales", "orders"], "displayFields": [{"name": "x"}]
        }));

        let first = write_reflection(&target, &mut existing, &raw, &mut report).await.unwrap();
        let second = write_reflection(&target, &mut existing, &raw, &mut report).await.unwrap();

        assert_eq!((first, second), (WriteOutcome::Created, WriteOutcome::Unchanged));
        assert_eq!(existing.len(), 1);
        assert_eq!(target.counts().reflection_creates, 1);
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn reflection_on_missing_dataset_is_reported() {
        let (target, _) = target_with_dataset();
        let mut existing = ExistingReflections::default();
        let mut report = ExceptionReport::new();
        let orphan = reflection(json!({"name": "r", "type": "RAW", "path": ["Sales", "gone"]}));
        let outcome = write_reflection(&target, &mut existing, &orphan, &mut report).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Failed);
        assert!(report.contains("reflection", "Sales/gone:r"));
    }

    #[tokio::test]
    async fn wiki_written_only_when_text_differs() {
        let (target, _) = target_with_dataset();
        let mut report = ExceptionReport::new();
        let mut wiki = Wiki::new("# Orders");
        wiki.path = CatalogPath::new(["Sales", "orders"]);

        assert_eq!(write_wiki(&target, &wiki, &mut report).await.unwrap(), WriteOutcome::Created);
        assert_eq!(write_wiki(&target, &wiki, &mut report).await.unwrap(), WriteOutcome::Unchanged);
        wiki.text = "# Orders v2".into();
        assert_eq!(write_wiki(&target, &wiki, &mut report).await.unwrap(), WriteOutcome::Updated);

        let stored = target.wiki_of(&CatalogPath::new(["Sales", "orders"])).unwrap();
        assert_eq!(stored.text, "# Orders v2");
        assert_eq!(stored.version, Some(json!(1)));
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn tags_compare_as_sets() {
        let (target, dataset_id) = target_with_dataset();
        target.seed_tags(&dataset_id, &["gold", "pii"]);
        let mut report = ExceptionReport::new();
        let mut tags = Tags::new(["pii", "gold"]);
        tags.path = CatalogPath::new(["Sales", "orders"]);

        assert_eq!(write_tags(&target, &tags, &mut report).await.unwrap(), WriteOutcome::Unchanged);
        tags.tags.push("finance".into());
        assert_eq!(write_tags(&target, &tags, &mut report).await.unwrap(), WriteOutcome::Updated);

        let mut orphan = Tags::new(["x"]);
        orphan.path = CatalogPath::new(["Sales", "missing"]);
        assert_eq!(write_tags(&target, &orphan, &mut report).await.unwrap(), WriteOutcome::Failed);
        assert!(report.contains("tags", "Sales/missing"));
    }
}
