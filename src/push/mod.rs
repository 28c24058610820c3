//! Snapshot reconciliation and write-back.
//!
//! A push replays a snapshot onto a target environment in dependency order:
//! principals are resolved first, then sources, spaces, folders, virtual
//! datasets level by level, and finally reflections, wikis and tags. Every
//! write is a create-or-update, so pushing the same snapshot twice leaves the
//! target untouched the second time. Per-object failures go to the exception
//! report; only fatal client errors abort the push.

mod attachments;
mod entity;
mod ordering;
mod principals;

use std::sync::Arc;

use catalog_client::CatalogClient;
use catalog_types::{Entity, EnvironmentSnapshot};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::report::ExceptionReport;

pub use attachments::{write_reflection, write_tags, write_wiki, ExistingReflections};
pub use entity::{get_existing, promote_referenced_pds, write_entity, Promotion, WriteOutcome};
pub use ordering::{order_vds, VdsOrdering, MAX_VDS_HIERARCHY_DEPTH};
pub use principals::PrincipalMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushCounters {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl PushCounters {
    fn count(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Created => self.created += 1,
            WriteOutcome::Updated => self.updated += 1,
            WriteOutcome::Unchanged => self.unchanged += 1,
            WriteOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug)]
pub struct PushOutcome {
    pub report: ExceptionReport,
    pub counters: PushCounters,
}

/// Engine state for one push. Nothing outlives the value.
pub struct SnapshotPusher {
    client: Arc<dyn CatalogClient>,
    principals: PrincipalMap,
    existing_reflections: ExistingReflections,
    report: ExceptionReport,
    counters: PushCounters,
}

impl SnapshotPusher {
    pub fn new(client: Arc<dyn CatalogClient>) -> Self {
        Self {
            client,
            principals: PrincipalMap::default(),
            existing_reflections: ExistingReflections::default(),
            report: ExceptionReport::new(),
            counters: PushCounters::default(),
        }
    }

    pub async fn push(mut self, mut snapshot: EnvironmentSnapshot) -> Result<PushOutcome> {
        info!(
            from = %snapshot.endpoint,
            to = self.client.endpoint(),
            entities = snapshot.entity_count(),
            "Pushing snapshot"
        );
        let client = Arc::clone(&self.client);

        self.principals =
            PrincipalMap::resolve(&snapshot, client.as_ref(), &mut self.report).await?;
        self.existing_reflections = ExistingReflections::load(client.as_ref()).await?;

        for source in std::mem::take(&mut snapshot.sources) {
            self.write(&source, None).await?;
        }
        for space in std::mem::take(&mut snapshot.spaces) {
            self.write(&space, None).await?;
        }
        if !snapshot.homes.is_empty() {
            debug!(count = snapshot.homes.len(), "Homes are never written");
        }

        let mut folders = std::mem::take(&mut snapshot.folders);
        folders.sort_by_key(|folder| folder.path().len());
        for folder in &folders {
            self.write(folder, None).await?;
        }

        let ordering = order_vds(std::mem::take(&mut snapshot.vds), &snapshot.vds_parents);
        self.push_vds(ordering).await?;

        for reflection in &snapshot.reflections {
            let outcome = write_reflection(
                client.as_ref(),
                &mut self.existing_reflections,
                reflection,
                &mut self.report,
            )
            .await?;
            self.counters.count(outcome);
        }
        for wiki in &snapshot.wikis {
            let outcome = write_wiki(client.as_ref(), wiki, &mut self.report).await?;
            self.counters.count(outcome);
        }
        for tags in &snapshot.tags {
            let outcome = write_tags(client.as_ref(), tags, &mut self.report).await?;
            self.counters.count(outcome);
        }

        let counters = self.counters;
        info!(
            created = counters.created,
            updated = counters.updated,
            unchanged = counters.unchanged,
            failed = counters.failed,
            errors = self.report.len(),
            "Push finished"
        );
        Ok(PushOutcome {
            report: self.report,
            counters,
        })
    }

    /// Write one entity; a failure is reported with `note` (or a generic one).
    async fn write(&mut self, entity: &Entity, note: Option<String>) -> Result<WriteOutcome> {
        let outcome = write_entity(self.client.as_ref(), &self.principals, entity).await?;
        self.counters.count(outcome);
        if outcome == WriteOutcome::Failed {
            let kind = entity.kind();
            self.report.record(
                kind.as_str(),
                entity.path(),
                note.unwrap_or_else(|| format!("Unable to create or update {kind}")),
            );
        }
        Ok(outcome)
    }

    async fn push_vds(&mut self, ordering: VdsOrdering) -> Result<()> {
        for vds in &ordering.abandoned {
            self.counters.count(WriteOutcome::Failed);
            self.report.record(
                "vds",
                vds.path(),
                format!(
                    "Unable to order VDS: dependency cycle or hierarchy deeper than {MAX_VDS_HIERARCHY_DEPTH} levels"
                ),
            );
        }

        for path in &ordering.referenced_pds {
            let note = match promote_referenced_pds(self.client.as_ref(), path).await? {
                Promotion::NotNeeded | Promotion::Promoted => continue,
                Promotion::NotFound => "Referenced physical dataset not found in target".to_string(),
                Promotion::NotPromotable(kind) => {
                    format!("Referenced physical dataset is a {kind} in target")
                }
                Promotion::Failed => "Unable to promote to physical dataset".to_string(),
            };
            self.report.record("pds", path, note);
        }

        for (level, items) in ordering.levels.iter().enumerate() {
            debug!(level, count = items.len(), "Writing VDS level");
            for vds in items {
                self.write(vds, Some(format!("Unable to write VDS. Hierarchy Level: {level}")))
                    .await?;
            }
        }

        // Best effort: keep passing over the fallback list while a pass
        // lands at least one write.
        let mut pending: Vec<Entity> = ordering.fallback;
        let mut pass = 0;
        while !pending.is_empty() {
            let before = pending.len();
            let mut remaining = Vec::new();
            for vds in pending {
                let outcome = write_entity(self.client.as_ref(), &self.principals, &vds).await?;
                if outcome.is_success() {
                    self.counters.count(outcome);
                } else {
                    remaining.push(vds);
                }
            }
            pass += 1;
            debug!(pass, written = before - remaining.len(), left = remaining.len(), "Fallback VDS pass");
            let progressed = remaining.len() < before;
            pending = remaining;
            if !progressed {
                break;
            }
        }
        for vds in &pending {
            warn!(vds = %vds.path(), "VDS without lineage could not be written");
            self.counters.count(WriteOutcome::Failed);
            self.report.record(
                "vds",
                vds.path(),
                "Unable to write VDS without lineage after repeated attempts",
            );
        }
        Ok(())
    }
}
