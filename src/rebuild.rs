//! Metadata rebuild of physical datasets.
//!
//! Every PDS (optionally only those of one datasource) gets its metadata
//! forgotten and then refreshed with auto promotion. Datasets are processed
//! concurrently, bounded by a semaphore; all tasks are joined before the
//! status list is returned.

use std::sync::Arc;
use std::time::Duration;

use catalog_client::CatalogClient;
use catalog_types::{CatalogPath, JobStatus};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{Result, ToolkitError};
use crate::report::ExceptionReport;
use crate::sql::{execute_sql, RESULT_PAGE_SIZE};

/// Above this the catalog's coordinator tends to queue the jobs anyway.
pub const MAX_ADVISED_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebuildState {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PdsRebuildStatus {
    pub pds: String,
    pub forget_jobid: Option<String>,
    pub forget_job_info: Option<JobStatus>,
    pub refresh_jobid: Option<String>,
    pub refresh_job_info: Option<JobStatus>,
    pub pds_rebuild_status: RebuildState,
}

#[derive(Debug)]
pub struct RebuildOutcome {
    pub statuses: Vec<PdsRebuildStatus>,
    pub report: ExceptionReport,
}

/// `INFORMATION_SCHEMA` query listing physical tables, optionally limited to
/// one datasource and everything nested below it.
pub fn pds_listing_sql(datasource: Option<&str>) -> String {
    let mut sql = String::from(
        "SELECT TABLE_SCHEMA, TABLE_NAME FROM INFORMATION_SCHEMA.\"TABLES\" WHERE TABLE_TYPE = 'TABLE'",
    );
    if let Some(datasource) = datasource {
        let ds = datasource.to_lowercase().replace('\'', "''");
        sql.push_str(&format!(
            " AND ( '{ds}' = LOWER(TABLE_SCHEMA) OR POSITION('{ds}.' IN LOWER(TABLE_SCHEMA)) = 1)"
        ));
    }
    sql
}

/// `"a"."b"."table"` from the dotted schema and the table name.
pub fn pds_fqn(schema: &str, table: &str) -> String {
    CatalogPath::new(schema.split('.').chain([table])).to_sql_identifier()
}

/// Fully qualified names of every matching PDS, or `None` when the listing
/// query fails.
pub async fn list_pds(
    client: &dyn CatalogClient,
    datasource: Option<&str>,
    poll_interval: Duration,
) -> Result<Option<Vec<String>>> {
    let listing = execute_sql(client, &pds_listing_sql(datasource), None, poll_interval).await?;
    let (true, Some(job_id)) = (listing.success, listing.job_id) else {
        return Ok(None);
    };

    let mut names = Vec::new();
    let mut offset = 0;
    loop {
        let Some(page) = client.get_job_results(&job_id, offset, RESULT_PAGE_SIZE).await? else {
            warn!(%job_id, offset, "Result page unavailable, listing truncated");
            break;
        };
        let fetched = page.rows.len();
        for row in &page.rows {
            match (
                row.get("TABLE_SCHEMA").and_then(Value::as_str),
                row.get("TABLE_NAME").and_then(Value::as_str),
            ) {
                (Some(schema), Some(table)) => names.push(pds_fqn(schema, table)),
                _ => warn!(?row, "Row without TABLE_SCHEMA/TABLE_NAME"),
            }
        }
        offset += fetched;
        if fetched == 0 || offset as u64 >= page.row_count {
            break;
        }
    }
    debug!(count = names.len(), "Physical datasets listed");
    Ok(Some(names))
}

async fn rebuild_one(
    client: &dyn CatalogClient,
    pds: String,
    comment: &str,
    poll_interval: Duration,
) -> Result<PdsRebuildStatus> {
    let forget = execute_sql(
        client,
        &format!("{comment}ALTER PDS {pds} FORGET METADATA"),
        None,
        poll_interval,
    )
    .await?;
    let mut status = PdsRebuildStatus {
        pds,
        forget_jobid: forget.job_id,
        forget_job_info: forget.job,
        refresh_jobid: None,
        refresh_job_info: None,
        pds_rebuild_status: RebuildState::Failed,
    };
    if !forget.success {
        return Ok(status);
    }

    let refresh = execute_sql(
        client,
        &format!("{comment}ALTER PDS {} REFRESH METADATA AUTO PROMOTION", status.pds),
        None,
        poll_interval,
    )
    .await?;
    status.refresh_jobid = refresh.job_id;
    status.refresh_job_info = refresh.job;
    if refresh.success {
        status.pds_rebuild_status = RebuildState::Success;
    }
    Ok(status)
}

/// Forget and refresh the metadata of every listed PDS with at most
/// `concurrency` datasets in flight.
pub async fn rebuild_metadata(
    client: Arc<dyn CatalogClient>,
    datasource: Option<&str>,
    concurrency: usize,
    comment: &str,
    poll_interval: Duration,
) -> Result<RebuildOutcome> {
    if concurrency > MAX_ADVISED_CONCURRENCY {
        warn!(
            concurrency,
            advised = MAX_ADVISED_CONCURRENCY,
            "High concurrency may overload the coordinator"
        );
    }
    let Some(datasets) = list_pds(client.as_ref(), datasource, poll_interval).await? else {
        return Err(ToolkitError::Aborted(
            "unable to list physical datasets".to_string(),
        ));
    };
    info!(count = datasets.len(), concurrency, "Rebuilding metadata");

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let comment: Arc<str> = Arc::from(comment);
    let mut tasks = JoinSet::new();
    for pds in datasets {
        let client = Arc::clone(&client);
        let semaphore = Arc::clone(&semaphore);
        let comment = Arc::clone(&comment);
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| ToolkitError::Aborted(format!("rebuild semaphore closed: {e}")))?;
            rebuild_one(client.as_ref(), pds, &comment, poll_interval).await
        });
    }

    let mut statuses = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let status = joined
            .map_err(|e| ToolkitError::Aborted(format!("rebuild task failed: {e}")))??;
        statuses.push(status);
    }
    statuses.sort_by(|a, b| a.pds.cmp(&b.pds));

    let mut report = ExceptionReport::new();
    for status in &statuses {
        if status.pds_rebuild_status == RebuildState::Failed {
            report.record("pds", &status.pds, "Metadata rebuild failed");
        }
    }
    info!(
        rebuilt = statuses.len() - report.len(),
        failed = report.len(),
        "Metadata rebuild finished"
    );
    Ok(RebuildOutcome { statuses, report })
}
