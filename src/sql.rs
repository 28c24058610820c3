//! SQL submission, job polling and script execution.

use std::time::Duration;

use catalog_client::CatalogClient;
use catalog_types::{CatalogPath, JobResults, JobState, JobStatus};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::context::RunContext;
use crate::error::Result;
use crate::report::ExceptionReport;

/// Rows fetched per results page.
pub const RESULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize)]
pub struct SqlOutcome {
    pub success: bool,
    pub job_id: Option<String>,
    pub job: Option<JobStatus>,
}

/// Submit `sql` and poll until the job reaches a terminal state. Only a
/// `COMPLETED` job is a success.
pub async fn execute_sql(
    client: &dyn CatalogClient,
    sql: &str,
    context: Option<&CatalogPath>,
    poll_interval: Duration,
) -> Result<SqlOutcome> {
    let Some(handle) = client.submit_sql(sql, context).await? else {
        return Ok(SqlOutcome {
            success: false,
            job_id: None,
            job: None,
        });
    };
    debug!(job_id = %handle.id, "SQL submitted");

    loop {
        let Some(status) = client.get_job(&handle.id).await? else {
            return Ok(SqlOutcome {
                success: false,
                job_id: Some(handle.id),
                job: None,
            });
        };
        if status.job_state.is_terminal() {
            debug!(job_id = %handle.id, state = ?status.job_state, "Job finished");
            return Ok(SqlOutcome {
                success: status.job_state == JobState::Completed,
                job_id: Some(handle.id),
                job: Some(status),
            });
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Split a script into statements on `;`. Semicolons inside literals are
/// not recognised.
pub fn split_statements(script: &str) -> Vec<&str> {
    script
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Per-statement record of an `exec-sql` run.
#[derive(Debug, Clone, Serialize)]
pub struct StatementStatus {
    pub sql: String,
    #[serde(rename = "jobid")]
    pub job_id: Option<String>,
    pub job_info: Option<JobStatus>,
    pub job_result: Option<JobResults>,
}

#[derive(Debug)]
pub struct ExecSqlOutcome {
    pub statuses: Vec<StatementStatus>,
    pub report: ExceptionReport,
    /// Stopped at a failed statement because `fail_on_error` was set.
    pub aborted: bool,
}

/// Run every statement of `script` in order, each prefixed with the run
/// comment. The first page of results is kept for successful statements.
pub async fn exec_sql(
    client: &dyn CatalogClient,
    script: &str,
    ctx: &RunContext,
    fail_on_error: bool,
    poll_interval: Duration,
) -> Result<ExecSqlOutcome> {
    let comment = ctx.sql_comment();
    let statements = split_statements(script);
    info!(count = statements.len(), "Executing SQL script");

    let mut outcome = ExecSqlOutcome {
        statuses: Vec::with_capacity(statements.len()),
        report: ExceptionReport::new(),
        aborted: false,
    };
    for (index, statement) in statements.iter().enumerate() {
        let sql = format!("{comment}{statement}");
        let result = execute_sql(client, &sql, None, poll_interval).await?;
        let job_result = match (&result.job_id, result.success) {
            (Some(job_id), true) => client.get_job_results(job_id, 0, RESULT_PAGE_SIZE).await?,
            _ => None,
        };
        if !result.success {
            let note = result
                .job
                .as_ref()
                .and_then(|job| job.error_message.clone())
                .unwrap_or_else(|| "Statement failed".to_string());
            outcome
                .report
                .record("sql", format!("statement {}", index + 1), note);
        }
        outcome.statuses.push(StatementStatus {
            sql,
            job_id: result.job_id,
            job_info: result.job,
            job_result,
        });
        if !result.success && fail_on_error {
            error!(statement = index + 1, "Aborting script on failed statement");
            outcome.aborted = true;
            break;
        }
    }
    Ok(outcome)
}
