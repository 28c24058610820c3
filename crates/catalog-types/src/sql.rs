//! SQL submission and job polling records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::path::CatalogPath;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlRequest {
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<CatalogPath>,
}

/// Returned by a successful SQL submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    NotSubmitted,
    Starting,
    Running,
    Completed,
    Canceled,
    Failed,
    CancellationRequested,
    Enqueued,
    Pending,
    MetadataRetrieval,
    Planning,
    EngineStart,
    Queued,
    ExecutionPlanning,
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobStatus {
    pub fn new(job_state: JobState) -> Self {
        Self {
            job_state,
            row_count: None,
            error_message: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResults {
    #[serde(default)]
    pub row_count: u64,
    #[serde(default)]
    pub rows: Vec<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_job_states_are_not_terminal() {
        let status: JobStatus =
            serde_json::from_str(r#"{"jobState":"SOMETHING_NEW","rowCount":1}"#).unwrap();
        assert_eq!(status.job_state, JobState::Unknown);
        assert!(!status.job_state.is_terminal());
        assert!(JobState::Canceled.is_terminal());
    }
}
