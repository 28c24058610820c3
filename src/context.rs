//! Per-run context shared by every command.

use std::path::PathBuf;

use uuid::Uuid;

pub const TOOL_NAME: &str = "catalog-toolkit";
pub const DEFAULT_REPORT_DELIMITER: char = '\t';

#[derive(Debug, Clone)]
pub struct RunContext {
    pub command: String,
    pub run_id: Uuid,
    pub report_path: Option<PathBuf>,
    pub report_delimiter: char,
}

impl RunContext {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            run_id: Uuid::new_v4(),
            report_path: None,
            report_delimiter: DEFAULT_REPORT_DELIMITER,
        }
    }

    pub fn with_report(mut self, path: Option<PathBuf>, delimiter: Option<char>) -> Self {
        self.report_path = path;
        if let Some(delimiter) = delimiter {
            self.report_delimiter = delimiter;
        }
        self
    }

    /// Comment prepended to every submitted statement so jobs can be traced
    /// back to the run that issued them.
    pub fn sql_comment(&self) -> String {
        format!("// {TOOL_NAME} \n// run_id: {}\n", self.run_id)
    }
}
