//! Exception report: every object a command could not process.

use std::fmt;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

use serde::Serialize;
use tracing::error;

use crate::error::{Result, ToolkitError};

/// Completed with zero per-object errors.
pub const EXIT_OK: u8 = 0;
/// Aborted by a fatal error.
pub const EXIT_FATAL: u8 = 1;
/// Completed, but some objects failed.
pub const EXIT_NON_FATAL: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub object_type: String,
    /// Id or path, whichever is the best known identity.
    pub identity: String,
    pub note: String,
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.object_type, self.identity, self.note)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ExceptionReport {
    entries: Vec<ReportEntry>,
}

impl ExceptionReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed object and log it at `error` level.
    pub fn record(
        &mut self,
        object_type: impl Into<String>,
        identity: impl fmt::Display,
        note: impl Into<String>,
    ) {
        let entry = ReportEntry {
            object_type: object_type.into(),
            identity: identity.to_string(),
            note: note.into(),
        };
        error!(object_type = %entry.object_type, identity = %entry.identity, "{}", entry.note);
        self.entries.push(entry);
    }

    pub fn merge(&mut self, other: ExceptionReport) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, object_type: &str, identity: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.object_type == object_type && e.identity == identity)
    }

    pub fn exit_status(&self) -> u8 {
        if self.is_empty() {
            EXIT_OK
        } else {
            EXIT_NON_FATAL
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }

    /// Header line plus one line per entry. Delimiters and line breaks inside
    /// a field are replaced by spaces.
    pub fn to_delimited(&self, delimiter: char) -> String {
        let clean = |field: &str| -> String {
            field
                .chars()
                .map(|c| if c == delimiter || c == '\n' || c == '\r' { ' ' } else { c })
                .collect()
        };
        let mut out = format!("object_type{delimiter}identity{delimiter}note\n");
        for entry in &self.entries {
            out.push_str(&format!(
                "{}{delimiter}{}{delimiter}{}\n",
                clean(&entry.object_type),
                clean(&entry.identity),
                clean(&entry.note)
            ));
        }
        out
    }

    pub fn write_delimited(&self, path: &Path, delimiter: char) -> Result<()> {
        fs::write(path, self.to_delimited(delimiter)).map_err(|e| ToolkitError::io(path, e))
    }
}

/// Pretty-printed JSON status report (SQL and metadata rebuild runs).
pub fn write_json_report<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| ToolkitError::json(path, e))?;
    fs::write(path, text).map_err(|e| ToolkitError::io(path, e))
}
