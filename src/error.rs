use std::path::PathBuf;

use catalog_client::ClientError;
use thiserror::Error;

/// Conditions that abort a whole command.
///
/// Per-object failures never become a `ToolkitError`; they are recorded in
/// the [`ExceptionReport`](crate::report::ExceptionReport) instead.
#[derive(Debug, Error)]
pub enum ToolkitError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("unable to list top-level containers of {0}")]
    ContainersUnavailable(String),

    #[error("unrecognized container type {container_type} for {path}")]
    UnknownContainer {
        path: String,
        container_type: String,
    },

    #[error("unsupported snapshot file version {found:?}, expected {expected:?}")]
    UnsupportedFileVersion { found: String, expected: &'static str },

    #[error("malformed snapshot {}: {message}", .path.display())]
    Snapshot { path: PathBuf, message: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("aborted: {0}")]
    Aborted(String),
}

impl ToolkitError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ToolkitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_version_message() {
        let err = ToolkitError::UnsupportedFileVersion {
            found: "1.0".into(),
            expected: "2.0",
        };
        assert_eq!(
            err.to_string(),
            "unsupported snapshot file version \"1.0\", expected \"2.0\""
        );
    }

    #[test]
    fn client_errors_pass_through() {
        let err: ToolkitError = ClientError::Authentication("HTTP 403".into()).into();
        assert_eq!(err.to_string(), "authentication failed: HTTP 403");
    }

    #[test]
    fn io_errors_name_the_path() {
        let err = ToolkitError::io(
            "/tmp/snap.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "I/O error on /tmp/snap.json: gone");
    }
}
