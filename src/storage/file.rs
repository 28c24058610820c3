use std::fs;
use std::path::Path;

use catalog_types::EnvironmentSnapshot;
use serde_json::Value;
use tracing::debug;

use super::check_version;
use crate::error::{Result, ToolkitError};

pub fn read_file(path: &Path) -> Result<EnvironmentSnapshot> {
    let text = fs::read_to_string(path).map_err(|e| ToolkitError::io(path, e))?;
    let document: Value = serde_json::from_str(&text).map_err(|e| ToolkitError::json(path, e))?;
    check_version(&document)?;
    let snapshot: EnvironmentSnapshot =
        serde_json::from_value(document).map_err(|e| ToolkitError::json(path, e))?;
    debug!(
        path = %path.display(),
        entities = snapshot.entity_count(),
        "Snapshot file read"
    );
    Ok(snapshot)
}

pub fn write_file(snapshot: &EnvironmentSnapshot, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ToolkitError::io(parent, e))?;
    }
    let text = serde_json::to_string_pretty(snapshot).map_err(|e| ToolkitError::json(path, e))?;
    fs::write(path, text).map_err(|e| ToolkitError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::sample_snapshot;

    #[test]
    fn round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dir/snap.json");
        let snapshot = sample_snapshot();
        write_file(&snapshot, &path).unwrap();
        assert_eq!(read_file(&path).unwrap(), snapshot);
    }

    #[test]
    fn rejects_legacy_documents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("legacy.json");
        fs::write(
            &path,
            r#"{"data": [{"dremio_environment": [{"file_version": "1.0"}]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            read_file(&path),
            Err(ToolkitError::UnsupportedFileVersion { .. })
        ));
    }

    #[test]
    fn malformed_json_is_reported_with_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = read_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
