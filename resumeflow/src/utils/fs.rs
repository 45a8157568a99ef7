//! Durable file helpers.

use crate::errors::{EngineError, EngineResult};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Writes `bytes` to `path` through a temp file and an atomic rename.
///
/// A crash part-way through leaves the previous file intact. The temp file
/// lives next to the target so the rename never crosses filesystems.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> EngineResult<()> {
    let parent = path.parent().ok_or_else(|| {
        EngineError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent"),
        )
    })?;
    fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;

    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("state");
    let tmp = parent.join(format!(
        ".{}.{}.{}.tmp",
        filename,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));

    let written = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(EngineError::io(&tmp, e));
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(EngineError::io(path, e));
    }
    Ok(())
}

/// Reads a file to a string, returning `None` if it does not exist.
pub fn read_optional(path: &Path) -> EngineResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EngineError::io(path, e)),
    }
}

/// Removes a file, treating "already gone" as success.
///
/// Returns true if a file was removed.
pub fn remove_if_exists(path: &Path) -> EngineResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(EngineError::io(path, e)),
    }
}

/// Checks that a workflow id is safe to embed in a file name.
pub fn validate_workflow_id(id: &str) -> EngineResult<()> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidWorkflowId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_creates_parent_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_atomic(&path, b"{\"a\":1}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_write_atomic_replaces_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_read_optional_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("missing.json")).unwrap().is_none());
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        fs::write(&path, "x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!remove_if_exists(&path).unwrap());
    }

    #[test]
    fn test_validate_workflow_id() {
        assert!(validate_workflow_id("todo-app_01").is_ok());
        assert!(validate_workflow_id("").is_err());
        assert!(validate_workflow_id("../escape").is_err());
        assert!(validate_workflow_id(".hidden").is_err());
        assert!(validate_workflow_id("with space").is_err());
    }
}
