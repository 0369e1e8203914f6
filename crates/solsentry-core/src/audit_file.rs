//! JSON-lines audit backend.
//!
//! One [`AuditEntry`] per line, appended. The file and its parent directory
//! are created on the first write, so a missing path does not stop the
//! server from starting.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::audit::{AuditBackend, AuditEntry};
use crate::error::AuditError;

/// Appends audit entries to a local file.
pub struct FileAuditBackend {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileAuditBackend {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn failure(&self, what: &str, err: &std::io::Error) -> AuditError {
        AuditError::BackendFailure {
            name: "file".to_owned(),
            reason: format!("{what} '{}': {err}", self.path.display()),
        }
    }

    async fn open(&self) -> Result<File, AuditError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.failure("cannot create directory for", &e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.failure("cannot open", &e))
    }
}

#[async_trait::async_trait]
impl AuditBackend for FileAuditBackend {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "file"
    }

    async fn log(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(entry).map_err(|e| AuditError::Serialization {
            reason: e.to_string(),
        })?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        let Some(file) = guard.as_mut() else {
            return Err(AuditError::BackendFailure {
                name: "file".to_owned(),
                reason: "file handle missing after open".to_owned(),
            });
        };

        if let Err(e) = file.write_all(&line).await {
            // Drop the handle so the next write reopens the file.
            *guard = None;
            return Err(self.failure("write failed for", &e));
        }
        file.flush()
            .await
            .map_err(|e| self.failure("flush failed for", &e))
    }
}

impl std::fmt::Debug for FileAuditBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAuditBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_one_json_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");
        let backend = FileAuditBackend::new(&path);

        backend.log(&AuditEntry::new("POST", "/v1/contracts", 201)).await.unwrap();
        backend.log(&AuditEntry::new("DELETE", "/v1/contracts/1", 204)).await.unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.method, "POST");
        assert_eq!(first.status, 201);
        let second: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.path, "/v1/contracts/1");
    }

    #[tokio::test]
    async fn existing_file_is_appended_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        tokio::fs::write(&path, "{\"previous\":true}\n").await.unwrap();

        FileAuditBackend::new(&path)
            .log(&AuditEntry::new("PUT", "/v1/x", 200))
            .await
            .unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(text.starts_with("{\"previous\":true}\n"));
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test]
    async fn unwritable_path_reports_backend_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as the log file.
        let backend = FileAuditBackend::new(dir.path());
        let err = backend
            .log(&AuditEntry::new("POST", "/v1/x", 200))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::BackendFailure { .. }));
    }
}
