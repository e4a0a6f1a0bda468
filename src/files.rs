//! Uploaded file storage under a single root directory.

use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

const FALLBACK_NAME: &str = "document";

/// Errors raised while reading or writing stored uploads.
#[derive(Debug, Error)]
pub enum FileStorageError {
    /// A filesystem operation failed.
    #[error("failed to {action} {path}: {source}")]
    Io {
        /// Operation that failed.
        action: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Writes uploads to disk under collision-free names.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `root`; the directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root directory if needed.
    pub async fn ensure_root(&self) -> Result<(), FileStorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| FileStorageError::Io {
                action: "create upload directory",
                path: self.root.clone(),
                source,
            })
    }

    /// Persist `bytes` and return the stored file name.
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String, FileStorageError> {
        self.ensure_root().await?;
        let stored_name = stored_file_name(original_name);
        let path = self.path_for(&stored_name);
        if let Err(source) = tokio::fs::write(&path, bytes).await {
            // Drop whatever part of the file made it to disk.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(FileStorageError::Io {
                action: "write",
                path,
                source,
            });
        }
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Stored upload");
        Ok(stored_name)
    }

    /// Absolute location of a stored file.
    pub fn path_for(&self, stored_name: &str) -> PathBuf {
        self.root.join(stored_name)
    }

    /// Read a stored file back.
    pub async fn read(&self, stored_name: &str) -> Result<Vec<u8>, FileStorageError> {
        let path = self.path_for(stored_name);
        tokio::fs::read(&path)
            .await
            .map_err(|source| FileStorageError::Io {
                action: "read",
                path,
                source,
            })
    }

    /// Remove a stored file; a file that is already gone is not an error.
    pub async fn remove(&self, stored_name: &str) -> Result<(), FileStorageError> {
        let path = self.path_for(stored_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FileStorageError::Io {
                action: "remove",
                path,
                source,
            }),
        }
    }
}

/// Build `<millis>-<token>-<sanitized name>` for a new upload.
fn stored_file_name(original_name: &str) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let token = Uuid::new_v4().simple().to_string();
    format!("{millis}-{}-{}", &token[..8], sanitize_file_name(original_name))
}

/// Keep only the final path component, with whitespace and unusual characters replaced.
pub(crate) fn sanitize_file_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();
    let sanitized: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        sanitized.to_string()
    }
}
