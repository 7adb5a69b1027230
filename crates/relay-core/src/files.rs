//! Content-addressed cache for uploaded documents.
//!
//! Uploads are downloaded to a per-user scratch path, hashed, and moved to
//! `<cache_dir>/<sha256>.<filetype>` so identical content is stored once no
//! matter who uploaded it or under which name.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::RelayError;
use crate::slack::{ChatPlatform, SlackFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedFile {
    pub path: PathBuf,
    pub checksum: String,
    /// The content was already cached; the fresh download was discarded.
    pub deduplicated: bool,
}

pub struct FileIngestor {
    cache_dir: PathBuf,
    allowed_types: Vec<String>,
}

impl FileIngestor {
    pub fn new<P: AsRef<Path>>(cache_dir: P, allowed_types: Vec<String>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            allowed_types,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn allowed_types(&self) -> &[String] {
        &self.allowed_types
    }

    pub fn check_file_type(&self, filetype: &str) -> Result<(), RelayError> {
        if self.allowed_types.iter().any(|t| t == filetype) {
            Ok(())
        } else {
            Err(RelayError::UnsupportedFileType {
                filetype: filetype.to_string(),
            })
        }
    }

    /// Validate, download and cache a Slack upload.
    pub async fn ingest(
        &self,
        platform: &dyn ChatPlatform,
        user: &str,
        file: &SlackFile,
    ) -> Result<IngestedFile, RelayError> {
        self.check_file_type(&file.filetype)?;

        let bytes = platform
            .download(&file.url_private)
            .await
            .map_err(RelayError::Download)?;
        tracing::info!(user, name = %file.name, bytes = bytes.len(), "downloaded upload");

        self.store(user, &file.name, &file.filetype, &bytes).await
    }

    /// Write `bytes` to the cache under their checksum.
    pub async fn store(
        &self,
        user: &str,
        name: &str,
        filetype: &str,
        bytes: &[u8],
    ) -> Result<IngestedFile, RelayError> {
        let scratch_dir = self.cache_dir.join(path_component(user, "anonymous"));
        tokio::fs::create_dir_all(&scratch_dir)
            .await
            .map_err(RelayError::Storage)?;

        let scratch_path = scratch_dir.join(format!(
            "{}-{}",
            uuid::Uuid::new_v4(),
            path_component(name, "upload")
        ));
        let placed = match tokio::fs::write(&scratch_path, bytes).await {
            Ok(()) => self.place(&scratch_path, filetype).await,
            Err(e) => Err(e),
        };
        let (final_path, checksum, deduplicated) = match placed {
            Ok(placed) => placed,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&scratch_path).await {
                    tracing::debug!(path = %scratch_path.display(), error = %cleanup, "scratch file not removed");
                }
                return Err(RelayError::Storage(e));
            }
        };

        Ok(IngestedFile {
            path: final_path,
            checksum,
            deduplicated,
        })
    }

    /// Move a scratch file to its content-addressed path, or drop it when that
    /// content is already cached.
    async fn place(
        &self,
        scratch_path: &Path,
        filetype: &str,
    ) -> std::io::Result<(PathBuf, String, bool)> {
        let checksum = file_checksum(scratch_path).await?;
        let final_path = self.cache_dir.join(format!("{}.{}", checksum, filetype));

        let deduplicated = tokio::fs::try_exists(&final_path).await?;
        if deduplicated {
            tracing::debug!(path = %final_path.display(), "upload already cached");
            tokio::fs::remove_file(scratch_path).await?;
        } else {
            tracing::info!(path = %final_path.display(), "caching upload");
            tokio::fs::rename(scratch_path, &final_path).await?;
        }
        Ok((final_path, checksum, deduplicated))
    }
}

/// Lowercase hex SHA-256 of `data`.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub async fn file_checksum(path: &Path) -> std::io::Result<String> {
    let data = tokio::fs::read(path).await?;
    Ok(checksum_bytes(&data))
}

/// Last path segment of an untrusted name, so it cannot escape the cache directory.
fn path_component(raw: &str, fallback: &str) -> String {
    Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
