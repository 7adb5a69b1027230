use std::path::{Path, PathBuf};

use crate::error::RelayError;

/// Static allow-list of Slack user IDs permitted to upload documents.
///
/// The backing file holds one identifier per line and is re-read on every
/// check, so edits take effect without a restart.
#[derive(Debug, Clone)]
pub struct AllowList {
    path: PathBuf,
}

impl AllowList {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `user_id` appears on its own line in the allow-list file.
    pub fn is_authorized(&self, user_id: &str) -> std::io::Result<bool> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(content.lines().any(|line| line == user_id))
    }

    /// Like [`AllowList::is_authorized`], with denial reported as
    /// [`RelayError::Unauthorized`].
    pub fn authorize(&self, user_id: &str) -> Result<(), RelayError> {
        if self.is_authorized(user_id).map_err(RelayError::AllowList)? {
            Ok(())
        } else {
            Err(RelayError::Unauthorized {
                user: user_id.to_string(),
            })
        }
    }
}
