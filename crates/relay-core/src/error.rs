use std::time::Duration;

/// Failures of the mention-handling pipeline.
///
/// `Unauthorized`, `UnsupportedFileType` and `Timeout` are recovered inside
/// [`crate::MentionHandler`] with a user-visible reply; the rest propagate.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("user {user} is not on the upload allow-list")]
    Unauthorized { user: String },

    #[error("file type '{filetype}' is not supported")]
    UnsupportedFileType { filetype: String },

    #[error("allow-list unreadable: {0}")]
    AllowList(#[source] std::io::Error),

    #[error("file download failed: {0:#}")]
    Download(anyhow::Error),

    #[error("file cache error: {0}")]
    Storage(#[source] std::io::Error),

    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("backend failed: {0:#}")]
    Backend(anyhow::Error),

    #[error("chat platform error: {0:#}")]
    Platform(anyhow::Error),
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
