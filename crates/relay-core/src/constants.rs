//! Application-wide constants
//!
//! Centralized location for defaults and user-facing strings
//! that are used across multiple modules.

use std::time::Duration;

/// Default listen address for the Slack events endpoint
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Default OpenAI-compatible API base
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Default chat model used by every answer backend
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Slack Web API base
pub const SLACK_API_BASE: &str = "https://slack.com/api";

// Conversation defaults
/// Number of dialog entries kept per thread.
pub const MAX_THREAD_MESSAGE_HISTORY: usize = 10;
/// History length handed to the document-grounded backend.
pub const DOCUMENT_HISTORY_LENGTH: usize = 1;

// Dispatch defaults
pub const DEFAULT_WORKER_POOL_SIZE: usize = 20;
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(300);

// File ingestion defaults
pub const DEFAULT_ALLOW_LIST_PATH: &str = "app/data/vip_whitelist.txt";
pub const DEFAULT_CACHE_DIR: &str = "index_cache";
pub const ALLOWED_FILE_TYPES: [&str; 5] = ["epub", "pdf", "text", "docx", "markdown"];

// Digest defaults
pub const DEFAULT_DIGEST_CHANNEL: &str = "#daily-news";
pub const DEFAULT_DIGEST_HOUR: u32 = 1;
pub const DEFAULT_DIGEST_MINUTE: u32 = 30;

/// Slack rejects signed requests older than this (replay window)
pub const SLACK_SIGNATURE_MAX_AGE_SECS: i64 = 5 * 60;

// Dialog role tags
pub const USER_ROLE_TAG: &str = "User:";
pub const AI_ROLE_TAG: &str = "AI:";

// User-facing replies
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Something went wrong while answering, please try again later.";

pub fn unauthorized_message(user: &str) -> String {
    format!(
        "<@{}>, this feature is only allowed by whitelist user, please contact the admin to open it.",
        user
    )
}

pub fn unsupported_file_type_message(user: &str, allowed: &[String]) -> String {
    format!(
        "<@{}>, this filetype is not supported, please upload a file with extension [{}]",
        user,
        allowed.join(", ")
    )
}

/// Reply posted when a backend misses its deadline, e.g. "Task timedout(5m) and was canceled."
pub fn timeout_message(timeout: Duration) -> String {
    let secs = timeout.as_secs();
    let label = if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    };
    format!("Task timedout({}) and was canceled.", label)
}

/// Prefix a reply with a mention of the user who asked
pub fn mention_reply(user: &str, text: &str) -> String {
    format!("<@{}>, {}", user, text)
}
