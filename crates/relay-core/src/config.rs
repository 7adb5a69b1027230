use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Relay configuration that can be loaded from a JSON file.
///
/// Secrets are normally supplied through the environment and overlaid with
/// [`RelayConfig::apply_env`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    pub bind_addr: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_signing_secret: Option<String>,

    /// The bot's own user ID; resolved through `auth.test` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_user_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,

    pub openai_api_base: String,
    pub model: String,

    pub allow_list_path: PathBuf,
    pub cache_dir: PathBuf,
    pub allowed_file_types: Vec<String>,

    pub worker_pool_size: usize,
    pub response_timeout_secs: u64,
    pub history_limit: usize,

    pub digest: DigestConfig,
}

/// Daily hot-news digest schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DigestConfig {
    pub enabled: bool,
    pub channel: String,
    /// Local wall-clock hour
    pub hour: u32,
    pub minute: u32,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: DEFAULT_DIGEST_CHANNEL.to_string(),
            hour: DEFAULT_DIGEST_HOUR,
            minute: DEFAULT_DIGEST_MINUTE,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            slack_token: None,
            slack_signing_secret: None,
            bot_user_id: None,
            openai_api_key: None,
            openai_api_base: OPENAI_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            allow_list_path: PathBuf::from(DEFAULT_ALLOW_LIST_PATH),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            allowed_file_types: ALLOWED_FILE_TYPES.iter().map(|s| s.to_string()).collect(),
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            response_timeout_secs: DEFAULT_RESPONSE_TIMEOUT.as_secs(),
            history_limit: MAX_THREAD_MESSAGE_HISTORY,
            digest: DigestConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: RelayConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Default config location: ~/.chatrelay/config.json
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chatrelay")
            .join("config.json")
    }

    /// Overlay secrets and endpoints from the process environment
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| var(key).filter(|v| !v.is_empty());

        if let Some(token) = non_empty("SLACK_TOKEN") {
            self.slack_token = Some(token);
        }
        if let Some(secret) = non_empty("SLACK_SIGNING_SECRET") {
            self.slack_signing_secret = Some(secret);
        }
        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(base) = non_empty("OPENAI_API_BASE") {
            self.openai_api_base = base;
        }
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Fail early on settings the relay cannot run without
    pub fn validate(&self) -> Result<()> {
        if self.slack_token.as_deref().unwrap_or_default().is_empty() {
            anyhow::bail!("Slack bot token missing (set SLACK_TOKEN or slackToken)");
        }
        if self.openai_api_key.as_deref().unwrap_or_default().is_empty() {
            anyhow::bail!("OpenAI API key missing (set OPENAI_API_KEY or openaiApiKey)");
        }
        if self.response_timeout_secs == 0 {
            anyhow::bail!("responseTimeoutSecs must be greater than zero");
        }
        if self.digest.hour > 23 || self.digest.minute > 59 {
            anyhow::bail!(
                "invalid digest time {:02}:{:02}",
                self.digest.hour,
                self.digest.minute
            );
        }
        Ok(())
    }
}
