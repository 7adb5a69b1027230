use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::constants::SLACK_API_BASE;

/// Outbound side of the chat platform, as seen by the relay.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Post `text` into the thread rooted at `thread_ts`.
    async fn reply(&self, channel: &str, thread_ts: &str, text: &str) -> Result<()>;

    /// Fetch a private file URL with the bot's credentials.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;

    /// Post a Block Kit message to a channel.
    async fn post_blocks(&self, channel: &str, blocks: &serde_json::Value, broadcast: bool) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

/// Slack Web API client authenticated with a bot token
pub struct SlackClient {
    token: String,
    client: reqwest::Client,
}

impl SlackClient {
    pub fn new(token: String) -> Self {
        Self {
            token,
            client: reqwest::Client::new(),
        }
    }

    /// User ID of the bot behind the token, used to strip self-mentions
    pub async fn bot_user_id(&self) -> Result<String> {
        let response = self.call("auth.test", &serde_json::json!({})).await?;
        response
            .user_id
            .context("auth.test response did not include user_id")
    }

    async fn call(&self, method: &str, body: &serde_json::Value) -> Result<ApiResponse> {
        let url = format!("{}/{}", SLACK_API_BASE, method);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Slack API error ({}) on {}: {}", status, method, error_text);
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        if !api_response.ok {
            anyhow::bail!(
                "Slack {} failed: {}",
                method,
                api_response.error.as_deref().unwrap_or("unknown error")
            );
        }

        Ok(api_response)
    }
}

#[async_trait]
impl ChatPlatform for SlackClient {
    async fn reply(&self, channel: &str, thread_ts: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "channel": channel,
            "thread_ts": thread_ts,
            "text": text,
        });
        self.call("chat.postMessage", &body).await?;
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .context("Failed to send file download request")?;

        if !response.status().is_success() {
            anyhow::bail!("Slack file download failed ({})", response.status());
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read file download body")?
            .to_vec();

        Ok(bytes)
    }

    async fn post_blocks(&self, channel: &str, blocks: &serde_json::Value, broadcast: bool) -> Result<()> {
        let body = serde_json::json!({
            "channel": channel,
            "text": "",
            "blocks": blocks,
            "reply_broadcast": broadcast,
        });
        self.call("chat.postMessage", &body).await?;
        Ok(())
    }
}
