use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Outer payload of the Slack Events API.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEnvelope {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        #[serde(default)]
        event_id: Option<String>,
        event: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

/// An `app_mention` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MentionEvent {
    pub user: String,
    pub channel: String,
    pub ts: String,
    /// Root message of the thread when the mention is a threaded reply.
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub files: Vec<SlackFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub elements: Vec<BlockElement>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockElement {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub elements: Vec<InlineElement>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InlineElement {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackFile {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub filetype: String,
    pub url_private: String,
    #[serde(default)]
    pub mimetype: Option<String>,
}

impl MentionEvent {
    /// Key of the conversation this event belongs to: the thread root for
    /// threaded replies, otherwise the event itself.
    pub fn thread_key(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    /// Every `link` element in the rich-text blocks, deduplicated and kept as
    /// written. Links that are not absolute URLs are skipped.
    pub fn link_urls(&self) -> Vec<String> {
        let mut urls = BTreeSet::new();
        for block in &self.blocks {
            for element in &block.elements {
                for inline in &element.elements {
                    if inline.kind != "link" {
                        continue;
                    }
                    let Some(raw) = inline.url.as_deref() else {
                        continue;
                    };
                    match url::Url::parse(raw) {
                        Ok(_) => {
                            urls.insert(raw.to_string());
                        }
                        Err(e) => {
                            tracing::debug!(url = raw, error = %e, "skipping unparsable link");
                        }
                    }
                }
            }
        }
        urls.into_iter().collect()
    }

    /// Only the first attachment of an event is used.
    pub fn first_file(&self) -> Option<&SlackFile> {
        self.files.first()
    }
}

/// Parse the inner event of an `event_callback`, if it is an `app_mention`.
pub fn parse_mention(event: &serde_json::Value) -> Option<MentionEvent> {
    if event.get("type").and_then(|t| t.as_str()) != Some("app_mention") {
        return None;
    }
    match serde_json::from_value(event.clone()) {
        Ok(mention) => Some(mention),
        Err(e) => {
            tracing::warn!(error = %e, "malformed app_mention event");
            None
        }
    }
}

/// Remove the bot's own `<@ID>` token from the message text.
pub fn strip_bot_mention(text: &str, bot_user_id: Option<&str>) -> String {
    match bot_user_id {
        Some(id) if !id.is_empty() => text.replace(&format!("<@{}>", id), ""),
        _ => text.to_string(),
    }
}
