//! Daily hot-news digest posted to a broadcast channel.

pub mod hackernews;
pub mod v2ex;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::slack::ChatPlatform;

pub use hackernews::HackerNewsSource;
pub use v2ex::V2exSource;

/// Items kept per source in one digest.
pub const DIGEST_MAX_ITEMS: usize = 10;
/// Slack rejects section text longer than this.
const SECTION_TEXT_LIMIT: usize = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
}

/// A site whose current hot list can be fetched.
#[async_trait]
pub trait NewsSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<NewsItem>>;
}

/// Slack blocks for one source: a header followed by bulleted links.
pub fn build_digest_blocks(source_name: &str, items: &[NewsItem]) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": format!("{} hot news", source_name) }
        }),
        json!({ "type": "divider" }),
    ];

    let mut section = String::new();
    for item in items {
        let line = format!("• <{}|{}>\n", item.url, escape_mrkdwn(&item.title));
        if !section.is_empty() && section.len() + line.len() > SECTION_TEXT_LIMIT {
            blocks.push(section_block(&section));
            section.clear();
        }
        section.push_str(&line);
    }
    if !section.is_empty() {
        blocks.push(section_block(&section));
    }

    Value::Array(blocks)
}

fn section_block(text: &str) -> Value {
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": text.trim_end() }
    })
}

fn escape_mrkdwn(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Posts one digest message per source to a channel.
pub struct DigestJob {
    sources: Vec<Arc<dyn NewsSource>>,
    platform: Arc<dyn ChatPlatform>,
    channel: String,
}

impl DigestJob {
    pub fn new(
        sources: Vec<Arc<dyn NewsSource>>,
        platform: Arc<dyn ChatPlatform>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            sources,
            platform,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Fetch every source and post the non-empty digests. A failing source is
    /// logged and skipped. Returns how many digests were posted.
    pub async fn run_once(&self) -> usize {
        let mut posted = 0;
        for source in &self.sources {
            let items = match source.fetch().await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "news source failed");
                    continue;
                }
            };
            if items.is_empty() {
                tracing::debug!(source = source.name(), "news source returned nothing");
                continue;
            }

            let items = &items[..items.len().min(DIGEST_MAX_ITEMS)];
            let blocks = build_digest_blocks(source.name(), items);
            match self.platform.post_blocks(&self.channel, &blocks, true).await {
                Ok(()) => {
                    posted += 1;
                    tracing::info!(source = source.name(), items = items.len(), channel = %self.channel, "posted digest");
                }
                Err(e) => {
                    tracing::error!(source = source.name(), error = %e, "failed to post digest");
                }
            }
        }
        posted
    }

    /// Run the digest every day at `hour:minute` local time until cancelled.
    pub async fn run_daily(&self, hour: u32, minute: u32, cancel: CancellationToken) -> Result<()> {
        loop {
            let now = Local::now();
            let Some(next) = next_run_after(&now, hour, minute) else {
                anyhow::bail!("invalid digest time {:02}:{:02}", hour, minute);
            };
            let wait = (next.clone() - now).to_std().unwrap_or_default();
            tracing::info!(next_run = %next, wait_secs = wait.as_secs(), "digest scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => {
                    tracing::info!("digest scheduler stopped");
                    return Ok(());
                }
            }

            let posted = self.run_once().await;
            tracing::info!(posted, sources = self.sources.len(), "digest run finished");
        }
    }
}

/// The first `hour:minute` strictly after `now` in `now`'s timezone.
///
/// Days where that wall-clock time does not exist (DST gap) are skipped.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32, minute: u32) -> Option<DateTime<Tz>> {
    let today = now.date_naive();
    (0..=2).find_map(|offset| {
        let day = today + ChronoDuration::days(offset);
        let candidate = day
            .and_hms_opt(hour, minute, 0)?
            .and_local_timezone(now.timezone())
            .earliest()?;
        (candidate > *now).then_some(candidate)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::Utc;
    use parking_lot::Mutex;

    struct StaticSource {
        name: &'static str,
        items: Option<Vec<NewsItem>>,
    }

    #[async_trait]
    impl NewsSource for StaticSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self) -> Result<Vec<NewsItem>> {
            self.items.clone().ok_or_else(|| anyhow!("site down"))
        }
    }

    #[derive(Default)]
    struct RecordingPlatform {
        posts: Mutex<Vec<(String, Value, bool)>>,
    }

    #[async_trait]
    impl ChatPlatform for RecordingPlatform {
        async fn reply(&self, _channel: &str, _thread_ts: &str, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn download(&self, _url: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn post_blocks(&self, channel: &str, blocks: &Value, broadcast: bool) -> Result<()> {
            self.posts
                .lock()
                .push((channel.to_string(), blocks.clone(), broadcast));
            Ok(())
        }
    }

    fn item(title: &str, url: &str) -> NewsItem {
        NewsItem {
            title: title.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_build_digest_blocks() {
        let blocks = build_digest_blocks(
            "Hacker News",
            &[
                item("Rust 2.0 <announced>", "https://a.example/1"),
                item("Fish & chips", "https://a.example/2"),
            ],
        );

        let blocks = blocks.as_array().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0]["text"]["text"], "Hacker News hot news");
        assert_eq!(blocks[1]["type"], "divider");
        assert_eq!(
            blocks[2]["text"]["text"],
            "• <https://a.example/1|Rust 2.0 &lt;announced&gt;>\n• <https://a.example/2|Fish &amp; chips>"
        );
    }

    #[test]
    fn test_long_digest_is_split_into_sections() {
        let title = "x".repeat(200);
        let items: Vec<_> = (0..40)
            .map(|i| item(&title, &format!("https://a.example/{}", i)))
            .collect();
        let blocks = build_digest_blocks("V2EX", &items);

        let sections: Vec<_> = blocks
            .as_array()
            .unwrap()
            .iter()
            .filter(|b| b["type"] == "section")
            .collect();
        assert!(sections.len() > 1);
        for section in sections {
            assert!(section["text"]["text"].as_str().unwrap().len() <= SECTION_TEXT_LIMIT);
        }
    }

    #[test]
    fn test_next_run_later_today() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 15, 0).unwrap();
        let next = next_run_after(&now, 1, 30).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 10, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_next_run_rolls_over_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 1, 30, 0).unwrap();
        let next = next_run_after(&now, 1, 30).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 1, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_next_run_rejects_invalid_time() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        assert!(next_run_after(&now, 24, 0).is_none());
    }

    #[tokio::test]
    async fn test_run_once_skips_failing_and_empty_sources() {
        let platform = Arc::new(RecordingPlatform::default());
        let many: Vec<_> = (0..15)
            .map(|i| item(&format!("story {}", i), &format!("https://hn.example/{}", i)))
            .collect();
        let sources: Vec<Arc<dyn NewsSource>> = vec![
            Arc::new(StaticSource {
                name: "Broken",
                items: None,
            }),
            Arc::new(StaticSource {
                name: "Empty",
                items: Some(Vec::new()),
            }),
            Arc::new(StaticSource {
                name: "Hacker News",
                items: Some(many),
            }),
        ];

        let job = DigestJob::new(sources, platform.clone(), "#daily-news");
        assert_eq!(job.run_once().await, 1);

        let posts = platform.posts.lock();
        assert_eq!(posts.len(), 1);
        let (channel, blocks, broadcast) = &posts[0];
        assert_eq!(channel, "#daily-news");
        assert!(*broadcast);
        let text = blocks[2]["text"]["text"].as_str().unwrap();
        assert_eq!(text.lines().count(), DIGEST_MAX_ITEMS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_daily_stops_on_cancel() {
        let platform = Arc::new(RecordingPlatform::default());
        let job = DigestJob::new(Vec::new(), platform, "#daily-news");
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(job.run_daily(1, 30, cancel).await.is_ok());
    }
}
