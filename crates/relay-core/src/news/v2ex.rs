use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{NewsItem, NewsSource};

const V2EX_HOT_TOPICS_URL: &str = "https://www.v2ex.com/api/topics/hot.json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct Topic {
    title: String,
    url: String,
    #[serde(default)]
    replies: u64,
}

/// Today's hot topics from the public V2EX API.
pub struct V2exSource {
    client: reqwest::Client,
    url: String,
}

impl V2exSource {
    pub fn new() -> Self {
        Self::with_url(V2EX_HOT_TOPICS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl Default for V2exSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Hot topics ordered by reply count, most discussed first.
fn parse_topics(body: &str) -> Result<Vec<NewsItem>> {
    let mut topics: Vec<Topic> =
        serde_json::from_str(body).context("Failed to parse V2EX hot topics")?;
    topics.sort_by(|a, b| b.replies.cmp(&a.replies));
    Ok(topics
        .into_iter()
        .map(|t| NewsItem {
            title: t.title,
            url: t.url,
        })
        .collect())
}

#[async_trait]
impl NewsSource for V2exSource {
    fn name(&self) -> &str {
        "V2EX"
    }

    async fn fetch(&self) -> Result<Vec<NewsItem>> {
        let response = self
            .client
            .get(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("Failed to fetch V2EX hot topics")?;

        if !response.status().is_success() {
            anyhow::bail!("V2EX API error: {}", response.status());
        }

        let body = response.text().await.context("Failed to read V2EX response")?;
        parse_topics(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topics_orders_by_replies() {
        let body = r#"[
            {"id": 1, "title": "quiet", "url": "https://www.v2ex.com/t/1", "replies": 3},
            {"id": 2, "title": "busy", "url": "https://www.v2ex.com/t/2", "replies": 90, "node": {"name": "qna"}}
        ]"#;
        let items = parse_topics(body).unwrap();
        assert_eq!(items[0].title, "busy");
        assert_eq!(items[1].url, "https://www.v2ex.com/t/1");
    }

    #[test]
    fn test_parse_topics_rejects_garbage() {
        assert!(parse_topics("<html>rate limited</html>").is_err());
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_fetch_live() {
        let items = V2exSource::new().fetch().await.unwrap();
        assert!(!items.is_empty());
    }
}
