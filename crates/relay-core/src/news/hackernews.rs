use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use std::time::Duration;

use super::{NewsItem, NewsSource, DIGEST_MAX_ITEMS};

const HACKER_NEWS_API_BASE: &str = "https://hacker-news.firebaseio.com/v0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct Story {
    id: u64,
    title: Option<String>,
    url: Option<String>,
    #[serde(default)]
    dead: bool,
    #[serde(default)]
    deleted: bool,
}

impl Story {
    fn into_item(self) -> Option<NewsItem> {
        if self.dead || self.deleted {
            return None;
        }
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        // Ask HN and similar posts have no external link
        let url = self
            .url
            .unwrap_or_else(|| format!("https://news.ycombinator.com/item?id={}", self.id));
        Some(NewsItem { title, url })
    }
}

/// Front-page stories from the Hacker News Firebase API.
pub struct HackerNewsSource {
    client: reqwest::Client,
    api_base: String,
}

impl HackerNewsSource {
    pub fn new() -> Self {
        Self::with_api_base(HACKER_NEWS_API_BASE)
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Hacker News API error: {} for {}", response.status(), url);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {}", url))
    }
}

impl Default for HackerNewsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NewsSource for HackerNewsSource {
    fn name(&self) -> &str {
        "Hacker News"
    }

    async fn fetch(&self) -> Result<Vec<NewsItem>> {
        let ids: Vec<u64> = self
            .get_json(&format!("{}/topstories.json", self.api_base))
            .await?;

        let stories = join_all(ids.iter().take(DIGEST_MAX_ITEMS).map(|id| {
            let url = format!("{}/item/{}.json", self.api_base, id);
            async move { self.get_json::<Option<Story>>(&url).await }
        }))
        .await;

        let mut items = Vec::new();
        for story in stories {
            match story {
                Ok(Some(story)) => items.extend(story.into_item()),
                Ok(None) => {}
                Err(e) => tracing::debug!(error = %e, "skipping story"),
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(json: &str) -> Option<NewsItem> {
        serde_json::from_str::<Story>(json).unwrap().into_item()
    }

    #[test]
    fn test_story_with_link() {
        let item = story(r#"{"id": 1, "title": "Show HN: a relay", "url": "https://relay.example", "score": 120, "type": "story"}"#);
        assert_eq!(
            item,
            Some(NewsItem {
                title: "Show HN: a relay".to_string(),
                url: "https://relay.example".to_string(),
            })
        );
    }

    #[test]
    fn test_text_post_links_to_discussion() {
        let item = story(r#"{"id": 42, "title": "Ask HN: anything?"}"#).unwrap();
        assert_eq!(item.url, "https://news.ycombinator.com/item?id=42");
    }

    #[test]
    fn test_dead_or_untitled_stories_are_dropped() {
        assert!(story(r#"{"id": 1, "title": "gone", "dead": true}"#).is_none());
        assert!(story(r#"{"id": 2, "deleted": true}"#).is_none());
        assert!(story(r#"{"id": 3, "title": "  "}"#).is_none());
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_fetch_live() {
        let items = HackerNewsSource::new().fetch().await.unwrap();
        assert!(!items.is_empty());
    }
}
