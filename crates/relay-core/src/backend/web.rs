use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use regex::{Captures, Regex};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{cancellable, history_to_messages, AnswerBackend, ChatMessage, OpenAiClient};
use crate::selector::BackendRequest;

const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(15);
/// Characters of visible text kept per page.
const MAX_PAGE_CHARS: usize = 6000;

/// Answers grounded in the web pages referenced in the thread.
pub struct WebBackend {
    client: Arc<OpenAiClient>,
}

struct Page {
    url: String,
    text: String,
}

impl WebBackend {
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }

    async fn fetch_page(&self, url: &str) -> Result<Page> {
        let response = self
            .client
            .http()
            .get(url)
            .timeout(PAGE_FETCH_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Fetching {} returned {}", url, response.status());
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;

        Ok(Page {
            url: url.to_string(),
            text: truncate_chars(&html_to_text(&body), MAX_PAGE_CHARS),
        })
    }
}

#[async_trait]
impl AnswerBackend for WebBackend {
    async fn invoke(&self, request: BackendRequest, cancel: CancellationToken) -> Result<String> {
        let kind = request.kind();
        let BackendRequest::Web { history, urls } = request else {
            anyhow::bail!("web backend needs a web request, got {}", kind);
        };

        let fetches = join_all(urls.iter().map(|url| self.fetch_page(url)));
        let results = cancellable(&cancel, async { Ok(fetches.await) }).await?;

        let mut pages = Vec::new();
        for result in results {
            match result {
                Ok(page) if !page.text.is_empty() => pages.push(page),
                Ok(page) => tracing::debug!(url = %page.url, "page has no visible text"),
                Err(e) => tracing::warn!(error = %e, "skipping unreachable page"),
            }
        }
        if pages.is_empty() {
            anyhow::bail!("none of the {} referenced pages could be loaded", urls.len());
        }

        if cancel.is_cancelled() {
            anyhow::bail!("backend call cancelled");
        }

        let mut messages = vec![ChatMessage::system(grounding_prompt(&pages))];
        messages.extend(history_to_messages(&history));

        tracing::debug!(pages = pages.len(), "web-grounded completion");
        cancellable(&cancel, self.client.complete(messages)).await
    }
}

fn grounding_prompt(pages: &[Page]) -> String {
    let mut prompt = String::from(
        "Answer the user's question using the web pages below. \
If they do not contain the answer, say so.\n",
    );
    for (i, page) in pages.iter().enumerate() {
        prompt.push_str(&format!("\n[{}] {}\n{}\n", i + 1, page.url, page.text));
    }
    prompt
}

static HIDDEN_BLOCKS: OnceLock<Option<Regex>> = OnceLock::new();
static TAGS: OnceLock<Option<Regex>> = OnceLock::new();
static ENTITIES: OnceLock<Option<Regex>> = OnceLock::new();

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Reduce an HTML document to its visible text.
pub(crate) fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();

    if let Some(re) = cached(
        &HIDDEN_BLOCKS,
        r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->",
    ) {
        text = re.replace_all(&text, " ").into_owned();
    }
    // A tag cut off by the end of the body is dropped too.
    if let Some(re) = cached(&TAGS, r"<[^>]*(?:>|$)") {
        text = re.replace_all(&text, " ").into_owned();
    }
    if let Some(re) = cached(&ENTITIES, r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);") {
        text = re
            .replace_all(&text, |caps: &Captures| {
                decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entity(entity: &str) -> Option<String> {
    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse().ok()?
    } else {
        let named = match entity {
            "nbsp" => ' ',
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            "hellip" => '…',
            "mdash" => '\u{2014}',
            "ndash" => '\u{2013}',
            "copy" => '©',
            _ => return None,
        };
        return Some(named.to_string());
    };
    char::from_u32(code).map(|c| c.to_string())
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text() {
        let html = r#"<html><head><title>T</title><style>p { color: red; }</style>
            <script type="text/javascript">var x = "<b>";</script></head>
            <body><!-- note --><h1>Hello</h1><p>Fish &amp; chips&nbsp;today</p></body></html>"#;
        assert_eq!(html_to_text(html), "T Hello Fish & chips today");
    }

    #[test]
    fn test_html_to_text_unclosed() {
        assert_eq!(html_to_text("plain <b>bold"), "plain bold");
        assert_eq!(html_to_text("cut <scr"), "cut");
        assert_eq!(html_to_text("a <SCRIPT>x</SCRIPT> b"), "a b");
    }

    #[test]
    fn test_html_entities_are_decoded() {
        assert_eq!(
            html_to_text("<p>&#20320;&#x597D; &quot;hi&quot; &apos;x&apos; &unknown; 1 &lt; 2</p>"),
            "你好 \"hi\" 'x' &unknown; 1 < 2"
        );
        assert_eq!(html_to_text("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("世界你好", 2), "世界");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_grounding_prompt_lists_sources() {
        let pages = vec![
            Page {
                url: "https://a.example".to_string(),
                text: "alpha".to_string(),
            },
            Page {
                url: "https://b.example".to_string(),
                text: "beta".to_string(),
            },
        ];
        let prompt = grounding_prompt(&pages);
        assert!(prompt.contains("[1] https://a.example\nalpha"));
        assert!(prompt.contains("[2] https://b.example\nbeta"));
    }

    #[tokio::test]
    async fn test_rejects_other_requests() {
        let backend = WebBackend::new(Arc::new(OpenAiClient::new(
            "key".to_string(),
            "http://127.0.0.1:9".to_string(),
            "m".to_string(),
        )));
        let result = backend
            .invoke(BackendRequest::Chat { history: vec![] }, CancellationToken::new())
            .await;
        assert!(result.is_err());
    }
}
