use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use relay_core::constants::{mention_reply, GENERIC_FAILURE_MESSAGE};
use relay_core::slack::{parse_mention, MentionEvent, SlackEnvelope};
use relay_core::MentionHandler;

use super::signature::verify_slack_signature;

const SIGNATURE_HEADER: &str = "x-slack-signature";
const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const RETRY_HEADER: &str = "x-slack-retry-num";

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<MentionHandler>,
    /// Requests are not verified when unset
    pub signing_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(handler: Arc<MentionHandler>, signing_secret: Option<String>) -> Self {
        Self {
            handler,
            signing_secret: signing_secret.filter(|s| !s.is_empty()).map(Arc::from),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Handler for POST /slack/events
///
/// Mentions are acknowledged immediately and answered on a spawned task, so
/// Slack's three-second delivery deadline is never at risk.
async fn slack_events(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(secret) = state.signing_secret.as_deref() {
        let timestamp = header_str(&headers, TIMESTAMP_HEADER);
        let signature = header_str(&headers, SIGNATURE_HEADER);
        if !verify_slack_signature(secret, timestamp, &body, signature, unix_now()) {
            tracing::warn!("rejected Slack request with invalid signature");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let envelope: SlackEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "unparsable Slack payload");
            return (StatusCode::BAD_REQUEST, "invalid payload").into_response();
        }
    };

    match envelope {
        SlackEnvelope::UrlVerification { challenge } => {
            tracing::info!("answering url_verification challenge");
            Json(json!({ "challenge": challenge })).into_response()
        }
        SlackEnvelope::EventCallback { event_id, event } => {
            if let Some(retry) = headers.get(RETRY_HEADER) {
                tracing::debug!(event_id = ?event_id, retry = ?retry, "ignoring Slack retry delivery");
                return StatusCode::OK.into_response();
            }
            match parse_mention(&event) {
                Some(mention) => {
                    spawn_mention(state.handler.clone(), mention);
                }
                None => tracing::debug!(event_id = ?event_id, "ignoring non-mention event"),
            }
            StatusCode::OK.into_response()
        }
        SlackEnvelope::Other => StatusCode::OK.into_response(),
    }
}

/// Handle a mention in the background. Failures the handler does not answer
/// itself get a generic reply in the thread.
pub fn spawn_mention(handler: Arc<MentionHandler>, event: MentionEvent) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match handler.handle_mention(&event).await {
            Ok(outcome) => {
                tracing::debug!(thread_key = event.thread_key(), outcome = ?outcome, "mention handled");
            }
            Err(e) => {
                tracing::error!(thread_key = event.thread_key(), user = %event.user, error = %e, "mention failed");
                let text = mention_reply(&event.user, GENERIC_FAILURE_MESSAGE);
                if let Err(e) = handler
                    .platform()
                    .reply(&event.channel, event.thread_key(), &text)
                    .await
                {
                    tracing::error!(error = %e, "failed to post failure reply");
                }
            }
        }
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::signature::sign;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use parking_lot::Mutex;
    use relay_core::backend::{AnswerBackend, AnswerBackends};
    use relay_core::selector::BackendRequest;
    use relay_core::slack::ChatPlatform;
    use relay_core::RelayConfig;
    use tokio_util::sync::CancellationToken;

    const SECRET: &str = "shhh";

    #[derive(Default)]
    struct FakePlatform {
        replies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatPlatform for FakePlatform {
        async fn reply(&self, _channel: &str, _thread_ts: &str, text: &str) -> anyhow::Result<()> {
            self.replies.lock().push(text.to_string());
            Ok(())
        }

        async fn download(&self, _url: &str) -> anyhow::Result<Vec<u8>> {
            Err(anyhow!("no files here"))
        }

        async fn post_blocks(
            &self,
            _channel: &str,
            _blocks: &serde_json::Value,
            _broadcast: bool,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FixedBackend(Result<&'static str, &'static str>);

    #[async_trait]
    impl AnswerBackend for FixedBackend {
        async fn invoke(&self, _request: BackendRequest, _cancel: CancellationToken) -> anyhow::Result<String> {
            self.0.map(str::to_string).map_err(|e| anyhow!(e))
        }
    }

    fn state_with(answer: Result<&'static str, &'static str>, secret: Option<&str>) -> (AppState, Arc<FakePlatform>) {
        let platform = Arc::new(FakePlatform::default());
        let backend: Arc<dyn AnswerBackend> = Arc::new(FixedBackend(answer));
        let backends = AnswerBackends {
            chat: backend.clone(),
            document: backend.clone(),
            web: backend,
        };
        let config = RelayConfig {
            bot_user_id: Some("UBOT".to_string()),
            ..RelayConfig::default()
        };
        let handler = Arc::new(MentionHandler::new(&config, platform.clone(), backends));
        (AppState::new(handler, secret.map(str::to_string)), platform)
    }

    fn signed_headers(body: &[u8]) -> HeaderMap {
        let timestamp = unix_now().to_string();
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_str(&timestamp).unwrap());
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&sign(SECRET, &timestamp, body)).unwrap(),
        );
        headers
    }

    fn mention_body() -> Bytes {
        Bytes::from(
            json!({
                "type": "event_callback",
                "event_id": "Ev1",
                "event": {
                    "type": "app_mention",
                    "user": "U1",
                    "channel": "C1",
                    "ts": "100.1",
                    "text": "<@UBOT> hello"
                }
            })
            .to_string(),
        )
    }

    async fn wait_for_replies(platform: &FakePlatform, count: usize) -> Vec<String> {
        for _ in 0..100 {
            let replies = platform.replies.lock().clone();
            if replies.len() >= count {
                return replies;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        platform.replies.lock().clone()
    }

    #[tokio::test]
    async fn test_url_verification() {
        let (state, _) = state_with(Ok("unused"), Some(SECRET));
        let body = Bytes::from(r#"{"type":"url_verification","challenge":"c-123","token":"t"}"#);
        let headers = signed_headers(&body);

        let response = slack_events(State(state), headers, body).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["challenge"], "c-123");
    }

    #[tokio::test]
    async fn test_bad_signature_is_rejected() {
        let (state, platform) = state_with(Ok("unused"), Some(SECRET));
        let body = mention_body();
        let mut headers = signed_headers(&body);
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("v0=00"));

        let response = slack_events(State(state), headers, body).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(platform.replies.lock().is_empty());
    }

    #[tokio::test]
    async fn test_mention_is_acked_and_answered() {
        let (state, platform) = state_with(Ok("hi there"), Some(SECRET));
        let body = mention_body();
        let headers = signed_headers(&body);

        let response = slack_events(State(state.clone()), headers, body).await;
        assert_eq!(response.status(), StatusCode::OK);

        let replies = wait_for_replies(&platform, 1).await;
        assert_eq!(replies, vec!["<@U1>, hi there".to_string()]);
        assert_eq!(
            state.handler.store().snapshot("100.1").unwrap().dialog_texts,
            vec!["User: hello", "AI: hi there"]
        );
    }

    #[tokio::test]
    async fn test_retry_delivery_is_ignored() {
        let (state, platform) = state_with(Ok("hi there"), None);
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_HEADER, HeaderValue::from_static("1"));

        let response = slack_events(State(state.clone()), headers, mention_body()).await;
        assert_eq!(response.status(), StatusCode::OK);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(platform.replies.lock().is_empty());
        assert_eq!(state.handler.store().thread_count(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_gets_generic_reply() {
        let (state, platform) = state_with(Err("model down"), None);
        let response = slack_events(State(state), HeaderMap::new(), mention_body()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let replies = wait_for_replies(&platform, 1).await;
        assert_eq!(replies, vec![mention_reply("U1", GENERIC_FAILURE_MESSAGE)]);
    }

    #[tokio::test]
    async fn test_garbage_payload_is_bad_request() {
        let (state, _) = state_with(Ok("unused"), None);
        let response = slack_events(State(state), HeaderMap::new(), Bytes::from_static(b"nope")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
