pub mod chat;
pub mod document;
pub mod openai;
pub mod web;

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::constants::{AI_ROLE_TAG, USER_ROLE_TAG};
use crate::selector::{BackendKind, BackendRequest};

pub use chat::ChatBackend;
pub use document::DocumentBackend;
pub use openai::{ChatMessage, OpenAiClient};
pub use web::WebBackend;

/// A model that turns a thread's context into an answer.
///
/// Calls may be slow. Implementations should check `cancel` between steps
/// and race their network awaits against it.
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    async fn invoke(&self, request: BackendRequest, cancel: CancellationToken) -> Result<String>;
}

/// The closed set of answer backends, one per [`BackendKind`].
#[derive(Clone)]
pub struct AnswerBackends {
    pub chat: Arc<dyn AnswerBackend>,
    pub document: Arc<dyn AnswerBackend>,
    pub web: Arc<dyn AnswerBackend>,
}

impl AnswerBackends {
    /// All three backends on top of one OpenAI-compatible client.
    pub fn openai(client: OpenAiClient) -> Self {
        let client = Arc::new(client);
        Self {
            chat: Arc::new(ChatBackend::new(client.clone())),
            document: Arc::new(DocumentBackend::new(client.clone())),
            web: Arc::new(WebBackend::new(client)),
        }
    }

    pub fn backend(&self, kind: BackendKind) -> Arc<dyn AnswerBackend> {
        match kind {
            BackendKind::Chat => self.chat.clone(),
            BackendKind::Document => self.document.clone(),
            BackendKind::Web => self.web.clone(),
        }
    }

    pub async fn dispatch(&self, request: BackendRequest, cancel: CancellationToken) -> Result<String> {
        let backend = self.backend(request.kind());
        backend.invoke(request, cancel).await
    }
}

/// Map role-tagged dialog entries onto chat-completion messages.
///
/// Entries without a known tag are treated as user turns.
pub fn history_to_messages(history: &[String]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|entry| {
            if let Some(rest) = entry.strip_prefix(AI_ROLE_TAG) {
                ChatMessage::assistant(rest.trim())
            } else if let Some(rest) = entry.strip_prefix(USER_ROLE_TAG) {
                ChatMessage::user(rest.trim())
            } else {
                ChatMessage::user(entry.trim())
            }
        })
        .collect()
}

/// Run `fut` unless `cancel` fires first.
pub async fn cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        result = fut => result,
        _ = cancel.cancelled() => anyhow::bail!("backend call cancelled"),
    }
}
