use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{cancellable, history_to_messages, AnswerBackend, ChatMessage, OpenAiClient};
use crate::selector::BackendRequest;

const CHAT_SYSTEM_PROMPT: &str = "You are a helpful assistant in a Slack workspace. \
Answer the latest user message, using the earlier turns as context.";

/// General chat over the thread history, with no grounding material.
pub struct ChatBackend {
    client: Arc<OpenAiClient>,
}

impl ChatBackend {
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AnswerBackend for ChatBackend {
    async fn invoke(&self, request: BackendRequest, cancel: CancellationToken) -> Result<String> {
        let mut messages = vec![ChatMessage::system(CHAT_SYSTEM_PROMPT)];
        messages.extend(history_to_messages(request.history()));

        tracing::debug!(turns = messages.len() - 1, model = self.client.model(), "chat completion");
        cancellable(&cancel, self.client.complete(messages)).await
    }
}
