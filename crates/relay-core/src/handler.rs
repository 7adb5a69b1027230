use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::allowlist::AllowList;
use crate::backend::AnswerBackends;
use crate::config::RelayConfig;
use crate::constants::{
    mention_reply, timeout_message, unauthorized_message, unsupported_file_type_message,
    AI_ROLE_TAG, USER_ROLE_TAG,
};
use crate::error::RelayError;
use crate::executor::DispatchExecutor;
use crate::files::FileIngestor;
use crate::normalize::normalize;
use crate::selector::{select_backend, BackendKind};
use crate::slack::{strip_bot_mention, ChatPlatform, MentionEvent};
use crate::store::ConversationStore;

/// Terminal state reached for one mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionOutcome {
    Answered { backend: BackendKind },
    TimedOut,
    /// File upload by a user missing from the allow-list.
    Denied,
    UnsupportedFileType,
}

/// Turns `app_mention` events into threaded answers.
pub struct MentionHandler {
    store: Arc<ConversationStore>,
    allow_list: AllowList,
    ingestor: FileIngestor,
    backends: AnswerBackends,
    executor: DispatchExecutor,
    platform: Arc<dyn ChatPlatform>,
    bot_user_id: Option<String>,
    timeout: Duration,
}

impl MentionHandler {
    pub fn new(
        config: &RelayConfig,
        platform: Arc<dyn ChatPlatform>,
        backends: AnswerBackends,
    ) -> Self {
        Self {
            store: Arc::new(ConversationStore::new(config.history_limit)),
            allow_list: AllowList::new(&config.allow_list_path),
            ingestor: FileIngestor::new(&config.cache_dir, config.allowed_file_types.clone()),
            backends,
            executor: DispatchExecutor::new(config.worker_pool_size),
            platform,
            bot_user_id: config.bot_user_id.clone(),
            timeout: config.response_timeout(),
        }
    }

    pub fn with_bot_user_id(mut self, bot_user_id: Option<String>) -> Self {
        self.bot_user_id = bot_user_id;
        self
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.platform
    }

    /// Handle one mention end to end.
    ///
    /// Denied uploads, unsupported file types and backend timeouts are
    /// answered in-thread and reported as outcomes. Any other failure is
    /// returned after the context updates made so far have been committed.
    pub async fn handle_mention(&self, event: &MentionEvent) -> Result<MentionOutcome, RelayError> {
        let thread_key = event.thread_key();
        let user = event.user.as_str();
        tracing::info!(thread_key, user, channel = %event.channel, "handling mention");

        self.store.ensure(thread_key);

        if let Some(file) = event.first_file() {
            match self.allow_list.authorize(user) {
                Ok(()) => {}
                Err(RelayError::Unauthorized { .. }) => {
                    tracing::info!(thread_key, user, "upload from user outside the allow-list");
                    self.reply(event, &unauthorized_message(user)).await?;
                    return Ok(MentionOutcome::Denied);
                }
                Err(e) => return Err(e),
            }

            match self.ingestor.ingest(self.platform.as_ref(), user, file).await {
                Ok(ingested) => {
                    tracing::info!(
                        thread_key,
                        path = %ingested.path.display(),
                        deduplicated = ingested.deduplicated,
                        "attached document"
                    );
                    self.store.set_file(thread_key, ingested.path);
                }
                Err(RelayError::UnsupportedFileType { filetype }) => {
                    tracing::info!(thread_key, user, filetype = %filetype, "rejected upload");
                    let message =
                        unsupported_file_type_message(user, self.ingestor.allowed_types());
                    self.reply(event, &message).await?;
                    return Ok(MentionOutcome::UnsupportedFileType);
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(text) = &event.text {
            let stripped = strip_bot_mention(text, self.bot_user_id.as_deref());
            let normalized = normalize(stripped.trim());
            // Bare mentions record an empty user turn.
            self.store
                .append_message(thread_key, format!("{} {}", USER_ROLE_TAG, normalized));
            self.store.merge_urls(thread_key, event.link_urls());
        }

        let snapshot = self.store.snapshot(thread_key).unwrap_or_default();
        let request = select_backend(&snapshot);
        let kind = request.kind();
        tracing::debug!(thread_key, backend = %kind, history = request.history().len(), "dispatching");

        let backends = self.backends.clone();
        let handle = self
            .executor
            .submit(move |cancel| async move { backends.dispatch(request, cancel).await });

        let started = Instant::now();
        match self.executor.await_result(handle, self.timeout).await {
            Ok(answer) => {
                tracing::info!(
                    thread_key,
                    backend = %kind,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "answered"
                );
                self.store
                    .append_message(thread_key, format!("{} {}", AI_ROLE_TAG, normalize(&answer)));
                self.reply(event, &mention_reply(user, &answer)).await?;
                Ok(MentionOutcome::Answered { backend: kind })
            }
            Err(RelayError::Timeout(timeout)) => {
                tracing::warn!(thread_key, backend = %kind, timeout_secs = timeout.as_secs(), "answer timed out");
                self.reply(event, &mention_reply(user, &timeout_message(timeout)))
                    .await?;
                Ok(MentionOutcome::TimedOut)
            }
            Err(e) => Err(e),
        }
    }

    async fn reply(&self, event: &MentionEvent, text: &str) -> Result<(), RelayError> {
        self.platform
            .reply(&event.channel, event.thread_key(), text)
            .await
            .map_err(RelayError::Platform)
    }
}
