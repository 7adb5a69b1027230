use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use super::history::BoundedHistory;

/// Accumulated context of one Slack thread.
#[derive(Debug, Clone)]
pub struct ThreadContext {
    pub dialog_texts: BoundedHistory,
    pub context_urls: HashSet<String>,
    pub attached_file: Option<PathBuf>,
}

impl ThreadContext {
    pub fn new(history_limit: usize) -> Self {
        Self {
            dialog_texts: BoundedHistory::new(history_limit),
            context_urls: HashSet::new(),
            attached_file: None,
        }
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            dialog_texts: self.dialog_texts.to_vec(),
            context_urls: self.context_urls.iter().cloned().collect(),
            attached_file: self.attached_file.clone(),
        }
    }
}

/// Read-only copy of a thread's context, detached from the store lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub dialog_texts: Vec<String>,
    /// Order is unspecified.
    pub context_urls: Vec<String>,
    pub attached_file: Option<PathBuf>,
}

/// Process-wide map from thread key to [`ThreadContext`].
///
/// Threads are never evicted; only each thread's dialog history is bounded.
/// Every mutation on a thread must be preceded by [`ConversationStore::ensure`].
pub struct ConversationStore {
    threads: Mutex<HashMap<String, ThreadContext>>,
    history_limit: usize,
}

impl ConversationStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
            history_limit,
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    // ===== Query Methods =====

    pub fn contains(&self, thread_key: &str) -> bool {
        self.threads.lock().contains_key(thread_key)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn snapshot(&self, thread_key: &str) -> Option<ContextSnapshot> {
        self.threads.lock().get(thread_key).map(ThreadContext::snapshot)
    }

    // ===== Mutation Methods =====

    /// Create an empty context for `thread_key` unless one exists.
    pub fn ensure(&self, thread_key: &str) {
        let history_limit = self.history_limit;
        self.threads
            .lock()
            .entry(thread_key.to_string())
            .or_insert_with(|| ThreadContext::new(history_limit));
    }

    /// Append a dialog entry. Returns false if the thread was never ensured.
    pub fn append_message(&self, thread_key: &str, text: String) -> bool {
        self.with_thread(thread_key, |ctx| ctx.dialog_texts.push(text))
    }

    /// Union `urls` into the thread's URL set. Returns false if the thread was never ensured.
    pub fn merge_urls<I>(&self, thread_key: &str, urls: I) -> bool
    where
        I: IntoIterator<Item = String>,
    {
        self.with_thread(thread_key, |ctx| ctx.context_urls.extend(urls))
    }

    /// Replace the attached file. Returns false if the thread was never ensured.
    pub fn set_file(&self, thread_key: &str, file: PathBuf) -> bool {
        self.with_thread(thread_key, |ctx| ctx.attached_file = Some(file))
    }

    fn with_thread<F>(&self, thread_key: &str, f: F) -> bool
    where
        F: FnOnce(&mut ThreadContext),
    {
        let mut threads = self.threads.lock();
        match threads.get_mut(thread_key) {
            Some(ctx) => {
                f(ctx);
                true
            }
            None => {
                tracing::warn!(thread_key, "mutation on a thread that was never ensured");
                false
            }
        }
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(crate::constants::MAX_THREAD_MESSAGE_HISTORY)
    }
}
