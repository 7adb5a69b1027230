use std::fmt;
use std::path::PathBuf;

use crate::constants::DOCUMENT_HISTORY_LENGTH;
use crate::store::ContextSnapshot;

/// Work order for one of the three answer backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendRequest {
    /// Unconstrained chat over the bounded dialog history.
    Chat { history: Vec<String> },
    /// Answer grounded in an uploaded document; history holds only the latest turn.
    Document { history: Vec<String>, file: PathBuf },
    /// Answer grounded in every URL referenced in the thread.
    Web { history: Vec<String>, urls: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Chat,
    Document,
    Web,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Chat => write!(f, "chat"),
            BackendKind::Document => write!(f, "document"),
            BackendKind::Web => write!(f, "web"),
        }
    }
}

impl BackendRequest {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendRequest::Chat { .. } => BackendKind::Chat,
            BackendRequest::Document { .. } => BackendKind::Document,
            BackendRequest::Web { .. } => BackendKind::Web,
        }
    }

    pub fn history(&self) -> &[String] {
        match self {
            BackendRequest::Chat { history }
            | BackendRequest::Document { history, .. }
            | BackendRequest::Web { history, .. } => history,
        }
    }
}

/// Pick a backend for the thread: an attached file wins over URLs, and
/// general chat is the fallback when there is no grounding material.
pub fn select_backend(snapshot: &ContextSnapshot) -> BackendRequest {
    if let Some(file) = &snapshot.attached_file {
        BackendRequest::Document {
            history: keep_latest(&snapshot.dialog_texts, DOCUMENT_HISTORY_LENGTH),
            file: file.clone(),
        }
    } else if !snapshot.context_urls.is_empty() {
        BackendRequest::Web {
            history: snapshot.dialog_texts.clone(),
            urls: snapshot.context_urls.clone(),
        }
    } else {
        BackendRequest::Chat {
            history: snapshot.dialog_texts.clone(),
        }
    }
}

fn keep_latest(history: &[String], max_len: usize) -> Vec<String> {
    let start = history.len().saturating_sub(max_len);
    history[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(dialog: &[&str], urls: &[&str], file: Option<&str>) -> ContextSnapshot {
        ContextSnapshot {
            dialog_texts: dialog.iter().map(|s| s.to_string()).collect(),
            context_urls: urls.iter().map(|s| s.to_string()).collect(),
            attached_file: file.map(PathBuf::from),
        }
    }

    #[test]
    fn test_file_wins_and_truncates_history() {
        let snap = snapshot(
            &["User: a", "AI: b", "User: c"],
            &["https://a.example"],
            Some("/cache/abc.pdf"),
        );
        match select_backend(&snap) {
            BackendRequest::Document { history, file } => {
                assert_eq!(history, vec!["User: c"]);
                assert_eq!(file, PathBuf::from("/cache/abc.pdf"));
            }
            other => panic!("expected document backend, got {:?}", other),
        }
    }

    #[test]
    fn test_file_with_empty_history() {
        let snap = snapshot(&[], &[], Some("/cache/abc.pdf"));
        let request = select_backend(&snap);
        assert_eq!(request.kind(), BackendKind::Document);
        assert!(request.history().is_empty());
    }

    #[test]
    fn test_urls_select_web_with_full_history() {
        let snap = snapshot(
            &["User: a", "AI: b", "User: c"],
            &["https://a.example", "https://b.example"],
            None,
        );
        match select_backend(&snap) {
            BackendRequest::Web { history, mut urls } => {
                assert_eq!(history.len(), 3);
                urls.sort();
                assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
            }
            other => panic!("expected web backend, got {:?}", other),
        }
    }

    #[test]
    fn test_chat_is_the_fallback() {
        let snap = snapshot(&["User: a", "AI: b"], &[], None);
        assert_eq!(
            select_backend(&snap),
            BackendRequest::Chat {
                history: vec!["User: a".to_string(), "AI: b".to_string()],
            }
        );
    }

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Chat.to_string(), "chat");
        assert_eq!(BackendKind::Document.to_string(), "document");
        assert_eq!(BackendKind::Web.to_string(), "web");
    }
}
