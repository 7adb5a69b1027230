use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::web::truncate_chars;
use super::{cancellable, history_to_messages, AnswerBackend, ChatMessage, OpenAiClient};
use crate::selector::BackendRequest;

/// Characters of an inlined text document sent to the model.
const MAX_DOCUMENT_CHARS: usize = 24_000;
/// Binary documents above this size are refused rather than uploaded inline.
const MAX_INLINE_DOCUMENT_BYTES: usize = 20 * 1024 * 1024;

const DOCUMENT_SYSTEM_PROMPT: &str = "Answer the user's question using only the attached document. \
If the document does not contain the answer, say so.";

/// How a cached document is handed to the model, chosen by its file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Text,
    Binary { mime: &'static str },
}

fn document_format(path: &Path) -> DocumentFormat {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "pdf" => DocumentFormat::Binary {
            mime: "application/pdf",
        },
        "docx" => DocumentFormat::Binary {
            mime: "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        },
        "epub" => DocumentFormat::Binary {
            mime: "application/epub+zip",
        },
        _ => DocumentFormat::Text,
    }
}

/// Answers grounded in a single uploaded document.
pub struct DocumentBackend {
    client: Arc<OpenAiClient>,
}

impl DocumentBackend {
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AnswerBackend for DocumentBackend {
    async fn invoke(&self, request: BackendRequest, cancel: CancellationToken) -> Result<String> {
        let kind = request.kind();
        let BackendRequest::Document { history, file } = request else {
            anyhow::bail!("document backend needs a document request, got {}", kind);
        };

        let bytes = tokio::fs::read(&file)
            .await
            .with_context(|| format!("Failed to read cached document {}", file.display()))?;

        if cancel.is_cancelled() {
            anyhow::bail!("backend call cancelled");
        }

        let messages = document_messages(&file, &bytes, &history)?;
        tracing::debug!(file = %file.display(), bytes = bytes.len(), "document-grounded completion");
        cancellable(&cancel, self.client.complete(messages)).await
    }
}

fn document_messages(file: &Path, bytes: &[u8], history: &[String]) -> Result<Vec<ChatMessage>> {
    let question = history_to_messages(history)
        .into_iter()
        .last()
        .and_then(|m| m.content.as_str().map(str::to_string))
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| "Summarize this document.".to_string());

    match document_format(file) {
        DocumentFormat::Text => {
            let text = truncate_chars(&String::from_utf8_lossy(bytes), MAX_DOCUMENT_CHARS);
            Ok(vec![
                ChatMessage::system(format!("{}\n\nDocument:\n{}", DOCUMENT_SYSTEM_PROMPT, text)),
                ChatMessage::user(question),
            ])
        }
        DocumentFormat::Binary { mime } => {
            if bytes.len() > MAX_INLINE_DOCUMENT_BYTES {
                anyhow::bail!(
                    "document is too large to attach ({} bytes, max {})",
                    bytes.len(),
                    MAX_INLINE_DOCUMENT_BYTES
                );
            }
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("document");
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            Ok(vec![
                ChatMessage::system(DOCUMENT_SYSTEM_PROMPT),
                ChatMessage::user_parts(vec![
                    serde_json::json!({
                        "type": "file",
                        "file": {
                            "filename": filename,
                            "file_data": format!("data:{};base64,{}", mime, encoded),
                        }
                    }),
                    serde_json::json!({ "type": "text", "text": question }),
                ]),
            ])
        }
    }
}
