use crate::ai::client::{AiClient, AiClientSettings};
use crate::ai::types::{ContentPart, FileHandle, FileState, GenerateRequest, LlmError, LlmProvider};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Provider whose generate replies come from a closure; uploads are immediately active.
pub(crate) struct FnProvider<F> {
    handler: F,
    pub generate_calls: AtomicUsize,
    pub uploads: AtomicUsize,
}

#[async_trait]
impl<F> LlmProvider for FnProvider<F>
where
    F: Fn(&GenerateRequest) -> Result<Value, LlmError> + Send + Sync,
{
    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<FileHandle, LlmError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(FileHandle {
            name: format!(
                "files/{}",
                path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
            ),
            uri: path.display().to_string(),
            mime_type: mime_type.to_string(),
            state: FileState::Active,
        })
    }

    async fn get_file(&self, name: &str) -> Result<FileHandle, LlmError> {
        Ok(FileHandle {
            name: name.to_string(),
            uri: name.to_string(),
            mime_type: "application/pdf".to_string(),
            state: FileState::Active,
        })
    }

    async fn generate_content(&self, req: &GenerateRequest) -> Result<Value, LlmError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        (self.handler)(req)
    }
}

pub(crate) fn fn_client<F>(handler: F) -> (AiClient, Arc<FnProvider<F>>)
where
    F: Fn(&GenerateRequest) -> Result<Value, LlmError> + Send + Sync + 'static,
{
    let provider = Arc::new(FnProvider {
        handler,
        generate_calls: AtomicUsize::new(0),
        uploads: AtomicUsize::new(0),
    });
    let settings = AiClientSettings {
        poll_interval: Duration::from_millis(5),
        ready_timeout: Duration::from_millis(200),
        default_retry_delay: Duration::from_millis(5),
        ..AiClientSettings::default()
    };
    (AiClient::new(provider.clone(), settings), provider)
}

pub(crate) fn prompt_text(req: &GenerateRequest) -> String {
    req.contents
        .iter()
        .filter_map(|p| match p {
            ContentPart::Text(t) => Some(t.as_str()),
            ContentPart::File(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn file_uris(req: &GenerateRequest) -> Vec<String> {
    req.contents
        .iter()
        .filter_map(|p| match p {
            ContentPart::File(h) => Some(h.uri.clone()),
            ContentPart::Text(_) => None,
        })
        .collect()
}

/// generateContent body carrying `text` and a fixed token count.
pub(crate) fn reply(text: &str, total_tokens: u64) -> Value {
    json!({
        "candidates": [{"content": {"parts": [{"text": text}]}}],
        "usageMetadata": {
            "promptTokenCount": total_tokens,
            "candidatesTokenCount": 0,
            "totalTokenCount": total_tokens
        }
    })
}
