use crate::ai::build_llm_http_client;
use crate::ai::types::{
    ContentPart, FileHandle, FileState, GenerateRequest, LlmError, LlmProvider,
};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use std::path::Path;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Generative Language REST API (files + generateContent).
#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, base_url: String) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey("GEMINI_API_KEY".to_string()));
        }
        Ok(Self {
            client: build_llm_http_client()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn model_path(model: &str) -> String {
        let m = model.trim();
        match m.strip_prefix("models/") {
            Some(rest) => rest.to_string(),
            None => m.to_string(),
        }
    }

    fn build_body(req: &GenerateRequest) -> Value {
        let parts: Vec<Value> = req
            .contents
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => json!({ "text": text }),
                ContentPart::File(handle) => json!({
                    "file_data": {
                        "mime_type": handle.mime_type,
                        "file_uri": handle.uri,
                    }
                }),
            })
            .collect();
        json!({
            "contents": [
                { "role": "user", "parts": parts }
            ],
            "generationConfig": {
                "temperature": req.temperature
            }
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<FileHandle, LlmError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| LlmError::Io(format!("{}: {}", path.display(), e)))?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document.pdf".to_string());

        // resumable upload: start, then upload+finalize in one request
        let start_url = format!("{}/upload/v1beta/files?key={}", self.base_url, self.api_key);
        let resp = self
            .client
            .post(start_url)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            return Err(classify_error(status, &raw));
        }
        let upload_url = resp
            .headers()
            .get("x-goog-upload-url")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::InvalidResponse("missing x-goog-upload-url header".into()))?;

        let resp = self
            .client
            .post(upload_url)
            .header("Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let v = read_json(resp).await?;
        parse_file_handle(v.get("file").unwrap_or(&v), mime_type)
    }

    async fn get_file(&self, name: &str) -> Result<FileHandle, LlmError> {
        let url = format!("{}/v1beta/{}?key={}", self.base_url, name, self.api_key);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        let v = read_json(resp).await?;
        parse_file_handle(&v, "application/pdf")
    }

    async fn generate_content(&self, req: &GenerateRequest) -> Result<Value, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url,
            Self::model_path(&req.model),
            self.api_key
        );
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&Self::build_body(req))
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        read_json(resp).await
    }
}

async fn read_json(resp: Response) -> Result<Value, LlmError> {
    let status = resp.status();
    let raw = resp
        .text()
        .await
        .map_err(|e| LlmError::Http(e.to_string()))?;
    if !status.is_success() {
        return Err(classify_error(status, &raw));
    }
    serde_json::from_str(&raw)
        .map_err(|e| LlmError::InvalidResponse(format!("json parse failed: {e}, raw={raw}")))
}

fn parse_file_handle(v: &Value, fallback_mime: &str) -> Result<FileHandle, LlmError> {
    let name = v
        .get("name")
        .and_then(|x| x.as_str())
        .ok_or_else(|| LlmError::InvalidResponse(format!("file without name: {v}")))?;
    let uri = v.get("uri").and_then(|x| x.as_str()).unwrap_or_default();
    let mime_type = v
        .get("mimeType")
        .or_else(|| v.get("mime_type"))
        .and_then(|x| x.as_str())
        .unwrap_or(fallback_mime);
    let state = v
        .get("state")
        .and_then(|x| x.as_str())
        .map(FileState::parse)
        .unwrap_or(FileState::Processing);
    Ok(FileHandle {
        name: name.to_string(),
        uri: uri.to_string(),
        mime_type: mime_type.to_string(),
        state,
    })
}

/// Maps an unsuccessful HTTP reply onto the error taxonomy used by `AiClient`.
pub(crate) fn classify_error(status: StatusCode, raw: &str) -> LlmError {
    let lower = raw.to_ascii_lowercase();
    if status == StatusCode::TOO_MANY_REQUESTS || lower.contains("resource_exhausted") {
        return LlmError::RateLimited(raw.to_string());
    }
    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || lower.contains("api key expired")
        || lower.contains("api_key_invalid")
        || lower.contains("api key not valid")
    {
        return LlmError::Unauthorized(raw.to_string());
    }
    if status == StatusCode::NOT_FOUND {
        return LlmError::ModelNotFound(raw.to_string());
    }
    if status.is_client_error() {
        return LlmError::InvalidArgument(format!("{} {}", status.as_u16(), raw));
    }
    LlmError::Http(format!("{} {}", status.as_u16(), raw))
}
