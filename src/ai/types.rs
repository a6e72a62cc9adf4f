use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileState {
    Processing,
    Active,
    Failed,
    Unknown(String),
}

impl FileState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => FileState::Active,
            "PROCESSING" | "STATE_UNSPECIFIED" | "" => FileState::Processing,
            "FAILED" => FileState::Failed,
            other => FileState::Unknown(other.to_string()),
        }
    }
}

/// Remote handle of an uploaded file.
#[derive(Clone, Debug)]
pub struct FileHandle {
    pub name: String,
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
}

#[derive(Clone, Debug)]
pub enum ContentPart {
    Text(String),
    File(FileHandle),
}

#[derive(Clone, Debug)]
pub struct GenerateRequest {
    pub model: String,
    pub temperature: f32,
    pub contents: Vec<ContentPart>,
}

/// Token counters of one or more provider calls. Counters only ever grow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

impl Sum for TokenUsage {
    fn sum<I: Iterator<Item = TokenUsage>>(iter: I) -> TokenUsage {
        iter.fold(TokenUsage::default(), |acc, u| acc + u)
    }
}

#[derive(Clone, Debug)]
pub struct GenerateResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
    pub duration_ms: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    #[error("missing api key: {0}")]
    MissingApiKey(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Raw provider surface. Implementations return the undecoded generate-content body so that
/// text and usage extraction stay in one place (`AiClient`).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<FileHandle, LlmError>;
    async fn get_file(&self, name: &str) -> Result<FileHandle, LlmError>;
    async fn generate_content(&self, req: &GenerateRequest) -> Result<Value, LlmError>;
}

/// Rewrites provider failures that operators can act on into a readable message.
pub fn friendly_error_text(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("api key expired") || lower.contains("api_key_expired") {
        return "Gemini API key has expired. Renew the key and set GEMINI_API_KEY (environment, \
                tender_ai.conf or the tender_ai.gemini_api_key setting), then restart the service."
            .to_string();
    }
    if lower.contains("api key not valid")
        || lower.contains("api_key_invalid")
        || lower.contains("invalid api key")
        || lower.contains("missing api key")
    {
        return "Gemini API key is missing or invalid. Set GEMINI_API_KEY (environment, \
                tender_ai.conf or the tender_ai.gemini_api_key setting), then restart the service."
            .to_string();
    }
    if lower.contains("permission_denied") || lower.contains("permission denied") {
        return format!(
            "Gemini API rejected the request (permission denied). Check that the API key belongs \
             to a project with the Generative Language API enabled. Details: {}",
            raw
        );
    }
    if lower.contains("resource_exhausted") || lower.contains("quota") {
        return format!(
            "Gemini API quota exhausted; retry later or raise the project quota. Details: {}",
            raw
        );
    }
    if lower.contains("model not found") || lower.contains("is not found for api version") {
        return format!(
            "Configured Gemini model is not available. Check TENDER_AI_EXTRACT_MODEL / \
             TENDER_AI_EVALUATE_MODEL. Details: {}",
            raw
        );
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_sum_is_additive() {
        let parts = vec![
            TokenUsage {
                prompt_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            },
            TokenUsage::default(),
            TokenUsage {
                prompt_tokens: 1,
                output_tokens: 2,
                total_tokens: 3,
            },
        ];
        let total: TokenUsage = parts.into_iter().sum();
        assert_eq!(total.prompt_tokens, 11);
        assert_eq!(total.output_tokens, 7);
        assert_eq!(total.total_tokens, 18);
    }

    #[test]
    fn test_file_state_parse() {
        assert_eq!(FileState::parse("ACTIVE"), FileState::Active);
        assert_eq!(FileState::parse("processing"), FileState::Processing);
        assert_eq!(FileState::parse("FAILED"), FileState::Failed);
        assert_eq!(
            FileState::parse("ARCHIVED"),
            FileState::Unknown("ARCHIVED".to_string())
        );
    }

    #[test]
    fn test_friendly_error_text_expired_key() {
        let msg = friendly_error_text("400 API key expired. Please renew the API key.");
        assert!(msg.contains("expired"));
        assert!(msg.contains("GEMINI_API_KEY"));
        assert!(msg.contains("restart"));
    }

    #[test]
    fn test_friendly_error_text_passthrough() {
        assert_eq!(friendly_error_text("disk full"), "disk full");
    }
}
