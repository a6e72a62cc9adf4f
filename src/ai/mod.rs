pub mod client;
pub mod gemini;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{AiClient, AiClientSettings};
pub use gemini::GeminiProvider;
pub use types::{
    friendly_error_text, ContentPart, FileHandle, FileState, GenerateRequest, GenerateResponse,
    LlmError, LlmProvider, TokenUsage,
};

pub(crate) fn build_llm_http_client() -> Result<reqwest::Client, LlmError> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(20))
        .timeout(std::time::Duration::from_secs(600));

    if let Ok(raw) = std::env::var("LLM_PROXY") {
        let t = raw.trim();
        if !t.is_empty() {
            let url = if t.contains("://") {
                t.to_string()
            } else {
                format!("socks5h://{}", t)
            };
            let proxy = reqwest::Proxy::all(&url).map_err(|e| LlmError::Http(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
    }

    builder.build().map_err(|e| LlmError::Http(e.to_string()))
}
