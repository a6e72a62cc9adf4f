use crate::ai::types::{
    ContentPart, FileHandle, FileState, GenerateRequest, GenerateResponse, LlmError, LlmProvider,
    TokenUsage,
};
use log::{debug, info, warn};
use moka::sync::Cache;
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;

#[derive(Clone, Debug)]
pub struct AiClientSettings {
    pub max_concurrent_calls: usize,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    pub rate_limit_retries: u32,
    pub default_retry_delay: Duration,
    pub file_cache_ttl: Duration,
    pub file_cache_capacity: u64,
}

impl Default for AiClientSettings {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 8,
            ready_timeout: Duration::from_secs(90),
            poll_interval: Duration::from_secs(1),
            rate_limit_retries: 3,
            default_retry_delay: Duration::from_secs(10),
            file_cache_ttl: Duration::from_secs(3600),
            file_cache_capacity: 10_000,
        }
    }
}

/// Provider adapter shared by every extractor and the evaluator.
///
/// One instance per process: the semaphore bounds concurrent provider calls across all jobs and
/// worker pools, and the file cache maps local paths to uploaded handles.
pub struct AiClient {
    provider: Arc<dyn LlmProvider>,
    settings: AiClientSettings,
    permits: Arc<Semaphore>,
    files: Cache<PathBuf, FileHandle>,
}

impl AiClient {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: AiClientSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_calls.max(1)));
        let files = Cache::builder()
            .max_capacity(settings.file_cache_capacity)
            .time_to_live(settings.file_cache_ttl)
            .build();
        Self {
            provider,
            settings,
            permits,
            files,
        }
    }

    pub fn settings(&self) -> &AiClientSettings {
        &self.settings
    }

    /// Uploads `path` and waits for the remote file to become active.
    ///
    /// A cache hit is returned as-is without polling. On timeout the last observed handle is
    /// returned, whatever its state.
    pub async fn upload(&self, path: &Path, use_cache: bool) -> Result<FileHandle, LlmError> {
        let key = path.to_path_buf();
        if use_cache {
            if let Some(handle) = self.files.get(&key) {
                debug!("file cache hit: {}", path.display());
                return Ok(handle);
            }
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| LlmError::Http(format!("ai permits closed: {e}")))?;

        let started = Instant::now();
        let mut handle = self
            .provider
            .upload_file(path, mime_for_path(path))
            .await?;
        while !matches!(handle.state, FileState::Active | FileState::Failed)
            && started.elapsed() < self.settings.ready_timeout
        {
            sleep(self.settings.poll_interval).await;
            match self.provider.get_file(&handle.name).await {
                Ok(h) => handle = h,
                Err(e) => warn!("polling {} failed: {}", handle.name, e),
            }
        }

        if handle.state == FileState::Active {
            self.files.insert(key, handle.clone());
        } else {
            warn!(
                "file {} not active after {:?}: {:?}",
                path.display(),
                started.elapsed(),
                handle.state
            );
        }
        Ok(handle)
    }

    /// Calls generate-content, retrying rate-limit errors with the provider suggested delay.
    pub async fn generate(
        &self,
        contents: Vec<ContentPart>,
        model: &str,
        temperature: f32,
    ) -> Result<GenerateResponse, LlmError> {
        let req = GenerateRequest {
            model: model.to_string(),
            temperature,
            contents,
        };
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            let result = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|e| LlmError::Http(format!("ai permits closed: {e}")))?;
                self.provider.generate_content(&req).await
            };

            match result {
                Ok(body) => {
                    let text = extract_text(&body)?;
                    let usage = extract_usage(&body);
                    let model = body
                        .get("modelVersion")
                        .and_then(|m| m.as_str())
                        .unwrap_or(model)
                        .to_string();
                    let duration_ms = started.elapsed().as_millis() as u64;
                    info!(
                        "generate ok model={} tokens={} duration={}ms",
                        model, usage.total_tokens, duration_ms
                    );
                    return Ok(GenerateResponse {
                        text,
                        usage,
                        model,
                        duration_ms,
                    });
                }
                Err(LlmError::RateLimited(message)) if attempt < self.settings.rate_limit_retries => {
                    attempt += 1;
                    let delay =
                        parse_retry_delay(&message).unwrap_or(self.settings.default_retry_delay);
                    warn!(
                        "rate limited, retry {}/{} in {:?}",
                        attempt, self.settings.rate_limit_retries, delay
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

fn retry_delay_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r#""retryDelay"\s*:\s*"(\d+(?:\.\d+)?)s""#).unwrap(),
            Regex::new(r"(?i)retry in (\d+(?:\.\d+)?)\s*s").unwrap(),
            Regex::new(r"(?i)retry_delay\s*\{\s*seconds:\s*(\d+)").unwrap(),
        ]
    })
}

/// Extracts the provider suggested back-off from a rate-limit error message.
pub fn parse_retry_delay(message: &str) -> Option<Duration> {
    for re in retry_delay_patterns() {
        if let Some(caps) = re.captures(message) {
            if let Some(secs) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) {
                // a little headroom so the retry lands after the window
                return Some(Duration::from_secs_f64(secs.max(0.0) + 1.0));
            }
        }
    }
    None
}

/// Pulls the generated text out of the known response shapes.
pub fn extract_text(body: &Value) -> Result<String, LlmError> {
    if let Some(parts) = body
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
    {
        let texts: Vec<&str> = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect();
        if !texts.is_empty() {
            return Ok(texts.join(""));
        }
    }
    if let Some(Value::String(s)) = body.get("text") {
        return Ok(s.clone());
    }
    if let Some(Value::String(s)) = body.get("output_text") {
        return Ok(s.clone());
    }
    if let Some(Value::String(s)) = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
    {
        return Ok(s.clone());
    }
    if let Some(reason) = body
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(|r| r.as_str())
    {
        return Err(LlmError::InvalidResponse(format!("prompt blocked: {reason}")));
    }
    Err(LlmError::InvalidResponse(
        "no text in generate response".to_string(),
    ))
}

fn count(v: Option<&Value>) -> Option<u64> {
    match v? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Token usage across response shapes; zero when the provider omits it.
pub fn extract_usage(body: &Value) -> TokenUsage {
    let shapes: [(&str, &[&str], &[&str], &str); 3] = [
        (
            "usageMetadata",
            &["promptTokenCount"],
            &["candidatesTokenCount"],
            "totalTokenCount",
        ),
        (
            "usage_metadata",
            &["prompt_token_count"],
            &["candidates_token_count"],
            "total_token_count",
        ),
        (
            "usage",
            &["prompt_tokens", "input_tokens"],
            &["completion_tokens", "output_tokens"],
            "total_tokens",
        ),
    ];
    for (key, prompt_keys, output_keys, total_key) in shapes {
        let Some(meta) = body.get(key).filter(|m| m.is_object()) else {
            continue;
        };
        let prompt = prompt_keys
            .iter()
            .find_map(|k| count(meta.get(*k)))
            .unwrap_or(0);
        let output = output_keys
            .iter()
            .find_map(|k| count(meta.get(*k)))
            .unwrap_or(0);
        let total = count(meta.get(total_key)).unwrap_or(prompt + output);
        return TokenUsage {
            prompt_tokens: prompt,
            output_tokens: output,
            total_tokens: total,
        };
    }
    TokenUsage::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedProvider {
        replies: Mutex<Vec<Result<Value, LlmError>>>,
        uploads: AtomicUsize,
        polls: AtomicUsize,
        upload_state: FileState,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<Value, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                uploads: AtomicUsize::new(0),
                polls: AtomicUsize::new(0),
                upload_state: FileState::Processing,
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn upload_file(&self, path: &Path, mime: &str) -> Result<FileHandle, LlmError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(FileHandle {
                name: format!("files/{}", path.display()),
                uri: "uri".to_string(),
                mime_type: mime.to_string(),
                state: self.upload_state.clone(),
            })
        }

        async fn get_file(&self, name: &str) -> Result<FileHandle, LlmError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(FileHandle {
                name: name.to_string(),
                uri: "uri".to_string(),
                mime_type: "application/pdf".to_string(),
                state: if n >= 1 {
                    FileState::Active
                } else {
                    FileState::Processing
                },
            })
        }

        async fn generate_content(&self, _req: &GenerateRequest) -> Result<Value, LlmError> {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(LlmError::Http("script exhausted".to_string()));
            }
            replies.remove(0)
        }
    }

    fn fast_settings() -> AiClientSettings {
        AiClientSettings {
            poll_interval: Duration::from_millis(5),
            ready_timeout: Duration::from_millis(500),
            default_retry_delay: Duration::from_millis(5),
            ..AiClientSettings::default()
        }
    }

    #[test]
    fn test_parse_retry_delay_variants() {
        let a = parse_retry_delay(r#"{"details":[{"retryDelay": "12s"}]}"#).unwrap();
        assert_eq!(a, Duration::from_secs(13));
        let b = parse_retry_delay("Quota exceeded. Please retry in 2.5s.").unwrap();
        assert_eq!(b, Duration::from_secs_f64(3.5));
        let c = parse_retry_delay("retry_delay { seconds: 7 }").unwrap();
        assert_eq!(c, Duration::from_secs(8));
        assert!(parse_retry_delay("slow down").is_none());
    }

    #[test]
    fn test_extract_usage_shapes() {
        let a = extract_usage(&json!({"usageMetadata": {
            "promptTokenCount": 100, "candidatesTokenCount": 20, "totalTokenCount": 130}}));
        assert_eq!(a.prompt_tokens, 100);
        assert_eq!(a.output_tokens, 20);
        assert_eq!(a.total_tokens, 130);

        let b = extract_usage(&json!({"usage": {"input_tokens": "7", "output_tokens": 3}}));
        assert_eq!(b.total_tokens, 10);

        let c = extract_usage(&json!({"usage_metadata": {"prompt_token_count": 4}}));
        assert_eq!(c.prompt_tokens, 4);
        assert_eq!(c.total_tokens, 4);

        assert_eq!(extract_usage(&json!({"candidates": []})), TokenUsage::default());
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = json!({"candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}]});
        assert_eq!(extract_text(&body).unwrap(), "{\"a\":1}");
        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        assert!(matches!(
            extract_text(&blocked),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_retries_rate_limit_then_succeeds() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(LlmError::RateLimited("slow down".to_string())),
            Ok(json!({"text": "ok", "usage": {"prompt_tokens": 1, "completion_tokens": 1}})),
        ]));
        let client = AiClient::new(provider, fast_settings());
        let resp = client
            .generate(vec![ContentPart::Text("hi".into())], "m", 0.0)
            .await
            .unwrap();
        assert_eq!(resp.text, "ok");
        assert_eq!(resp.usage.total_tokens, 2);
        assert_eq!(resp.model, "m");
    }

    #[tokio::test]
    async fn test_generate_gives_up_after_retry_budget() {
        let replies = (0..5)
            .map(|_| Err(LlmError::RateLimited("slow down".to_string())))
            .collect();
        let client = AiClient::new(Arc::new(ScriptedProvider::new(replies)), fast_settings());
        let err = client
            .generate(vec![ContentPart::Text("hi".into())], "m", 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_generate_does_not_retry_model_not_found() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(LlmError::ModelNotFound("nope".to_string())),
            Ok(json!({"text": "unreachable"})),
        ]));
        let client = AiClient::new(provider, fast_settings());
        let err = client
            .generate(vec![ContentPart::Text("hi".into())], "m", 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ModelNotFound(_)));
    }

    #[tokio::test]
    async fn test_upload_polls_until_active_and_caches() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let client = AiClient::new(provider.clone(), fast_settings());
        let path = Path::new("/tmp/some.pdf");

        let first = client.upload(path, true).await.unwrap();
        assert_eq!(first.state, FileState::Active);
        assert_eq!(provider.polls.load(Ordering::SeqCst), 2);

        let second = client.upload(path, true).await.unwrap();
        assert_eq!(second.name, first.name);
        assert_eq!(provider.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(provider.polls.load(Ordering::SeqCst), 2);

        client.upload(path, false).await.unwrap();
        assert_eq!(provider.uploads.load(Ordering::SeqCst), 2);
    }
}
