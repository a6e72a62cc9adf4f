use crate::ai::gemini::DEFAULT_GEMINI_BASE_URL;
use crate::ai::AiClientSettings;
use crate::evaluate::EvaluatorOptions;
use crate::job::{JobSettings, RetryPolicy};
use crate::storage::repository::SettingRepository;
use anyhow::Context;
use log::{info, warn};
use sea_orm::ConnectionTrait;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const API_KEY_SETTING: &str = "tender_ai.gemini_api_key";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub gemini_base_url: String,
    pub extract_model: String,
    pub evaluate_model: String,
    pub chat_model: String,
    pub company_workers: usize,
    pub document_workers: usize,
    pub max_ai_calls: usize,
    pub eval_attach_pdfs: bool,
    pub eval_pdf_limit: usize,
    pub config_file: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let text = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let number = |key: &str, default: usize| {
            lookup(key)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default)
        };

        Self {
            database_url: text("DATABASE_URL", "sqlite://tender_ai.db?mode=rwc"),
            data_dir: PathBuf::from(text("TENDER_AI_DATA_DIR", "./tender_ai_data")),
            gemini_base_url: text("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
            extract_model: text("TENDER_AI_EXTRACT_MODEL", DEFAULT_MODEL),
            evaluate_model: text("TENDER_AI_EVALUATE_MODEL", DEFAULT_MODEL),
            chat_model: text("TENDER_AI_CHAT_MODEL", DEFAULT_MODEL),
            company_workers: number("TENDER_AI_COMPANY_WORKERS", 4),
            document_workers: number("TENDER_AI_DOCUMENT_WORKERS", 5),
            max_ai_calls: number("TENDER_AI_MAX_AI_CALLS", 8),
            eval_attach_pdfs: lookup("TENDER_AI_EVAL_ATTACH_PDFS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            eval_pdf_limit: number("TENDER_AI_EVAL_PDF_LIMIT", 10),
            config_file: PathBuf::from(text("TENDER_AI_CONFIG", "./tender_ai.conf")),
        }
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            data_dir: self.data_dir.clone(),
            extract_model: self.extract_model.clone(),
            chat_model: self.chat_model.clone(),
            company_workers: self.company_workers,
            document_workers: self.document_workers,
            evaluator: EvaluatorOptions {
                model: self.evaluate_model.clone(),
                attach_pdfs: self.eval_attach_pdfs,
                pdf_limit: self.eval_pdf_limit,
                ..EvaluatorOptions::default()
            },
            retry: RetryPolicy::default(),
        }
    }

    pub fn ai_settings(&self) -> AiClientSettings {
        AiClientSettings {
            max_concurrent_calls: self.max_ai_calls,
            ..AiClientSettings::default()
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// `key = value` lines; `#` starts a comment, quotes around values are dropped.
pub fn parse_config_text(text: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        out.insert(key.to_ascii_lowercase(), value.to_string());
    }
    out
}

pub fn load_config_file(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    Ok(parse_config_text(&text))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiKeySource {
    Environment(&'static str),
    ConfigFile(PathBuf),
    Setting,
}

impl fmt::Display for ApiKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiKeySource::Environment(var) => write!(f, "environment variable {}", var),
            ApiKeySource::ConfigFile(p) => write!(f, "config file {}", p.display()),
            ApiKeySource::Setting => write!(f, "stored setting {}", API_KEY_SETTING),
        }
    }
}

/// Environment first, then the local config file, then the persisted setting.
pub async fn resolve_api_key<C: ConnectionTrait>(
    db: &C,
    config: &AppConfig,
) -> anyhow::Result<Option<(String, ApiKeySource)>> {
    for var in ["GEMINI_API_KEY", "GOOGLE_API_KEY"] {
        if let Some(key) = std::env::var(var).ok().filter(|k| !k.trim().is_empty()) {
            return Ok(Some((key.trim().to_string(), ApiKeySource::Environment(var))));
        }
    }

    if config.config_file.is_file() {
        match load_config_file(&config.config_file) {
            Ok(values) => {
                if let Some(key) = values.get("gemini_api_key").filter(|k| !k.is_empty()) {
                    return Ok(Some((
                        key.clone(),
                        ApiKeySource::ConfigFile(config.config_file.clone()),
                    )));
                }
            }
            Err(e) => warn!("{:#}", e),
        }
    }

    let stored = SettingRepository::get(db, API_KEY_SETTING)
        .await
        .context("reading stored API key")?;
    if let Some(key) = stored.filter(|k| !k.trim().is_empty()) {
        info!("using API key from {}", ApiKeySource::Setting);
        return Ok(Some((key.trim().to_string(), ApiKeySource::Setting)));
    }
    Ok(None)
}
