//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.kestrel/config.json`) and environment.
//! Tokens set in the environment always win over the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Slack bot and app tokens.
    #[serde(default)]
    pub slack: SlackConfig,

    /// OCR engine settings.
    #[serde(default)]
    pub ocr: OcrConfig,

    /// Classification and summarization backend.
    #[serde(default)]
    pub models: ModelsConfig,

    /// Background work limits for the desktop and CLI text commands.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Slack credentials and API endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Bot User OAuth token (xoxb-...). Overridden by SLACK_BOT_TOKEN env.
    pub bot_token: Option<String>,
    /// App-level token with `connections:write` (xapp-...). Overridden by SLACK_APP_TOKEN env.
    pub app_token: Option<String>,
    /// Web API base (default "https://slack.com/api").
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            app_token: None,
            api_base: default_slack_api_base(),
        }
    }
}

/// Tesseract invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrConfig {
    /// Binary name or path (default "tesseract").
    #[serde(default = "default_ocr_binary")]
    pub binary: String,
    /// Tesseract language pack (default "eng").
    #[serde(default = "default_ocr_language")]
    pub language: String,
    /// Page segmentation mode passed as `--psm`. Tesseract's own default when unset.
    #[serde(default)]
    pub psm: Option<u8>,
    /// Convert to grayscale before OCR.
    #[serde(default)]
    pub grayscale: bool,
}

fn default_ocr_binary() -> String {
    "tesseract".to_string()
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            binary: default_ocr_binary(),
            language: default_ocr_language(),
            psm: None,
            grayscale: false,
        }
    }
}

/// Which inference service answers classification and summarization requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// Hugging Face Inference API (hosted pipelines).
    #[default]
    HuggingFace,
    /// Local Ollama instance, prompted to pick a label or write a summary.
    Ollama,
}

/// Model backend, model ids, and candidate labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsConfig {
    #[serde(default)]
    pub backend: ModelBackend,
    /// Backend base URL. Defaults per backend when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Hugging Face token. Overridden by HF_API_TOKEN env. Ignored by Ollama.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Zero-shot model id (Hugging Face) or model name (Ollama).
    #[serde(default)]
    pub classifier_model: Option<String>,
    /// Summarization model id (Hugging Face) or model name (Ollama).
    #[serde(default)]
    pub summarizer_model: Option<String>,
    /// Candidate labels for categorization.
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
}

pub fn default_categories() -> Vec<String> {
    [
        "Communication",
        "Customer Focus",
        "Influence",
        "Job Specific Skills",
        "Judgment",
        "Lives the Values",
        "Problem Solving",
        "Results Focus",
        "Teamwork",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::default(),
            base_url: None,
            api_token: None,
            classifier_model: None,
            summarizer_model: None,
            categories: default_categories(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchConfig {
    /// Upper bound on inference calls running at once (default 4, minimum 1).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Non-empty trimmed env var, if set.
fn env_token(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn config_token(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the Slack bot token: env SLACK_BOT_TOKEN overrides config.
pub fn resolve_slack_bot_token(config: &Config) -> Option<String> {
    env_token("SLACK_BOT_TOKEN").or_else(|| config_token(&config.slack.bot_token))
}

/// Resolve the Slack app-level token: env SLACK_APP_TOKEN overrides config.
pub fn resolve_slack_app_token(config: &Config) -> Option<String> {
    env_token("SLACK_APP_TOKEN").or_else(|| config_token(&config.slack.app_token))
}

/// Resolve the Hugging Face token: env HF_API_TOKEN overrides config.
pub fn resolve_hf_token(config: &Config) -> Option<String> {
    env_token("HF_API_TOKEN").or_else(|| config_token(&config.models.api_token))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("KESTREL_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".kestrel").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, KESTREL_CONFIG_PATH, or the default. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
