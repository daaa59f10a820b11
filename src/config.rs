//! Configuration, read from `TRIAGE_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::classifier::DEFAULT_EMBEDDER_REPO;
use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::pipeline::OrchestratorConfig;
use crate::pipeline::types::{DEFAULT_CONFIDENCE_THRESHOLD, MAX_QUESTIONS, MIN_QUESTIONS};

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOCAL_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    pub llm: LlmConfig,
    /// Gate threshold, inclusive.
    pub threshold: f32,
    /// Questions to ask the oracle for, in `MIN_QUESTIONS..=MAX_QUESTIONS`.
    pub question_target: usize,
    pub oracle_timeout: Duration,
    pub local_timeout: Duration,
    /// Directory holding `classifier_head.json` and `embedder/`.
    pub models_dir: Option<PathBuf>,
    /// Hub repository to fetch a missing embedder from. `None` disables downloads.
    pub embedder_repo: Option<String>,
    /// JSON catalog replacing the built-in one.
    pub catalog_path: Option<PathBuf>,
    /// Text file replacing the catalog-built classifier prompt.
    pub classifier_prompt_path: Option<PathBuf>,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Bearer token sent with intake result callbacks.
    pub callback_token: Option<SecretString>,
    pub callback_timeout: Duration,
    /// Enables a daily rolling log file in this directory.
    pub log_dir: Option<PathBuf>,
}

impl TriageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend: LlmBackend = match get("TRIAGE_LLM_BACKEND") {
            Some(s) => s.parse()?,
            None => LlmBackend::Anthropic,
        };
        let api_key = get("TRIAGE_LLM_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("TRIAGE_LLM_API_KEY".to_string()))?;
        let model = get("TRIAGE_LLM_MODEL").unwrap_or_else(|| default_model(backend).to_string());
        let base_url = get("TRIAGE_LLM_BASE_URL");
        if backend == LlmBackend::OpenAiCompatible && base_url.is_none() {
            return Err(ConfigError::MissingEnvVar("TRIAGE_LLM_BASE_URL".to_string()));
        }

        let threshold = match get("TRIAGE_CONFIDENCE_THRESHOLD") {
            Some(s) => {
                let value: f32 = s.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "TRIAGE_CONFIDENCE_THRESHOLD".to_string(),
                    message: format!("'{s}' is not a number"),
                })?;
                if !(0.0..=1.0).contains(&value) {
                    return Err(ConfigError::InvalidValue {
                        key: "TRIAGE_CONFIDENCE_THRESHOLD".to_string(),
                        message: format!("{value} is outside [0, 1]"),
                    });
                }
                value
            }
            None => DEFAULT_CONFIDENCE_THRESHOLD,
        };

        let question_target: usize = get("TRIAGE_QUESTION_TARGET")
            .and_then(|s| s.parse().ok())
            .unwrap_or(MAX_QUESTIONS)
            .clamp(MIN_QUESTIONS, MAX_QUESTIONS);

        let oracle_timeout_secs: u64 = get("TRIAGE_ORACLE_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_ORACLE_TIMEOUT_SECS);

        let local_timeout_secs: u64 = get("TRIAGE_LOCAL_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_LOCAL_TIMEOUT_SECS);

        let callback_timeout_secs: u64 = get("TRIAGE_CALLBACK_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_CALLBACK_TIMEOUT_SECS);

        let download_models = get("TRIAGE_MODEL_DOWNLOAD")
            .map(|s| !matches!(s.to_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);
        let embedder_repo = if download_models {
            Some(get("TRIAGE_EMBEDDER_REPO").unwrap_or_else(|| DEFAULT_EMBEDDER_REPO.to_string()))
        } else {
            None
        };

        let port: u16 = get("TRIAGE_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let cors_origins: Vec<String> = get("TRIAGE_CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
                base_url,
            },
            threshold,
            question_target,
            oracle_timeout: Duration::from_secs(oracle_timeout_secs),
            local_timeout: Duration::from_secs(local_timeout_secs),
            models_dir: get("TRIAGE_MODELS_DIR").map(PathBuf::from),
            embedder_repo,
            catalog_path: get("TRIAGE_CATALOG_PATH").map(PathBuf::from),
            classifier_prompt_path: get("TRIAGE_CLASSIFIER_PROMPT_PATH").map(PathBuf::from),
            port,
            cors_origins,
            callback_token: get("TRIAGE_CALLBACK_TOKEN").map(SecretString::from),
            callback_timeout: Duration::from_secs(callback_timeout_secs),
            log_dir: get("TRIAGE_LOG_DIR").map(PathBuf::from),
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            threshold: self.threshold,
            question_target: self.question_target,
            oracle_timeout: self.oracle_timeout,
            local_timeout: self.local_timeout,
        }
    }
}

fn default_model(backend: LlmBackend) -> &'static str {
    match backend {
        LlmBackend::Anthropic => "claude-sonnet-4-20250514",
        LlmBackend::OpenAi => "gpt-4o-mini",
        LlmBackend::OpenAiCompatible => "GigaChat",
    }
}
