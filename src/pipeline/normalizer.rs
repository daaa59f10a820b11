//! Text normalization — expands abbreviations and fixes typos before classification.
//!
//! Never fails: any oracle problem yields the original text.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::llm::complete_within;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::parse::{ParseOutcome, parse_normalized};
use crate::pipeline::prompts::NORMALIZE_SYSTEM_PROMPT;

/// Low temperature: this is a correction, not a rewrite.
const NORMALIZE_TEMPERATURE: f32 = 0.1;

/// Enough headroom for a long ticket echoed back.
const NORMALIZE_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            temperature: NORMALIZE_TEMPERATURE,
            max_tokens: NORMALIZE_MAX_TOKENS,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct TextNormalizer {
    llm: Arc<dyn LlmProvider>,
    config: NormalizerConfig,
}

impl TextNormalizer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: NormalizerConfig) -> Self {
        Self { llm, config }
    }

    /// Corrected text, or `text` unchanged if the oracle is unavailable or unhelpful.
    pub async fn normalize(&self, text: &str) -> String {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(NORMALIZE_SYSTEM_PROMPT),
            ChatMessage::user(text),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = match complete_within(self.llm.as_ref(), request, self.config.timeout).await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Normalization unavailable, keeping original text");
                return text.to_string();
            }
        };

        match parse_normalized(&response.content) {
            ParseOutcome::Structured(normalized) | ParseOutcome::Heuristic(normalized) => {
                debug!(
                    original_len = text.len(),
                    normalized_len = normalized.len(),
                    "Ticket normalized"
                );
                normalized
            }
            ParseOutcome::Unparseable { reason } => {
                warn!(reason = %reason, "Normalization reply unusable, keeping original text");
                text.to_string()
            }
        }
    }
}
