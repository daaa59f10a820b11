//! Deep gate — catalog-grounded LLM classification.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::StageFailure;
use crate::llm::complete_within;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::parse::{ParseOutcome, parse_verdict};
use crate::pipeline::prompts::deep_user_prompt;
use crate::pipeline::types::{AttemptSource, ClassificationAttempt, DEFAULT_CONFIDENCE_THRESHOLD};

/// Max tokens for the deep classification call.
const DEEP_MAX_TOKENS: u32 = 512;

/// Temperature for classification (deterministic-ish).
const DEEP_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct DeepConfig {
    pub threshold: f32,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for DeepConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            temperature: DEEP_TEMPERATURE,
            max_tokens: DEEP_MAX_TOKENS,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct DeepClassifier {
    llm: Arc<dyn LlmProvider>,
    system_prompt: String,
    config: DeepConfig,
}

impl DeepClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, system_prompt: String, config: DeepConfig) -> Self {
        Self {
            llm,
            system_prompt,
            config,
        }
    }

    /// Classify `text`. Oracle failures and unusable replies escalate.
    pub async fn classify(&self, text: &str) -> ClassificationAttempt {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(deep_user_prompt(text)),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = match complete_within(self.llm.as_ref(), request, self.config.timeout).await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Deep classification unavailable, escalating");
                return ClassificationAttempt::failed(
                    AttemptSource::Deep,
                    StageFailure::OracleUnavailable(e.to_string()),
                );
            }
        };

        let outcome = parse_verdict(&response.content);
        let parse_kind = outcome.label();
        let attempt = match outcome {
            ParseOutcome::Structured(verdict) => ClassificationAttempt::scored(
                AttemptSource::Deep,
                verdict.label().map(str::to_string),
                verdict.confidence(),
                self.config.threshold,
            )
            .with_rationale(verdict.reasoning),
            ParseOutcome::Heuristic(verdict) => ClassificationAttempt::scored(
                AttemptSource::Deep,
                verdict.label().map(str::to_string),
                verdict.confidence(),
                self.config.threshold,
            )
            .with_rationale(verdict.reasoning)
            .with_failure(StageFailure::OracleMalformedResponse(
                "reply was not JSON; label recovered from text".to_string(),
            )),
            ParseOutcome::Unparseable { reason } => {
                warn!(reason = %reason, "Deep classification reply unusable, escalating");
                ClassificationAttempt::failed(
                    AttemptSource::Deep,
                    StageFailure::OracleMalformedResponse(reason),
                )
            }
        };

        info!(
            label = attempt.label.as_deref().unwrap_or("-"),
            confidence = attempt.confidence.unwrap_or(0.0),
            escalate = attempt.should_escalate,
            parse = parse_kind,
            "Deep gate decided"
        );

        attempt
    }
}
