//! Clarifying questions, and the final classification once they are answered.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::llm::complete_within;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::parse::{ParseOutcome, parse_questions, parse_verdict};
use crate::pipeline::prompts::{QUESTION_SYSTEM_PROMPT, question_user_prompt, resolve_user_prompt};
use crate::pipeline::types::{
    AnswerSet, CandidateLabel, MAX_QUESTIONS, MIN_QUESTIONS, NO_CLASS_SENTINEL, QuestionSet,
};

/// Higher temperature for varied questions.
const QUESTION_TEMPERATURE: f32 = 0.7;
const QUESTION_MAX_TOKENS: u32 = 512;

const RESOLVE_TEMPERATURE: f32 = 0.2;
const RESOLVE_MAX_TOKENS: u32 = 512;

#[derive(Debug, Clone)]
pub struct QuestionConfig {
    /// How many questions to ask the oracle for. Clamped to `MIN_QUESTIONS..=MAX_QUESTIONS`.
    pub target: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub resolve_temperature: f32,
    pub resolve_max_tokens: u32,
    pub timeout: Duration,
}

impl Default for QuestionConfig {
    fn default() -> Self {
        Self {
            target: MAX_QUESTIONS,
            temperature: QUESTION_TEMPERATURE,
            max_tokens: QUESTION_MAX_TOKENS,
            resolve_temperature: RESOLVE_TEMPERATURE,
            resolve_max_tokens: RESOLVE_MAX_TOKENS,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Final label after answers. No threshold applies.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub label: String,
    pub confidence: f32,
    pub reasoning: Option<String>,
}

impl Resolution {
    fn no_class() -> Self {
        Self {
            label: NO_CLASS_SENTINEL.to_string(),
            confidence: 0.0,
            reasoning: None,
        }
    }
}

pub struct QuestionGenerator {
    llm: Arc<dyn LlmProvider>,
    /// Catalog-grounded classification instructions, reused by `resolve_with_answers`.
    classifier_prompt: String,
    config: QuestionConfig,
}

impl QuestionGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, classifier_prompt: String, config: QuestionConfig) -> Self {
        Self {
            llm,
            classifier_prompt,
            config,
        }
    }

    /// Between `MIN_QUESTIONS` and `MAX_QUESTIONS` clarifying questions.
    ///
    /// Falls back to canned questions if the oracle fails or says nothing usable.
    pub async fn generate_questions(&self, text: &str, hint: Option<&CandidateLabel>) -> QuestionSet {
        let target = self.config.target.clamp(MIN_QUESTIONS, MAX_QUESTIONS);
        let request = CompletionRequest::new(vec![
            ChatMessage::system(QUESTION_SYSTEM_PROMPT),
            ChatMessage::user(question_user_prompt(text, hint, target)),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = match complete_within(self.llm.as_ref(), request, self.config.timeout).await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Question generation unavailable, using canned questions");
                return QuestionSet::fallback();
            }
        };

        let outcome = parse_questions(&response.content);
        let parse_kind = outcome.label();
        let Some(candidates) = outcome.value() else {
            warn!("Question generation reply unusable, using canned questions");
            return QuestionSet::fallback();
        };

        match QuestionSet::from_candidates(candidates) {
            Some(questions) => {
                let questions = questions.topped_up();
                info!(count = questions.len(), parse = parse_kind, "Questions generated");
                questions
            }
            None => {
                warn!("Question generation returned only blanks, using canned questions");
                QuestionSet::fallback()
            }
        }
    }

    /// Classify `text` with the answered questions as extra context.
    ///
    /// Any failure yields the "no class" sentinel at confidence 0.
    pub async fn resolve_with_answers(
        &self,
        text: &str,
        questions: &QuestionSet,
        answers: &AnswerSet,
    ) -> Resolution {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(self.classifier_prompt.clone()),
            ChatMessage::user(resolve_user_prompt(text, questions, answers)),
        ])
        .with_temperature(self.config.resolve_temperature)
        .with_max_tokens(self.config.resolve_max_tokens);

        let response = match complete_within(self.llm.as_ref(), request, self.config.timeout).await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Final classification unavailable");
                return Resolution::no_class();
            }
        };

        let resolution = match parse_verdict(&response.content) {
            ParseOutcome::Structured(verdict) | ParseOutcome::Heuristic(verdict) => {
                match verdict.label() {
                    Some(label) => Resolution {
                        label: label.to_string(),
                        confidence: verdict.confidence().unwrap_or(0.0),
                        reasoning: verdict.reasoning.clone(),
                    },
                    None => Resolution::no_class(),
                }
            }
            ParseOutcome::Unparseable { reason } => {
                warn!(reason = %reason, "Final classification reply unusable");
                Resolution::no_class()
            }
        };

        debug!(
            label = %resolution.label,
            confidence = resolution.confidence,
            "Final classification"
        );
        resolution
    }
}
