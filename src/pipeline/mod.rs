//! Ticket triage pipeline.
//!
//! Every ticket flows through:
//! 1. `TextNormalizer::normalize()` — abbreviation and typo cleanup (LLM, fail-open)
//! 2. `FastClassifier::classify()` — local embedding classifier, first gate
//! 3. `DeepClassifier::classify()` — catalog-grounded LLM, second gate
//! 4. `QuestionGenerator::generate_questions()` — pause for clarifying answers
//! 5. `QuestionGenerator::resolve_with_answers()` — final label, no gate
//!
//! `Orchestrator` owns the sequence. A gate stops the run only when its
//! label is not the "no class" sentinel and its confidence is at least the
//! threshold.

pub mod deep;
pub mod events;
pub mod fast;
pub mod normalizer;
pub mod orchestrator;
pub mod parse;
pub mod prompts;
pub mod questions;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use events::{EventHub, StageEvent};
pub use orchestrator::{Orchestrator, OrchestratorConfig, TriageDeps};
pub use types::{
    AnswerSet, ClassificationResponse, Outcome, PipelineResult, QuestionSet, Stage,
};
