//! Shared types for the triage pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, StageFailure};
use crate::pipeline::parse::clean_question;

/// Confidence at or above which a gate accepts a label.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.90;

/// Reserved label meaning "the classifier found no matching category".
pub const NO_CLASS_SENTINEL: &str = "no_class";

/// Hard upper bound on emitted clarifying questions.
pub const MAX_QUESTIONS: usize = 5;

/// Lower bound on emitted clarifying questions.
pub const MIN_QUESTIONS: usize = 3;

/// Canned questions used when the oracle gives nothing usable.
pub const FALLBACK_QUESTIONS: [&str; MIN_QUESTIONS] = [
    "Could you describe in more detail what exactly is not working?",
    "When did the problem start?",
    "Is the problem related to a computer, a program, or access to a system?",
];

/// Whether `label` is the "no class" sentinel (case-insensitive; `_`, `-` or space between the words).
pub fn is_no_class(label: &str) -> bool {
    let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
    normalized == NO_CLASS_SENTINEL
}

// ── Stages ──────────────────────────────────────────────────────────

/// The stage a result was emitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    MlClassification,
    DeepAnalysis,
    QuestionGeneration,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MlClassification => "ml_classification",
            Self::DeepAnalysis => "deep_analysis",
            Self::QuestionGeneration => "question_generation",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Internal steps of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Normalize,
    FastClassify,
    DeepClassify,
    QuestionGeneration,
    Finalize,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::FastClassify => "fast_classify",
            Self::DeepClassify => "deep_classify",
            Self::QuestionGeneration => "question_generation",
            Self::Finalize => "finalize",
        }
    }
}

// ── Classification attempts ─────────────────────────────────────────

/// Which gate produced an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptSource {
    Fast,
    Deep,
}

/// Result of one classification gate.
///
/// `should_escalate` is derived at construction and always equals
/// `label is None || confidence is None || confidence < threshold || label is the sentinel`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationAttempt {
    pub source: AttemptSource,
    pub label: Option<String>,
    pub confidence: Option<f32>,
    pub should_escalate: bool,
    /// Short explanation from the oracle, when it gave one.
    pub rationale: Option<String>,
    /// Why the attempt degraded, when it did.
    pub failure: Option<StageFailure>,
}

impl ClassificationAttempt {
    /// An attempt that produced a score; the gate decides whether it stands.
    pub fn scored(
        source: AttemptSource,
        label: Option<String>,
        confidence: Option<f32>,
        threshold: f32,
    ) -> Self {
        let should_escalate = !passes_gate(label.as_deref(), confidence, threshold);
        Self {
            source,
            label,
            confidence,
            should_escalate,
            rationale: None,
            failure: None,
        }
    }

    /// An attempt whose oracle failed. Always escalates.
    pub fn failed(source: AttemptSource, failure: StageFailure) -> Self {
        Self {
            source,
            label: None,
            confidence: None,
            should_escalate: true,
            rationale: None,
            failure: Some(failure),
        }
    }

    pub fn with_rationale(mut self, rationale: Option<String>) -> Self {
        self.rationale = rationale.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn with_failure(mut self, failure: StageFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// The accepted label and confidence, if this gate stops the pipeline.
    pub fn verdict(&self) -> Option<(&str, f32)> {
        if self.should_escalate {
            return None;
        }
        match (&self.label, self.confidence) {
            (Some(label), Some(confidence)) => Some((label.as_str(), confidence)),
            _ => None,
        }
    }

    /// A non-sentinel label usable as an advisory hint, with its confidence.
    pub fn candidate(&self) -> Option<CandidateLabel> {
        let label = self.label.as_deref()?;
        if label.trim().is_empty() || is_no_class(label) {
            return None;
        }
        Some(CandidateLabel {
            label: label.to_string(),
            confidence: self.confidence,
        })
    }
}

/// The gate rule. Inclusive at the threshold.
pub fn passes_gate(label: Option<&str>, confidence: Option<f32>, threshold: f32) -> bool {
    match (label, confidence) {
        (Some(label), Some(confidence)) => {
            !label.trim().is_empty() && !is_no_class(label) && confidence >= threshold
        }
        _ => false,
    }
}

/// Best-effort label carried forward from an inconclusive gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateLabel {
    pub label: String,
    pub confidence: Option<f32>,
}

// ── Questions and answers ───────────────────────────────────────────

/// Ordered, distinct clarifying questions. Never empty, at most `MAX_QUESTIONS`.
///
/// Deserialization enforces the size bounds but keeps the caller's wording and
/// order, since answers are paired with questions by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct QuestionSet(Vec<String>);

impl TryFrom<Vec<String>> for QuestionSet {
    type Error = PipelineError;

    fn try_from(questions: Vec<String>) -> Result<Self, Self::Error> {
        if questions.is_empty() || questions.len() > MAX_QUESTIONS {
            return Err(PipelineError::InvalidQuestionSet {
                count: questions.len(),
            });
        }
        Ok(Self(questions))
    }
}

impl From<QuestionSet> for Vec<String> {
    fn from(questions: QuestionSet) -> Self {
        questions.0
    }
}

impl QuestionSet {
    /// Clean candidate questions: strip enumeration, drop blanks and
    /// duplicates, keep order, cap at `MAX_QUESTIONS`. `None` if nothing is left.
    pub fn from_candidates<I, S>(candidates: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut questions: Vec<String> = Vec::new();
        for candidate in candidates {
            let question = clean_question(candidate.as_ref());
            if question.is_empty() || questions.iter().any(|q| q.eq_ignore_ascii_case(&question))
            {
                continue;
            }
            questions.push(question);
            if questions.len() == MAX_QUESTIONS {
                break;
            }
        }
        if questions.is_empty() {
            None
        } else {
            Some(Self(questions))
        }
    }

    /// The canned fallback set. Exactly `MIN_QUESTIONS` items.
    pub fn fallback() -> Self {
        Self(FALLBACK_QUESTIONS.iter().map(|q| q.to_string()).collect())
    }

    /// Pad with canned questions (skipping duplicates) up to `MIN_QUESTIONS`.
    pub fn topped_up(mut self) -> Self {
        for canned in FALLBACK_QUESTIONS {
            if self.0.len() >= MIN_QUESTIONS {
                break;
            }
            if !self.0.iter().any(|q| q.eq_ignore_ascii_case(canned)) {
                self.0.push(canned.to_string());
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Answers collected by the caller, positionally paired with a question list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSet(Vec<String>);

impl AnswerSet {
    pub fn new(answers: Vec<String>) -> Self {
        Self(answers)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

// ── Pipeline results ────────────────────────────────────────────────

/// What a run produced. Each variant carries only its own fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The fast gate was confident.
    MlClassification { label: String, confidence: f32 },
    /// The deep gate was confident.
    DeepAnalysis { label: String, confidence: f32 },
    /// Neither gate was confident; the run pauses for answers.
    QuestionGeneration {
        questions: QuestionSet,
        hint: Option<CandidateLabel>,
    },
    /// Terminal verdict after answers. No threshold applies.
    Completed { label: String, confidence: f32 },
}

impl Outcome {
    pub fn stage(&self) -> Stage {
        match self {
            Self::MlClassification { .. } => Stage::MlClassification,
            Self::DeepAnalysis { .. } => Stage::DeepAnalysis,
            Self::QuestionGeneration { .. } => Stage::QuestionGeneration,
            Self::Completed { .. } => Stage::Completed,
        }
    }
}

/// Terminal artifact of `classify` or `resolve`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub outcome: Outcome,
    /// The text the classifiers saw.
    pub processed_text: String,
    /// Human-readable explanation of the path taken.
    pub reasoning: String,
}

impl PipelineResult {
    pub fn stage(&self) -> Stage {
        self.outcome.stage()
    }

    /// Flatten into the wire shape.
    pub fn to_response(&self) -> ClassificationResponse {
        let (ticket_class, confidence, questions) = match &self.outcome {
            Outcome::MlClassification { label, confidence }
            | Outcome::DeepAnalysis { label, confidence }
            | Outcome::Completed { label, confidence } => {
                (Some(label.clone()), Some(*confidence), None)
            }
            Outcome::QuestionGeneration { questions, hint } => (
                hint.as_ref().map(|h| h.label.clone()),
                hint.as_ref().and_then(|h| h.confidence),
                Some(questions.as_slice().to_vec()),
            ),
        };

        ClassificationResponse {
            stage: self.stage(),
            ticket_class,
            confidence,
            questions,
            processed_text: self.processed_text.clone(),
            reasoning: self.reasoning.clone(),
        }
    }
}

/// Flat serialized form of a `PipelineResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResponse {
    pub stage: Stage,
    pub ticket_class: Option<String>,
    pub confidence: Option<f32>,
    pub questions: Option<Vec<String>>,
    pub processed_text: String,
    pub reasoning: String,
}
