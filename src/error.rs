//! Error types for ticket triage.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Generative oracle (LLM provider) errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// Local classification oracle errors.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Local models not loaded: {reason}")]
    NotLoaded { reason: String },

    #[error("Failed to load {artifact} from {path}: {reason}")]
    Load {
        artifact: String,
        path: String,
        reason: String,
    },

    #[error("Embedding dimension mismatch: head expects {expected}, embedder produced {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Work-type catalog errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate work type id: {0}")]
    DuplicateId(String),

    #[error("Catalog is empty")]
    Empty,
}

/// Intake result callback errors.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Invalid callback URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Callback to {url} failed: {reason}")]
    SendFailed { url: String, reason: String },

    #[error("Callback to {url} was rejected with status {status}")]
    Rejected { url: String, status: u16 },
}

/// Why a stage handed off to the next one instead of producing a verdict.
///
/// The first three are absorbed at the component boundary and never reach
/// the caller as errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageFailure {
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("oracle returned a malformed response: {0}")]
    OracleMalformedResponse(String),

    #[error("local classifier models are not loaded")]
    ModelNotLoaded,

    #[error("neither classification gate produced a label")]
    AllStagesInconclusive,
}

/// Errors that cross the pipeline boundary.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Ticket text is empty")]
    EmptyTicket,

    #[error("Got {questions} questions but {answers} answers")]
    AnswerCountMismatch { questions: usize, answers: usize },

    #[error("Question list must hold 1 to 5 questions, got {count}")]
    InvalidQuestionSet { count: usize },

    #[error("Internal pipeline fault: {0}")]
    Internal(String),
}
