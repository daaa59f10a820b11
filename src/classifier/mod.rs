//! Local classification oracle.
//!
//! Text is embedded into a fixed-size vector, then a logistic head turns the
//! vector into a probability distribution over labels. Everything here is
//! synchronous, in-process, and read-only after load, so one instance is
//! shared by all concurrent pipeline runs without locking.

#[cfg(feature = "bert")]
pub mod bert;
pub mod logistic;

pub use logistic::LogisticHead;

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::ClassifierError;

/// Classifier head weights, relative to the models directory.
pub const HEAD_FILE: &str = "classifier_head.json";

/// Embedder artifacts directory, relative to the models directory.
pub const EMBEDDER_DIR: &str = "embedder";

/// Hugging Face Hub repository a missing embedder is fetched from.
pub const DEFAULT_EMBEDDER_REPO: &str = "cointegrated/rubert-tiny2";

/// Turns text into a fixed-size vector.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, ClassifierError>;
}

/// Output of a local classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Argmax label.
    pub label: String,
    /// Probability of `label` (the max of the distribution).
    pub confidence: f32,
    /// Full distribution, one entry per known label.
    pub distribution: Vec<(String, f32)>,
}

/// Text → (label, distribution).
pub trait TextClassifier: Send + Sync {
    fn predict(&self, text: &str) -> Result<Prediction, ClassifierError>;
}

/// An embedder composed with a logistic head.
pub struct EmbeddingClassifier {
    embedder: Box<dyn Embedder>,
    head: LogisticHead,
}

impl EmbeddingClassifier {
    pub fn new(embedder: Box<dyn Embedder>, head: LogisticHead) -> Result<Self, ClassifierError> {
        if embedder.dimension() != head.dimension() {
            return Err(ClassifierError::DimensionMismatch {
                expected: head.dimension(),
                got: embedder.dimension(),
            });
        }
        Ok(Self { embedder, head })
    }
}

impl TextClassifier for EmbeddingClassifier {
    fn predict(&self, text: &str) -> Result<Prediction, ClassifierError> {
        let embedding = self.embedder.embed(text)?;
        let (label, confidence, probabilities) = self.head.predict(&embedding)?;
        let distribution = self
            .head
            .classes()
            .iter()
            .cloned()
            .zip(probabilities)
            .collect();
        Ok(Prediction {
            label,
            confidence,
            distribution,
        })
    }
}

/// Process-wide local model state.
///
/// Never-loaded models are a legitimate startup condition: the fast gate
/// then escalates every ticket instead of failing.
#[derive(Clone)]
pub enum LocalModels {
    Loaded(Arc<dyn TextClassifier>),
    Unavailable { reason: String },
}

impl LocalModels {
    pub fn loaded(classifier: Arc<dyn TextClassifier>) -> Self {
        Self::Loaded(classifier)
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Load the embedder and classifier head from `models_dir`.
    ///
    /// With `download_repo` set, missing embedder files are fetched from that
    /// Hugging Face Hub repository first. Any failure is logged and yields
    /// `Unavailable`; startup continues.
    pub fn load(models_dir: Option<&Path>, download_repo: Option<&str>) -> Self {
        let Some(dir) = models_dir else {
            warn!("No models directory configured, fast classification disabled");
            return Self::unavailable("no models directory configured");
        };

        match load_embedding_classifier(dir, download_repo) {
            Ok(classifier) => {
                info!(dir = %dir.display(), "Local classifier models loaded");
                Self::Loaded(Arc::new(classifier))
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Local classifier models not loaded");
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn classifier(&self) -> Result<Arc<dyn TextClassifier>, ClassifierError> {
        match self {
            Self::Loaded(classifier) => Ok(Arc::clone(classifier)),
            Self::Unavailable { reason } => Err(ClassifierError::NotLoaded {
                reason: reason.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for LocalModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loaded(_) => f.write_str("LocalModels::Loaded"),
            Self::Unavailable { reason } => write!(f, "LocalModels::Unavailable({reason})"),
        }
    }
}

fn load_embedding_classifier(
    dir: &Path,
    download_repo: Option<&str>,
) -> Result<EmbeddingClassifier, ClassifierError> {
    // Embedder first, so a fresh install fetches its checkpoint even before
    // a head has been trained.
    let embedder = load_embedder(&dir.join(EMBEDDER_DIR), download_repo)?;
    let head = LogisticHead::load(&dir.join(HEAD_FILE))?;
    EmbeddingClassifier::new(embedder, head)
}

#[cfg(feature = "bert")]
fn load_embedder(dir: &Path, download_repo: Option<&str>) -> Result<Box<dyn Embedder>, ClassifierError> {
    if let Some(repo) = download_repo {
        bert::ensure_checkpoint(dir, repo)?;
    }
    Ok(Box::new(bert::BertEmbedder::load(dir)?))
}

#[cfg(not(feature = "bert"))]
fn load_embedder(_dir: &Path, _download_repo: Option<&str>) -> Result<Box<dyn Embedder>, ClassifierError> {
    Err(ClassifierError::NotLoaded {
        reason: "built without the `bert` feature (rebuild with `--features bert`)".to_string(),
    })
}
