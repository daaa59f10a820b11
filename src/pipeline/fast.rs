//! Fast gate — local embedding classifier.
//!
//! Inference is CPU-bound and runs on the blocking pool. Missing models,
//! inference errors and timeouts all escalate; only a panic or a lost
//! blocking task is an internal fault.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::classifier::LocalModels;
use crate::error::{PipelineError, StageFailure};
use crate::pipeline::types::{AttemptSource, ClassificationAttempt, DEFAULT_CONFIDENCE_THRESHOLD};

#[derive(Debug, Clone)]
pub struct FastConfig {
    pub threshold: f32,
    pub timeout: Duration,
}

impl Default for FastConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct FastClassifier {
    models: LocalModels,
    config: FastConfig,
}

impl FastClassifier {
    pub fn new(models: LocalModels, config: FastConfig) -> Self {
        Self { models, config }
    }

    pub fn is_ready(&self) -> bool {
        self.models.is_loaded()
    }

    pub async fn classify(&self, text: &str) -> Result<ClassificationAttempt, PipelineError> {
        let classifier = match self.models.classifier() {
            Ok(classifier) => classifier,
            Err(e) => {
                debug!(reason = %e, "Fast gate skipped");
                return Ok(ClassificationAttempt::failed(
                    AttemptSource::Fast,
                    StageFailure::ModelNotLoaded,
                ));
            }
        };

        let owned = text.to_string();
        let task = tokio::task::spawn_blocking(move || classifier.predict(&owned));

        let prediction = match tokio::time::timeout(self.config.timeout, task).await {
            Err(_) => {
                warn!(timeout = ?self.config.timeout, "Local inference timed out");
                return Ok(ClassificationAttempt::failed(
                    AttemptSource::Fast,
                    StageFailure::OracleUnavailable(format!(
                        "local inference timed out after {:?}",
                        self.config.timeout
                    )),
                ));
            }
            Ok(Err(join_error)) => {
                return Err(PipelineError::Internal(format!(
                    "local inference task failed: {join_error}"
                )));
            }
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "Local inference failed");
                return Ok(ClassificationAttempt::failed(
                    AttemptSource::Fast,
                    StageFailure::OracleUnavailable(e.to_string()),
                ));
            }
            Ok(Ok(Ok(prediction))) => prediction,
        };

        let attempt = ClassificationAttempt::scored(
            AttemptSource::Fast,
            Some(prediction.label),
            Some(prediction.confidence),
            self.config.threshold,
        );

        info!(
            label = attempt.label.as_deref().unwrap_or("-"),
            confidence = prediction.confidence,
            escalate = attempt.should_escalate,
            "Fast gate decided"
        );

        Ok(attempt)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pipeline::testing::StubClassifier;

    fn fast(stub: StubClassifier) -> FastClassifier {
        FastClassifier::new(
            LocalModels::loaded(Arc::new(stub)),
            FastConfig {
                timeout: Duration::from_millis(200),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn confident_prediction_stops() {
        let attempt = fast(StubClassifier::predicts("net_setup", 0.95))
            .classify("need a network port")
            .await
            .unwrap();
        assert!(!attempt.should_escalate);
        assert_eq!(attempt.verdict(), Some(("net_setup", 0.95)));
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let at = fast(StubClassifier::predicts("net_setup", 0.90))
            .classify("x")
            .await
            .unwrap();
        assert!(!at.should_escalate);

        let below = fast(StubClassifier::predicts("net_setup", 0.89))
            .classify("x")
            .await
            .unwrap();
        assert!(below.should_escalate);
        assert_eq!(below.label.as_deref(), Some("net_setup"));
    }

    #[tokio::test]
    async fn unloaded_models_escalate() {
        let f = FastClassifier::new(LocalModels::unavailable("no dir"), FastConfig::default());
        assert!(!f.is_ready());
        let attempt = f.classify("x").await.unwrap();
        assert!(attempt.should_escalate);
        assert!(attempt.label.is_none());
        assert!(attempt.confidence.is_none());
        assert_eq!(attempt.failure, Some(StageFailure::ModelNotLoaded));
    }

    #[tokio::test]
    async fn inference_error_escalates() {
        let attempt = fast(StubClassifier::Fails).classify("x").await.unwrap();
        assert!(attempt.should_escalate);
        assert!(matches!(
            attempt.failure,
            Some(StageFailure::OracleUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn slow_inference_escalates() {
        let attempt = fast(StubClassifier::Sleeps(Duration::from_secs(1)))
            .classify("x")
            .await
            .unwrap();
        assert!(attempt.should_escalate);
        assert!(matches!(
            attempt.failure,
            Some(StageFailure::OracleUnavailable(ref m)) if m.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn panic_is_internal_fault() {
        let err = fast(StubClassifier::Panics).classify("x").await.unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));
    }
}
