//! Logistic-regression classification head over fixed-size embeddings.
//!
//! Weights are exported from a trained model as JSON:
//!
//! ```json
//! { "classes": ["access", "net_setup"], "coef": [[...], ...], "intercept": [...] }
//! ```
//!
//! Multiclass heads carry one coefficient row per class and use softmax.
//! Binary heads carry a single row scoring `classes[1]` and use a sigmoid.

use std::path::Path;

use serde::Deserialize;

use crate::error::ClassifierError;

#[derive(Debug, Clone, Deserialize)]
pub struct LogisticHead {
    classes: Vec<String>,
    coef: Vec<Vec<f32>>,
    intercept: Vec<f32>,
}

impl LogisticHead {
    pub fn new(
        classes: Vec<String>,
        coef: Vec<Vec<f32>>,
        intercept: Vec<f32>,
    ) -> Result<Self, ClassifierError> {
        let head = Self {
            classes,
            coef,
            intercept,
        };
        head.validate()?;
        Ok(head)
    }

    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let head: Self = serde_json::from_str(json).map_err(|e| ClassifierError::Load {
            artifact: "classifier head".to_string(),
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })?;
        head.validate()?;
        Ok(head)
    }

    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let json = std::fs::read_to_string(path).map_err(|e| ClassifierError::Load {
            artifact: "classifier head".to_string(),
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json).map_err(|e| match e {
            ClassifierError::Load {
                artifact, reason, ..
            } => ClassifierError::Load {
                artifact,
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        let invalid = |reason: String| ClassifierError::Load {
            artifact: "classifier head".to_string(),
            path: "<inline>".to_string(),
            reason,
        };

        if self.classes.len() < 2 {
            return Err(invalid(format!(
                "need at least 2 classes, got {}",
                self.classes.len()
            )));
        }
        let expected_rows = if self.classes.len() == 2 {
            1
        } else {
            self.classes.len()
        };
        // Binary heads may also be exported in the expanded one-row-per-class form.
        if self.coef.len() != expected_rows && self.coef.len() != self.classes.len() {
            return Err(invalid(format!(
                "expected {} coefficient rows, got {}",
                expected_rows,
                self.coef.len()
            )));
        }
        if self.intercept.len() != self.coef.len() {
            return Err(invalid(format!(
                "intercept has {} entries for {} coefficient rows",
                self.intercept.len(),
                self.coef.len()
            )));
        }
        let dim = self.coef[0].len();
        if dim == 0 || self.coef.iter().any(|row| row.len() != dim) {
            return Err(invalid("coefficient rows must share a non-zero width".to_string()));
        }
        Ok(())
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Width of the embeddings this head accepts.
    pub fn dimension(&self) -> usize {
        self.coef[0].len()
    }

    /// Per-class probabilities, in `classes()` order. Sums to 1.
    pub fn predict_proba(&self, embedding: &[f32]) -> Result<Vec<f32>, ClassifierError> {
        if embedding.len() != self.dimension() {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.dimension(),
                got: embedding.len(),
            });
        }

        let scores: Vec<f32> = self
            .coef
            .iter()
            .zip(&self.intercept)
            .map(|(row, b)| row.iter().zip(embedding).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect();

        if scores.len() == 1 {
            let p = sigmoid(scores[0]);
            return Ok(vec![1.0 - p, p]);
        }
        Ok(softmax(&scores))
    }

    /// Argmax label and its probability.
    pub fn predict(&self, embedding: &[f32]) -> Result<(String, f32, Vec<f32>), ClassifierError> {
        let probabilities = self.predict_proba(embedding)?;
        let (idx, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, p)| {
                if p > best.1 { (i, p) } else { best }
            });
        if !confidence.is_finite() {
            return Err(ClassifierError::Inference(
                "classifier produced non-finite probabilities".to_string(),
            ));
        }
        Ok((self.classes[idx].clone(), confidence, probabilities))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
