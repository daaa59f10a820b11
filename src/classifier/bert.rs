//! BERT sentence embedder using Candle.
//!
//! Loads a local BERT checkpoint (`config.json`, `tokenizer.json`,
//! `model.safetensors`) and embeds text as the raw `[CLS]` hidden state,
//! matching how the classifier head was trained. Inputs are truncated to
//! `MAX_TOKENS`. A missing checkpoint can be fetched from the Hugging Face
//! Hub first with `ensure_checkpoint`.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use super::Embedder;
use crate::error::ClassifierError;

/// Token budget per ticket.
pub const MAX_TOKENS: usize = 256;

/// Files that make up a checkpoint.
pub const CHECKPOINT_FILES: [&str; 3] = ["config.json", "tokenizer.json", "model.safetensors"];

pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    hidden_size: usize,
}

fn load_error(artifact: &str, path: &Path, reason: impl ToString) -> ClassifierError {
    ClassifierError::Load {
        artifact: artifact.to_string(),
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn inference_error(e: candle_core::Error) -> ClassifierError {
    ClassifierError::Inference(e.to_string())
}

/// Fill in whatever checkpoint files `dir` is missing from the Hub repo `repo_id`.
///
/// Files are downloaded into the Hugging Face cache (~/.cache/huggingface)
/// and copied into `dir`. A complete directory never touches the network.
pub fn ensure_checkpoint(dir: &Path, repo_id: &str) -> Result<(), ClassifierError> {
    let missing: Vec<&str> = CHECKPOINT_FILES
        .into_iter()
        .filter(|file| !dir.join(file).is_file())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    info!(repo = repo_id, dir = %dir.display(), missing = ?missing, "Downloading embedder checkpoint");
    std::fs::create_dir_all(dir).map_err(|e| load_error("checkpoint", dir, e))?;

    let api = Api::new().map_err(|e| load_error("checkpoint", dir, e))?;
    let repo = api.repo(Repo::new(repo_id.to_string(), RepoType::Model));
    for file in missing {
        let target = dir.join(file);
        let cached = repo
            .get(file)
            .map_err(|e| load_error(file, &target, format!("download from {repo_id} failed: {e}")))?;
        std::fs::copy(&cached, &target).map_err(|e| load_error(file, &target, e))?;
        debug!(file, "Checkpoint file ready");
    }

    info!(repo = repo_id, "Embedder checkpoint downloaded");
    Ok(())
}

impl BertEmbedder {
    /// Load a checkpoint from a local directory.
    pub fn load(dir: &Path) -> Result<Self, ClassifierError> {
        info!(dir = %dir.display(), "Loading BERT embedder");

        let device = Device::Cpu;

        let config_path = dir.join("config.json");
        let config: Config = serde_json::from_str(
            &std::fs::read_to_string(&config_path)
                .map_err(|e| load_error("config", &config_path, e))?,
        )
        .map_err(|e| load_error("config", &config_path, e))?;

        let tokenizer_path = dir.join("tokenizer.json");
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| load_error("tokenizer", &tokenizer_path, e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| load_error("tokenizer", &tokenizer_path, e))?;

        let weights_path = dir.join("model.safetensors");
        // SAFETY: the weights file is not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.clone()], DTYPE, &device)
                .map_err(|e| load_error("weights", &weights_path, e))?
        };
        let model =
            BertModel::load(vb, &config).map_err(|e| load_error("weights", &weights_path, e))?;

        debug!(hidden_size = config.hidden_size, "BERT embedder ready");

        Ok(Self {
            model,
            tokenizer,
            device,
            hidden_size: config.hidden_size,
        })
    }
}

impl Embedder for BertEmbedder {
    fn dimension(&self) -> usize {
        self.hidden_size
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ClassifierError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ClassifierError::Inference(format!("tokenization failed: {e}")))?;

        let ids = encoding.get_ids().to_vec();
        let attention = encoding.get_attention_mask().to_vec();
        let len = ids.len();

        let input_ids = Tensor::from_vec(ids, (1, len), &self.device).map_err(inference_error)?;
        let attention_mask =
            Tensor::from_vec(attention, (1, len), &self.device).map_err(inference_error)?;
        let token_type_ids = input_ids.zeros_like().map_err(inference_error)?;

        let output = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(inference_error)?;

        // [CLS] is position 0: (1, seq, hidden) -> (hidden)
        let cls = output
            .narrow(1, 0, 1)
            .and_then(|t| t.squeeze(1))
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_dtype(DType::F32))
            .map_err(inference_error)?;

        cls.to_vec1::<f32>().map_err(inference_error)
    }
}
