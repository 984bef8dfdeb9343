use std::path::{Path, PathBuf};

use candle_core::Device;
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::info;

use crate::{
    embedding::{BertEmbedder, EmbedConfig},
    error::{Error, Result},
};

pub const DEFAULT_MODEL_ID: &str = "intfloat/e5-small-v2";
pub const MODEL_ENV_VAR: &str = "GLANCE_MODEL_PATH";

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const SAFETENSORS_FILE: &str = "model.safetensors";
const PYTORCH_FILE: &str = "pytorch_model.bin";
const SENTENCE_CONFIG_FILE: &str = "sentence_bert_config.json";

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
pub fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

/// Parse a device name: `auto`, `cpu`, `cuda`, `cuda:N`, `metal` or `metal:N`.
pub fn parse_device(name: &str) -> Result<Device> {
    let (kind, ordinal) = match name.split_once(':') {
        Some((kind, ordinal)) => {
            let ordinal = ordinal.parse::<usize>().map_err(|_| {
                Error::Config(format!("invalid device ordinal in '{name}'"))
            })?;
            (kind, ordinal)
        }
        None => (name, 0),
    };

    match kind {
        "auto" => Ok(default_device()),
        "cpu" => Ok(Device::Cpu),
        "cuda" => Ok(Device::new_cuda(ordinal)?),
        "metal" => Ok(Device::new_metal(ordinal)?),
        _ => Err(Error::Config(format!("unknown device '{name}'"))),
    }
}

#[derive(Debug, Deserialize)]
struct SentenceBertConfig {
    max_seq_length: Option<usize>,
}

fn load_max_seq_length(model_dir: &Path) -> Option<usize> {
    let contents =
        std::fs::read_to_string(model_dir.join(SENTENCE_CONFIG_FILE)).ok()?;
    let config: SentenceBertConfig = serde_json::from_str(&contents).ok()?;
    config.max_seq_length
}

/// Resolve embedding options for a model, falling back to defaults.
///
/// Local model directories carrying a `sentence_bert_config.json` with a
/// `max_seq_length` field override the default token limit. Hub model IDs
/// always use the defaults.
pub fn resolve_embed_config(model_id: &str) -> EmbedConfig {
    let mut config = EmbedConfig::default();
    let model_path = Path::new(model_id);
    if model_path.is_dir()
        && let Some(max_seq_length) = load_max_seq_length(model_path)
    {
        config.max_seq_length = max_seq_length;
    }
    config
}

/// Paths of the files needed to build an encoder.
#[derive(Debug, Clone)]
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

/// Resolves and loads the sentence encoder.
///
/// Loading happens once, at startup; the resulting [`BertEmbedder`] is
/// immutable and can be shared between ranking calls.
pub struct ModelManager {
    model_id: String,
    device: Device,
    config: EmbedConfig,
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelManager {
    /// Creates a new `ModelManager`. The model ID is resolved from:
    /// 1. The `GLANCE_MODEL_PATH` environment variable, if set
    /// 2. Otherwise, the default model (`intfloat/e5-small-v2`)
    pub fn new() -> Self {
        let model_id = std::env::var(MODEL_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());
        Self::with_model_id(model_id)
    }

    /// Creates a `ModelManager` with an explicit model ID or local path,
    /// bypassing environment variable resolution.
    pub fn with_model_id(model_id: String) -> Self {
        let config = resolve_embed_config(&model_id);
        Self {
            model_id,
            device: default_device(),
            config,
        }
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_config(mut self, config: EmbedConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the model ID or path that will be loaded.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    /// Load the encoder, downloading it from the HuggingFace Hub when the
    /// model ID is not a local directory.
    pub fn load(&self) -> Result<BertEmbedder> {
        info!(model = %self.model_id, device = ?self.device, "loading encoder");
        let files = self.fetch_files()?;

        let config: Config =
            serde_json::from_str(&std::fs::read_to_string(&files.config)?)?;
        let tokenizer = Tokenizer::from_file(&files.tokenizer)?;

        let vb = if files.weights.extension().is_some_and(|e| e == "bin") {
            VarBuilder::from_pth(&files.weights, DTYPE, &self.device)?
        } else {
            // SAFETY: the weights file is not modified while it is mapped.
            unsafe {
                VarBuilder::from_mmaped_safetensors(
                    &[&files.weights],
                    DTYPE,
                    &self.device,
                )?
            }
        };
        let model = BertModel::load(vb, &config)?;

        BertEmbedder::new(
            model,
            tokenizer,
            self.device.clone(),
            self.config.clone(),
        )
    }

    fn fetch_files(&self) -> Result<ModelFiles> {
        let local = Path::new(&self.model_id);
        if local.is_dir() {
            return local_files(local);
        }

        let api = hf_hub::api::sync::Api::new()?;
        let repo = api.model(self.model_id.clone());
        let weights = match repo.get(SAFETENSORS_FILE) {
            Ok(path) => path,
            Err(_) => repo.get(PYTORCH_FILE)?,
        };

        Ok(ModelFiles {
            config: repo.get(CONFIG_FILE)?,
            tokenizer: repo.get(TOKENIZER_FILE)?,
            weights,
        })
    }
}

fn local_files(dir: &Path) -> Result<ModelFiles> {
    let require = |name: &str| -> Result<PathBuf> {
        let path = dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::Config(format!(
                "model directory {} is missing {name}",
                dir.display()
            )))
        }
    };

    let weights = require(SAFETENSORS_FILE).or_else(|_| require(PYTORCH_FILE))?;

    Ok(ModelFiles {
        config: require(CONFIG_FILE)?,
        tokenizer: require(TOKENIZER_FILE)?,
        weights,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::embedding::DEFAULT_MAX_SEQ_LENGTH;

    #[test]
    fn custom_model_id() {
        let manager = ModelManager::with_model_id("custom/model".to_string());
        assert_eq!(manager.model_id(), "custom/model");
        assert_eq!(manager.config(), &EmbedConfig::default());
    }

    #[test]
    fn builder_overrides() {
        let config = EmbedConfig {
            batch_size: 4,
            ..EmbedConfig::default()
        };
        let manager = ModelManager::with_model_id(DEFAULT_MODEL_ID.into())
            .with_device(Device::Cpu)
            .with_config(config.clone());
        assert!(manager.device().is_cpu());
        assert_eq!(manager.config(), &config);
    }

    #[test]
    fn parse_device_names() {
        assert!(parse_device("cpu").unwrap().is_cpu());
        assert!(parse_device("auto").is_ok());
        assert!(matches!(parse_device("tpu"), Err(Error::Config(_))));
        assert!(matches!(parse_device("cuda:x"), Err(Error::Config(_))));
    }

    #[test]
    fn embed_config_from_model_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SENTENCE_CONFIG_FILE),
            "{\"max_seq_length\": 256, \"do_lower_case\": false}",
        )
        .unwrap();

        let config = resolve_embed_config(&dir.path().to_string_lossy());
        assert_eq!(config.max_seq_length, 256);
        assert_eq!(config.passage_prefix, "passage: ");
    }

    #[test]
    fn embed_config_defaults_without_sentence_config() {
        let dir = tempdir().unwrap();
        let config = resolve_embed_config(&dir.path().to_string_lossy());
        assert_eq!(config.max_seq_length, DEFAULT_MAX_SEQ_LENGTH);

        let remote = resolve_embed_config("intfloat/e5-base-v2");
        assert_eq!(remote, EmbedConfig::default());
    }

    #[test]
    fn local_files_prefers_safetensors() {
        let dir = tempdir().unwrap();
        for name in [CONFIG_FILE, TOKENIZER_FILE, SAFETENSORS_FILE, PYTORCH_FILE]
        {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let files = local_files(dir.path()).unwrap();
        assert_eq!(files.weights, dir.path().join(SAFETENSORS_FILE));
        assert_eq!(files.config, dir.path().join(CONFIG_FILE));
    }

    #[test]
    fn local_files_falls_back_to_pytorch() {
        let dir = tempdir().unwrap();
        for name in [CONFIG_FILE, TOKENIZER_FILE, PYTORCH_FILE] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let files = local_files(dir.path()).unwrap();
        assert_eq!(files.weights, dir.path().join(PYTORCH_FILE));
    }

    #[test]
    fn local_files_reports_missing_tokenizer() {
        let dir = tempdir().unwrap();
        for name in [CONFIG_FILE, SAFETENSORS_FILE] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let err = local_files(dir.path()).unwrap_err();
        assert!(err.to_string().contains(TOKENIZER_FILE));
    }
}
