use candle_core::{DType, Device, Tensor};
use candle_transformers::models::bert::BertModel;
use tokenizers::Tokenizer;
use tracing::debug;

use crate::error::{Error, Result};

/// Prefix the E5 family of encoders expects in front of indexed passages.
pub const DEFAULT_PASSAGE_PREFIX: &str = "passage: ";

/// Token limit applied when the model directory does not specify one.
pub const DEFAULT_MAX_SEQ_LENGTH: usize = 512;

/// Number of texts encoded per forward pass.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Options for turning window texts into embeddings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedConfig {
    /// Literal marker prepended to every text before tokenization.
    pub passage_prefix: String,
    /// Sequences longer than this many tokens are truncated from the end.
    pub max_seq_length: usize,
    /// Texts per forward pass. Bounds peak memory.
    pub batch_size: usize,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            passage_prefix: DEFAULT_PASSAGE_PREFIX.to_string(),
            max_seq_length: DEFAULT_MAX_SEQ_LENGTH,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Maps texts to unit-length dense vectors.
///
/// Implementations must return a `[texts.len(), dim]` matrix whose row `k`
/// belongs to `texts[k]`.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Tensor>;
}

impl<E: Embedder + ?Sized> Embedder for &E {
    fn embed(&self, texts: &[String]) -> Result<Tensor> {
        (**self).embed(texts)
    }
}

impl<E: Embedder + ?Sized> Embedder for std::sync::Arc<E> {
    fn embed(&self, texts: &[String]) -> Result<Tensor> {
        (**self).embed(texts)
    }
}

/// Mean-pooled, L2-normalized BERT sentence embeddings.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    config: EmbedConfig,
}

impl BertEmbedder {
    /// Wrap an already loaded encoder.
    ///
    /// The tokenizer is switched to batch-longest padding and right-side
    /// truncation at `config.max_seq_length`.
    pub fn new(
        model: BertModel,
        mut tokenizer: Tokenizer,
        device: Device,
        config: EmbedConfig,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::Config("batch size must be positive".into()));
        }

        let padding = tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..tokenizer.get_padding().cloned().unwrap_or_default()
        };
        tokenizer.with_padding(Some(padding));
        tokenizer.with_truncation(Some(tokenizers::TruncationParams {
            max_length: config.max_seq_length,
            direction: tokenizers::TruncationDirection::Right,
            ..Default::default()
        }))?;

        Ok(Self {
            model,
            tokenizer,
            device,
            config,
        })
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn embed_batch(&self, batch: &[String]) -> Result<Tensor> {
        let encodings = self.tokenizer.encode_batch(batch.to_vec(), true)?;
        let batch_size = encodings.len();
        let seq_len = encodings.first().map_or(0, |e| e.get_ids().len());

        let mut ids = Vec::with_capacity(batch_size * seq_len);
        let mut type_ids = Vec::with_capacity(batch_size * seq_len);
        let mut mask = Vec::with_capacity(batch_size * seq_len);
        for encoding in &encodings {
            ids.extend_from_slice(encoding.get_ids());
            type_ids.extend_from_slice(encoding.get_type_ids());
            mask.extend_from_slice(encoding.get_attention_mask());
        }

        let shape = (batch_size, seq_len);
        let ids = Tensor::from_vec(ids, shape, &self.device)?;
        let type_ids = Tensor::from_vec(type_ids, shape, &self.device)?;
        let mask = Tensor::from_vec(mask, shape, &self.device)?;

        // [batch, seq, hidden]
        let hidden = self.model.forward(&ids, &type_ids, Some(&mask))?;
        l2_normalize(&mean_pool(&hidden, &mask)?)
    }
}

impl Embedder for BertEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Tensor> {
        let prefixed = with_prefix(&self.config.passage_prefix, texts);
        embed_in_batches(&prefixed, self.config.batch_size, |batch| {
            self.embed_batch(batch)
        })
    }
}

/// Prepend `prefix` to every text.
pub fn with_prefix(prefix: &str, texts: &[String]) -> Vec<String> {
    texts.iter().map(|t| format!("{prefix}{t}")).collect()
}

/// Run `encode` over consecutive chunks of `texts` and stack the results.
///
/// Chunks are processed in input order, so row `k` of the output always
/// belongs to `texts[k]`.
pub fn embed_in_batches<F>(
    texts: &[String],
    batch_size: usize,
    mut encode: F,
) -> Result<Tensor>
where
    F: FnMut(&[String]) -> Result<Tensor>,
{
    if texts.is_empty() {
        return Err(Error::InvalidInput("no texts to embed".into()));
    }
    if batch_size == 0 {
        return Err(Error::Config("batch size must be positive".into()));
    }

    let total = texts.len().div_ceil(batch_size);
    let mut parts = Vec::with_capacity(total);
    for (i, batch) in texts.chunks(batch_size).enumerate() {
        debug!(batch = i + 1, total, size = batch.len(), "embedding batch");
        let part = encode(batch)?;
        let rows = part.dim(0)?;
        if rows != batch.len() {
            return Err(Error::Config(format!(
                "encoder returned {rows} rows for a batch of {}",
                batch.len()
            )));
        }
        parts.push(part);
    }

    Ok(Tensor::cat(&parts, 0)?)
}

/// Average token vectors over the non-padding positions of each sequence.
///
/// `hidden` is `[batch, seq, dim]`, `attention_mask` is `[batch, seq]` with
/// 1 for real tokens and 0 for padding.
pub fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let mask = attention_mask.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?;
    Ok(summed.broadcast_div(&counts)?)
}

/// Scale every row of a `[n, dim]` matrix to unit Euclidean norm.
pub fn l2_normalize(vectors: &Tensor) -> Result<Tensor> {
    let norms = vectors
        .to_dtype(DType::F32)?
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .maximum(1e-12)?
        .to_dtype(vectors.dtype())?;
    Ok(vectors.broadcast_div(&norms)?)
}
