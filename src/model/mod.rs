//! The full language model: embedding, transformer blocks, vocabulary head.
//!
//! ```text
//! ids -> Embedding -> n_layer x TransformerBlock -> Linear (head) -> softmax
//! ```
//!
//! [`Model::forward`] returns per-position next-token distributions and a
//! [`ModelContext`]. Feed the context and the logit gradient from
//! [`cross_entropy`] to [`Model::backward`], then call [`Module::update`].

mod checkpoint;
mod error;
mod loss;

use std::fmt;

use rand::Rng;
use rand_distr::{weighted::WeightedIndex, Distribution};
use tracing::debug;

pub use checkpoint::{read_header, stream_len, FORMAT_VERSION, HEADER_LEN, MAGIC};
pub use error::CheckpointError;
pub use loss::{cross_entropy, PROB_FLOOR};

use crate::config::ConfigError;
use crate::nn::{
    BlockContext, Embedding, EmbeddingContext, Linear, LinearContext, Module, TransformerBlock,
};
use crate::tensor::{softmax, Tensor};

/// Architecture dimensions; every parameter shape follows from these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelDims {
    pub vocab_size: usize,
    pub n_embed: usize,
    /// Feed-forward inner width.
    pub n_hidden: usize,
    pub n_layer: usize,
    pub n_head: usize,
}

impl ModelDims {
    /// Checks that every dimension is non-zero and `n_embed` splits evenly into heads.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("vocab_size", self.vocab_size),
            ("n_embed", self.n_embed),
            ("n_hidden", self.n_hidden),
            ("n_layer", self.n_layer),
            ("n_head", self.n_head),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        if self.n_embed % self.n_head != 0 {
            return Err(ConfigError::Validation(format!(
                "n_embed ({}) must be divisible by n_head ({})",
                self.n_embed, self.n_head
            )));
        }
        Ok(())
    }

    /// Parameter tensors in a model of this shape, or `None` on overflow.
    #[must_use]
    pub fn num_tensors(&self) -> Option<usize> {
        self.n_layer.checked_mul(16)?.checked_add(3)
    }

    /// Scalar parameter count computed without allocating, or `None` on overflow.
    #[must_use]
    pub fn checked_num_params(&self) -> Option<usize> {
        let (v, e, h) = (self.vocab_size, self.n_embed, self.n_hidden);
        let square = e.checked_mul(e)?.checked_add(e)?;
        let up = e.checked_mul(h)?.checked_add(h)?;
        let down = h.checked_mul(e)?.checked_add(e)?;
        let per_block = e
            .checked_mul(4)?
            .checked_add(square.checked_mul(4)?)?
            .checked_add(up)?
            .checked_add(down)?;
        let table = v.checked_mul(e)?;
        let head = e.checked_mul(v)?.checked_add(v)?;
        self.n_layer
            .checked_mul(per_block)?
            .checked_add(table)?
            .checked_add(head)
    }

    /// Head dimension (`n_embed / n_head`).
    #[must_use]
    pub fn head_dim(&self) -> usize {
        self.n_embed / self.n_head
    }
}

impl fmt::Display for ModelDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vocab={} embed={} hidden={} layers={} heads={}",
            self.vocab_size, self.n_embed, self.n_hidden, self.n_layer, self.n_head
        )
    }
}

#[derive(Clone, Debug)]
pub struct Model {
    dims: ModelDims,
    embedding: Embedding,
    blocks: Vec<TransformerBlock>,
    head: Linear,
}

/// Everything [`Model::backward`] needs from one [`Model::forward`] call.
#[derive(Clone, Debug)]
pub struct ModelContext {
    embedding: EmbeddingContext,
    blocks: Vec<BlockContext>,
    head: LinearContext,
}

impl Model {
    /// Fresh model with weights drawn uniformly from `[-init_scale, init_scale]`.
    ///
    /// Norm layers start at gamma = 1, beta = 0.
    pub fn new<R: Rng>(dims: ModelDims, init_scale: f32, rng: &mut R) -> Result<Self, ConfigError> {
        dims.validate()?;
        if !init_scale.is_finite() || init_scale < 0.0 {
            return Err(ConfigError::Validation(format!(
                "init_scale must be finite and non-negative, got {init_scale}"
            )));
        }
        let embedding = Embedding::new(dims.vocab_size, dims.n_embed, init_scale, rng);
        let blocks = (0..dims.n_layer)
            .map(|_| {
                TransformerBlock::new(dims.n_embed, dims.n_hidden, dims.n_head, init_scale, rng)
            })
            .collect();
        let head = Linear::new(dims.n_embed, dims.vocab_size, init_scale, rng);
        Ok(Model {
            dims,
            embedding,
            blocks,
            head,
        })
    }

    #[must_use]
    pub fn dims(&self) -> ModelDims {
        self.dims
    }

    #[must_use]
    pub fn embedding(&self) -> &Embedding {
        &self.embedding
    }

    #[must_use]
    pub fn blocks(&self) -> &[TransformerBlock] {
        &self.blocks
    }

    #[must_use]
    pub fn head(&self) -> &Linear {
        &self.head
    }

    /// Vocabulary logits, one row per position.
    #[must_use]
    pub fn forward_logits(&self, ids: &[usize]) -> (Tensor, ModelContext) {
        debug!(seq_len = ids.len(), n_layer = self.blocks.len(), "model forward");
        let (mut x, embedding) = self.embedding.forward(ids);
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let (out, ctx) = block.forward(&x);
            blocks.push(ctx);
            x = out;
        }
        let (logits, head) = self.head.forward(&x);
        (
            logits,
            ModelContext {
                embedding,
                blocks,
                head,
            },
        )
    }

    /// Next-token distribution at every position (rows sum to 1).
    #[must_use]
    pub fn forward(&self, ids: &[usize]) -> (Tensor, ModelContext) {
        let (logits, ctx) = self.forward_logits(ids);
        (softmax(&logits), ctx)
    }

    /// Backpropagates `grad_logits` (e.g. the gradient from [`cross_entropy`])
    /// through the head, the blocks in reverse and the embedding.
    pub fn backward(&mut self, ctx: ModelContext, grad_logits: &Tensor) {
        let mut grad = self.head.backward(ctx.head, grad_logits);
        for (block, block_ctx) in self.blocks.iter_mut().zip(ctx.blocks).rev() {
            grad = block.backward(block_ctx, &grad);
        }
        self.embedding.backward(ctx.embedding, &grad);
    }

    /// Greedy prediction: the most probable id after the last position.
    #[must_use]
    pub fn predict_next(&self, ids: &[usize]) -> usize {
        assert!(!ids.is_empty(), "predict_next: empty token sequence");
        let (probs, _) = self.forward(ids);
        argmax(probs.row(probs.rows() - 1))
    }

    /// Samples the id after the last position with logits divided by `temperature`
    /// (low temperature = sharper, high = more random).
    pub fn sample_next<R: Rng>(&self, ids: &[usize], temperature: f32, rng: &mut R) -> usize {
        assert!(!ids.is_empty(), "sample_next: empty token sequence");
        assert!(
            temperature > 0.0,
            "sample_next: temperature must be positive, got {temperature}"
        );
        let (logits, _) = self.forward_logits(ids);
        let last = logits.row(logits.rows() - 1);
        let scaled: Vec<f32> = last.iter().map(|l| l / temperature).collect();
        let scaled = Tensor::from_vec(1, scaled.len(), scaled);
        let probs = softmax(&scaled);
        WeightedIndex::new(probs.values())
            .ok()
            .map(|dist| dist.sample(rng))
            .unwrap_or_else(|| argmax(probs.values()))
    }
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}

impl Module for Model {
    /// Checkpoint order: embedding table, each block, head weight and bias.
    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.embedding.parameters();
        for block in &self.blocks {
            params.extend(block.parameters());
        }
        params.extend(self.head.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.embedding.parameters_mut();
        for block in &mut self.blocks {
            params.extend(block.parameters_mut());
        }
        params.extend(self.head.parameters_mut());
        params
    }
}
