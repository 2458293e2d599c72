//! Configuration for model shape, initialization, training and checkpoint path.
//!
//! Load from environment via [`from_env`] and validate with [`Config::validate`].
//! Default values and env key names are centralized in the `constants` submodule.

mod builder;
mod constants;
mod error;

use std::path::PathBuf;

use constants::{
    DEFAULT_CHECKPOINT_PATH, DEFAULT_INIT_SCALE, DEFAULT_LEARNING_RATE, DEFAULT_LOSS_LOG_EVERY,
    DEFAULT_NUM_EPOCHS, DEFAULT_N_EMBED, DEFAULT_N_HEAD, DEFAULT_N_HIDDEN, DEFAULT_N_LAYER,
    DEFAULT_SEED, DEFAULT_SEQ_LEN, DEFAULT_TEMPERATURE, DEFAULT_VOCAB_SIZE,
};

pub use builder::{env_key, env_parsed, env_string, from_env};
pub use error::ConfigError;

use crate::model::ModelDims;
use crate::train::TrainConfig;

/// Central configuration for the training binary.
///
/// Use [`from_env`] to build from environment variables and [`Config::validate`] before use.
#[derive(Clone, Debug)]
pub struct Config {
    /// Seed for weight initialization and sampling.
    pub seed: u64,
    /// Where the trained checkpoint is written.
    pub checkpoint_path: PathBuf,

    /// Number of token ids (`[0, vocab_size)`).
    pub vocab_size: usize,
    /// Model width (must be divisible by `n_head`).
    pub n_embed: usize,
    /// Inner width of the feed-forward sublayer.
    pub n_hidden: usize,
    /// Number of transformer blocks.
    pub n_layer: usize,
    /// Number of attention heads.
    pub n_head: usize,
    /// Length of the synthetic training sequence.
    pub seq_len: usize,

    /// Half-width of the uniform weight init.
    pub init_scale: f32,
    /// Gradient-descent step size.
    pub learning_rate: f32,
    pub num_epochs: usize,
    /// Log loss every this many epochs.
    pub loss_log_every: usize,

    /// Sampling temperature (0 < T <= 1).
    pub temperature: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            vocab_size: DEFAULT_VOCAB_SIZE,
            n_embed: DEFAULT_N_EMBED,
            n_hidden: DEFAULT_N_HIDDEN,
            n_layer: DEFAULT_N_LAYER,
            n_head: DEFAULT_N_HEAD,
            seq_len: DEFAULT_SEQ_LEN,
            init_scale: DEFAULT_INIT_SCALE,
            learning_rate: DEFAULT_LEARNING_RATE,
            num_epochs: DEFAULT_NUM_EPOCHS,
            loss_log_every: DEFAULT_LOSS_LOG_EVERY,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl Config {
    /// Validates configuration. Returns `Ok(())` if valid, or a [`ConfigError::Validation`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dims().validate()?;
        if self.seq_len == 0 {
            return Err(ConfigError::Validation(
                "seq_len must be greater than 0".to_string(),
            ));
        }
        if !self.init_scale.is_finite() || self.init_scale < 0.0 {
            return Err(ConfigError::Validation(format!(
                "init_scale must be finite and non-negative, got {}",
                self.init_scale
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "learning_rate must be finite and positive, got {}",
                self.learning_rate
            )));
        }
        if self.loss_log_every == 0 {
            return Err(ConfigError::Validation(
                "loss_log_every must be greater than 0".to_string(),
            ));
        }
        if !(self.temperature > 0.0 && self.temperature <= 1.0) {
            return Err(ConfigError::Validation(
                "temperature must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Architecture part of the configuration.
    #[must_use]
    pub fn dims(&self) -> ModelDims {
        ModelDims {
            vocab_size: self.vocab_size,
            n_embed: self.n_embed,
            n_hidden: self.n_hidden,
            n_layer: self.n_layer,
            n_head: self.n_head,
        }
    }

    /// Epoch-loop part of the configuration.
    #[must_use]
    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            learning_rate: self.learning_rate,
            num_epochs: self.num_epochs,
            loss_log_every: self.loss_log_every,
        }
    }
}
