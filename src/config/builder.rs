//! Build [`Config`] from environment variables.
//!
//! Key names live in the config `constants` submodule; every read goes through
//! [`env_string`] or [`env_parsed`] so failures surface as [`ConfigError`].

use std::path::PathBuf;

use super::constants::{
    ENV_CHECKPOINT_PATH, ENV_INIT_SCALE, ENV_LEARNING_RATE, ENV_LOSS_LOG_EVERY, ENV_NUM_EPOCHS,
    ENV_N_EMBED, ENV_N_HEAD, ENV_N_HIDDEN, ENV_N_LAYER, ENV_PREFIX, ENV_SEED, ENV_SEQ_LEN,
    ENV_TEMPERATURE, ENV_VOCAB_SIZE,
};
use super::Config;
use super::ConfigError;

/// Returns the full environment variable key for a suffix (e.g. `SEED` → `MICROGPT_STACK_SEED`).
#[must_use]
pub fn env_key(suffix: &str) -> String {
    format!("{ENV_PREFIX}{suffix}")
}

/// Reads an environment variable as a string.
///
/// `Ok(None)` when unset; [`ConfigError::EnvVar`] when set but not valid Unicode.
pub fn env_string(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(s) => Ok(Some(s)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::EnvVar {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Reads an environment variable and parses it into `T`.
///
/// `Ok(None)` when unset; [`ConfigError::Parse`] when set but unparsable (e.g. `SEED=abc`).
pub fn env_parsed<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(s) = env_string(key)? else {
        return Ok(None);
    };
    match s.parse() {
        Ok(t) => Ok(Some(t)),
        Err(e) => Err(ConfigError::Parse {
            key: key.to_string(),
            value: s,
            message: e.to_string(),
        }),
    }
}

/// Builds [`Config`] from environment variables, falling back to [`Config::default`]
/// for unset keys.
///
/// Does not validate; call [`Config::validate`] on the result.
pub fn from_env() -> Result<Config, ConfigError> {
    let default = Config::default();

    let seed = env_parsed::<u64>(&env_key(ENV_SEED))?.unwrap_or(default.seed);
    let checkpoint_path = env_string(&env_key(ENV_CHECKPOINT_PATH))?
        .map(PathBuf::from)
        .unwrap_or_else(|| default.checkpoint_path.clone());
    let vocab_size = env_parsed::<usize>(&env_key(ENV_VOCAB_SIZE))?.unwrap_or(default.vocab_size);
    let n_embed = env_parsed::<usize>(&env_key(ENV_N_EMBED))?.unwrap_or(default.n_embed);
    let n_hidden = env_parsed::<usize>(&env_key(ENV_N_HIDDEN))?.unwrap_or(default.n_hidden);
    let n_layer = env_parsed::<usize>(&env_key(ENV_N_LAYER))?.unwrap_or(default.n_layer);
    let n_head = env_parsed::<usize>(&env_key(ENV_N_HEAD))?.unwrap_or(default.n_head);
    let seq_len = env_parsed::<usize>(&env_key(ENV_SEQ_LEN))?.unwrap_or(default.seq_len);
    let init_scale = env_parsed::<f32>(&env_key(ENV_INIT_SCALE))?.unwrap_or(default.init_scale);
    let learning_rate =
        env_parsed::<f32>(&env_key(ENV_LEARNING_RATE))?.unwrap_or(default.learning_rate);
    let num_epochs = env_parsed::<usize>(&env_key(ENV_NUM_EPOCHS))?.unwrap_or(default.num_epochs);
    let loss_log_every =
        env_parsed::<usize>(&env_key(ENV_LOSS_LOG_EVERY))?.unwrap_or(default.loss_log_every);
    let temperature = env_parsed::<f32>(&env_key(ENV_TEMPERATURE))?.unwrap_or(default.temperature);

    Ok(Config {
        seed,
        checkpoint_path,
        vocab_size,
        n_embed,
        n_hidden,
        n_layer,
        n_head,
        seq_len,
        init_scale,
        learning_rate,
        num_epochs,
        loss_log_every,
        temperature,
    })
}
