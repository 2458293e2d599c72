//! Default values and environment variable key names used by the config builder.

/// Environment variable prefix (e.g. `MICROGPT_STACK_N_EMBED`).
pub(crate) const ENV_PREFIX: &str = "MICROGPT_STACK_";

// --- Env key suffixes (full key = ENV_PREFIX + suffix) ---

pub(crate) const ENV_SEED: &str = "SEED";
pub(crate) const ENV_CHECKPOINT_PATH: &str = "CHECKPOINT_PATH";
pub(crate) const ENV_VOCAB_SIZE: &str = "VOCAB_SIZE";
pub(crate) const ENV_N_EMBED: &str = "N_EMBED";
pub(crate) const ENV_N_HIDDEN: &str = "N_HIDDEN";
pub(crate) const ENV_N_LAYER: &str = "N_LAYER";
pub(crate) const ENV_N_HEAD: &str = "N_HEAD";
pub(crate) const ENV_SEQ_LEN: &str = "SEQ_LEN";
pub(crate) const ENV_INIT_SCALE: &str = "INIT_SCALE";
pub(crate) const ENV_LEARNING_RATE: &str = "LEARNING_RATE";
pub(crate) const ENV_NUM_EPOCHS: &str = "NUM_EPOCHS";
pub(crate) const ENV_LOSS_LOG_EVERY: &str = "LOSS_LOG_EVERY";
pub(crate) const ENV_TEMPERATURE: &str = "TEMPERATURE";

// --- Default values ---

pub(crate) const DEFAULT_SEED: u64 = 42;
pub(crate) const DEFAULT_CHECKPOINT_PATH: &str = "microgpt_stack.ckpt";
pub(crate) const DEFAULT_VOCAB_SIZE: usize = 64;
pub(crate) const DEFAULT_N_EMBED: usize = 32;
pub(crate) const DEFAULT_N_HIDDEN: usize = 64;
pub(crate) const DEFAULT_N_LAYER: usize = 2;
pub(crate) const DEFAULT_N_HEAD: usize = 4;
pub(crate) const DEFAULT_SEQ_LEN: usize = 16;
pub(crate) const DEFAULT_INIT_SCALE: f32 = 0.02;
pub(crate) const DEFAULT_LEARNING_RATE: f32 = 0.01;
pub(crate) const DEFAULT_NUM_EPOCHS: usize = 100;
pub(crate) const DEFAULT_LOSS_LOG_EVERY: usize = 10;
pub(crate) const DEFAULT_TEMPERATURE: f32 = 0.5;
