//! Configuration errors.

use std::fmt;

/// Errors produced when building or validating configuration.
///
/// # Variants
///
/// - **Validation**: values are inconsistent or out of range (e.g. `n_embed` not
///   divisible by `n_head`).
///   Raised by [`Config::validate`](super::Config::validate) and by model construction.
///
/// - **EnvVar**: an environment variable is set but could not be read (e.g. invalid Unicode).
///
/// - **Parse**: an environment variable is set but does not parse into the expected type
///   (e.g. `MICROGPT_STACK_SEED=abc`). Unset it to fall back to the default.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Validation(String),

    EnvVar {
        /// Full environment variable name.
        key: String,
        message: String,
    },

    Parse {
        /// Full environment variable name.
        key: String,
        /// Raw value that failed to parse.
        value: String,
        message: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Validation(m) => write!(f, "config validation: {m}"),
            ConfigError::EnvVar { key, message } => write!(f, "env var {key}: {message}"),
            ConfigError::Parse {
                key,
                value,
                message,
            } => write!(f, "env var {key}={value:?}: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}
