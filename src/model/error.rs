//! Errors produced when saving or loading a checkpoint.

use std::fmt;

use crate::config::ConfigError;

use super::ModelDims;

/// Errors produced by checkpoint I/O.
///
/// # Variants
///
/// - **Io**: the file could not be opened, read or written, or a record was truncated or malformed.
/// - **BadMagic**: the file does not start with the checkpoint magic bytes.
/// - **UnsupportedVersion**: the header carries a format version this build cannot read.
/// - **ArchitectureMismatch**: the header dimensions differ from the model being loaded into.
/// - **InvalidArchitecture**: the header dimensions do not describe a valid model.
/// - **ShapeMismatch**: a tensor record's shape differs from the parameter it should fill.
///
/// A failed load never modifies the target model.
#[derive(Debug)]
pub enum CheckpointError {
    Io(std::io::Error),

    BadMagic([u8; 4]),

    UnsupportedVersion(u32),

    ArchitectureMismatch {
        expected: ModelDims,
        found: ModelDims,
    },

    InvalidArchitecture(ConfigError),

    ShapeMismatch {
        /// Position of the record in the parameter stream.
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "checkpoint io: {e}"),
            CheckpointError::BadMagic(m) => write!(f, "checkpoint: bad magic {m:?}"),
            CheckpointError::UnsupportedVersion(v) => {
                write!(f, "checkpoint: unsupported format version {v}")
            }
            CheckpointError::ArchitectureMismatch { expected, found } => write!(
                f,
                "checkpoint: architecture {found} does not match model {expected}"
            ),
            CheckpointError::InvalidArchitecture(e) => write!(f, "checkpoint: {e}"),
            CheckpointError::ShapeMismatch {
                index,
                expected,
                found,
            } => write!(
                f,
                "checkpoint: tensor {index} is {}x{}, expected {}x{}",
                found.0, found.1, expected.0, expected.1
            ),
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CheckpointError::Io(e) => Some(e),
            CheckpointError::InvalidArchitecture(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CheckpointError {
    fn from(e: std::io::Error) -> Self {
        CheckpointError::Io(e)
    }
}
