//! # microgpt-stack
//!
//! A small autoregressive transformer trained from scratch: dense `f32` tensors
//! with paired gradient buffers, layers with hand-written backward passes, a
//! cross-entropy objective, plain gradient descent and a validated binary
//! checkpoint format.

pub mod config;
pub mod error;
pub mod model;
pub mod nn;
pub mod tensor;
pub mod train;

pub use error::Error;
pub use model::{cross_entropy, CheckpointError, Model, ModelContext, ModelDims};
pub use nn::Module;
pub use tensor::Tensor;
