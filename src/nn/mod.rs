//! Layers with hand-written forward and backward passes.
//!
//! Every layer follows the same two-phase protocol: `forward` borrows the layer
//! immutably and returns the output together with a context value holding
//! whatever the gradient computation needs; `backward` takes that context by
//! value, accumulates into the layer's parameter gradients and returns the
//! gradient with respect to the layer input. A context can only be consumed once,
//! so a backward pass is always paired with exactly one forward pass.
//!
//! Parameter bookkeeping (update, zeroing, counting, checkpoint order) goes
//! through the [`Module`] trait.

pub mod impls;
#[cfg(test)]
mod tests;

pub use impls::attention::{AttentionContext, MultiHeadAttention};
pub use impls::block::{BlockContext, TransformerBlock};
pub use impls::embedding::{Embedding, EmbeddingContext};
pub use impls::feed_forward::{FeedForward, FeedForwardContext};
pub use impls::layer_norm::{LayerNorm, LayerNormContext, LAYER_NORM_EPS};
pub use impls::linear::{Linear, LinearContext};

use crate::tensor::Tensor;

/// A component that owns trainable parameter tensors.
///
/// [`Module::parameters`] and [`Module::parameters_mut`] must list the tensors in
/// the same fixed order; checkpoints are written and read in that order.
pub trait Module {
    /// Parameter tensors in checkpoint order.
    fn parameters(&self) -> Vec<&Tensor>;

    /// Mutable parameter tensors, same order as [`Module::parameters`].
    fn parameters_mut(&mut self) -> Vec<&mut Tensor>;

    /// One plain gradient-descent step on every parameter; gradients are zeroed afterwards.
    fn update(&mut self, learning_rate: f32) {
        for p in self.parameters_mut() {
            p.sgd_step(learning_rate);
        }
    }

    /// Resets every parameter gradient to zero without touching the values.
    fn zero_grad(&mut self) {
        for p in self.parameters_mut() {
            p.zero_grad();
        }
    }

    /// Total number of scalar parameters.
    fn num_params(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }
}
