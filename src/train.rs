//! Gradient-descent training on a single token sequence.
//!
//! One step is forward → cross-entropy → full backward → update. Gradients left
//! over from an earlier unpaired backward are discarded first, and the update
//! leaves them zero again.

use tracing::info;

use crate::model::{cross_entropy, Model};
use crate::nn::Module;

/// Epoch-loop settings.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainConfig {
    pub learning_rate: f32,
    pub num_epochs: usize,
    /// Log loss every this many epochs (and at epoch 0).
    pub loss_log_every: usize,
}

/// Targets for next-token prediction on a synthetic sequence: `(id + 1) % vocab_size`.
#[must_use]
pub fn next_token_targets(ids: &[usize], vocab_size: usize) -> Vec<usize> {
    ids.iter().map(|&id| (id + 1) % vocab_size).collect()
}

/// One gradient-descent step; returns the loss measured before the update.
pub fn train_step(model: &mut Model, ids: &[usize], targets: &[usize], learning_rate: f32) -> f32 {
    model.zero_grad();
    let (probs, ctx) = model.forward(ids);
    let (loss, grad) = cross_entropy(&probs, targets);
    model.backward(ctx, &grad);
    model.update(learning_rate);
    loss
}

/// Runs `cfg.num_epochs` steps over the same sequence and returns every epoch's loss.
pub fn fit(model: &mut Model, ids: &[usize], targets: &[usize], cfg: &TrainConfig) -> Vec<f32> {
    let mut losses = Vec::with_capacity(cfg.num_epochs);
    for epoch in 0..cfg.num_epochs {
        let loss = train_step(model, ids, targets, cfg.learning_rate);
        if epoch % cfg.loss_log_every.max(1) == 0 {
            info!(epoch, num_epochs = cfg.num_epochs, loss, "training");
        }
        losses.push(loss);
    }
    losses
}
