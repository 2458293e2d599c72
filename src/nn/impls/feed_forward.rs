//! Position-wise two-layer MLP with a ReLU in between.

use rand::Rng;

use crate::nn::{Linear, LinearContext, Module};
use crate::tensor::Tensor;

/// `Linear(dim -> hidden) -> ReLU -> Linear(hidden -> dim)`.
#[derive(Clone, Debug)]
pub struct FeedForward {
    up: Linear,
    down: Linear,
}

#[derive(Clone, Debug)]
pub struct FeedForwardContext {
    up_ctx: LinearContext,
    down_ctx: LinearContext,
    /// Output of `up` before the ReLU.
    pre_activation: Tensor,
}

impl FeedForward {
    pub fn new<R: Rng>(dim: usize, hidden: usize, init_scale: f32, rng: &mut R) -> Self {
        let up = Linear::new(dim, hidden, init_scale, rng);
        let down = Linear::new(hidden, dim, init_scale, rng);
        FeedForward { up, down }
    }

    #[must_use]
    pub fn from_layers(up: Linear, down: Linear) -> Self {
        assert_eq!(
            up.out_features(),
            down.in_features(),
            "feed forward: hidden widths of the two projections differ"
        );
        FeedForward { up, down }
    }

    #[must_use]
    pub fn forward(&self, x: &Tensor) -> (Tensor, FeedForwardContext) {
        let (pre_activation, up_ctx) = self.up.forward(x);
        let mut hidden = pre_activation.clone();
        for v in hidden.values_mut() {
            *v = v.max(0.0);
        }
        let (y, down_ctx) = self.down.forward(&hidden);
        (
            y,
            FeedForwardContext {
                up_ctx,
                down_ctx,
                pre_activation,
            },
        )
    }

    pub fn backward(&mut self, ctx: FeedForwardContext, grad_out: &Tensor) -> Tensor {
        let mut grad_hidden = self.down.backward(ctx.down_ctx, grad_out);
        for (g, &a) in grad_hidden
            .values_mut()
            .iter_mut()
            .zip(ctx.pre_activation.values())
        {
            if a <= 0.0 {
                *g = 0.0;
            }
        }
        self.up.backward(ctx.up_ctx, &grad_hidden)
    }
}

impl Module for FeedForward {
    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.up.parameters();
        params.extend(self.down.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.up.parameters_mut();
        params.extend(self.down.parameters_mut());
        params
    }
}
