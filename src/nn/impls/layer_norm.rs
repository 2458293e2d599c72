//! Per-feature normalization over the position axis with learned scale and shift.
//!
//! Statistics are taken down each column: for feature `j`, the mean and biased
//! variance run over all rows (positions) of the input.

use crate::nn::Module;
use crate::tensor::Tensor;

/// Added to the variance before every square root.
pub const LAYER_NORM_EPS: f32 = 1e-5;

/// Column-wise normalization with `gamma` (init 1) and `beta` (init 0), both `1 x dim`.
#[derive(Clone, Debug)]
pub struct LayerNorm {
    gamma: Tensor,
    beta: Tensor,
}

/// Input and per-column statistics of a [`LayerNorm::forward`] call.
#[derive(Clone, Debug)]
pub struct LayerNormContext {
    input: Tensor,
    mean: Vec<f32>,
    var: Vec<f32>,
}

fn inv_std(var: f32) -> f32 {
    1.0 / (var + LAYER_NORM_EPS).sqrt()
}

impl LayerNorm {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        LayerNorm {
            gamma: Tensor::from_vec(1, dim, vec![1.0; dim]),
            beta: Tensor::new(1, dim),
        }
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.gamma.cols()
    }

    #[must_use]
    pub fn gamma(&self) -> &Tensor {
        &self.gamma
    }

    #[must_use]
    pub fn beta(&self) -> &Tensor {
        &self.beta
    }

    #[must_use]
    pub fn forward(&self, x: &Tensor) -> (Tensor, LayerNormContext) {
        assert_eq!(
            x.cols(),
            self.dim(),
            "layer norm: expected {} features, got {}",
            self.dim(),
            x.cols()
        );
        let n = x.rows() as f32;
        let mut y = Tensor::new(x.rows(), x.cols());
        let mut mean = vec![0.0; x.cols()];
        let mut var = vec![0.0; x.cols()];

        for j in 0..x.cols() {
            let mu = (0..x.rows()).map(|i| x.get(i, j)).sum::<f32>() / n;
            let v = (0..x.rows())
                .map(|i| {
                    let d = x.get(i, j) - mu;
                    d * d
                })
                .sum::<f32>()
                / n;
            let s = inv_std(v);
            let (g, b) = (self.gamma.get(0, j), self.beta.get(0, j));
            for i in 0..x.rows() {
                y.set(i, j, (x.get(i, j) - mu) * s * g + b);
            }
            mean[j] = mu;
            var[j] = v;
        }

        (
            y,
            LayerNormContext {
                input: x.clone(),
                mean,
                var,
            },
        )
    }

    /// Accumulates `dgamma = Σ g·x̂`, `dbeta = Σ g` and returns
    /// `inv_std · (dx̂ − mean(dx̂) − x̂·mean(dx̂·x̂))` with `dx̂ = g·gamma`.
    pub fn backward(&mut self, ctx: LayerNormContext, grad_out: &Tensor) -> Tensor {
        let x = &ctx.input;
        assert_eq!(
            grad_out.shape(),
            x.shape(),
            "layer norm backward: gradient shape does not match forward output"
        );
        let n = x.rows() as f32;
        let mut grad_in = Tensor::new(x.rows(), x.cols());

        for j in 0..x.cols() {
            let mu = ctx.mean[j];
            let s = inv_std(ctx.var[j]);
            let gamma = self.gamma.get(0, j);

            let mut dgamma = 0.0;
            let mut dbeta = 0.0;
            let mut sum_dxhat = 0.0;
            let mut sum_dxhat_xhat = 0.0;
            for i in 0..x.rows() {
                let g = grad_out.get(i, j);
                let xhat = (x.get(i, j) - mu) * s;
                dgamma += g * xhat;
                dbeta += g;
                sum_dxhat += g * gamma;
                sum_dxhat_xhat += g * gamma * xhat;
            }
            self.gamma.grads_mut()[j] += dgamma;
            self.beta.grads_mut()[j] += dbeta;

            for i in 0..x.rows() {
                let xhat = (x.get(i, j) - mu) * s;
                let dxhat = grad_out.get(i, j) * gamma;
                grad_in.set(i, j, s * (dxhat - sum_dxhat / n - xhat * sum_dxhat_xhat / n));
            }
        }

        grad_in
    }
}

impl Module for LayerNorm {
    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.gamma, &self.beta]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.gamma, &mut self.beta]
    }
}
