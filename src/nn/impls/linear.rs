//! Affine projection `y = x·W + b`.

use rand::Rng;

use crate::nn::Module;
use crate::tensor::{matmul, transpose, Tensor};

/// Affine layer with weight `in x out` and bias `1 x out`.
#[derive(Clone, Debug)]
pub struct Linear {
    weight: Tensor,
    bias: Tensor,
}

/// Saved input of a [`Linear::forward`] call.
#[derive(Clone, Debug)]
pub struct LinearContext {
    input: Tensor,
}

impl Linear {
    /// Weight and bias drawn uniformly from `[-init_scale, init_scale]`.
    pub fn new<R: Rng>(
        in_features: usize,
        out_features: usize,
        init_scale: f32,
        rng: &mut R,
    ) -> Self {
        let mut weight = Tensor::new(in_features, out_features);
        let mut bias = Tensor::new(1, out_features);
        weight.randomize(init_scale, rng);
        bias.randomize(init_scale, rng);
        Linear { weight, bias }
    }

    /// Builds a layer from explicit tensors. `bias` must be `1 x weight.cols()`.
    #[must_use]
    pub fn from_parts(weight: Tensor, bias: Tensor) -> Self {
        assert_eq!(
            bias.shape(),
            (1, weight.cols()),
            "linear: bias must be 1x{}",
            weight.cols()
        );
        Linear { weight, bias }
    }

    #[must_use]
    pub fn in_features(&self) -> usize {
        self.weight.rows()
    }

    #[must_use]
    pub fn out_features(&self) -> usize {
        self.weight.cols()
    }

    #[must_use]
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    #[must_use]
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// `x: rows x in` → `rows x out`.
    #[must_use]
    pub fn forward(&self, x: &Tensor) -> (Tensor, LinearContext) {
        let mut y = matmul(x, &self.weight);
        let bias = self.bias.values();
        for i in 0..y.rows() {
            for (v, b) in y.row_mut(i).iter_mut().zip(bias) {
                *v += b;
            }
        }
        (y, LinearContext { input: x.clone() })
    }

    /// Accumulates `dW += xᵀ·g` and `db += Σ_rows g`, returns `g·Wᵀ`.
    pub fn backward(&mut self, ctx: LinearContext, grad_out: &Tensor) -> Tensor {
        let x = ctx.input;
        assert_eq!(
            grad_out.shape(),
            (x.rows(), self.out_features()),
            "linear backward: gradient shape does not match forward output"
        );

        let dw = matmul(&transpose(&x), grad_out);
        self.weight.accumulate_grad(dw.values());

        let db = self.bias.grad_row_mut(0);
        for i in 0..grad_out.rows() {
            for (g, go) in db.iter_mut().zip(grad_out.row(i)) {
                *g += go;
            }
        }

        matmul(grad_out, &transpose(&self.weight))
    }
}

impl Module for Linear {
    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weight, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.bias]
    }
}
