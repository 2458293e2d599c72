//! Multi-head scaled dot-product self-attention over the whole sequence (no mask).

use rand::Rng;
use rayon::prelude::*;
use tracing::trace;

use crate::nn::{Linear, LinearContext, Module};
use crate::tensor::{matmul, softmax, softmax_backward, transpose, Tensor};

/// Q, K, V and output projections (all `dim -> dim`) split into `n_head` heads.
#[derive(Clone, Debug)]
pub struct MultiHeadAttention {
    n_head: usize,
    head_dim: usize,
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    o_proj: Linear,
}

/// Projections, per-head attention weights and projection contexts of one forward call.
#[derive(Clone, Debug)]
pub struct AttentionContext {
    q_ctx: LinearContext,
    k_ctx: LinearContext,
    v_ctx: LinearContext,
    o_ctx: LinearContext,
    q: Tensor,
    k: Tensor,
    v: Tensor,
    /// `seq x seq` softmax weights, one per head.
    probs: Vec<Tensor>,
}

impl AttentionContext {
    /// Attention weights of head `h` (rows sum to 1).
    #[must_use]
    pub fn head_weights(&self, h: usize) -> &Tensor {
        &self.probs[h]
    }
}

impl MultiHeadAttention {
    /// Panics unless `n_head > 0` and `dim % n_head == 0`.
    pub fn new<R: Rng>(dim: usize, n_head: usize, init_scale: f32, rng: &mut R) -> Self {
        let q_proj = Linear::new(dim, dim, init_scale, rng);
        let k_proj = Linear::new(dim, dim, init_scale, rng);
        let v_proj = Linear::new(dim, dim, init_scale, rng);
        let o_proj = Linear::new(dim, dim, init_scale, rng);
        Self::from_projections(n_head, q_proj, k_proj, v_proj, o_proj)
    }

    /// Assembles attention from existing projections (all square and equally sized).
    #[must_use]
    pub fn from_projections(
        n_head: usize,
        q_proj: Linear,
        k_proj: Linear,
        v_proj: Linear,
        o_proj: Linear,
    ) -> Self {
        let dim = q_proj.in_features();
        assert!(n_head > 0, "attention: n_head must be greater than 0");
        assert!(
            dim % n_head == 0,
            "attention: dim ({dim}) must be divisible by n_head ({n_head})"
        );
        for p in [&q_proj, &k_proj, &v_proj, &o_proj] {
            assert_eq!(
                (p.in_features(), p.out_features()),
                (dim, dim),
                "attention: projections must all be {dim}x{dim}"
            );
        }
        MultiHeadAttention {
            n_head,
            head_dim: dim / n_head,
            q_proj,
            k_proj,
            v_proj,
            o_proj,
        }
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.n_head * self.head_dim
    }

    #[must_use]
    pub fn n_head(&self) -> usize {
        self.n_head
    }

    #[must_use]
    pub fn head_dim(&self) -> usize {
        self.head_dim
    }

    #[must_use]
    pub fn v_proj(&self) -> &Linear {
        &self.v_proj
    }

    #[must_use]
    pub fn o_proj(&self) -> &Linear {
        &self.o_proj
    }

    fn score_scale(&self) -> f32 {
        1.0 / (self.head_dim as f32).sqrt()
    }

    /// `x: seq x dim` → `seq x dim`.
    #[must_use]
    pub fn forward(&self, x: &Tensor) -> (Tensor, AttentionContext) {
        trace!(
            seq_len = x.rows(),
            n_head = self.n_head,
            head_dim = self.head_dim,
            "attention forward"
        );
        let (q, q_ctx) = self.q_proj.forward(x);
        let (k, k_ctx) = self.k_proj.forward(x);
        let (v, v_ctx) = self.v_proj.forward(x);

        let hd = self.head_dim;
        let scale = self.score_scale();
        let heads: Vec<(Tensor, Tensor)> = (0..self.n_head)
            .into_par_iter()
            .map(|h| {
                let q_h = q.slice_cols(h * hd, hd);
                let k_h = k.slice_cols(h * hd, hd);
                let v_h = v.slice_cols(h * hd, hd);
                let mut scores = matmul(&q_h, &transpose(&k_h));
                scores.scale(scale);
                let probs = softmax(&scores);
                let out = matmul(&probs, &v_h);
                (probs, out)
            })
            .collect();

        let mut concat = Tensor::new(x.rows(), self.dim());
        let mut probs = Vec::with_capacity(self.n_head);
        for (h, (p, out)) in heads.into_iter().enumerate() {
            concat.set_cols(h * hd, &out);
            probs.push(p);
        }

        let (y, o_ctx) = self.o_proj.forward(&concat);
        (
            y,
            AttentionContext {
                q_ctx,
                k_ctx,
                v_ctx,
                o_ctx,
                q,
                k,
                v,
                probs,
            },
        )
    }

    /// Backward through the output projection, each head's softmax and the
    /// Q/K/V projections. The three projection gradients are summed into the
    /// returned gradient for `x`.
    pub fn backward(&mut self, ctx: AttentionContext, grad_out: &Tensor) -> Tensor {
        let d_concat = self.o_proj.backward(ctx.o_ctx, grad_out);

        let hd = self.head_dim;
        let scale = self.score_scale();
        let (q, k, v) = (&ctx.q, &ctx.k, &ctx.v);
        let head_grads: Vec<(Tensor, Tensor, Tensor)> = ctx
            .probs
            .par_iter()
            .enumerate()
            .map(|(h, p)| {
                let d_out = d_concat.slice_cols(h * hd, hd);
                let q_h = q.slice_cols(h * hd, hd);
                let k_h = k.slice_cols(h * hd, hd);
                let v_h = v.slice_cols(h * hd, hd);

                let dp = matmul(&d_out, &transpose(&v_h));
                let dv_h = matmul(&transpose(p), &d_out);
                let mut ds = softmax_backward(p, &dp);
                ds.scale(scale);
                let dq_h = matmul(&ds, &k_h);
                let dk_h = matmul(&transpose(&ds), &q_h);
                (dq_h, dk_h, dv_h)
            })
            .collect();

        let rows = d_concat.rows();
        let mut dq = Tensor::new(rows, self.dim());
        let mut dk = Tensor::new(rows, self.dim());
        let mut dv = Tensor::new(rows, self.dim());
        for (h, (dq_h, dk_h, dv_h)) in head_grads.iter().enumerate() {
            dq.set_cols(h * hd, dq_h);
            dk.set_cols(h * hd, dk_h);
            dv.set_cols(h * hd, dv_h);
        }

        let mut grad_in = self.q_proj.backward(ctx.q_ctx, &dq);
        grad_in.add_assign(&self.k_proj.backward(ctx.k_ctx, &dk));
        grad_in.add_assign(&self.v_proj.backward(ctx.v_ctx, &dv));
        grad_in
    }
}

impl Module for MultiHeadAttention {
    fn parameters(&self) -> Vec<&Tensor> {
        [&self.q_proj, &self.k_proj, &self.v_proj, &self.o_proj]
            .into_iter()
            .flat_map(|l| l.parameters())
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.q_proj.parameters_mut();
        params.extend(self.k_proj.parameters_mut());
        params.extend(self.v_proj.parameters_mut());
        params.extend(self.o_proj.parameters_mut());
        params
    }
}
