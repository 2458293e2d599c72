//! Pre-norm residual transformer block.
//!
//! ```text
//! r1  = x  + attn(ln1(x))
//! out = r1 + ff(ln2(r1))
//! ```

use rand::Rng;
use tracing::trace;

use crate::nn::{
    AttentionContext, FeedForward, FeedForwardContext, LayerNorm, LayerNormContext, Module,
    MultiHeadAttention,
};
use crate::tensor::Tensor;

#[derive(Clone, Debug)]
pub struct TransformerBlock {
    ln1: LayerNorm,
    ln2: LayerNorm,
    attn: MultiHeadAttention,
    ff: FeedForward,
}

#[derive(Clone, Debug)]
pub struct BlockContext {
    ln1: LayerNormContext,
    attn: AttentionContext,
    ln2: LayerNormContext,
    ff: FeedForwardContext,
}

impl TransformerBlock {
    pub fn new<R: Rng>(
        dim: usize,
        hidden: usize,
        n_head: usize,
        init_scale: f32,
        rng: &mut R,
    ) -> Self {
        let attn = MultiHeadAttention::new(dim, n_head, init_scale, rng);
        let ff = FeedForward::new(dim, hidden, init_scale, rng);
        Self::from_parts(attn, ff)
    }

    /// Block around existing sublayers; both norms start at gamma = 1, beta = 0.
    #[must_use]
    pub fn from_parts(attn: MultiHeadAttention, ff: FeedForward) -> Self {
        let dim = attn.dim();
        TransformerBlock {
            ln1: LayerNorm::new(dim),
            ln2: LayerNorm::new(dim),
            attn,
            ff,
        }
    }

    #[must_use]
    pub fn forward(&self, x: &Tensor) -> (Tensor, BlockContext) {
        trace!(seq_len = x.rows(), dim = x.cols(), "block forward");
        let (norm1, ln1) = self.ln1.forward(x);
        let (attn_out, attn) = self.attn.forward(&norm1);
        let r1 = x.add(&attn_out);

        let (norm2, ln2) = self.ln2.forward(&r1);
        let (ff_out, ff) = self.ff.forward(&norm2);
        let out = r1.add(&ff_out);

        (out, BlockContext { ln1, attn, ln2, ff })
    }

    /// Each residual adds the incoming gradient unchanged next to the sublayer path.
    pub fn backward(&mut self, ctx: BlockContext, grad_out: &Tensor) -> Tensor {
        let g_norm2 = self.ff.backward(ctx.ff, grad_out);
        let mut g_r1 = self.ln2.backward(ctx.ln2, &g_norm2);
        g_r1.add_assign(grad_out);

        let g_norm1 = self.attn.backward(ctx.attn, &g_r1);
        let mut g_x = self.ln1.backward(ctx.ln1, &g_norm1);
        g_x.add_assign(&g_r1);
        g_x
    }
}

impl Module for TransformerBlock {
    /// `ln1, ln2, attn (q, k, v, o), ff (up, down)`.
    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.ln1.parameters();
        params.extend(self.ln2.parameters());
        params.extend(self.attn.parameters());
        params.extend(self.ff.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.ln1.parameters_mut();
        params.extend(self.ln2.parameters_mut());
        params.extend(self.attn.parameters_mut());
        params.extend(self.ff.parameters_mut());
        params
    }
}
