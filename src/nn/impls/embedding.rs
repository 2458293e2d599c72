//! Token id → vector lookup table.

use rand::Rng;

use crate::nn::Module;
use crate::tensor::Tensor;

/// `vocab_size x dim` table; row `t` is the vector for token id `t`.
#[derive(Clone, Debug)]
pub struct Embedding {
    table: Tensor,
}

/// Ids seen by an [`Embedding::forward`] call.
#[derive(Clone, Debug)]
pub struct EmbeddingContext {
    ids: Vec<usize>,
}

impl Embedding {
    pub fn new<R: Rng>(vocab_size: usize, dim: usize, init_scale: f32, rng: &mut R) -> Self {
        let mut table = Tensor::new(vocab_size, dim);
        table.randomize(init_scale, rng);
        Embedding { table }
    }

    #[must_use]
    pub fn from_table(table: Tensor) -> Self {
        Embedding { table }
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.table.rows()
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.table.cols()
    }

    #[must_use]
    pub fn table(&self) -> &Tensor {
        &self.table
    }

    /// One output row per id. Panics on ids outside `[0, vocab_size)`.
    #[must_use]
    pub fn forward(&self, ids: &[usize]) -> (Tensor, EmbeddingContext) {
        let mut out = Tensor::new(ids.len(), self.dim());
        for (i, &id) in ids.iter().enumerate() {
            assert!(
                id < self.vocab_size(),
                "embedding: token id {id} outside vocabulary of {}",
                self.vocab_size()
            );
            out.row_mut(i).copy_from_slice(self.table.row(id));
        }
        (out, EmbeddingContext { ids: ids.to_vec() })
    }

    /// Adds row `i` of `grad_out` into the gradient row of `ids[i]`.
    ///
    /// Repeated ids accumulate. The input ids are discrete, so nothing is returned.
    pub fn backward(&mut self, ctx: EmbeddingContext, grad_out: &Tensor) {
        assert_eq!(
            grad_out.shape(),
            (ctx.ids.len(), self.dim()),
            "embedding backward: gradient shape does not match forward output"
        );
        for (i, &id) in ctx.ids.iter().enumerate() {
            for (g, go) in self.table.grad_row_mut(id).iter_mut().zip(grad_out.row(i)) {
                *g += go;
            }
        }
    }
}

impl Module for Embedding {
    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.table]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.table]
    }
}
