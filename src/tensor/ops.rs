//! Numeric kernels over [`Tensor`]: dot product, transpose, matmul, row softmax.

use rayon::prelude::*;

use super::Tensor;

/// Accumulator width of [`dot`].
pub const LANES: usize = 8;

/// Dot product of two equal-length slices.
///
/// The body is accumulated in `LANES` independent partial sums so the compiler can
/// keep them in one vector register; the remainder is added with scalar code.
/// Results match a scalar loop up to float rounding order.
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "dot: length mismatch");
    let a_chunks = a.chunks_exact(LANES);
    let b_chunks = b.chunks_exact(LANES);
    let tail = a_chunks.remainder().iter().zip(b_chunks.remainder());

    let mut acc = [0.0f32; LANES];
    for (ca, cb) in a_chunks.zip(b_chunks) {
        for lane in 0..LANES {
            acc[lane] += ca[lane] * cb[lane];
        }
    }
    let mut sum: f32 = acc.iter().sum();
    for (x, y) in tail {
        sum += x * y;
    }
    sum
}

/// Returns `tᵀ`.
#[must_use]
pub fn transpose(t: &Tensor) -> Tensor {
    let mut out = Tensor::new(t.cols(), t.rows());
    for i in 0..t.rows() {
        for (j, &v) in t.row(i).iter().enumerate() {
            out.set(j, i, v);
        }
    }
    out
}

/// `a · b`. Panics unless `a.cols() == b.rows()`.
///
/// Entry `(i, j)` is the dot product of row `i` of `a` with row `j` of `bᵀ`.
/// Output rows are filled in parallel; each row is written by exactly one task.
#[must_use]
pub fn matmul(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(
        a.cols(),
        b.rows(),
        "matmul: inner dimensions differ ({}x{} · {}x{})",
        a.rows(),
        a.cols(),
        b.rows(),
        b.cols()
    );
    let mut out = Tensor::new(a.rows(), b.cols());
    if out.is_empty() {
        return out;
    }
    let bt = transpose(b);
    let width = b.cols();
    out.values_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(i, row)| {
            let a_row = a.row(i);
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = dot(a_row, bt.row(j));
            }
        });
    out
}

/// Row-wise softmax with the row maximum subtracted before exponentiating.
#[must_use]
pub fn softmax(t: &Tensor) -> Tensor {
    let mut out = Tensor::new(t.rows(), t.cols());
    for i in 0..t.rows() {
        let row = t.row(i);
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let dst = out.row_mut(i);
        let mut total = 0.0;
        for (d, &x) in dst.iter_mut().zip(row) {
            *d = (x - max).exp();
            total += *d;
        }
        for d in dst.iter_mut() {
            *d /= total;
        }
    }
    out
}

/// Gradient through a row softmax: `ds = p ⊙ (dp - rowsum(p ⊙ dp))`.
#[must_use]
pub fn softmax_backward(probs: &Tensor, grad_probs: &Tensor) -> Tensor {
    assert_eq!(
        probs.shape(),
        grad_probs.shape(),
        "softmax_backward: shape mismatch"
    );
    let mut out = Tensor::new(probs.rows(), probs.cols());
    for i in 0..probs.rows() {
        let p = probs.row(i);
        let dp = grad_probs.row(i);
        let inner = dot(p, dp);
        for ((d, &pi), &dpi) in out.row_mut(i).iter_mut().zip(p).zip(dp) {
            *d = pi * (dpi - inner);
        }
    }
    out
}
