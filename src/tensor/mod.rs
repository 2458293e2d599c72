//! Dense 2D tensors with a paired gradient buffer.
//!
//! A [`Tensor`] stores `rows * cols` values in row-major order together with an
//! equally sized gradient buffer. Activations are created fresh on every forward
//! call; parameter tensors live inside their layer and are stepped in place.
//!
//! Free functions for the numeric kernels ([`dot`], [`matmul`], [`transpose`],
//! [`softmax`]) live in the `ops` submodule; the binary record format lives in `io`.

mod io;
mod ops;

pub use ops::{dot, matmul, softmax, softmax_backward, transpose, LANES};

use rand::Rng;

/// Row-major `rows x cols` buffer of `f32` values with a gradient of the same shape.
///
/// The shape is fixed at construction. The only operation that replaces it is
/// [`Tensor::load`], which swaps in both buffers at once.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    rows: usize,
    cols: usize,
    values: Vec<f32>,
    grads: Vec<f32>,
}

impl Tensor {
    /// Creates a zero-filled tensor with zero gradients.
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        let len = rows
            .checked_mul(cols)
            .expect("tensor shape overflows usize");
        Tensor {
            rows,
            cols,
            values: vec![0.0; len],
            grads: vec![0.0; len],
        }
    }

    /// Wraps existing row-major values. Panics if `values.len() != rows * cols`.
    #[must_use]
    pub fn from_vec(rows: usize, cols: usize, values: Vec<f32>) -> Self {
        assert_eq!(
            values.len(),
            rows * cols,
            "from_vec: {} values do not fill a {rows}x{cols} tensor",
            values.len()
        );
        let grads = vec![0.0; values.len()];
        Tensor {
            rows,
            cols,
            values,
            grads,
        }
    }

    /// Identity matrix of size `n x n`.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        let mut t = Tensor::new(n, n);
        for i in 0..n {
            t.set(i, i, 1.0);
        }
        t
    }

    /// Fills the values with independent uniform noise in `[-scale, scale]`.
    ///
    /// Only meant for fresh parameter tensors. The generator is passed in so
    /// initialization is reproducible from a seed.
    pub fn randomize<R: Rng>(&mut self, scale: f32, rng: &mut R) {
        assert!(
            scale.is_finite() && scale >= 0.0,
            "randomize: scale must be finite and non-negative, got {scale}"
        );
        for v in &mut self.values {
            *v = rng.random_range(-scale..=scale);
        }
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of elements (`rows * cols`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Mutable view of the values. The slice cannot change the tensor's length.
    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    #[must_use]
    pub fn grads(&self) -> &[f32] {
        &self.grads
    }

    pub fn grads_mut(&mut self) -> &mut [f32] {
        &mut self.grads
    }

    fn index(&self, i: usize, j: usize) -> usize {
        assert!(
            i < self.rows && j < self.cols,
            "tensor index ({i}, {j}) out of range for {}x{}",
            self.rows,
            self.cols
        );
        i * self.cols + j
    }

    /// Value at `(i, j)`. Panics when out of range.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.values[self.index(i, j)]
    }

    /// Sets the value at `(i, j)`. Panics when out of range.
    pub fn set(&mut self, i: usize, j: usize, value: f32) {
        let idx = self.index(i, j);
        self.values[idx] = value;
    }

    /// Gradient at `(i, j)`. Panics when out of range.
    #[must_use]
    pub fn grad(&self, i: usize, j: usize) -> f32 {
        self.grads[self.index(i, j)]
    }

    /// Values of row `i`.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f32] {
        assert!(i < self.rows, "row {i} out of range for {} rows", self.rows);
        &self.values[i * self.cols..(i + 1) * self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        assert!(i < self.rows, "row {i} out of range for {} rows", self.rows);
        &mut self.values[i * self.cols..(i + 1) * self.cols]
    }

    /// Gradient slice of row `i`.
    pub fn grad_row_mut(&mut self, i: usize) -> &mut [f32] {
        assert!(i < self.rows, "row {i} out of range for {} rows", self.rows);
        &mut self.grads[i * self.cols..(i + 1) * self.cols]
    }

    /// Adds `delta` element-wise into the gradient buffer.
    pub fn accumulate_grad(&mut self, delta: &[f32]) {
        assert_eq!(
            delta.len(),
            self.grads.len(),
            "accumulate_grad: length mismatch"
        );
        for (g, d) in self.grads.iter_mut().zip(delta) {
            *g += d;
        }
    }

    pub fn zero_grad(&mut self) {
        self.grads.fill(0.0);
    }

    /// Plain gradient descent: `v -= lr * g`, then the gradient is reset to zero.
    pub fn sgd_step(&mut self, learning_rate: f32) {
        for (v, g) in self.values.iter_mut().zip(self.grads.iter_mut()) {
            *v -= learning_rate * *g;
            *g = 0.0;
        }
    }

    /// Element-wise `self += other` on the values.
    pub fn add_assign(&mut self, other: &Tensor) {
        assert_eq!(
            self.shape(),
            other.shape(),
            "add_assign: shape mismatch"
        );
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += b;
        }
    }

    /// Element-wise sum of two equally shaped tensors.
    #[must_use]
    pub fn add(&self, other: &Tensor) -> Tensor {
        let mut out = self.clone();
        out.grads.fill(0.0);
        out.add_assign(other);
        out
    }

    /// Multiplies every value by `factor`.
    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.values {
            *v *= factor;
        }
    }

    /// Copies columns `[start, start + width)` into a new `rows x width` tensor.
    #[must_use]
    pub fn slice_cols(&self, start: usize, width: usize) -> Tensor {
        assert!(
            start + width <= self.cols,
            "slice_cols: [{start}, {}) exceeds {} columns",
            start + width,
            self.cols
        );
        let mut out = Tensor::new(self.rows, width);
        for i in 0..self.rows {
            out.row_mut(i)
                .copy_from_slice(&self.row(i)[start..start + width]);
        }
        out
    }

    /// Writes `src` into columns `[start, start + src.cols())`.
    pub fn set_cols(&mut self, start: usize, src: &Tensor) {
        assert_eq!(self.rows, src.rows, "set_cols: row count mismatch");
        assert!(
            start + src.cols <= self.cols,
            "set_cols: [{start}, {}) exceeds {} columns",
            start + src.cols,
            self.cols
        );
        for i in 0..self.rows {
            let width = src.cols;
            self.row_mut(i)[start..start + width].copy_from_slice(src.row(i));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn naive_matmul(a: &Tensor, b: &Tensor) -> Tensor {
        let mut out = Tensor::new(a.rows(), b.cols());
        for i in 0..a.rows() {
            for j in 0..b.cols() {
                let mut s = 0.0;
                for k in 0..a.cols() {
                    s += a.get(i, k) * b.get(k, j);
                }
                out.set(i, j, s);
            }
        }
        out
    }

    #[test]
    fn new_tensor_is_zeroed_with_matching_grad() {
        let t = Tensor::new(3, 4);
        assert_eq!(t.shape(), (3, 4));
        assert_eq!(t.values().len(), 12);
        assert_eq!(t.grads().len(), t.values().len());
        assert!(t.values().iter().all(|&v| v == 0.0));
        assert!(t.grads().iter().all(|&g| g == 0.0));
    }

    #[test]
    fn randomize_stays_within_scale_and_is_seeded() {
        let mut a = Tensor::new(8, 8);
        let mut b = Tensor::new(8, 8);
        a.randomize(0.02, &mut StdRng::seed_from_u64(3));
        b.randomize(0.02, &mut StdRng::seed_from_u64(3));
        assert_eq!(a.values(), b.values());
        assert!(a.values().iter().all(|v| v.abs() <= 0.02));
        assert!(a.values().iter().any(|&v| v != 0.0));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn get_out_of_range_panics() {
        let t = Tensor::new(2, 2);
        let _ = t.get(2, 0);
    }

    #[test]
    fn matmul_shape_is_rows_by_cols() {
        let a = Tensor::new(3, 5);
        let b = Tensor::new(5, 2);
        assert_eq!(matmul(&a, &b).shape(), (3, 2));
    }

    #[test]
    fn matmul_identity_returns_other_operand() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut b = Tensor::new(4, 6);
        b.randomize(1.0, &mut rng);
        let out = matmul(&Tensor::identity(4), &b);
        assert_eq!(out.values(), b.values());
    }

    #[test]
    fn matmul_matches_scalar_reference() {
        let mut rng = StdRng::seed_from_u64(5);
        // 19 exercises both the 8-wide body and the scalar tail.
        let mut a = Tensor::new(7, 19);
        let mut b = Tensor::new(19, 5);
        a.randomize(1.0, &mut rng);
        b.randomize(1.0, &mut rng);
        let fast = matmul(&a, &b);
        let slow = naive_matmul(&a, &b);
        for (x, y) in fast.values().iter().zip(slow.values()) {
            assert!((x - y).abs() < 1e-5, "{x} vs {y}");
        }
    }

    #[test]
    #[should_panic(expected = "inner dimensions")]
    fn matmul_rejects_mismatched_inner_dimension() {
        let _ = matmul(&Tensor::new(2, 3), &Tensor::new(4, 2));
    }

    #[test]
    fn dot_agrees_with_scalar_sum_for_all_tail_lengths() {
        for n in 0..=20 {
            let a: Vec<f32> = (0..n).map(|i| i as f32 * 0.5 - 2.0).collect();
            let b: Vec<f32> = (0..n).map(|i| 1.0 - i as f32 * 0.25).collect();
            let expected: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
            assert!((dot(&a, &b) - expected).abs() < 1e-4, "n = {n}");
        }
    }

    #[test]
    fn transpose_swaps_indices() {
        let t = Tensor::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let tt = transpose(&t);
        assert_eq!(tt.shape(), (3, 2));
        assert_eq!(tt.get(2, 1), 6.0);
        assert_eq!(tt.get(0, 1), 4.0);
    }

    #[test]
    fn softmax_rows_sum_to_one_and_survive_large_logits() {
        let t = Tensor::from_vec(2, 3, vec![1000.0, 1001.0, 1002.0, 0.0, 0.0, 0.0]);
        let p = softmax(&t);
        for i in 0..2 {
            let s: f32 = p.row(i).iter().sum();
            assert!((s - 1.0).abs() < 1e-6);
            assert!(p.row(i).iter().all(|v| v.is_finite()));
        }
        assert!((p.get(1, 0) - 1.0 / 3.0).abs() < 1e-6);
        assert!(p.get(0, 2) > p.get(0, 1));
    }

    #[test]
    fn sgd_step_moves_against_gradient_and_resets_it() {
        let mut t = Tensor::from_vec(1, 2, vec![1.0, -1.0]);
        t.accumulate_grad(&[0.5, -2.0]);
        t.sgd_step(0.1);
        assert!((t.get(0, 0) - 0.95).abs() < 1e-7);
        assert!((t.get(0, 1) + 0.8).abs() < 1e-7);
        assert!(t.grads().iter().all(|&g| g == 0.0));
    }

    #[test]
    fn slice_and_set_cols_round_trip_a_column_block() {
        let t = Tensor::from_vec(2, 4, (0..8).map(|v| v as f32).collect());
        let s = t.slice_cols(1, 2);
        assert_eq!(s.values(), &[1.0, 2.0, 5.0, 6.0]);
        let mut z = Tensor::new(2, 4);
        z.set_cols(1, &s);
        assert_eq!(z.values(), &[0.0, 1.0, 2.0, 0.0, 0.0, 5.0, 6.0, 0.0]);
    }
}
