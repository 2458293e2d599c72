//! Cross-entropy against next-token targets.

use crate::tensor::Tensor;

/// Lower bound on the target probability before taking the log.
pub const PROB_FLOOR: f32 = 1e-9;

/// Mean cross-entropy of `probs` (one distribution per row) against `targets`,
/// plus the gradient at the logits, `probs - one_hot(target)`, row by row.
///
/// The gradient is not divided by the number of rows. Panics if `targets` does not
/// have one entry per row or a target lies outside `[0, probs.cols())`.
#[must_use]
pub fn cross_entropy(probs: &Tensor, targets: &[usize]) -> (f32, Tensor) {
    assert_eq!(
        targets.len(),
        probs.rows(),
        "cross_entropy: {} targets for {} positions",
        targets.len(),
        probs.rows()
    );
    let mut grad = probs.clone();
    grad.zero_grad();
    let mut loss = 0.0;
    for (i, &t) in targets.iter().enumerate() {
        assert!(
            t < probs.cols(),
            "cross_entropy: target {t} outside vocabulary of {}",
            probs.cols()
        );
        grad.row_mut(i)[t] -= 1.0;
        loss -= probs.get(i, t).max(PROB_FLOOR).ln();
    }
    (loss / probs.rows() as f32, grad)
}
