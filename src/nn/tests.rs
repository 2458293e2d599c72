//! Layer tests: forward semantics and finite-difference checks of every backward pass.
//!
//! The gradient checks use the objective `L = Σ probe ⊙ f(x)` for a fixed random
//! probe, so the analytic side is simply `backward(probe)`.

use rand::{rngs::StdRng, SeedableRng};

use crate::nn::{
    Embedding, FeedForward, LayerNorm, Linear, Module, MultiHeadAttention, TransformerBlock,
};
use crate::tensor::Tensor;

const H: f32 = 5e-3;
const TOL: f32 = 2e-2;

fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

fn random(rows: usize, cols: usize, scale: f32, seed: u64) -> Tensor {
    let mut t = Tensor::new(rows, cols);
    t.randomize(scale, &mut rng(seed));
    t
}

/// Three positions with a clear spread in every column.
fn sample_input() -> Tensor {
    Tensor::from_vec(
        3,
        4,
        vec![
            0.9, -0.4, 0.3, -1.0, //
            -0.7, 0.8, -0.2, 0.5, //
            0.1, 0.2, 1.1, -0.3,
        ],
    )
}

fn weighted_sum(out: &Tensor, probe: &Tensor) -> f64 {
    assert_eq!(out.shape(), probe.shape());
    out.values()
        .iter()
        .zip(probe.values())
        .map(|(&o, &p)| f64::from(o) * f64::from(p))
        .sum()
}

fn central_difference(plus: f64, minus: f64, step: f32) -> f32 {
    ((plus - minus) / f64::from(step)) as f32
}

fn numeric_input_grad(x: &Tensor, probe: &Tensor, f: impl Fn(&Tensor) -> Tensor) -> Tensor {
    let mut grad = Tensor::new(x.rows(), x.cols());
    for k in 0..x.len() {
        let mut xp = x.clone();
        let mut xm = x.clone();
        xp.values_mut()[k] += H;
        xm.values_mut()[k] -= H;
        let step = xp.values()[k] - xm.values()[k];
        grad.values_mut()[k] = central_difference(
            weighted_sum(&f(&xp), probe),
            weighted_sum(&f(&xm), probe),
            step,
        );
    }
    grad
}

fn numeric_param_grads<M: Module + Clone>(
    layer: &M,
    probe: &Tensor,
    f: impl Fn(&M) -> Tensor,
) -> Vec<Vec<f32>> {
    let shapes: Vec<usize> = layer.parameters().iter().map(|p| p.len()).collect();
    shapes
        .iter()
        .enumerate()
        .map(|(p, &len)| {
            (0..len)
                .map(|k| {
                    let mut plus = layer.clone();
                    let mut minus = layer.clone();
                    plus.parameters_mut()[p].values_mut()[k] += H;
                    minus.parameters_mut()[p].values_mut()[k] -= H;
                    let step = plus.parameters()[p].values()[k] - minus.parameters()[p].values()[k];
                    central_difference(
                        weighted_sum(&f(&plus), probe),
                        weighted_sum(&f(&minus), probe),
                        step,
                    )
                })
                .collect()
        })
        .collect()
}

fn assert_grads_close(analytic: &[f32], numeric: &[f32], what: &str) {
    assert_eq!(analytic.len(), numeric.len(), "{what}: length");
    for (i, (&a, &n)) in analytic.iter().zip(numeric).enumerate() {
        assert!(
            (a - n).abs() <= TOL * (1.0 + n.abs()),
            "{what}[{i}]: analytic {a}, numeric {n}"
        );
    }
}

/// Compares the input gradient and every parameter gradient against central differences.
fn check_gradients<M, F, B>(layer: &M, x: &Tensor, forward: F, forward_backward: B)
where
    M: Module + Clone,
    F: Fn(&M, &Tensor) -> Tensor,
    B: FnOnce(&mut M, &Tensor, &Tensor) -> Tensor,
{
    let out = forward(layer, x);
    let probe = random(out.rows(), out.cols(), 1.0, 99);

    let mut trained = layer.clone();
    let grad_in = forward_backward(&mut trained, x, &probe);

    let numeric_in = numeric_input_grad(x, &probe, |xi| forward(layer, xi));
    assert_grads_close(grad_in.values(), numeric_in.values(), "input");

    let numeric_params = numeric_param_grads(layer, &probe, |m| forward(m, x));
    for (p, (param, numeric)) in trained.parameters().iter().zip(&numeric_params).enumerate() {
        assert_grads_close(param.grads(), numeric, &format!("parameter {p}"));
    }
}

/// Up-projection whose pre-activations stay far from the ReLU kink for unit-scale inputs.
fn biased_up(dim: usize, hidden: usize, seed: u64) -> Linear {
    let weight = random(dim, hidden, 0.05, seed);
    let bias: Vec<f32> = (0..hidden)
        .map(|j| if j % 2 == 0 { 2.0 } else { -2.0 })
        .collect();
    Linear::from_parts(weight, Tensor::from_vec(1, hidden, bias))
}

fn zero_linear(dim_in: usize, dim_out: usize) -> Linear {
    Linear::from_parts(Tensor::new(dim_in, dim_out), Tensor::new(1, dim_out))
}

// --- linear ---

#[test]
fn linear_forward_adds_bias_to_every_row() {
    let layer = Linear::from_parts(
        Tensor::identity(2),
        Tensor::from_vec(1, 2, vec![10.0, 20.0]),
    );
    let x = Tensor::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
    let (y, _) = layer.forward(&x);
    assert_eq!(y.values(), &[11.0, 22.0, 13.0, 24.0]);
}

#[test]
fn linear_gradients_match_finite_differences() {
    let layer = Linear::new(4, 3, 0.5, &mut rng(1));
    check_gradients(
        &layer,
        &sample_input(),
        |l, x| l.forward(x).0,
        |l, x, g| {
            let (_, ctx) = l.forward(x);
            l.backward(ctx, g)
        },
    );
}

#[test]
fn linear_gradients_accumulate_until_update() {
    let mut layer = Linear::new(4, 3, 0.5, &mut rng(2));
    let x = sample_input();
    let g = random(3, 3, 1.0, 3);

    let (_, ctx) = layer.forward(&x);
    layer.backward(ctx, &g);
    let once = layer.weight().grads().to_vec();
    let (_, ctx) = layer.forward(&x);
    layer.backward(ctx, &g);
    for (twice, once) in layer.weight().grads().iter().zip(&once) {
        assert!((twice - 2.0 * once).abs() < 1e-5);
    }

    let before = layer.weight().clone();
    layer.update(0.1);
    assert_ne!(layer.weight().values(), before.values());
    assert!(layer.parameters().iter().all(|p| p.grads().iter().all(|&v| v == 0.0)));
    assert_eq!(layer.num_params(), 4 * 3 + 3);
}

// --- layer norm ---

#[test]
fn layer_norm_standardizes_each_column() {
    let ln = LayerNorm::new(4);
    let (y, _) = ln.forward(&sample_input());
    for j in 0..4 {
        let col: Vec<f32> = (0..3).map(|i| y.get(i, j)).collect();
        let mean = col.iter().sum::<f32>() / 3.0;
        let var = col.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / 3.0;
        assert!(mean.abs() < 1e-5, "column {j} mean {mean}");
        assert!((var - 1.0).abs() < 1e-3, "column {j} variance {var}");
    }
}

#[test]
fn layer_norm_single_position_stays_finite() {
    let ln = LayerNorm::new(3);
    let x = Tensor::from_vec(1, 3, vec![5.0, -2.0, 0.5]);
    let (y, ctx) = ln.forward(&x);
    assert!(y.values().iter().all(|&v| v == 0.0));

    let mut ln = ln;
    let g = ln.backward(ctx, &Tensor::from_vec(1, 3, vec![1.0, 1.0, 1.0]));
    assert!(g.values().iter().all(|v| v.is_finite()));
}

#[test]
fn layer_norm_gradients_match_finite_differences() {
    let mut ln = LayerNorm::new(4);
    for (i, g) in ln.parameters_mut()[0].values_mut().iter_mut().enumerate() {
        *g = 0.5 + 0.25 * i as f32;
    }
    for (i, b) in ln.parameters_mut()[1].values_mut().iter_mut().enumerate() {
        *b = 0.1 * i as f32 - 0.2;
    }
    check_gradients(
        &ln,
        &sample_input(),
        |l, x| l.forward(x).0,
        |l, x, g| {
            let (_, ctx) = l.forward(x);
            l.backward(ctx, g)
        },
    );
}

// --- embedding ---

#[test]
fn embedding_forward_copies_table_rows() {
    let table = Tensor::from_vec(3, 2, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    let emb = Embedding::from_table(table);
    let (out, _) = emb.forward(&[2, 0, 2]);
    assert_eq!(out.values(), &[4.0, 5.0, 0.0, 1.0, 4.0, 5.0]);
}

#[test]
fn embedding_repeated_id_accumulates_gradient() {
    let mut single = Embedding::new(5, 3, 0.5, &mut rng(4));
    let mut repeated = single.clone();
    let row = Tensor::from_vec(1, 3, vec![0.5, -1.0, 2.0]);
    let rows = Tensor::from_vec(2, 3, vec![0.5, -1.0, 2.0, 0.5, -1.0, 2.0]);

    let (_, ctx) = single.forward(&[3]);
    single.backward(ctx, &row);
    let (_, ctx) = repeated.forward(&[3, 3]);
    repeated.backward(ctx, &rows);

    let table = repeated.table();
    for j in 0..3 {
        assert_eq!(table.grad(3, j), 2.0 * single.table().grad(3, j));
    }
    // Rows never looked up get no gradient.
    assert!((0..5)
        .filter(|&t| t != 3)
        .all(|t| (0..3).all(|j| table.grad(t, j) == 0.0)));
}

#[test]
#[should_panic(expected = "outside vocabulary")]
fn embedding_rejects_unknown_ids() {
    let emb = Embedding::new(4, 2, 0.5, &mut rng(5));
    let _ = emb.forward(&[1, 4]);
}

// --- attention ---

#[test]
fn attention_over_one_position_is_value_then_output_projection() {
    let attn = MultiHeadAttention::new(4, 2, 0.5, &mut rng(6));
    let x = Tensor::from_vec(1, 4, vec![0.3, -0.6, 0.9, 0.1]);
    let (y, ctx) = attn.forward(&x);
    let (v, _) = attn.v_proj().forward(&x);
    let (expected, _) = attn.o_proj().forward(&v);
    for (a, b) in y.values().iter().zip(expected.values()) {
        assert!((a - b).abs() < 1e-5);
    }
    assert_eq!(ctx.head_weights(0).values(), &[1.0]);
}

#[test]
fn attention_weights_are_row_distributions() {
    let attn = MultiHeadAttention::new(4, 2, 0.5, &mut rng(7));
    let (_, ctx) = attn.forward(&sample_input());
    for h in 0..2 {
        let w = ctx.head_weights(h);
        assert_eq!(w.shape(), (3, 3));
        for i in 0..3 {
            assert!((w.row(i).iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
    }
}

#[test]
fn attention_gradients_match_finite_differences() {
    let attn = MultiHeadAttention::new(4, 2, 0.5, &mut rng(8));
    check_gradients(
        &attn,
        &sample_input(),
        |a, x| a.forward(x).0,
        |a, x, g| {
            let (_, ctx) = a.forward(x);
            a.backward(ctx, g)
        },
    );
}

#[test]
#[should_panic(expected = "divisible")]
fn attention_rejects_indivisible_heads() {
    let _ = MultiHeadAttention::new(6, 4, 0.5, &mut rng(9));
}

// --- feed forward ---

#[test]
fn feed_forward_gradients_match_finite_differences() {
    let ff = FeedForward::from_layers(biased_up(4, 6, 10), Linear::new(6, 4, 0.5, &mut rng(11)));
    check_gradients(
        &ff,
        &sample_input(),
        |f, x| f.forward(x).0,
        |f, x, g| {
            let (_, ctx) = f.forward(x);
            f.backward(ctx, g)
        },
    );
}

#[test]
fn feed_forward_blocks_gradient_through_inactive_units() {
    let up = Linear::from_parts(Tensor::new(2, 2), Tensor::from_vec(1, 2, vec![1.0, -1.0]));
    let mut ff = FeedForward::from_layers(up, Linear::new(2, 2, 0.5, &mut rng(12)));
    let x = Tensor::from_vec(1, 2, vec![0.4, -0.2]);
    let (_, ctx) = ff.forward(&x);
    let _ = ff.backward(ctx, &Tensor::from_vec(1, 2, vec![1.0, 1.0]));
    // Unit 1 sits at -1 before the ReLU, so its bias sees no gradient.
    let up_bias_grad = ff.parameters()[1].grads();
    assert_ne!(up_bias_grad[0], 0.0);
    assert_eq!(up_bias_grad[1], 0.0);
}

// --- block ---

#[test]
fn block_with_silent_sublayers_is_identity_both_ways() {
    let mut r = rng(13);
    let attn = MultiHeadAttention::from_projections(
        2,
        Linear::new(4, 4, 0.5, &mut r),
        Linear::new(4, 4, 0.5, &mut r),
        Linear::new(4, 4, 0.5, &mut r),
        zero_linear(4, 4),
    );
    let ff = FeedForward::from_layers(Linear::new(4, 6, 0.5, &mut r), zero_linear(6, 4));
    let mut block = TransformerBlock::from_parts(attn, ff);

    let x = sample_input();
    let (y, ctx) = block.forward(&x);
    assert_eq!(y, x);

    let g = random(3, 4, 1.0, 14);
    let grad_in = block.backward(ctx, &g);
    assert_eq!(grad_in.values(), g.values());
}

#[test]
fn block_gradients_match_finite_differences() {
    let mut r = rng(15);
    let attn = MultiHeadAttention::new(4, 2, 0.5, &mut r);
    let ff = FeedForward::from_layers(biased_up(4, 6, 16), Linear::new(6, 4, 0.5, &mut r));
    let block = TransformerBlock::from_parts(attn, ff);
    check_gradients(
        &block,
        &sample_input(),
        |b, x| b.forward(x).0,
        |b, x, g| {
            let (_, ctx) = b.forward(x);
            b.backward(ctx, g)
        },
    );
}

#[test]
fn block_parameter_order_and_count() {
    let block = TransformerBlock::new(4, 6, 2, 0.5, &mut rng(17));
    let shapes: Vec<(usize, usize)> = block.parameters().iter().map(|p| p.shape()).collect();
    assert_eq!(shapes.len(), 16);
    assert_eq!(&shapes[..4], &[(1, 4); 4]);
    assert_eq!(shapes[4], (4, 4));
    assert_eq!(shapes[12], (4, 6));
    assert_eq!(shapes[15], (1, 4));
    // Norms, four square projections, then the MLP.
    assert_eq!(block.num_params(), 4 * 4 + 4 * (16 + 4) + (24 + 6) + (24 + 4));
}
