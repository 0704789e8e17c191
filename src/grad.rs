//! Gradient of the negative log-likelihood w.r.t. the raw activations.
//!
//! For each timestep and class the gradient is the softmax probability minus
//! the posterior occupancy of that class under the alignment distribution.
//! Alpha and beta are emission-inclusive, so one emission factor is divided
//! out of the alpha * beta product; the whole combination happens in
//! log-space and is exponentiated once per class.

use crate::util::log_add;
use ndarray::ArrayViewMut2;

/// Accumulates the gradient for one item into its `grad` column (T_max x A
/// view; rows at or beyond `time` are left untouched at zero).
#[allow(clippy::too_many_arguments)]
pub(crate) fn accumulate_grad(
    log_probs: &[f32],
    alpha: &[f32],
    beta: &[f32],
    ext: &[usize],
    class_acc: &mut [f32],
    time: usize,
    log_like: f32,
    grad: &mut ArrayViewMut2<'_, f32>,
) {
    let alphabet = grad.shape()[1];
    let s_len = ext.len();
    for t in 0..time {
        class_acc.fill(f32::NEG_INFINITY);
        let row = t * s_len;
        for s in 0..s_len {
            let c = ext[s];
            class_acc[c] = log_add(class_acc[c], alpha[row + s] + beta[row + s]);
        }
        let emit = &log_probs[t * alphabet..(t + 1) * alphabet];
        for c in 0..alphabet {
            let prob = emit[c].exp();
            let occupancy = if class_acc[c] == f32::NEG_INFINITY {
                0.0
            } else {
                (class_acc[c] - emit[c] - log_like).exp()
            };
            grad[[t, c]] = prob - occupancy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{backward, extend_labels, forward, log_likelihood, log_softmax_rows};
    use ndarray::Array2;

    #[test]
    fn test_single_frame_single_label_gradient() {
        // T=1, label [1]: the posterior puts all mass on the label, so the
        // gradient is softmax - one_hot(label).
        let alphabet = 3;
        let acts = Array2::from_shape_vec((1, 3), vec![0.2, -0.1, 0.4]).unwrap();
        let mut lp = vec![0.0; alphabet];
        log_softmax_rows(&acts.view(), 1, &mut lp);
        let mut ext = [0usize; 3];
        extend_labels(&[1], 0, &mut ext);
        let mut alpha = vec![0.0; 3];
        let mut beta = vec![0.0; 3];
        forward(&lp, &ext, 1, alphabet, &mut alpha);
        backward(&lp, &ext, 1, alphabet, &mut beta);
        let ll = log_likelihood(&alpha, 1, 3).unwrap();
        let mut grad = Array2::zeros((1, 3));
        let mut acc = vec![0.0; alphabet];
        accumulate_grad(
            &lp,
            &alpha,
            &beta,
            &ext,
            &mut acc,
            1,
            ll,
            &mut grad.view_mut(),
        );
        for c in 0..alphabet {
            let expected = lp[c].exp() - if c == 1 { 1.0 } else { 0.0 };
            assert!((grad[[0, c]] - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn test_gradient_rows_sum_to_zero() {
        // Softmax probabilities and occupancies both sum to one over classes,
        // so every valid gradient row sums to zero.
        let alphabet = 4;
        let time = 6;
        let acts = Array2::from_shape_fn((time, alphabet), |(t, c)| {
            ((t * alphabet + c) as f32 * 0.61).cos()
        });
        let mut lp = vec![0.0; time * alphabet];
        log_softmax_rows(&acts.view(), time, &mut lp);
        let labels = [1, 3, 1];
        let mut ext = [0usize; 7];
        extend_labels(&labels, 0, &mut ext);
        let s_len = ext.len();
        let mut alpha = vec![0.0; time * s_len];
        let mut beta = vec![0.0; time * s_len];
        forward(&lp, &ext, time, alphabet, &mut alpha);
        backward(&lp, &ext, time, alphabet, &mut beta);
        let ll = log_likelihood(&alpha, time, s_len).unwrap();
        let mut grad = Array2::zeros((time, alphabet));
        let mut acc = vec![0.0; alphabet];
        accumulate_grad(
            &lp,
            &alpha,
            &beta,
            &ext,
            &mut acc,
            time,
            ll,
            &mut grad.view_mut(),
        );
        for t in 0..time {
            let row_sum: f32 = (0..alphabet).map(|c| grad[[t, c]]).sum();
            assert!(row_sum.abs() < 1e-4, "row {} sums to {}", t, row_sum);
        }
    }
}
