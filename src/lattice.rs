//! Forward-backward recursions over the CTC alignment lattice.
//!
//! The lattice for one item is the extended label sequence (blanks interleaved
//! between and around the labels, length S = 2L + 1) unrolled over T timesteps.
//! Alpha and beta are T x S tables in log-space; both include the emission
//! term at their own timestep, so the recursions are symmetric.

use crate::error::Error;
use crate::util::log_add;
use ndarray::ArrayView2;

/// Builds the extended label sequence into `ext` (length 2L + 1): blanks at
/// even positions, the item's labels at odd positions.
pub(crate) fn extend_labels(labels: &[i32], blank: usize, ext: &mut [usize]) {
    debug_assert_eq!(ext.len(), 2 * labels.len() + 1);
    ext.fill(blank);
    for (i, &label) in labels.iter().enumerate() {
        ext[2 * i + 1] = label as usize;
    }
}

/// Minimum number of timesteps that admits any valid alignment: one per label
/// plus one mandatory blank separator per adjacent equal pair.
pub(crate) fn min_input_length(labels: &[i32]) -> usize {
    let repeats = labels.windows(2).filter(|w| w[0] == w[1]).count();
    labels.len() + repeats
}

/// Writes the log-softmax of the first `time` activation rows into
/// `log_probs` (time x alphabet, row-major).
pub(crate) fn log_softmax_rows(
    activations: &ArrayView2<'_, f32>,
    time: usize,
    log_probs: &mut [f32],
) {
    let alphabet = activations.shape()[1];
    for t in 0..time {
        let row = &mut log_probs[t * alphabet..(t + 1) * alphabet];
        let mut max = f32::NEG_INFINITY;
        for c in 0..alphabet {
            max = max.max(activations[[t, c]]);
        }
        let mut sum = 0.0;
        for c in 0..alphabet {
            let shifted = activations[[t, c]] - max;
            row[c] = shifted;
            sum += shifted.exp();
        }
        let lse = sum.ln();
        for v in row.iter_mut() {
            *v -= lse;
        }
    }
}

/// Forward pass: alpha[t][s] = logsumexp over the allowed predecessors of s
/// at t-1, plus the emission log-probability of symbol(s) at t.
///
/// The skip transition (s-2 -> s) is allowed exactly when the two positions
/// hold distinct symbols; even (blank) positions always hold equal symbols,
/// so `ext[s] != ext[s - 2]` is the complete test.
pub(crate) fn forward(
    log_probs: &[f32],
    ext: &[usize],
    time: usize,
    alphabet: usize,
    alpha: &mut [f32],
) {
    let s_len = ext.len();
    alpha.fill(f32::NEG_INFINITY);

    alpha[0] = log_probs[ext[0]];
    if s_len > 1 {
        alpha[1] = log_probs[ext[1]];
    }
    for t in 1..time {
        let (prev_rows, cur_row) = alpha.split_at_mut(t * s_len);
        let prev = &prev_rows[(t - 1) * s_len..];
        let emit = &log_probs[t * alphabet..(t + 1) * alphabet];
        for s in 0..s_len {
            let mut acc = prev[s];
            if s >= 1 {
                acc = log_add(acc, prev[s - 1]);
            }
            if s >= 2 && ext[s] != ext[s - 2] {
                acc = log_add(acc, prev[s - 2]);
            }
            cur_row[s] = acc + emit[ext[s]];
        }
    }
}

/// Backward pass, symmetric to [`forward`]: beta[t][s] accumulates over the
/// allowed successors of s at t+1 and includes the emission at t.
pub(crate) fn backward(
    log_probs: &[f32],
    ext: &[usize],
    time: usize,
    alphabet: usize,
    beta: &mut [f32],
) {
    let s_len = ext.len();
    beta.fill(f32::NEG_INFINITY);

    let last = (time - 1) * s_len;
    let last_emit = &log_probs[(time - 1) * alphabet..time * alphabet];
    beta[last + s_len - 1] = last_emit[ext[s_len - 1]];
    if s_len > 1 {
        beta[last + s_len - 2] = last_emit[ext[s_len - 2]];
    }
    for t in (0..time - 1).rev() {
        let (head, next_rows) = beta.split_at_mut((t + 1) * s_len);
        let cur_row = &mut head[t * s_len..];
        let next = &next_rows[..s_len];
        let emit = &log_probs[t * alphabet..(t + 1) * alphabet];
        for s in 0..s_len {
            let mut acc = next[s];
            if s + 1 < s_len {
                acc = log_add(acc, next[s + 1]);
            }
            if s + 2 < s_len && ext[s] != ext[s + 2] {
                acc = log_add(acc, next[s + 2]);
            }
            cur_row[s] = acc + emit[ext[s]];
        }
    }
}

/// Total log-likelihood of the target: mass of the two extended positions a
/// valid alignment may end in.
pub(crate) fn log_likelihood(alpha: &[f32], time: usize, s_len: usize) -> Result<f32, Error> {
    let last = (time - 1) * s_len;
    let mut ll = alpha[last + s_len - 1];
    if s_len > 1 {
        ll = log_add(ll, alpha[last + s_len - 2]);
    }
    if ll.is_nan() {
        return Err(Error::InternalLogicError(
            "forward pass produced NaN log-likelihood".to_string(),
        ));
    }
    Ok(ll)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_extend_labels_interleaves_blanks() {
        let mut ext = [0usize; 7];
        extend_labels(&[1, 2, 1], 0, &mut ext);
        assert_eq!(ext, [0, 1, 0, 2, 0, 1, 0]);
    }

    #[test]
    fn test_extend_labels_empty_target() {
        let mut ext = [9usize; 1];
        extend_labels(&[], 3, &mut ext);
        assert_eq!(ext, [3]);
    }

    #[test]
    fn test_min_input_length_counts_repeats() {
        assert_eq!(min_input_length(&[]), 0);
        assert_eq!(min_input_length(&[1, 2, 3]), 3);
        assert_eq!(min_input_length(&[1, 1]), 3);
        assert_eq!(min_input_length(&[2, 2, 2]), 5);
    }

    #[test]
    fn test_log_softmax_rows_normalizes() {
        let acts = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0]).unwrap();
        let mut lp = vec![0.0; 6];
        log_softmax_rows(&acts.view(), 2, &mut lp);
        for t in 0..2 {
            let total: f32 = lp[t * 3..(t + 1) * 3].iter().map(|x| x.exp()).sum();
            assert!((total - 1.0).abs() < 1e-5);
        }
        // Uniform row normalizes to log(1/3).
        assert!((lp[3] - (1.0f32 / 3.0).ln()).abs() < 1e-6);
    }

    #[test]
    fn test_log_softmax_rows_peaked_inputs_stay_finite() {
        let acts = Array2::from_shape_vec((1, 3), vec![1000.0, -1000.0, 0.0]).unwrap();
        let mut lp = vec![0.0; 3];
        log_softmax_rows(&acts.view(), 1, &mut lp);
        assert!((lp[0] - 0.0).abs() < 1e-4);
        assert!(lp.iter().all(|x| !x.is_nan()));
    }

    #[test]
    fn test_forward_alpha_rows_sum_to_prefix_mass() {
        // T=2, A=3, uniform probabilities, label [1]. The total likelihood is
        // 3 * (1/3)^2 per the three valid paths.
        let alphabet = 3;
        let lp = vec![(1.0f32 / 3.0).ln(); 2 * alphabet];
        let ext = [0usize, 1, 0];
        let mut alpha = vec![0.0; 2 * 3];
        forward(&lp, &ext, 2, alphabet, &mut alpha);
        let ll = log_likelihood(&alpha, 2, 3).unwrap();
        assert!((ll - (1.0f32 / 3.0).ln()).abs() < 1e-5);
    }

    #[test]
    fn test_backward_agrees_with_forward_on_total_mass() {
        // For emission-inclusive alpha/beta, summing exp(alpha + beta - emit)
        // over s at any fixed t reproduces the total likelihood.
        let alphabet = 4;
        let time = 5;
        let acts = Array2::from_shape_fn((time, alphabet), |(t, c)| {
            ((t * alphabet + c) as f32 * 0.37).sin()
        });
        let mut lp = vec![0.0; time * alphabet];
        log_softmax_rows(&acts.view(), time, &mut lp);
        let ext = [0usize, 2, 0, 1, 0];
        let s_len = ext.len();
        let mut alpha = vec![0.0; time * s_len];
        let mut beta = vec![0.0; time * s_len];
        forward(&lp, &ext, time, alphabet, &mut alpha);
        backward(&lp, &ext, time, alphabet, &mut beta);
        let ll = log_likelihood(&alpha, time, s_len).unwrap();
        for t in 0..time {
            let mut total = f32::NEG_INFINITY;
            for s in 0..s_len {
                let emit = lp[t * alphabet + ext[s]];
                total = log_add(total, alpha[t * s_len + s] + beta[t * s_len + s] - emit);
            }
            assert!((total - ll).abs() < 1e-4, "t={}: {} vs {}", t, total, ll);
        }
    }
}
