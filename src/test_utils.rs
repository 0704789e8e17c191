//! Finite-difference checking of the CTC gradient.

use crate::error::Error;
use crate::ops::{ctc_loss, CtcOptions};
use ndarray::ArrayD;

/// Checks the analytic CTC gradient against a central finite difference of
/// the summed batch loss.
///
/// Perturbing one activation only affects its own item's loss, so the
/// gradient of the sum equals the per-item gradient tensor returned by
/// [`ctc_loss`].
///
/// # Arguments
/// * `activations`: raw activations, rank 2 or 3, standard layout.
/// * `epsilon`: perturbation size (e.g. 1e-2 for f32).
/// * `tolerance`: maximum allowed difference; an element passes if either the
///   absolute or the relative difference is within it.
///
/// # Returns
/// * `Ok(())` if every element matches within the tolerance.
/// * `Err(Error::GradientCheckError)` with the worst offender otherwise.
pub fn check_ctc_gradient(
    activations: &ArrayD<f32>,
    labels: &[i32],
    input_lengths: &[i32],
    label_lengths: &[i32],
    options: &CtcOptions,
    epsilon: f32,
    tolerance: f32,
) -> Result<(), Error> {
    let (losses, grads) = ctc_loss(
        activations.view(),
        labels,
        input_lengths,
        label_lengths,
        options,
    )?;
    if losses.iter().any(|l| !l.is_finite()) {
        return Err(Error::InvalidOperation(
            "gradient check requires every item's loss to be finite".to_string(),
        ));
    }
    let analytic = grads.as_slice().ok_or_else(|| {
        Error::InternalLogicError("gradient tensor is not contiguous".to_string())
    })?;

    let mut perturbed = activations.clone();
    let len = perturbed.len();
    let mut worst_abs = 0.0f32;
    let mut worst_rel = 0.0f32;
    let mut worst_idx = 0usize;
    let mut failed = false;

    for idx in 0..len {
        let original = {
            let slice = perturbed.as_slice_mut().ok_or_else(|| {
                Error::InternalLogicError("activations are not contiguous".to_string())
            })?;
            let original = slice[idx];
            slice[idx] = original + epsilon;
            original
        };
        let (plus, _) = ctc_loss(
            perturbed.view(),
            labels,
            input_lengths,
            label_lengths,
            options,
        )?;
        if let Some(slice) = perturbed.as_slice_mut() {
            slice[idx] = original - epsilon;
        }
        let (minus, _) = ctc_loss(
            perturbed.view(),
            labels,
            input_lengths,
            label_lengths,
            options,
        )?;
        if let Some(slice) = perturbed.as_slice_mut() {
            slice[idx] = original;
        }

        let numeric = (plus.sum() - minus.sum()) / (2.0 * epsilon);
        let abs_err = (analytic[idx] - numeric).abs();
        let rel_err = abs_err / analytic[idx].abs().max(numeric.abs()).max(1e-8);
        if abs_err > tolerance && rel_err > tolerance {
            failed = true;
            if abs_err > worst_abs {
                worst_abs = abs_err;
                worst_rel = rel_err;
                worst_idx = idx;
            }
        }
    }

    if failed {
        return Err(Error::GradientCheckError {
            max_rel_error: worst_rel,
            max_abs_error: worst_abs,
            at_index: worst_idx,
        });
    }
    Ok(())
}
