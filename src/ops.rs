//! Public entry points for the CTC loss.

use crate::batch::{run_batch, validate};
use crate::error::{Error, Reduction};
use ndarray::{Array1, ArrayD, ArrayViewD, Axis, Ix3};

/// Which outcome an infeasible alignment (input too short for the target,
/// counting mandatory blank separators between equal adjacent labels) has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InfeasiblePolicy {
    /// The affected item gets `+inf` loss and a zero gradient; every other
    /// item in the batch completes normally.
    #[default]
    Isolate,
    /// The whole call fails with [`Error::AlignmentInfeasible`] before any
    /// item is computed.
    FailBatch,
}

/// Per-call options, mirroring the knobs of the underlying algorithm.
#[derive(Debug, Clone)]
pub struct CtcOptions {
    /// Index of the CTC blank label. Default: 0.
    pub blank: usize,
    /// Threads for the per-item fan-out. `None` (default) uses the global
    /// rayon pool; `Some(n)` builds a dedicated pool of `n` threads.
    pub num_threads: Option<usize>,
    /// Handling of items with no valid alignment. Default: [`InfeasiblePolicy::Isolate`].
    pub infeasible: InfeasiblePolicy,
}

impl Default for CtcOptions {
    fn default() -> Self {
        Self {
            blank: 0,
            num_threads: None,
            infeasible: InfeasiblePolicy::Isolate,
        }
    }
}

/// The Connectionist Temporal Classification loss (forward and backward).
///
/// # Arguments
/// * `activations` - Unnormalized per-class scores with shape `(T, N, A)`,
///   or `(T, A)` for a single item, in standard row-major layout. `T` is the
///   maximum number of frames, `N` the minibatch size, and `A` the alphabet
///   size including the blank. Log-softmax is applied internally.
/// * `labels` - Reference labels for all items, concatenated.
/// * `input_lengths` - Valid frame count per item (`N` entries).
/// * `label_lengths` - Label count per item (`N` entries).
/// * `options` - Blank index, thread count, infeasibility policy.
///
/// # Returns
/// Per-item negative log-likelihoods (shape `(N,)`) and the gradient of each
/// item's loss with respect to `activations` (same shape as `activations`;
/// rows at or beyond an item's input length stay zero).
///
/// All preconditions are checked before any workspace is allocated; the
/// first violated constraint fails the call with a descriptive error.
pub fn ctc_loss(
    activations: ArrayViewD<'_, f32>,
    labels: &[i32],
    input_lengths: &[i32],
    label_lengths: &[i32],
    options: &CtcOptions,
) -> Result<(Array1<f32>, ArrayD<f32>), Error> {
    let spec = validate(
        &activations,
        labels,
        input_lengths,
        label_lengths,
        options.blank,
    )?;

    let out_dim = activations.raw_dim();
    let single_item = activations.ndim() == 2;
    let acts = if single_item {
        activations.insert_axis(Axis(1))
    } else {
        activations
    };
    let acts = acts
        .into_dimensionality::<Ix3>()
        .map_err(|e| Error::ShapeError(e.to_string()))?;

    let mut grads = ArrayD::<f32>::zeros(out_dim);
    let losses = {
        let view = grads.view_mut();
        let view = if single_item {
            view.insert_axis(Axis(1))
        } else {
            view
        };
        let mut view = view
            .into_dimensionality::<Ix3>()
            .map_err(|e| Error::ShapeError(e.to_string()))?;
        run_batch(&acts, labels, &spec, options, &mut view)?
    };

    Ok((losses, grads))
}

/// Convenience wrapper carrying frame averaging and minibatch reduction,
/// applied consistently to both the costs and the gradients.
#[derive(Debug, Clone)]
pub struct CtcLoss {
    /// Divide each item's cost (and gradient) by its frame count.
    pub average_frames: bool,
    /// Reduction over the minibatch costs. `Sum` and `Mean` return a single
    /// element; `Mean` also scales the gradients by `1/N`.
    pub reduction: Reduction,
    pub options: CtcOptions,
}

impl Default for CtcLoss {
    fn default() -> Self {
        Self {
            average_frames: false,
            reduction: Reduction::Sum,
            options: CtcOptions::default(),
        }
    }
}

impl CtcLoss {
    pub fn new(average_frames: bool, reduction: Reduction, blank: usize) -> Self {
        Self {
            average_frames,
            reduction,
            options: CtcOptions {
                blank,
                ..CtcOptions::default()
            },
        }
    }

    /// Computes the loss and gradient, then applies `average_frames` and the
    /// configured reduction.
    pub fn forward(
        &self,
        activations: ArrayViewD<'_, f32>,
        labels: &[i32],
        input_lengths: &[i32],
        label_lengths: &[i32],
    ) -> Result<(Array1<f32>, ArrayD<f32>), Error> {
        let (mut losses, mut grads) =
            ctc_loss(activations, labels, input_lengths, label_lengths, &self.options)?;

        if self.average_frames {
            for item in 0..losses.len() {
                let frames = input_lengths[item] as f32;
                if frames > 0.0 {
                    losses[item] /= frames;
                    scale_item_grad(&mut grads, item, 1.0 / frames);
                }
            }
        }

        match self.reduction {
            Reduction::None => {}
            Reduction::Sum => {
                losses = Array1::from_vec(vec![losses.sum()]);
            }
            Reduction::Mean => {
                let n = losses.len().max(1) as f32;
                grads.mapv_inplace(|g| g / n);
                losses = Array1::from_vec(vec![losses.sum() / n]);
            }
        }
        Ok((losses, grads))
    }
}

fn scale_item_grad(grads: &mut ArrayD<f32>, item: usize, factor: f32) {
    if grads.ndim() == 3 {
        grads
            .index_axis_mut(Axis(1), item)
            .mapv_inplace(|g| g * factor);
    } else {
        grads.mapv_inplace(|g| g * factor);
    }
}
