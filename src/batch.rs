//! Batch driver: validates the whole call up front, then fans the independent
//! per-item forward-backward computations out across a thread pool.

use crate::debug_println;
use crate::error::Error;
use crate::grad::accumulate_grad;
use crate::lattice::{
    backward, extend_labels, forward, log_likelihood, log_softmax_rows, min_input_length,
};
use crate::ops::{CtcOptions, InfeasiblePolicy};
use crate::workspace::{ItemScratch, Workspace, WorkspacePlan};
use ndarray::{Array1, ArrayView2, ArrayView3, ArrayViewD, ArrayViewMut2, ArrayViewMut3, Axis};
use rayon::prelude::*;

/// Validated per-call metadata derived from the raw arguments.
pub(crate) struct BatchSpec {
    pub input_lengths: Vec<usize>,
    pub label_lengths: Vec<usize>,
    /// Offset of each item's first label in the flattened label sequence.
    pub label_offsets: Vec<usize>,
    pub alphabet_size: usize,
    pub max_time: usize,
}

/// Checks every call precondition before any workspace is sized or any item
/// is computed. The first violated constraint fails the whole call.
pub(crate) fn validate(
    activations: &ArrayViewD<'_, f32>,
    labels: &[i32],
    input_lengths: &[i32],
    label_lengths: &[i32],
    blank: usize,
) -> Result<BatchSpec, Error> {
    let rank = activations.ndim();
    if rank != 2 && rank != 3 {
        return Err(Error::InvalidRank {
            arg: "activations",
            rank,
        });
    }
    if !activations.is_standard_layout() {
        return Err(Error::NonContiguous { arg: "activations" });
    }
    if input_lengths.len() != label_lengths.len() {
        return Err(Error::LengthMismatch {
            arg_a: "input_lengths",
            arg_b: "label_lengths",
            len_a: input_lengths.len(),
            len_b: label_lengths.len(),
        });
    }

    let batch = input_lengths.len();
    let shape = activations.shape();
    let (max_time, alphabet_size, acts_batch) = if rank == 2 {
        (shape[0], shape[1], 1)
    } else {
        (shape[0], shape[2], shape[1])
    };
    if acts_batch != batch {
        return Err(Error::LengthMismatch {
            arg_a: "activations (batch dimension)",
            arg_b: "input_lengths",
            len_a: acts_batch,
            len_b: batch,
        });
    }
    if blank >= alphabet_size {
        return Err(Error::InvalidBlank {
            blank,
            alphabet_size,
        });
    }

    let mut in_lens = Vec::with_capacity(batch);
    let mut lab_lens = Vec::with_capacity(batch);
    let mut offsets = Vec::with_capacity(batch);
    let mut total_labels = 0usize;
    for item in 0..batch {
        let t = input_lengths[item];
        if t < 0 {
            return Err(Error::NegativeLength {
                arg: "input_lengths",
                item,
                value: t,
            });
        }
        let l = label_lengths[item];
        if l < 0 {
            return Err(Error::NegativeLength {
                arg: "label_lengths",
                item,
                value: l,
            });
        }
        let t = t as usize;
        if t > max_time {
            return Err(Error::InputLengthTooLarge {
                item,
                input_length: t,
                max_time,
            });
        }
        in_lens.push(t);
        lab_lens.push(l as usize);
        offsets.push(total_labels);
        total_labels += l as usize;
    }
    if total_labels != labels.len() {
        return Err(Error::LengthMismatch {
            arg_a: "labels",
            arg_b: "label_lengths (total)",
            len_a: labels.len(),
            len_b: total_labels,
        });
    }
    for item in 0..batch {
        let slice = &labels[offsets[item]..offsets[item] + lab_lens[item]];
        for &label in slice {
            if label < 0 || label as usize >= alphabet_size || label as usize == blank {
                return Err(Error::InvalidLabel {
                    item,
                    label,
                    alphabet_size,
                    blank,
                });
            }
        }
    }

    Ok(BatchSpec {
        input_lengths: in_lens,
        label_lengths: lab_lens,
        label_offsets: offsets,
        alphabet_size,
        max_time,
    })
}

/// One item's complete computation: feasibility, log-softmax, alpha/beta,
/// loss, gradient. This is the unit of work an execution context maps over
/// the batch; it owns its workspace partition and gradient column exclusively.
#[allow(clippy::too_many_arguments)]
fn compute_item(
    item: usize,
    activations: &ArrayView2<'_, f32>,
    labels: &[i32],
    time: usize,
    blank: usize,
    scratch: &mut ItemScratch<'_>,
    grad: &mut ArrayViewMut2<'_, f32>,
) -> Result<f32, Error> {
    if labels.is_empty() && time == 0 {
        // Empty target, no frames: the empty alignment has probability one.
        return Ok(0.0);
    }
    let min_required = min_input_length(labels);
    if time < min_required.max(1) {
        return Err(Error::AlignmentInfeasible {
            item,
            input_length: time,
            min_required: min_required.max(1),
        });
    }

    let alphabet = scratch.class_acc.len();
    extend_labels(labels, blank, scratch.ext);
    log_softmax_rows(activations, time, scratch.log_probs);
    forward(scratch.log_probs, scratch.ext, time, alphabet, scratch.alpha);
    backward(scratch.log_probs, scratch.ext, time, alphabet, scratch.beta);
    let log_like = log_likelihood(scratch.alpha, time, scratch.ext.len())?;
    accumulate_grad(
        scratch.log_probs,
        scratch.alpha,
        scratch.beta,
        scratch.ext,
        scratch.class_acc,
        time,
        log_like,
        grad,
    );
    Ok(-log_like)
}

/// Runs every item of the batch, writing gradients into disjoint columns of
/// `grads` and returning the per-item losses. Items are independent, so they
/// are distributed over the rayon pool (or a dedicated pool of
/// `options.num_threads` threads).
pub(crate) fn run_batch(
    activations: &ArrayView3<'_, f32>,
    labels: &[i32],
    spec: &BatchSpec,
    options: &CtcOptions,
    grads: &mut ArrayViewMut3<'_, f32>,
) -> Result<Array1<f32>, Error> {
    // FailBatch detects infeasible items before any computation starts so the
    // whole call fails without touching the outputs.
    if options.infeasible == InfeasiblePolicy::FailBatch {
        for item in 0..spec.input_lengths.len() {
            let slice = &labels
                [spec.label_offsets[item]..spec.label_offsets[item] + spec.label_lengths[item]];
            let min_required = min_input_length(slice).max(1);
            let empty_ok = slice.is_empty() && spec.input_lengths[item] == 0;
            if !empty_ok && spec.input_lengths[item] < min_required {
                return Err(Error::AlignmentInfeasible {
                    item,
                    input_length: spec.input_lengths[item],
                    min_required,
                });
            }
        }
    }

    let plan = WorkspacePlan::new(&spec.input_lengths, &spec.label_lengths, spec.alphabet_size)?;
    debug_println!(
        "ctc batch: {} items, {} workspace bytes",
        plan.batch_size(),
        plan.required_bytes()
    );
    let mut workspace = Workspace::acquire(&plan)?;
    let scratch = workspace.partition(&plan)?;

    let acts_cols: Vec<ArrayView2<'_, f32>> = activations.axis_iter(Axis(1)).collect();
    let grad_cols: Vec<ArrayViewMut2<'_, f32>> = grads.axis_iter_mut(Axis(1)).collect();

    let run = move || -> Result<Vec<f32>, Error> {
        acts_cols
            .into_par_iter()
            .zip(grad_cols.into_par_iter())
            .zip(scratch.into_par_iter())
            .enumerate()
            .map(|(item, ((acts, mut grad), mut scratch))| {
                let offset = spec.label_offsets[item];
                let item_labels = &labels[offset..offset + spec.label_lengths[item]];
                let result = compute_item(
                    item,
                    &acts,
                    item_labels,
                    spec.input_lengths[item],
                    options.blank,
                    &mut scratch,
                    &mut grad,
                );
                match result {
                    // Isolated infeasible items report infinite loss and keep
                    // their zero gradient; other items are unaffected.
                    Err(Error::AlignmentInfeasible { .. })
                        if options.infeasible == InfeasiblePolicy::Isolate =>
                    {
                        Ok(f32::INFINITY)
                    }
                    other => other,
                }
            })
            .collect()
    };

    let losses = match options.num_threads {
        Some(n) if n > 0 => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| Error::InvalidOperation(format!("failed to build thread pool: {}", e)))?
            .install(run),
        _ => run(),
    }?;

    Ok(Array1::from_vec(losses))
}
