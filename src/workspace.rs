//! Scratch-memory planning for the forward-backward computation.
//!
//! All per-item lattice state (extended labels, alpha/beta tables, the
//! log-softmax copy of the activations) lives in one arena that is sized
//! deterministically up front and partitioned into disjoint per-item slices.
//! Nothing is allocated while the recursions run.

use crate::debug_println;
use crate::error::Error;
use std::mem;

#[derive(Debug, Clone, Copy)]
pub(crate) struct ItemLayout {
    /// Valid timestep count T for this item.
    pub time: usize,
    /// Extended label length S = 2L + 1.
    pub ext_len: usize,
}

/// Deterministic scratch layout for one batch call.
#[derive(Debug, Clone)]
pub struct WorkspacePlan {
    pub(crate) items: Vec<ItemLayout>,
    pub(crate) alphabet_size: usize,
    total_floats: usize,
    total_ext: usize,
}

impl WorkspacePlan {
    /// Computes the layout for a batch. Lengths must already be validated
    /// (non-negative, in range); sizing overflow is reported as a
    /// `WorkspaceError`.
    pub fn new(
        input_lengths: &[usize],
        label_lengths: &[usize],
        alphabet_size: usize,
    ) -> Result<Self, Error> {
        debug_assert_eq!(input_lengths.len(), label_lengths.len());
        let overflow = || Error::WorkspaceError("workspace size overflows usize".to_string());

        let mut items = Vec::with_capacity(input_lengths.len());
        let mut total_floats: usize = 0;
        let mut total_ext: usize = 0;
        for (&t, &l) in input_lengths.iter().zip(label_lengths.iter()) {
            let s = l.checked_mul(2).and_then(|x| x.checked_add(1)).ok_or_else(overflow)?;
            let log_probs = t.checked_mul(alphabet_size).ok_or_else(overflow)?;
            let tables = t
                .checked_mul(s)
                .and_then(|x| x.checked_mul(2))
                .ok_or_else(overflow)?;
            let item_floats = log_probs
                .checked_add(tables)
                .and_then(|x| x.checked_add(alphabet_size))
                .ok_or_else(overflow)?;
            total_floats = total_floats.checked_add(item_floats).ok_or_else(overflow)?;
            total_ext = total_ext.checked_add(s).ok_or_else(overflow)?;
            items.push(ItemLayout { time: t, ext_len: s });
        }

        Ok(Self {
            items,
            alphabet_size,
            total_floats,
            total_ext,
        })
    }

    /// Total scratch requirement in bytes.
    pub fn required_bytes(&self) -> usize {
        self.total_floats * mem::size_of::<f32>() + self.total_ext * mem::size_of::<usize>()
    }

    pub fn batch_size(&self) -> usize {
        self.items.len()
    }
}

/// Mutable, disjoint scratch slices for one batch item.
pub(crate) struct ItemScratch<'a> {
    /// Log-softmax copy of this item's activation slice, T x A row-major.
    pub log_probs: &'a mut [f32],
    /// Forward table, T x S row-major.
    pub alpha: &'a mut [f32],
    /// Backward table, T x S row-major.
    pub beta: &'a mut [f32],
    /// Per-timestep log-space class accumulator, length A.
    pub class_acc: &'a mut [f32],
    /// Extended label sequence, length S.
    pub ext: &'a mut [usize],
}

/// Zero-initialized scratch arena, owned by one batch call at a time.
#[derive(Debug)]
pub struct Workspace {
    floats: Vec<f32>,
    ext: Vec<usize>,
}

impl Workspace {
    /// Allocates a zero-initialized arena for `plan`. Allocation failure is
    /// reported as `Error::OutOfMemory` instead of aborting.
    pub fn acquire(plan: &WorkspacePlan) -> Result<Self, Error> {
        debug_println!(
            "acquiring {} bytes of CTC workspace for {} items",
            plan.required_bytes(),
            plan.batch_size()
        );
        let mut floats = Vec::new();
        floats
            .try_reserve_exact(plan.total_floats)
            .map_err(|e| Error::OutOfMemory(e.to_string()))?;
        floats.resize(plan.total_floats, 0.0);

        let mut ext = Vec::new();
        ext.try_reserve_exact(plan.total_ext)
            .map_err(|e| Error::OutOfMemory(e.to_string()))?;
        ext.resize(plan.total_ext, 0);

        Ok(Self { floats, ext })
    }

    /// Zero-fills the arena so it can be reused for another call with the
    /// same (or a smaller-or-equal) plan.
    pub fn reset(&mut self) {
        self.floats.fill(0.0);
        self.ext.fill(0);
    }

    /// Splits the arena into disjoint per-item scratch slices. An arena
    /// smaller than the plan is a hard precondition failure; there is no
    /// resizing mid-computation.
    pub(crate) fn partition(&mut self, plan: &WorkspacePlan) -> Result<Vec<ItemScratch<'_>>, Error> {
        if self.floats.len() < plan.total_floats || self.ext.len() < plan.total_ext {
            return Err(Error::WorkspaceError(format!(
                "workspace holds {} floats / {} ints but the plan requires {} / {}",
                self.floats.len(),
                self.ext.len(),
                plan.total_floats,
                plan.total_ext
            )));
        }

        let mut floats = self.floats.as_mut_slice();
        let mut ext = self.ext.as_mut_slice();
        let mut parts = Vec::with_capacity(plan.items.len());
        for item in &plan.items {
            let a = plan.alphabet_size;
            let (log_probs, rest) = mem::take(&mut floats).split_at_mut(item.time * a);
            let (alpha, rest) = rest.split_at_mut(item.time * item.ext_len);
            let (beta, rest) = rest.split_at_mut(item.time * item.ext_len);
            let (class_acc, rest) = rest.split_at_mut(a);
            floats = rest;
            let (item_ext, rest_ext) = mem::take(&mut ext).split_at_mut(item.ext_len);
            ext = rest_ext;
            parts.push(ItemScratch {
                log_probs,
                alpha,
                beta,
                class_acc,
                ext: item_ext,
            });
        }
        Ok(parts)
    }
}
