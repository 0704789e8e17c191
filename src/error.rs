use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape error: {0}")]
    ShapeError(String),

    #[error("{arg} must have rank 2 or 3, got rank {rank}")]
    InvalidRank { arg: &'static str, rank: usize },

    #[error("{arg} must be contiguous (standard row-major layout)")]
    NonContiguous { arg: &'static str },

    #[error("Number of elements of {arg_a} and {arg_b} must be equal ({len_a} vs. {len_b})")]
    LengthMismatch {
        arg_a: &'static str,
        arg_b: &'static str,
        len_a: usize,
        len_b: usize,
    },

    #[error("{arg} must be non-negative, got {value} for batch item {item}")]
    NegativeLength {
        arg: &'static str,
        item: usize,
        value: i32,
    },

    #[error("input length {input_length} of batch item {item} exceeds the activation time dimension {max_time}")]
    InputLengthTooLarge {
        item: usize,
        input_length: usize,
        max_time: usize,
    },

    #[error("blank label {blank} is out of range for alphabet size {alphabet_size}")]
    InvalidBlank { blank: usize, alphabet_size: usize },

    #[error("label {label} of batch item {item} is invalid for alphabet size {alphabet_size} with blank {blank}")]
    InvalidLabel {
        item: usize,
        label: i32,
        alphabet_size: usize,
        blank: usize,
    },

    #[error("no alignment exists for batch item {item}: input length {input_length} is below the required minimum {min_required}")]
    AlignmentInfeasible {
        item: usize,
        input_length: usize,
        min_required: usize,
    },

    #[error("Workspace error: {0}")]
    WorkspaceError(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Gradient check error: max_rel_error={max_rel_error}, max_abs_error={max_abs_error}, at_index={at_index}")]
    GradientCheckError {
        max_rel_error: f32,
        max_abs_error: f32,
        at_index: usize,
    },

    #[error("Internal logic error: {0}")]
    InternalLogicError(String),
}

/// Specifies the reduction to apply to the per-item costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// No reduction applied (one cost per batch item).
    None,
    /// The costs are summed over the minibatch.
    Sum,
    /// The costs are averaged over the minibatch.
    Mean,
}
