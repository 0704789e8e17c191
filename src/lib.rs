//! A pure-Rust implementation of the Connectionist Temporal Classification
//! (CTC) loss: the forward-backward algorithm over the extended-label
//! alignment lattice, the per-item negative log-likelihood, and the gradient
//! with respect to the raw activations.
//!
//! The entry point is [`ctc_loss`], a single synchronous call that validates
//! every argument up front, sizes one scratch arena deterministically, and
//! computes the independent batch items in parallel. [`CtcLoss`] wraps it
//! with frame averaging and minibatch reduction.
//!
//! # Features
//! - `debug_logs` - Enables workspace/dispatch debug printing
//!
//! # Example
//! ```rust
//! use ndarray::ArrayD;
//! use rust_ctc_lib::{ctc_loss, CtcOptions};
//!
//! fn main() -> Result<(), rust_ctc_lib::Error> {
//!     // Two frames, one item, alphabet {blank, 1, 2}, uniform scores.
//!     let acts = ArrayD::<f32>::zeros(ndarray::IxDyn(&[2, 1, 3]));
//!     let (losses, grads) =
//!         ctc_loss(acts.view(), &[1], &[2], &[1], &CtcOptions::default())?;
//!
//!     // Valid alignments: {blank,1}, {1,blank}, {1,1} => 3 * (1/3)^2.
//!     assert!((losses[0] - 3f32.ln()).abs() < 1e-5);
//!     assert_eq!(grads.shape(), &[2, 1, 3]);
//!     Ok(())
//! }
//! ```

// --- Central debug_println macro definition ---
/// Conditional logging macro. Prints if 'debug_logs' feature is enabled.
#[cfg(feature = "debug_logs")]
#[macro_export]
macro_rules! debug_println {
    ($($arg:tt)*) => {
        ::std::println!("[DEBUG {}] {}", module_path!(), ::std::format_args!($($arg)*))
    };
}

/// Conditional logging macro (disabled version). Does nothing.
#[cfg(not(feature = "debug_logs"))]
#[macro_export]
macro_rules! debug_println {
    ($($arg:tt)*) => {};
}

pub mod batch;
pub mod error;
pub mod grad;
pub mod lattice;
pub mod ops;
pub mod util;
pub mod workspace;

// Only useful for testing, but compiled unconditionally like the rest of the
// public surface so downstream crates can gradient-check their own setups.
pub mod test_utils;

pub use error::{Error, Reduction};
pub use ops::{ctc_loss, CtcLoss, CtcOptions, InfeasiblePolicy};
pub use workspace::{Workspace, WorkspacePlan};
