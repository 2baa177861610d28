//! High-performance out-of-place tensor transposition.
//!
//! This crate computes `B[pi(i)] = alpha * A[i] + beta * B[pi(i)]` for dense
//! multidimensional arrays of arbitrary rank, where `pi` is an axis
//! permutation. The operands are plain slices in an axis-0-fastest layout
//! with optional outer (padded) sizes per axis.
//!
//! # Architecture
//!
//! Planning and execution are split:
//!
//! - **Planner**: normalizes the problem (validation, fusion of
//!   consecutively-permuted axes, leading dimensions), enumerates candidate
//!   loop orders, factors the thread count across outer loops, and selects a
//!   master plan either by heuristic cost or by brief timed trials.
//! - **Executor**: each worker walks its own chain of loop descriptors down
//!   to a tiled kernel: a register-tile transpose with fused
//!   scale-and-accumulate, or a contiguous scaled copy when the unit-stride
//!   axis is shared by both operands.
//!
//! # Example
//!
//! ```rust
//! use strided_transpose::{create_plan, SelectionMethod};
//!
//! // A is 3 x 2 with axis 0 fastest; B = A^T.
//! let a = vec![1.0f64, 3.0, 5.0, 2.0, 4.0, 6.0];
//! let mut b = vec![0.0f64; 6];
//! let plan = create_plan(
//!     &[3, 2],
//!     &[1, 0],
//!     None,
//!     None,
//!     1.0,
//!     &a,
//!     0.0,
//!     &mut b,
//!     SelectionMethod::Estimate,
//!     1,
//! )
//! .unwrap();
//! plan.execute(&a, &mut b);
//! assert_eq!(b, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! ```
//!
//! # Plan reuse
//!
//! A plan is immutable after selection and may be reused across many
//! executions; buffers are borrowed per call, so the same plan serves any
//! pair of buffers with the selected geometry. `alpha`, `beta` and the
//! thread count can be updated through setters.
//!
//! # Environment
//!
//! - `HPTT_NUM_THREADS`: default worker count when the caller passes 0.
//! - `HPTT_TIMING_BUDGET_SECONDS`: wall-clock budget for measured selection.
//! - `HPTT_VERBOSE`: `>= 1` prints the chosen plan to standard error.

mod config;
mod element;
mod execute;
mod macro_kernel;
mod micro_kernel;
mod normalize;
mod order;
mod parallel;
mod plan;
mod select;
mod transpose;

pub use config::{engine_config, EngineConfig};
pub use element::{Element, REGISTER_BITS};
pub use transpose::{create_plan, SelectionMethod, TransposePlan};

/// Errors detected at plan creation.
///
/// Execution itself is infallible given a valid plan; buffer-geometry
/// violations at execute time are programming errors and abort.
#[derive(Debug, thiserror::Error)]
pub enum TransposeError {
    /// Rank must be at least 1.
    #[error("rank must be at least 1")]
    RankZero,

    /// Parameter arrays disagree about the rank.
    #[error("length mismatch: sizes carry {0} axes, permutation {1}")]
    LengthMismatch(usize, usize),

    /// The permutation is not a bijection on `0..dim`.
    #[error("permutation {0:?} is not a bijection on 0..{1}")]
    NotAPermutation(Vec<usize>, usize),

    /// Logical sizes must be positive.
    #[error("size must be at least 1 on axis {axis}")]
    ZeroSize { axis: usize },

    /// Outer sizes must dominate logical sizes.
    #[error("outer size {outer} smaller than logical size {size} on axis {axis}")]
    OuterTooSmall {
        axis: usize,
        outer: usize,
        size: usize,
    },

    /// Input and output buffers share storage.
    #[error("input and output buffers overlap")]
    AliasedBuffers,

    /// A buffer is smaller than its padded layout requires.
    #[error("buffer holds {got} elements, layout requires {need}")]
    BufferTooSmall { got: usize, need: usize },

    /// Reserved for element/layout combinations the tiled kernels cannot
    /// service. Unreachable with the built-in element types, which all
    /// expose a unit-stride axis after normalization.
    #[error("unsupported layout: {0}")]
    UnsupportedLayout(String),
}

/// Result type for plan creation.
pub type Result<T> = std::result::Result<T, TransposeError>;
