// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

use thiserror::Error;

/// Result alias used throughout the tensor crate and its consumers.
pub type TensorResult<T> = Result<T, TensorError>;

/// Errors emitted by tensor, layer, and reduce-step operations.
///
/// Every error is fatal at the point of detection: shapes are never
/// broadcast or coerced, and a misconfigured layer chain is expected to
/// fail at wiring time rather than produce silently wrong numbers later.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TensorError {
    /// A matrix constructor received a zero-sized axis.
    #[error("invalid matrix dimensions ({rows} x {cols}); both axes must be non-zero")]
    InvalidDimensions { rows: usize, cols: usize },

    /// Data provided to a constructor does not match the requested shape.
    #[error("data length mismatch: expected {expected}, got {got}")]
    DataLength { expected: usize, got: usize },

    /// A shape descriptor requested more than the four supported axes.
    #[error("tensors support at most 4 axes (kernels, channels, rows, cols); got {axes}")]
    DimensionOverflow { axes: usize },

    /// A binary tensor operation was asked to combine differing shapes.
    #[error("shape mismatch: left={left:?}, right={right:?} cannot be combined")]
    ShapeMismatch {
        left: [usize; 4],
        right: [usize; 4],
    },

    /// A binary matrix operation was asked to combine differing shapes.
    #[error("matrix shape mismatch: left={left:?}, right={right:?}")]
    MatrixShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },

    /// `mmul` operands disagree on kernel/channel counts or inner dimension.
    #[error("incompatible multiply: left={left:?}, right={right:?}")]
    IncompatibleMultiply {
        left: [usize; 4],
        right: [usize; 4],
    },

    /// A valid-mode correlation was asked to slide a filter larger than its input.
    #[error("filter {filter:?} does not fit input {input:?} in valid mode")]
    FilterTooLarge {
        input: (usize, usize),
        filter: (usize, usize),
    },

    /// Computation received an empty input which would otherwise trigger a panic.
    #[error("{0} must not be empty for this computation")]
    EmptyInput(&'static str),

    /// A layer operation ran before `init_weights` allocated its parameters.
    #[error("layer '{layer}' used before init_weights")]
    Uninitialized { layer: String },

    /// A backward operation ran before the matching forward pass of the round.
    #[error("layer '{layer}' has no forward pass cached for this round")]
    StaleBackward { layer: String },

    /// `get_average` was called on an accumulator with zero contributions.
    #[error("accumulator holds no contributions to average")]
    EmptyAccumulator,

    /// An accumulate call carried the wrong number of per-layer gradients.
    #[error("gradient set carries {got} layers, accumulator expects {expected}")]
    LayerCountMismatch { expected: usize, got: usize },

    /// A gradient set marked a layer parameterless where earlier
    /// contributions carried a gradient, or vice versa.
    #[error("gradient set disagrees with earlier contributions at layer {layer}")]
    InconsistentGradientSet { layer: usize },

    /// Attempted to load a parameter missing from a stored state dict.
    #[error("missing parameter '{name}' while loading network state")]
    MissingParameter { name: String },

    /// Wrapper around I/O failures when persisting or restoring state.
    #[error("i/o error while handling network state: {message}")]
    IoError { message: String },

    /// Wrapper around serde failures when persisting or restoring state.
    #[error("serialization error while handling network state: {message}")]
    SerializationError { message: String },
}
