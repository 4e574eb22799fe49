//! Error types for ndgrad.

use thiserror::Error;

use crate::autodiff::TapeId;

/// Errors raised by tensor kernels and value arithmetic.
///
/// These are the operand errors of the differentiation engine: a primitive
/// that rejects its inputs returns one of these, and the engine hands it back
/// to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TensorError {
    /// Shape mismatch between data length and expected size.
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Two operands disagree on shape.
    #[error("incompatible shapes {left:?} and {right:?}")]
    IncompatibleShapes { left: Vec<usize>, right: Vec<usize> },

    /// Index out of bounds.
    #[error("index out of bounds: index {index} is out of range for dimension {dim_size}")]
    IndexOutOfBounds { index: usize, dim_size: usize },

    /// Wrong number of indices provided.
    #[error("wrong number of indices: expected {expected}, got {actual}")]
    WrongNumberOfIndices { expected: usize, actual: usize },

    /// Operation requires specific tensor rank.
    #[error("expected tensor of rank {expected}, got rank {actual}")]
    RankMismatch { expected: usize, actual: usize },

    /// A primitive was called with the wrong number of arguments.
    #[error("{op} expects {expected} argument(s), got {actual}")]
    WrongArgumentCount {
        op: String,
        expected: usize,
        actual: usize,
    },

    /// A value of the wrong kind reached an operation.
    #[error("{op}: expected {expected}, got {actual}")]
    TypeMismatch {
        op: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Catch-all for domain errors inside a kernel (log of a negative, etc.).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Errors raised by the differentiation engine.
#[derive(Debug, Error)]
pub enum AutodiffError {
    /// The underlying primitive rejected its operands.
    #[error(transparent)]
    Operand(#[from] TensorError),

    /// The differentiated function did not return a scalar.
    #[error("differentiated function must return a scalar, got {0}")]
    NonScalarOutput(String),

    /// A traced value recorded on another tape, or in an earlier run of this
    /// one, was passed into the current run.
    #[error("traced value belongs to tape {found}, but the active tape is {expected}")]
    ForeignNode { expected: TapeId, found: TapeId },

    /// A traced value was passed to a call made without an active tape.
    #[error("traced value passed to {op} outside of a recording")]
    Detached { op: String },

    /// A backward function returned the wrong number of contributions.
    #[error("backward of {op} returned {actual} contribution(s) for {expected} argument(s)")]
    ArityMismatch {
        op: String,
        expected: usize,
        actual: usize,
    },

    /// A primitive with this name is already registered.
    #[error("primitive `{0}` is already registered")]
    DuplicatePrimitive(String),

    /// No primitive with this name is registered.
    #[error("unknown primitive `{0}`")]
    UnknownPrimitive(String),

    /// A gradient check named a leaf that does not exist in the input.
    #[error("input has no tensor leaf at `{0}`")]
    UnknownLeaf(String),

    /// A node referenced itself or a later node.
    #[error("node {node} references node {target}, which is not strictly earlier")]
    InvalidReference { node: usize, target: usize },
}

/// Convenience alias used throughout the engine.
pub type Result<T, E = AutodiffError> = std::result::Result<T, E>;
