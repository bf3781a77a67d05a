use thiserror::Error;

/// Errors produced while building layout transformation programs.
///
/// Everything here is detected synchronously at construction time; a failed
/// configuration has no partial result worth keeping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// Datatype has no fragment geometry (or no parseable tag).
    #[error("unsupported datatype: {0}")]
    UnsupportedDatatype(String),

    /// No fragment layout exists for the requested combination, or the
    /// requested matmul orientation/propagation combination is disallowed.
    #[error("unsupported layout: {0}")]
    UnsupportedLayout(String),

    /// Permutation programs need between 1 and 3 transform stages.
    #[error("invalid transform kind: {0} stages requested, supported range is 1..=3")]
    InvalidTransformKind(usize),

    /// Sub-byte packing arithmetic did not divide exactly.
    #[error("scaling mismatch: {0}")]
    ScalingMismatch(String),
}

pub type Result<T> = std::result::Result<T, LayoutError>;
