use thiserror::Error;

/// Errors raised by the delta algebra.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeltaError {
    /// A retain or delete ran past the end of the base document.
    #[error("Malformed delta: operation at position {position} overruns the base document by {overrun}")]
    Malformed { position: usize, overrun: usize },

    /// `diff` was called on a delta that contains retain or delete operations.
    #[error("Diff requires insert-only documents")]
    NotADocument,
}
