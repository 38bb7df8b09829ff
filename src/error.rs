//! Error types shared across the crate.

use thiserror::Error;

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ArborError>;

/// All errors surfaced by the public API.
///
/// Every variant is a local, synchronous condition the caller can recover
/// from; a failed call never leaves the store or the forest in a partially
/// mutated state.
#[derive(Debug, Error)]
pub enum ArborError {
    /// A vector did not match the dimension fixed at store creation.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An item with the given id is already stored.
    #[error("item id {0} is already present")]
    DuplicateId(u64),

    /// No item with the given id exists.
    #[error("item id {0} not found")]
    NotFound(u64),

    /// A query was issued before the forest was built.
    #[error("index has not been built yet")]
    NotBuilt,

    /// `build` was called on an already built index, or an item was added
    /// after the build froze the store.
    #[error("index has already been built")]
    AlreadyBuilt,

    /// `build` was called while the store held no items.
    #[error("cannot build an index over an empty store")]
    EmptyStore,

    /// A caller-supplied value failed boundary validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A serialized index could not be decoded.
    #[error("invalid index format: {0}")]
    InvalidFormat(String),

    /// An I/O error while reading or writing a serialized index.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArborError {
    /// Create an `InvalidArgument` error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ArborError::InvalidArgument(message.into())
    }

    /// Create an `InvalidFormat` error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        ArborError::InvalidFormat(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_mention_the_offending_id() {
        let err = ArborError::DuplicateId(7);
        assert!(err.to_string().contains('7'));

        let err = ArborError::NotFound(42);
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn dimension_mismatch_reports_both_sides() {
        let err = ArborError::DimensionMismatch {
            expected: 128,
            actual: 64,
        };
        let message = err.to_string();
        assert!(message.contains("128"));
        assert!(message.contains("64"));
    }
}
