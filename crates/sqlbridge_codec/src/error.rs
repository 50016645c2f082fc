//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding typed values.
///
/// Encoding never fails: classification is total.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value has a different variant than the requested Rust type accepts.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Name of the requested type.
        expected: &'static str,
        /// Name of the variant that was found.
        found: &'static str,
    },

    /// Integer does not fit the requested Rust type.
    #[error("integer {value} out of range for {target}")]
    IntegerOverflow {
        /// The stored integer.
        value: i64,
        /// Name of the requested type.
        target: &'static str,
    },

    /// Wire value could not be parsed as a typed value.
    #[error("malformed typed value: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },
}

impl CodecError {
    /// Create a type mismatch error.
    pub fn type_mismatch(expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch { expected, found }
    }

    /// Create an integer overflow error.
    pub fn integer_overflow(value: i64, target: &'static str) -> Self {
        Self::IntegerOverflow { value, target }
    }

    /// Create a malformed value error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}
