//! Error types for the bridge.

use sqlbridge_codec::CodecError;
use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Coarse classification of a [`BridgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The channel or the engine reported a failure.
    Transport,
    /// A required row or column was absent.
    NotFound,
    /// A transaction was used in a state that does not allow the operation.
    TransactionState,
    /// The database is not open.
    NotInitialized,
    /// Lock acquisition was cancelled.
    Cancelled,
    /// A value could not be converted to the requested type.
    Codec,
}

/// Errors surfaced by every public bridge operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Normalized channel or engine failure.
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable message from the engine or the channel.
        message: String,
    },

    /// A required row or column was absent.
    #[error("not found: {message}")]
    NotFound {
        /// What was missing.
        message: String,
    },

    /// Operation not allowed in the current transaction state.
    #[error("transaction error: {message}")]
    TransactionState {
        /// Error message.
        message: String,
    },

    /// The database has not been opened, or was closed.
    #[error("database not initialized: {name}")]
    NotInitialized {
        /// Connection name.
        name: String,
    },

    /// Lock acquisition was cancelled before the callback ran.
    #[error("operation cancelled")]
    Cancelled,

    /// Value conversion failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl BridgeError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a transaction-state error.
    pub fn transaction_state(message: impl Into<String>) -> Self {
        Self::TransactionState {
            message: message.into(),
        }
    }

    /// Creates the error for statements on a finalized transaction.
    pub fn already_finalized() -> Self {
        Self::transaction_state("transaction already finalized")
    }

    /// Creates a not-initialized error.
    pub fn not_initialized(name: impl Into<String>) -> Self {
        Self::NotInitialized { name: name.into() }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Transport { .. } => ErrorKind::Transport,
            BridgeError::NotFound { .. } => ErrorKind::NotFound,
            BridgeError::TransactionState { .. } => ErrorKind::TransactionState,
            BridgeError::NotInitialized { .. } => ErrorKind::NotInitialized,
            BridgeError::Cancelled => ErrorKind::Cancelled,
            BridgeError::Codec(_) => ErrorKind::Codec,
        }
    }

    /// Returns true if SQLite rejected the statement on a constraint
    /// (UNIQUE, NOT NULL, CHECK, FOREIGN KEY, PRIMARY KEY).
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            BridgeError::Transport { message } => message.contains("constraint failed"),
            _ => false,
        }
    }
}
