//! Error types for the engine.

use sqlbridge_codec::wire::FailureFrame;
use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while serving a command.
#[derive(Debug, Error)]
pub enum EngineError {
    /// SQLite reported an error. Constraint failures keep SQLite's message.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error while preparing the database directory.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No connection is open under this name.
    #[error("database not open: {name}")]
    DatabaseNotFound {
        /// Connection name.
        name: String,
    },

    /// Connection name cannot be used as a file name.
    #[error("invalid database name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// No live transaction has this handle.
    #[error("transaction not found: {tx_id}")]
    TransactionNotFound {
        /// The unknown handle.
        tx_id: String,
    },

    /// The transaction was already committed or rolled back.
    #[error("transaction already completed: {tx_id}")]
    TransactionCompleted {
        /// The finalized handle.
        tx_id: String,
    },

    /// Statement references a forbidden object.
    #[error("forbidden SQL: statement must not reference {fragment}")]
    ForbiddenSql {
        /// The matched fragment.
        fragment: String,
    },

    /// Arguments did not match the command's shape.
    #[error("invalid arguments for {command}: {message}")]
    InvalidArguments {
        /// Command name.
        command: String,
        /// Decoder message.
        message: String,
    },

    /// Result could not be encoded.
    #[error("failed to encode result of {command}: {message}")]
    Encoding {
        /// Command name.
        command: String,
        /// Encoder message.
        message: String,
    },

    /// Command name is not served by this engine.
    #[error("unknown command: {command}")]
    UnknownCommand {
        /// Command name.
        command: String,
    },
}

impl EngineError {
    /// Creates a database-not-found error.
    pub fn database_not_found(name: impl Into<String>) -> Self {
        Self::DatabaseNotFound { name: name.into() }
    }

    /// Creates a transaction-not-found error.
    pub fn transaction_not_found(tx_id: impl Into<String>) -> Self {
        Self::TransactionNotFound {
            tx_id: tx_id.into(),
        }
    }

    /// Creates a transaction-completed error.
    pub fn transaction_completed(tx_id: impl Into<String>) -> Self {
        Self::TransactionCompleted {
            tx_id: tx_id.into(),
        }
    }

    /// Creates an invalid-arguments error.
    pub fn invalid_arguments(command: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidArguments {
            command: command.into(),
            message: message.to_string(),
        }
    }

    /// Creates an encoding error.
    pub fn encoding(command: impl Into<String>, message: impl ToString) -> Self {
        Self::Encoding {
            command: command.into(),
            message: message.to_string(),
        }
    }

    /// Returns a stable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                "constraint"
            }
            EngineError::Sqlite(_) => "sqlite",
            EngineError::Io(_) => "io",
            EngineError::DatabaseNotFound { .. } => "database_not_found",
            EngineError::InvalidName { .. } => "invalid_name",
            EngineError::TransactionNotFound { .. } => "transaction_not_found",
            EngineError::TransactionCompleted { .. } => "transaction_completed",
            EngineError::ForbiddenSql { .. } => "forbidden_sql",
            EngineError::InvalidArguments { .. } => "invalid_arguments",
            EngineError::Encoding { .. } => "encoding",
            EngineError::UnknownCommand { .. } => "unknown_command",
        }
    }

    /// Converts this error into the structured failure sent over the channel.
    pub fn to_failure(&self) -> FailureFrame {
        FailureFrame {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_frame_carries_code_and_message() {
        let frame = EngineError::database_not_found("app").to_failure();
        assert_eq!(frame.code, "database_not_found");
        assert_eq!(frame.message, "database not open: app");
    }

    #[test]
    fn constraint_violations_have_their_own_code() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(id TEXT PRIMARY KEY); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err: EngineError = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "constraint");
        assert!(err.to_string().contains("UNIQUE constraint failed"));
    }
}
