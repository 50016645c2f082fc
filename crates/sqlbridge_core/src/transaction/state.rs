//! Transaction kind and state.

/// Whether a transaction intends to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Read transaction.
    Read,
    /// Write transaction.
    Write,
}

impl TransactionKind {
    /// Returns true for write transactions.
    pub fn is_write(self) -> bool {
        matches!(self, TransactionKind::Write)
    }
}

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Statements may run.
    Active,
    /// Commit was requested.
    Committed,
    /// Rollback was requested.
    RolledBack,
}

impl TransactionState {
    /// Returns true once the transaction was committed or rolled back.
    pub fn is_finalized(self) -> bool {
        !matches!(self, TransactionState::Active)
    }
}
