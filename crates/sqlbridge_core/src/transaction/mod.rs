//! Transactions over the command channel.
//!
//! A transaction moves through `Active` to exactly one of `Committed` or
//! `RolledBack`:
//! - the callback returning `Ok` commits unless it already finalized
//! - the callback returning `Err` rolls back unless it already finalized
//! - finalizing twice is a no-op
//! - statements after finalizing fail with a transaction-state error
//!
//! Nested units run as engine savepoints through
//! [`TransactionContext::savepoint`].

mod context;
mod coordinator;
mod state;

pub use context::TransactionContext;
pub(crate) use coordinator::TransactionCoordinator;
pub use state::{TransactionKind, TransactionState};
