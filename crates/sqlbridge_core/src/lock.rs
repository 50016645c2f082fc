//! Read/write lock entry points for sync collaborators.
//!
//! A sync client asks for a lock, does its work and releases it. Here the
//! write lock is a write transaction and the read lock is plain access to
//! the database; both honour a cancellation flag checked before the
//! callback starts.

use crate::channel::Channel;
use crate::database::Database;
use crate::error::BridgeError;
use crate::transaction::TransactionContext;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag a caller sets to abandon a pending lock request.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once `cancel` was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

fn check(cancel: Option<&CancellationFlag>) -> Result<(), BridgeError> {
    match cancel {
        Some(flag) if flag.is_cancelled() => Err(BridgeError::Cancelled),
        _ => Ok(()),
    }
}

impl<C: Channel> Database<C> {
    /// Runs `f` with read access to the database.
    ///
    /// Fails with [`BridgeError::Cancelled`] without running `f` if `cancel`
    /// is already set.
    pub async fn with_read_lock<F, Fut, T, E>(
        &self,
        cancel: Option<&CancellationFlag>,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Database<C>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BridgeError>,
    {
        check(cancel)?;
        self.ensure_open()?;
        f(self.clone()).await
    }

    /// Runs `f` inside a write transaction.
    ///
    /// `cancel` is checked before the transaction begins and again once it
    /// holds the connection; if set either time `f` never runs and the
    /// call fails with [`BridgeError::Cancelled`].
    pub async fn with_write_lock<F, Fut, T, E>(
        &self,
        cancel: Option<&CancellationFlag>,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(TransactionContext<C>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BridgeError>,
    {
        check(cancel)?;
        let cancel = cancel.cloned();
        self.write_transaction(move |tx| async move {
            check(cancel.as_ref())?;
            f(tx).await
        })
        .await
    }
}
