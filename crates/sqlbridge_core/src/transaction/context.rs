//! Execution context handed to transaction callbacks.

use super::state::{TransactionKind, TransactionState};
use crate::channel::Channel;
use crate::connection::Connection;
use crate::error::{BridgeError, BridgeResult};
use crate::notify::ChangeNotifier;
use crate::row::Row;
use parking_lot::Mutex;
use sqlbridge_codec::wire::ExecuteResult;
use sqlbridge_codec::TypedValue;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

type TableSet = Arc<Mutex<BTreeSet<String>>>;

struct ContextInner<C> {
    conn: Connection<C>,
    notifier: ChangeNotifier,
    tx_id: String,
    kind: TransactionKind,
    depth: usize,
    state: Mutex<TransactionState>,
    /// Tables modified by successful statements so far.
    modified: TableSet,
    /// Set of the enclosing transaction, for savepoints.
    parent: Option<TableSet>,
}

/// Handle to a live transaction or savepoint.
///
/// Clones refer to the same transaction. Once it is committed or rolled
/// back every statement fails with [`BridgeError::TransactionState`].
pub struct TransactionContext<C> {
    inner: Arc<ContextInner<C>>,
}

impl<C> Clone for TransactionContext<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Channel> TransactionContext<C> {
    pub(crate) fn new(
        conn: Connection<C>,
        notifier: ChangeNotifier,
        tx_id: String,
        kind: TransactionKind,
    ) -> Self {
        Self::with_parent(conn, notifier, tx_id, kind, 0, None)
    }

    fn with_parent(
        conn: Connection<C>,
        notifier: ChangeNotifier,
        tx_id: String,
        kind: TransactionKind,
        depth: usize,
        parent: Option<TableSet>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                conn,
                notifier,
                tx_id,
                kind,
                depth,
                state: Mutex::new(TransactionState::Active),
                modified: Arc::new(Mutex::new(BTreeSet::new())),
                parent,
            }),
        }
    }

    /// Returns the engine handle of this transaction.
    pub fn id(&self) -> &str {
        &self.inner.tx_id
    }

    /// Returns the transaction kind.
    pub fn kind(&self) -> TransactionKind {
        self.inner.kind
    }

    /// Returns the nesting depth; 0 for the outer transaction.
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Returns the current state.
    pub fn state(&self) -> TransactionState {
        *self.inner.state.lock()
    }

    /// Returns true once committed or rolled back.
    pub fn is_finalized(&self) -> bool {
        self.state().is_finalized()
    }

    /// Returns the tables modified so far.
    pub fn modified_tables(&self) -> BTreeSet<String> {
        self.inner.modified.lock().clone()
    }

    fn ensure_active(&self) -> BridgeResult<()> {
        if self.is_finalized() {
            return Err(BridgeError::already_finalized());
        }
        Ok(())
    }

    /// Moves from `Active` to `target`. Returns false if already finalized.
    fn finalize_as(&self, target: TransactionState) -> bool {
        let mut state = self.inner.state.lock();
        if state.is_finalized() {
            return false;
        }
        *state = target;
        true
    }

    fn record(&self, sql: &str) {
        let tables = self.inner.notifier.tables_for(sql);
        if !tables.is_empty() {
            self.inner.modified.lock().extend(tables);
        }
    }

    /// Executes one statement.
    pub async fn execute(&self, sql: &str, params: Vec<TypedValue>) -> BridgeResult<ExecuteResult> {
        self.ensure_active()?;
        let result = self.inner.conn.execute(sql, params).await?;
        self.record(sql);
        Ok(result)
    }

    /// Executes one statement once per parameter set, atomically.
    pub async fn execute_batch(
        &self,
        sql: &str,
        params_batch: Vec<Vec<TypedValue>>,
    ) -> BridgeResult<ExecuteResult> {
        self.ensure_active()?;
        let result = self.inner.conn.execute_batch(sql, params_batch).await?;
        self.record(sql);
        Ok(result)
    }

    /// Returns every row of a query.
    pub async fn get_all(&self, sql: &str, params: Vec<TypedValue>) -> BridgeResult<Vec<Row>> {
        self.ensure_active()?;
        self.inner.conn.get_all(sql, params).await
    }

    /// Returns the first row of a query, if any.
    pub async fn get_optional(
        &self,
        sql: &str,
        params: Vec<TypedValue>,
    ) -> BridgeResult<Option<Row>> {
        self.ensure_active()?;
        self.inner.conn.get_optional(sql, params).await
    }

    /// Returns the first row of a query, failing with `NotFound` if none.
    pub async fn get(&self, sql: &str, params: Vec<TypedValue>) -> BridgeResult<Row> {
        self.get_optional(sql, params)
            .await?
            .ok_or_else(|| BridgeError::not_found("query returned no rows"))
    }

    /// Commits now. A no-op if already finalized.
    ///
    /// If the engine rejects the commit, the transaction is rolled back.
    pub async fn commit(&self) -> BridgeResult<()> {
        if !self.finalize_as(TransactionState::Committed) {
            return Ok(());
        }
        self.send_commit().await
    }

    /// Rolls back now. A no-op if already finalized.
    pub async fn rollback(&self) -> BridgeResult<()> {
        if !self.finalize_as(TransactionState::RolledBack) {
            return Ok(());
        }
        self.inner.modified.lock().clear();
        self.inner.conn.rollback(&self.inner.tx_id).await
    }

    /// Runs `f` as a nested unit on a savepoint.
    ///
    /// The savepoint is released when `f` returns `Ok` and rolled back when
    /// it returns `Err`; either way the enclosing transaction stays live.
    /// Tables the savepoint modified are reported with the enclosing
    /// transaction's commit.
    pub async fn savepoint<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(TransactionContext<C>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BridgeError>,
    {
        self.ensure_active()?;
        let tx_id = self.inner.conn.begin(self.inner.kind.is_write()).await?;
        tracing::debug!(
            db = self.inner.conn.name(),
            tx_id = %tx_id,
            depth = self.inner.depth + 1,
            "savepoint"
        );

        let nested = Self::with_parent(
            self.inner.conn.clone(),
            self.inner.notifier.clone(),
            tx_id,
            self.inner.kind,
            self.inner.depth + 1,
            Some(Arc::clone(&self.inner.modified)),
        );
        nested.drive(f).await
    }

    /// Runs the callback, then finalizes implicitly if it did not.
    pub(crate) async fn drive<F, Fut, T, E>(self, f: F) -> Result<T, E>
    where
        F: FnOnce(TransactionContext<C>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BridgeError>,
    {
        match f(self.clone()).await {
            Ok(value) => {
                if self.finalize_as(TransactionState::Committed) {
                    self.send_commit().await?;
                }
                Ok(value)
            }
            Err(err) => {
                if self.finalize_as(TransactionState::RolledBack) {
                    self.inner.modified.lock().clear();
                    self.rollback_quietly().await;
                }
                Err(err)
            }
        }
    }

    async fn send_commit(&self) -> BridgeResult<()> {
        match self.inner.conn.commit(&self.inner.tx_id).await {
            Ok(()) => {
                self.publish();
                Ok(())
            }
            Err(err) => {
                *self.inner.state.lock() = TransactionState::RolledBack;
                self.inner.modified.lock().clear();
                self.rollback_quietly().await;
                Err(err)
            }
        }
    }

    /// Hands the modified tables to the enclosing transaction, or to the
    /// notifier for the outer one.
    fn publish(&self) {
        let tables = std::mem::take(&mut *self.inner.modified.lock());
        match &self.inner.parent {
            Some(parent) => parent.lock().extend(tables),
            None => self.inner.notifier.enqueue(tables),
        }
    }

    /// Marks a transaction whose caller went away as rolled back.
    pub(crate) fn abandon(&self) {
        if self.finalize_as(TransactionState::RolledBack) {
            self.inner.modified.lock().clear();
        }
    }

    pub(crate) async fn rollback_quietly(&self) {
        if let Err(err) = self.inner.conn.rollback(&self.inner.tx_id).await {
            tracing::warn!(
                db = self.inner.conn.name(),
                tx_id = %self.inner.tx_id,
                error = %err,
                "rollback failed"
            );
        }
    }
}

impl<C> std::fmt::Debug for TransactionContext<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("tx_id", &self.inner.tx_id)
            .field("kind", &self.inner.kind)
            .field("depth", &self.inner.depth)
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}
