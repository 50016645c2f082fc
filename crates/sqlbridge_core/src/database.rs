//! Database facade.

use crate::channel::{Channel, ChannelClient};
use crate::config::BridgeConfig;
use crate::connection::Connection;
use crate::error::{BridgeError, BridgeResult};
use crate::notify::{ChangeNotifier, TableUpdate};
use crate::row::Row;
use crate::transaction::{TransactionContext, TransactionCoordinator, TransactionKind};
use parking_lot::RwLock;
use sqlbridge_codec::wire::{CrudEntry, ExecuteResult};
use sqlbridge_codec::TypedValue;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

struct DatabaseInner<C> {
    config: BridgeConfig,
    conn: Connection<C>,
    notifier: ChangeNotifier,
    coordinator: TransactionCoordinator<C>,
    is_open: RwLock<bool>,
}

/// A named database reached through a command channel.
///
/// `Database` is the entry point of the bridge. It provides:
/// - Open/close lifecycle for the named connection
/// - Statements, queries and atomic batches
/// - Read and write transactions, with savepoint nesting
/// - Read/write lock entry points for sync collaborators
/// - Change listeners fed with the tables each write modified
///
/// Cloning yields another handle to the same database.
///
/// ```rust,ignore
/// use sqlbridge_core::{typed_params, BridgeError, Database, LocalChannel};
///
/// let db = Database::new("app", LocalChannel::in_memory()?, Default::default());
/// db.open().await?;
/// db.execute("CREATE TABLE todos(id TEXT PRIMARY KEY, title TEXT)", vec![]).await?;
///
/// let mut updates = db.register_change_listener();
/// db.write_transaction(|tx| async move {
///     tx.execute("INSERT INTO todos VALUES (?, ?)", typed_params!["1", "milk"]).await?;
///     Ok::<_, BridgeError>(())
/// })
/// .await?;
/// assert!(updates.recv().await.unwrap().contains("todos"));
/// ```
pub struct Database<C> {
    inner: Arc<DatabaseInner<C>>,
}

impl<C> Clone for Database<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Channel> Database<C> {
    /// Creates a closed database handle for `name` over `channel`.
    pub fn new(name: impl Into<String>, channel: C, config: BridgeConfig) -> Self {
        Self::with_client(name, ChannelClient::new(channel), config)
    }

    /// Creates a closed database handle sharing an existing client.
    pub fn with_client(
        name: impl Into<String>,
        client: ChannelClient<C>,
        config: BridgeConfig,
    ) -> Self {
        let conn = Connection::new(client, name);
        let notifier = ChangeNotifier::new(config.notifier.clone());
        let coordinator =
            TransactionCoordinator::new(conn.clone(), notifier.clone(), config.transaction_policy);

        Self {
            inner: Arc::new(DatabaseInner {
                config,
                conn,
                notifier,
                coordinator,
                is_open: RwLock::new(false),
            }),
        }
    }

    /// Returns the connection name.
    pub fn name(&self) -> &str {
        self.inner.conn.name()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Returns true between `open` and `close`.
    pub fn is_open(&self) -> bool {
        *self.inner.is_open.read()
    }

    /// Returns true while a transaction is live.
    pub fn in_transaction(&self) -> bool {
        self.inner.coordinator.is_busy()
    }

    /// Returns the number of channel calls awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.inner.conn.client().in_flight()
    }

    /// Returns the change notifier.
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.inner.notifier
    }

    pub(crate) fn ensure_open(&self) -> BridgeResult<()> {
        if !self.is_open() {
            return Err(BridgeError::not_initialized(self.name()));
        }
        Ok(())
    }

    /// Opens the connection. Opening an open database does nothing.
    pub async fn open(&self) -> BridgeResult<()> {
        if self.is_open() {
            return Ok(());
        }
        self.inner.conn.open().await?;
        *self.inner.is_open.write() = true;
        tracing::info!(db = self.name(), "database opened");
        Ok(())
    }

    /// Closes the connection. Closing a closed database does nothing.
    ///
    /// Any transaction still live on the engine side is rolled back. The
    /// database stays open if the engine fails to close it.
    pub async fn close(&self) -> BridgeResult<()> {
        if !self.is_open() {
            return Ok(());
        }
        self.inner.conn.close().await?;
        *self.inner.is_open.write() = false;
        tracing::info!(db = self.name(), "database closed");
        Ok(())
    }

    /// Executes one statement outside any transaction.
    ///
    /// Waits for the live transaction to finish first, or fails under
    /// [`TransactionPolicy::Reject`](crate::TransactionPolicy::Reject).
    /// Statements that return rows (SELECT, PRAGMA, RETURNING) report them
    /// in the result.
    pub async fn execute(&self, sql: &str, params: Vec<TypedValue>) -> BridgeResult<ExecuteResult> {
        self.ensure_open()?;
        let _hold = self.inner.notifier.hold();
        let result = self
            .inner
            .coordinator
            .exclusive(self.inner.conn.execute(sql, params))
            .await?;
        self.inner.notifier.enqueue(self.inner.notifier.tables_for(sql));
        Ok(result)
    }

    /// Executes one statement once per parameter set, atomically.
    ///
    /// Returns the summed change count.
    pub async fn execute_batch(
        &self,
        sql: &str,
        params_batch: Vec<Vec<TypedValue>>,
    ) -> BridgeResult<ExecuteResult> {
        self.ensure_open()?;
        let _hold = self.inner.notifier.hold();
        let result = self
            .inner
            .coordinator
            .exclusive(self.inner.conn.execute_batch(sql, params_batch))
            .await?;
        self.inner.notifier.enqueue(self.inner.notifier.tables_for(sql));
        Ok(result)
    }

    /// Returns every row of a query.
    pub async fn get_all(&self, sql: &str, params: Vec<TypedValue>) -> BridgeResult<Vec<Row>> {
        self.ensure_open()?;
        self.inner.conn.get_all(sql, params).await
    }

    /// Returns the first row of a query, if any.
    pub async fn get_optional(
        &self,
        sql: &str,
        params: Vec<TypedValue>,
    ) -> BridgeResult<Option<Row>> {
        self.ensure_open()?;
        self.inner.conn.get_optional(sql, params).await
    }

    /// Returns the first row of a query, failing with `NotFound` if none.
    pub async fn get(&self, sql: &str, params: Vec<TypedValue>) -> BridgeResult<Row> {
        self.get_optional(sql, params)
            .await?
            .ok_or_else(|| BridgeError::not_found("query returned no rows"))
    }

    /// Runs `f` in a read transaction.
    pub async fn read_transaction<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(TransactionContext<C>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BridgeError>,
    {
        self.ensure_open()?;
        self.inner.coordinator.run(TransactionKind::Read, f).await
    }

    /// Runs `f` in a write transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`,
    /// unless `f` finalized the transaction itself. Tables written are
    /// reported to listeners only after a successful commit.
    pub async fn write_transaction<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(TransactionContext<C>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BridgeError>,
    {
        self.ensure_open()?;
        self.inner.coordinator.run(TransactionKind::Write, f).await
    }

    /// Returns up to `limit` queued upload entries, oldest first.
    ///
    /// `None` uses the engine default of 100.
    pub async fn get_crud_batch(&self, limit: Option<i64>) -> BridgeResult<Vec<CrudEntry>> {
        self.ensure_open()?;
        self.inner.conn.get_crud_batch(limit).await
    }

    /// Returns true if any upload entry is queued.
    pub async fn has_pending_crud(&self) -> BridgeResult<bool> {
        self.ensure_open()?;
        self.inner.conn.has_pending_crud().await
    }

    /// Drops every upload entry up to and including `crud_id`.
    pub async fn remove_crud(&self, crud_id: i64) -> BridgeResult<()> {
        self.ensure_open()?;
        let _hold = self.inner.notifier.hold();
        self.inner
            .coordinator
            .exclusive(self.inner.conn.remove_crud(crud_id))
            .await?;
        self.inner
            .notifier
            .enqueue(self.inner.notifier.tables_for("DELETE FROM ps_crud"));
        Ok(())
    }

    /// Returns the last write checkpoint, if the sync extension has one.
    pub async fn get_write_checkpoint(&self) -> BridgeResult<Option<String>> {
        self.ensure_open()?;
        self.inner.conn.get_write_checkpoint().await
    }

    /// Subscribes to table updates.
    pub fn register_change_listener(&self) -> UnboundedReceiver<TableUpdate> {
        self.inner.notifier.subscribe()
    }

    /// Sets the logical tables that writes to internal tables fan out to.
    pub fn register_tables<I, S>(&self, tables: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.notifier.register_tables(tables);
    }
}

impl<C> std::fmt::Debug for Database<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("is_open", &*self.inner.is_open.read())
            .field("notifier", &self.inner.notifier)
            .finish_non_exhaustive()
    }
}
