//! A single named SQLite connection and its transaction bookkeeping.
//!
//! Nesting model:
//! - the first `begin_transaction` on a connection issues `BEGIN` (read) or
//!   `BEGIN IMMEDIATE` (write)
//! - any `begin_transaction` while one is live issues a savepoint instead
//! - committing the outer transaction while savepoints are live defers the
//!   `COMMIT` until the last savepoint is released or rolled back
//! - rolling back the outer transaction discards every live savepoint

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, Statement};
use sqlbridge_codec::wire::{ExecuteResult, QueryResult, RowFrame};
use sqlbridge_codec::TypedValue;
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// What a transaction handle refers to on the SQLite side.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    /// The real `BEGIN ... COMMIT` transaction.
    Outer {
        /// `COMMIT` was requested while savepoints were live.
        commit_deferred: bool,
    },
    /// A savepoint nested inside the outer transaction.
    Savepoint {
        /// Savepoint name.
        name: String,
    },
}

/// A live transaction or savepoint.
#[derive(Debug)]
struct LiveTransaction {
    is_write: bool,
    scope: Scope,
}

/// A named SQLite connection served by the engine.
pub struct EngineConnection {
    name: String,
    conn: Connection,
    path: Option<PathBuf>,
    transactions: HashMap<String, LiveTransaction>,
    /// Handles of live scopes, outermost first.
    stack: Vec<String>,
}

impl EngineConnection {
    /// Opens the connection for `name` according to `config`.
    pub fn open(name: &str, config: &EngineConfig) -> EngineResult<Self> {
        let path = config.database_path(name);
        let conn = match &path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_URI
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                conn.execute_batch(&format!("PRAGMA journal_mode={};", config.journal_mode))?;
                conn
            }
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(config.busy_timeout)?;

        tracing::info!(name, path = ?path, "opened database");

        Ok(Self {
            name: name.to_string(),
            conn,
            path,
            transactions: HashMap::new(),
            stack: Vec::new(),
        })
    }

    /// Returns the connection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the database file path, or `None` when in memory.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// Returns the number of live transactions and savepoints.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Returns true while SQLite is inside a transaction.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    pub(crate) fn sqlite(&self) -> &Connection {
        &self.conn
    }

    /// Executes one statement.
    ///
    /// Statements that produce columns (SELECT, PRAGMA, RETURNING) also
    /// return their rows, so engine functions invoked through SELECT can
    /// report results through `execute`.
    pub fn execute(&mut self, sql: &str, params: &[TypedValue]) -> EngineResult<ExecuteResult> {
        let mut stmt = self.conn.prepare(sql)?;

        if stmt.column_count() > 0 {
            let readonly = stmt.readonly();
            let (columns, rows) = collect_rows(&mut stmt, params, None)?;
            drop(stmt);
            let changes = if readonly { 0 } else { self.changes() };
            return Ok(ExecuteResult {
                changes,
                last_insert_rowid: self.conn.last_insert_rowid(),
                columns: Some(columns),
                rows: Some(rows),
            });
        }

        let changes = stmt.execute(params_from_iter(params.iter().map(to_sql_value)))?;
        drop(stmt);

        Ok(ExecuteResult {
            changes: i64::try_from(changes).unwrap_or(i64::MAX),
            last_insert_rowid: self.conn.last_insert_rowid(),
            columns: None,
            rows: None,
        })
    }

    /// Executes one statement once per parameter set.
    ///
    /// Runs under its own savepoint so the batch is all-or-nothing and
    /// still nests inside a live transaction.
    pub fn execute_batch(
        &mut self,
        sql: &str,
        params_batch: &[Vec<TypedValue>],
    ) -> EngineResult<ExecuteResult> {
        let savepoint = format!("batch_{}", Uuid::new_v4().simple());
        self.conn.execute_batch(&format!("SAVEPOINT {savepoint}"))?;

        match self.run_batch(sql, params_batch) {
            Ok(changes) => {
                self.conn
                    .execute_batch(&format!("RELEASE SAVEPOINT {savepoint}"))?;
                Ok(ExecuteResult {
                    changes,
                    last_insert_rowid: self.conn.last_insert_rowid(),
                    columns: None,
                    rows: None,
                })
            }
            Err(e) => {
                let _ = self.conn.execute_batch(&format!(
                    "ROLLBACK TO SAVEPOINT {savepoint}; RELEASE SAVEPOINT {savepoint};"
                ));
                Err(e)
            }
        }
    }

    fn run_batch(&self, sql: &str, params_batch: &[Vec<TypedValue>]) -> EngineResult<i64> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut total = 0i64;
        for params in params_batch {
            let changes = stmt.execute(params_from_iter(params.iter().map(to_sql_value)))?;
            total += i64::try_from(changes).unwrap_or(i64::MAX);
        }
        Ok(total)
    }

    /// Runs a query and returns every row.
    pub fn get_all(&self, sql: &str, params: &[TypedValue]) -> EngineResult<QueryResult> {
        let mut stmt = self.conn.prepare(sql)?;
        let (columns, rows) = collect_rows(&mut stmt, params, None)?;
        Ok(QueryResult { columns, rows })
    }

    /// Runs a query and returns the first row, if any.
    pub fn get_optional(&self, sql: &str, params: &[TypedValue]) -> EngineResult<Option<RowFrame>> {
        let mut stmt = self.conn.prepare(sql)?;
        let (columns, rows) = collect_rows(&mut stmt, params, Some(1))?;
        Ok(rows
            .into_iter()
            .next()
            .map(|values| RowFrame { columns, values }))
    }

    /// Begins a transaction, or a savepoint if one is already live.
    ///
    /// Returns an opaque handle that is never reused.
    pub fn begin_transaction(&mut self, is_write: bool) -> EngineResult<String> {
        let tx_id = Uuid::new_v4().to_string();

        let scope = if self.stack.is_empty() {
            self.conn
                .execute_batch(if is_write { "BEGIN IMMEDIATE" } else { "BEGIN" })?;
            Scope::Outer {
                commit_deferred: false,
            }
        } else {
            let name = format!("sp_{}", Uuid::new_v4().simple());
            self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
            Scope::Savepoint { name }
        };

        tracing::debug!(db = %self.name, tx_id = %tx_id, is_write, depth = self.stack.len(), "begin");

        self.transactions
            .insert(tx_id.clone(), LiveTransaction { is_write, scope });
        self.stack.push(tx_id.clone());
        Ok(tx_id)
    }

    /// Commits a transaction or releases a savepoint.
    pub fn commit_transaction(&mut self, tx_id: &str) -> EngineResult<()> {
        let scope = self.live_scope(tx_id)?;

        match scope {
            Scope::Savepoint { name } => {
                self.conn
                    .execute_batch(&format!("RELEASE SAVEPOINT {name}"))?;
                self.forget(tx_id);
                self.run_deferred_commit()?;
            }
            Scope::Outer { .. } => {
                if self.stack.len() == 1 {
                    self.conn.execute_batch("COMMIT")?;
                    self.forget(tx_id);
                } else if let Some(tx) = self.transactions.get_mut(tx_id) {
                    tx.scope = Scope::Outer {
                        commit_deferred: true,
                    };
                }
            }
        }

        tracing::debug!(db = %self.name, tx_id = %tx_id, "commit");
        Ok(())
    }

    /// Rolls back a transaction or a savepoint.
    pub fn rollback_transaction(&mut self, tx_id: &str) -> EngineResult<()> {
        let scope = self.live_scope(tx_id)?;

        match scope {
            Scope::Savepoint { name } => {
                self.conn.execute_batch(&format!(
                    "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name};"
                ))?;
                self.forget(tx_id);
                self.run_deferred_commit()?;
            }
            Scope::Outer { .. } => {
                self.conn.execute_batch("ROLLBACK")?;
                // Savepoints die with the outer transaction
                self.transactions.clear();
                self.stack.clear();
            }
        }

        tracing::debug!(db = %self.name, tx_id = %tx_id, "rollback");
        Ok(())
    }

    /// Returns whether `tx_id` was opened for writing.
    pub fn is_write_transaction(&self, tx_id: &str) -> Option<bool> {
        self.transactions.get(tx_id).map(|tx| tx.is_write)
    }

    fn live_scope(&self, tx_id: &str) -> EngineResult<Scope> {
        let tx = self
            .transactions
            .get(tx_id)
            .ok_or_else(|| EngineError::transaction_not_found(tx_id))?;
        if matches!(
            tx.scope,
            Scope::Outer {
                commit_deferred: true
            }
        ) {
            return Err(EngineError::transaction_completed(tx_id));
        }
        Ok(tx.scope.clone())
    }

    /// Drops `tx_id` and every scope nested inside it; SQLite releases
    /// inner savepoints together with the outer one.
    fn forget(&mut self, tx_id: &str) {
        if let Some(pos) = self.stack.iter().position(|id| id == tx_id) {
            for id in self.stack.drain(pos..) {
                self.transactions.remove(&id);
            }
        }
    }

    /// Commits the outer transaction once its savepoints are gone.
    fn run_deferred_commit(&mut self) -> EngineResult<()> {
        if self.stack.len() != 1 {
            return Ok(());
        }
        let outer = self.stack[0].clone();
        let deferred = matches!(
            self.transactions.get(&outer).map(|tx| &tx.scope),
            Some(Scope::Outer {
                commit_deferred: true
            })
        );
        if deferred {
            self.conn.execute_batch("COMMIT")?;
            self.forget(&outer);
            tracing::debug!(db = %self.name, tx_id = %outer, "deferred commit");
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn changes(&self) -> i64 {
        self.conn.changes() as i64
    }
}

impl std::fmt::Debug for EngineConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConnection")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("depth", &self.stack.len())
            .finish_non_exhaustive()
    }
}

/// Runs `stmt` and collects up to `limit` rows.
fn collect_rows(
    stmt: &mut Statement<'_>,
    params: &[TypedValue],
    limit: Option<usize>,
) -> EngineResult<(Vec<String>, Vec<Vec<TypedValue>>)> {
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql_value)))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(from_value_ref(row.get_ref(i)?));
        }
        out.push(values);
        if limit.is_some_and(|limit| out.len() >= limit) {
            break;
        }
    }
    Ok((columns, out))
}

/// Converts a typed parameter into a SQLite value.
pub fn to_sql_value(value: &TypedValue) -> Value {
    match value {
        TypedValue::Null => Value::Null,
        TypedValue::Bool(b) => Value::Integer(i64::from(*b)),
        TypedValue::Int(n) => Value::Integer(*n),
        TypedValue::Real(f) => Value::Real(*f),
        TypedValue::Text(s) => Value::Text(s.clone()),
        TypedValue::Blob(b) => Value::Blob(b.clone()),
    }
}

/// Converts a SQLite cell into a typed value.
pub fn from_value_ref(value: ValueRef<'_>) -> TypedValue {
    match value {
        ValueRef::Null => TypedValue::Null,
        ValueRef::Integer(n) => TypedValue::Int(n),
        ValueRef::Real(f) => TypedValue::Real(f),
        ValueRef::Text(s) => TypedValue::Text(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => TypedValue::Blob(b.to_vec()),
    }
}
