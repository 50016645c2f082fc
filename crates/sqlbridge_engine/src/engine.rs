//! Command dispatch.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::registry::ConnectionRegistry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlbridge_codec::wire::{
    command, BatchArgs, BeginArgs, ConnectionArgs, CrudBatchArgs, RemoveCrudArgs,
    StatementArgs, TransactionArgs, DEFAULT_CRUD_BATCH_LIMIT,
};

/// Serves engine commands against a set of named SQLite connections.
///
/// Arguments and results are JSON values shaped by the frames in
/// [`sqlbridge_codec::wire`]. Every command runs to completion before
/// `dispatch` returns.
#[derive(Debug)]
pub struct Engine {
    registry: ConnectionRegistry,
}

impl Engine {
    /// Creates an engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(config),
        }
    }

    /// Creates an engine that keeps every database in memory.
    pub fn in_memory() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Returns the connection registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Runs `command` with JSON `args` and returns its JSON result.
    pub fn dispatch(&self, command: &str, args: JsonValue) -> EngineResult<JsonValue> {
        tracing::debug!(command, "dispatch");

        match command {
            command::OPEN => {
                let args: ConnectionArgs = decode(command, args)?;
                self.registry.open(&args.name)?;
                Ok(JsonValue::Null)
            }
            command::CLOSE => {
                let args: ConnectionArgs = decode(command, args)?;
                self.registry.close(&args.name);
                Ok(JsonValue::Null)
            }
            command::EXECUTE => {
                let args: StatementArgs = decode(command, args)?;
                self.guard(&args.sql)?;
                let conn = self.registry.get(&args.name)?;
                let result = conn.lock().execute(&args.sql, &args.params)?;
                encode(command, &result)
            }
            command::EXECUTE_BATCH => {
                let args: BatchArgs = decode(command, args)?;
                self.guard(&args.sql)?;
                let conn = self.registry.get(&args.name)?;
                let result = conn.lock().execute_batch(&args.sql, &args.params_batch)?;
                encode(command, &result)
            }
            command::GET_ALL => {
                let args: StatementArgs = decode(command, args)?;
                self.guard(&args.sql)?;
                let conn = self.registry.get(&args.name)?;
                let result = conn.lock().get_all(&args.sql, &args.params)?;
                encode(command, &result)
            }
            command::GET_OPTIONAL => {
                let args: StatementArgs = decode(command, args)?;
                self.guard(&args.sql)?;
                let conn = self.registry.get(&args.name)?;
                let result = conn.lock().get_optional(&args.sql, &args.params)?;
                encode(command, &result)
            }
            command::BEGIN_TRANSACTION => {
                let args: BeginArgs = decode(command, args)?;
                let conn = self.registry.get(&args.name)?;
                let tx_id = conn.lock().begin_transaction(args.is_write)?;
                Ok(JsonValue::String(tx_id))
            }
            command::COMMIT_TRANSACTION => {
                let args: TransactionArgs = decode(command, args)?;
                let conn = self.registry.get(&args.name)?;
                conn.lock().commit_transaction(&args.tx_id)?;
                Ok(JsonValue::Null)
            }
            command::ROLLBACK_TRANSACTION => {
                let args: TransactionArgs = decode(command, args)?;
                let conn = self.registry.get(&args.name)?;
                conn.lock().rollback_transaction(&args.tx_id)?;
                Ok(JsonValue::Null)
            }
            command::GET_CRUD_BATCH => {
                let args: CrudBatchArgs = decode(command, args)?;
                let conn = self.registry.get(&args.name)?;
                let entries = conn
                    .lock()
                    .get_crud_batch(args.limit.unwrap_or(DEFAULT_CRUD_BATCH_LIMIT))?;
                encode(command, &entries)
            }
            command::REMOVE_CRUD => {
                let args: RemoveCrudArgs = decode(command, args)?;
                let conn = self.registry.get(&args.name)?;
                conn.lock().remove_crud(args.crud_id)?;
                Ok(JsonValue::Null)
            }
            command::HAS_PENDING_CRUD => {
                let args: ConnectionArgs = decode(command, args)?;
                let conn = self.registry.get(&args.name)?;
                let pending = conn.lock().has_pending_crud()?;
                Ok(JsonValue::Bool(pending))
            }
            command::GET_WRITE_CHECKPOINT => {
                let args: ConnectionArgs = decode(command, args)?;
                let conn = self.registry.get(&args.name)?;
                let checkpoint = conn.lock().get_write_checkpoint();
                Ok(checkpoint.map_or(JsonValue::Null, JsonValue::String))
            }
            other => Err(EngineError::UnknownCommand {
                command: other.to_string(),
            }),
        }
    }

    /// Rejects statements that mention a forbidden fragment.
    ///
    /// Only the statement text is checked, never bound parameters.
    fn guard(&self, sql: &str) -> EngineResult<()> {
        match self
            .registry
            .config()
            .forbidden_sql
            .iter()
            .find(|fragment| sql.contains(fragment.as_str()))
        {
            Some(fragment) => Err(EngineError::ForbiddenSql {
                fragment: fragment.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn decode<T: DeserializeOwned>(command: &str, args: JsonValue) -> EngineResult<T> {
    serde_json::from_value(args).map_err(|e| EngineError::invalid_arguments(command, e))
}

fn encode<T: Serialize>(command: &str, result: &T) -> EngineResult<JsonValue> {
    serde_json::to_value(result).map_err(|e| EngineError::encoding(command, e))
}
