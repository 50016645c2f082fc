//! Command names, argument frames and result frames shared by both ends
//! of the channel.

use crate::value::TypedValue;
use serde::{Deserialize, Serialize};

/// Engine command names.
pub mod command {
    /// Open (or reuse) a named connection.
    pub const OPEN: &str = "open";
    /// Close a named connection.
    pub const CLOSE: &str = "close";
    /// Execute one statement.
    pub const EXECUTE: &str = "execute";
    /// Execute one statement against many parameter sets.
    pub const EXECUTE_BATCH: &str = "execute_batch";
    /// Query all rows.
    pub const GET_ALL: &str = "get_all";
    /// Query the first row, if any.
    pub const GET_OPTIONAL: &str = "get_optional";
    /// Begin a transaction (or a savepoint when one is live).
    pub const BEGIN_TRANSACTION: &str = "begin_transaction";
    /// Commit a transaction handle.
    pub const COMMIT_TRANSACTION: &str = "commit_transaction";
    /// Roll back a transaction handle.
    pub const ROLLBACK_TRANSACTION: &str = "rollback_transaction";
    /// Read the oldest pending outbox entries.
    pub const GET_CRUD_BATCH: &str = "get_crud_batch";
    /// Delete outbox entries up to an id.
    pub const REMOVE_CRUD: &str = "remove_crud";
    /// Report whether the outbox holds any entry.
    pub const HAS_PENDING_CRUD: &str = "has_pending_crud";
    /// Read the last write checkpoint.
    pub const GET_WRITE_CHECKPOINT: &str = "get_write_checkpoint";
}

/// Outbox batch size used when `get_crud_batch` names no limit.
pub const DEFAULT_CRUD_BATCH_LIMIT: i64 = 100;

/// Arguments of `open` and `close`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionArgs {
    /// Connection name.
    pub name: String,
}

/// Arguments of `execute`, `get_all` and `get_optional`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementArgs {
    /// Connection name.
    pub name: String,
    /// SQL text.
    pub sql: String,
    /// Positional parameters.
    #[serde(default)]
    pub params: Vec<TypedValue>,
}

/// Arguments of `execute_batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchArgs {
    /// Connection name.
    pub name: String,
    /// SQL text shared by every parameter set.
    pub sql: String,
    /// One parameter set per execution.
    pub params_batch: Vec<Vec<TypedValue>>,
}

/// Arguments of `begin_transaction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginArgs {
    /// Connection name.
    pub name: String,
    /// Whether the transaction intends to write.
    pub is_write: bool,
}

/// Arguments of `commit_transaction` and `rollback_transaction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionArgs {
    /// Connection name.
    pub name: String,
    /// Handle returned by `begin_transaction`.
    pub tx_id: String,
}

/// Arguments of `get_crud_batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrudBatchArgs {
    /// Connection name.
    pub name: String,
    /// Maximum number of entries, [`DEFAULT_CRUD_BATCH_LIMIT`] when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

/// Arguments of `remove_crud`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveCrudArgs {
    /// Connection name.
    pub name: String,
    /// Highest entry id to delete.
    pub crud_id: i64,
}

/// One pending outbox entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrudEntry {
    /// Monotonic entry id.
    pub id: i64,
    /// Transaction that produced the entry, if recorded.
    #[serde(default)]
    pub tx_id: Option<i64>,
    /// Serialized change description.
    pub data: String,
}

/// Result of `execute` and `execute_batch`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    /// Rows changed by the statement (summed over a batch).
    pub changes: i64,
    /// Rowid of the most recent insert on the connection.
    pub last_insert_rowid: i64,
    /// Column names, for statements that return rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    /// Rows, for statements that return rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<TypedValue>>>,
}

/// Result of `get_all`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in select order.
    pub columns: Vec<String>,
    /// Row values, each aligned with `columns`.
    pub rows: Vec<Vec<TypedValue>>,
}

/// Result of `get_optional` when a row exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFrame {
    /// Column names in select order.
    pub columns: Vec<String>,
    /// Values aligned with `columns`.
    pub values: Vec<TypedValue>,
}

/// Structured failure returned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureFrame {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_args_use_camel_case() {
        let args = BatchArgs {
            name: "db".into(),
            sql: "INSERT INTO t VALUES (?)".into(),
            params_batch: vec![vec![TypedValue::Int(1)]],
        };
        let json = serde_json::to_value(&args).unwrap();
        assert_eq!(json["paramsBatch"][0][0], json!({"type": "int", "value": 1}));
    }

    #[test]
    fn execute_result_omits_absent_rows() {
        let result = ExecuteResult {
            changes: 2,
            last_insert_rowid: 9,
            ..ExecuteResult::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, json!({"changes": 2, "lastInsertRowid": 9}));

        let back: ExecuteResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn crud_frames_use_camel_case() {
        let args = RemoveCrudArgs {
            name: "db".into(),
            crud_id: 4,
        };
        assert_eq!(serde_json::to_value(&args).unwrap(), json!({"name": "db", "crudId": 4}));

        let entry: CrudEntry =
            serde_json::from_value(json!({"id": 1, "txId": null, "data": "{}"})).unwrap();
        assert_eq!(entry.tx_id, None);

        let args: CrudBatchArgs = serde_json::from_value(json!({"name": "db"})).unwrap();
        assert_eq!(args.limit, None);
    }

    #[test]
    fn statement_params_default_to_empty() {
        let args: StatementArgs =
            serde_json::from_value(json!({"name": "db", "sql": "SELECT 1"})).unwrap();
        assert!(args.params.is_empty());
    }
}
