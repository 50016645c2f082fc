//! Engine commands bound to one connection name.

use crate::channel::{Channel, ChannelClient};
use crate::error::BridgeResult;
use crate::row::Row;
use serde_json::Value as JsonValue;
use sqlbridge_codec::wire::{
    command, BatchArgs, BeginArgs, ConnectionArgs, CrudBatchArgs, CrudEntry, ExecuteResult,
    QueryResult, RemoveCrudArgs, RowFrame, StatementArgs, TransactionArgs,
};
use sqlbridge_codec::TypedValue;
use std::sync::Arc;

/// Issues engine commands for a single named connection.
pub(crate) struct Connection<C> {
    client: ChannelClient<C>,
    name: String,
}

impl<C> Clone for Connection<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            name: self.name.clone(),
        }
    }
}

impl<C: Channel> Connection<C> {
    pub(crate) fn new(client: ChannelClient<C>, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn client(&self) -> &ChannelClient<C> {
        &self.client
    }

    fn connection_args(&self) -> ConnectionArgs {
        ConnectionArgs {
            name: self.name.clone(),
        }
    }

    fn statement_args(&self, sql: &str, params: Vec<TypedValue>) -> StatementArgs {
        StatementArgs {
            name: self.name.clone(),
            sql: sql.to_string(),
            params,
        }
    }

    pub(crate) async fn open(&self) -> BridgeResult<()> {
        self.client
            .call::<_, JsonValue>(command::OPEN, &self.connection_args())
            .await
            .map(drop)
    }

    pub(crate) async fn close(&self) -> BridgeResult<()> {
        self.client
            .call::<_, JsonValue>(command::CLOSE, &self.connection_args())
            .await
            .map(drop)
    }

    pub(crate) async fn execute(
        &self,
        sql: &str,
        params: Vec<TypedValue>,
    ) -> BridgeResult<ExecuteResult> {
        self.client
            .call(command::EXECUTE, &self.statement_args(sql, params))
            .await
    }

    pub(crate) async fn execute_batch(
        &self,
        sql: &str,
        params_batch: Vec<Vec<TypedValue>>,
    ) -> BridgeResult<ExecuteResult> {
        let args = BatchArgs {
            name: self.name.clone(),
            sql: sql.to_string(),
            params_batch,
        };
        self.client.call(command::EXECUTE_BATCH, &args).await
    }

    pub(crate) async fn get_all(
        &self,
        sql: &str,
        params: Vec<TypedValue>,
    ) -> BridgeResult<Vec<Row>> {
        let result: QueryResult = self
            .client
            .call(command::GET_ALL, &self.statement_args(sql, params))
            .await?;
        let columns: Arc<[String]> = result.columns.into();
        Ok(result
            .rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect())
    }

    pub(crate) async fn get_optional(
        &self,
        sql: &str,
        params: Vec<TypedValue>,
    ) -> BridgeResult<Option<Row>> {
        let frame: Option<RowFrame> = self
            .client
            .call(command::GET_OPTIONAL, &self.statement_args(sql, params))
            .await?;
        Ok(frame.map(|frame| Row::new(frame.columns.into(), frame.values)))
    }

    pub(crate) async fn begin(&self, is_write: bool) -> BridgeResult<String> {
        let args = BeginArgs {
            name: self.name.clone(),
            is_write,
        };
        self.client.call(command::BEGIN_TRANSACTION, &args).await
    }

    pub(crate) async fn commit(&self, tx_id: &str) -> BridgeResult<()> {
        self.finish(command::COMMIT_TRANSACTION, tx_id).await
    }

    pub(crate) async fn rollback(&self, tx_id: &str) -> BridgeResult<()> {
        self.finish(command::ROLLBACK_TRANSACTION, tx_id).await
    }

    pub(crate) async fn get_crud_batch(&self, limit: Option<i64>) -> BridgeResult<Vec<CrudEntry>> {
        let args = CrudBatchArgs {
            name: self.name.clone(),
            limit,
        };
        self.client.call(command::GET_CRUD_BATCH, &args).await
    }

    pub(crate) async fn remove_crud(&self, crud_id: i64) -> BridgeResult<()> {
        let args = RemoveCrudArgs {
            name: self.name.clone(),
            crud_id,
        };
        self.client
            .call::<_, JsonValue>(command::REMOVE_CRUD, &args)
            .await
            .map(drop)
    }

    pub(crate) async fn has_pending_crud(&self) -> BridgeResult<bool> {
        self.client
            .call(command::HAS_PENDING_CRUD, &self.connection_args())
            .await
    }

    pub(crate) async fn get_write_checkpoint(&self) -> BridgeResult<Option<String>> {
        self.client
            .call(command::GET_WRITE_CHECKPOINT, &self.connection_args())
            .await
    }

    async fn finish(&self, command: &str, tx_id: &str) -> BridgeResult<()> {
        let args = TransactionArgs {
            name: self.name.clone(),
            tx_id: tx_id.to_string(),
        };
        self.client
            .call::<_, JsonValue>(command, &args)
            .await
            .map(drop)
    }
}
