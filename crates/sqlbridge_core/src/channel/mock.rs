//! Scripted channel for tests.

use super::{Channel, RawFailure};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    /// Command name.
    pub command: String,
    /// Arguments as sent.
    pub args: JsonValue,
}

/// A mock channel with scripted replies and a call log.
///
/// Queued replies for a command are used first, in order; after that the
/// sticky response set for the command is returned. A command with
/// neither fails with a message naming it.
#[derive(Debug)]
pub struct MockChannel {
    connected: AtomicBool,
    responses: Mutex<HashMap<String, JsonValue>>,
    queued: Mutex<HashMap<String, VecDeque<Result<JsonValue, RawFailure>>>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockChannel {
    /// Creates a connected mock with no scripted replies.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            responses: Mutex::new(HashMap::new()),
            queued: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Creates a mock that answers every engine command the way a healthy
    /// engine with no data would.
    pub fn healthy() -> Self {
        let mock = Self::new();
        mock.set_response("open", JsonValue::Null);
        mock.set_response("close", JsonValue::Null);
        mock.set_response(
            "execute",
            serde_json::json!({"changes": 0, "lastInsertRowid": 0}),
        );
        mock.set_response(
            "execute_batch",
            serde_json::json!({"changes": 0, "lastInsertRowid": 0}),
        );
        mock.set_response("get_all", serde_json::json!({"columns": [], "rows": []}));
        mock.set_response("get_optional", JsonValue::Null);
        mock.set_response("begin_transaction", JsonValue::String("mock-tx".into()));
        mock.set_response("commit_transaction", JsonValue::Null);
        mock.set_response("rollback_transaction", JsonValue::Null);
        mock.set_response("get_crud_batch", serde_json::json!([]));
        mock.set_response("remove_crud", JsonValue::Null);
        mock.set_response("has_pending_crud", JsonValue::Bool(false));
        mock.set_response("get_write_checkpoint", JsonValue::Null);
        mock
    }

    /// Sets the reply returned for `command` once its queue is empty.
    pub fn set_response(&self, command: &str, value: JsonValue) {
        self.responses.lock().insert(command.to_string(), value);
    }

    /// Queues a one-shot reply for `command`.
    pub fn push_response(&self, command: &str, value: JsonValue) {
        self.push(command, Ok(value));
    }

    /// Queues a one-shot failure for `command`.
    pub fn push_failure(&self, command: &str, failure: RawFailure) {
        self.push(command, Err(failure));
    }

    fn push(&self, command: &str, reply: Result<JsonValue, RawFailure>) {
        self.queued
            .lock()
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Sets the connected state. A disconnected mock fails every call.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns every call received so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Returns the command names received so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.command.clone()).collect()
    }

    fn reply(&self, command: &str) -> Result<JsonValue, RawFailure> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RawFailure::Disconnected);
        }
        if let Some(reply) = self
            .queued
            .lock()
            .get_mut(command)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        self.responses
            .lock()
            .get(command)
            .cloned()
            .ok_or_else(|| RawFailure::Message(format!("no mock response set for {command}")))
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for MockChannel {
    fn invoke(
        &self,
        command: &str,
        args: JsonValue,
    ) -> impl Future<Output = Result<JsonValue, RawFailure>> + Send {
        self.calls.lock().push(MockCall {
            command: command.to_string(),
            args,
        });
        let reply = self.reply(command);
        async move {
            // Suspend once like a real round trip
            tokio::task::yield_now().await;
            reply
        }
    }
}
