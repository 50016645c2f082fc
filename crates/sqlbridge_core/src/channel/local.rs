//! In-process channel that hosts an engine on a worker thread.

use super::{Channel, RawFailure};
use crate::error::{BridgeError, BridgeResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlbridge_codec::wire::FailureFrame;
use sqlbridge_engine::{Engine, EngineConfig};
use std::future::Future;
use std::sync::mpsc;
use std::thread;
use tokio::sync::oneshot;

/// Name of the engine worker thread.
const WORKER_NAME: &str = "sqlbridge-engine";

/// One command frame sent to the worker.
struct Request {
    command: String,
    args: Vec<u8>,
    reply: oneshot::Sender<Reply>,
}

/// CBOR-encoded reply from the worker.
enum Reply {
    /// Encoded JSON result.
    Success(Vec<u8>),
    /// Encoded failure frame.
    Failure(Vec<u8>),
}

/// A [`Channel`] whose engine runs on a dedicated thread.
///
/// Arguments and results cross the thread boundary only as CBOR frames.
/// The worker serves requests strictly in arrival order and exits once
/// every handle to the channel is dropped.
#[derive(Clone)]
pub struct LocalChannel {
    sender: mpsc::Sender<Request>,
}

impl LocalChannel {
    /// Starts a worker hosting an engine with `config`.
    pub fn new(config: EngineConfig) -> BridgeResult<Self> {
        Self::with_engine(Engine::new(config))
    }

    /// Starts a worker hosting an in-memory engine.
    pub fn in_memory() -> BridgeResult<Self> {
        Self::with_engine(Engine::in_memory())
    }

    /// Starts a worker hosting `engine`.
    pub fn with_engine(engine: Engine) -> BridgeResult<Self> {
        let (sender, receiver) = mpsc::channel::<Request>();

        thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || serve(&engine, &receiver))
            .map_err(|e| BridgeError::transport(format!("failed to start engine worker: {e}")))?;

        Ok(Self { sender })
    }
}

impl std::fmt::Debug for LocalChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalChannel").finish_non_exhaustive()
    }
}

impl Channel for LocalChannel {
    fn invoke(
        &self,
        command: &str,
        args: JsonValue,
    ) -> impl Future<Output = Result<JsonValue, RawFailure>> + Send {
        let sent = encode_frame(&args).and_then(|args| {
            let (reply, receiver) = oneshot::channel();
            self.sender
                .send(Request {
                    command: command.to_string(),
                    args,
                    reply,
                })
                .map_err(|_| RawFailure::Disconnected)?;
            Ok(receiver)
        });

        async move {
            match sent?.await {
                Ok(Reply::Success(frame)) => decode_frame(&frame),
                Ok(Reply::Failure(frame)) => Err(RawFailure::Structured(decode_frame(&frame)?)),
                Err(_) => Err(RawFailure::Disconnected),
            }
        }
    }
}

/// Worker loop.
fn serve(engine: &Engine, receiver: &mpsc::Receiver<Request>) {
    tracing::debug!("engine worker started");

    while let Ok(request) = receiver.recv() {
        let reply = handle(engine, &request.command, &request.args);
        // The caller may have stopped waiting
        let _ = request.reply.send(reply);
    }

    tracing::debug!("engine worker stopped");
}

fn handle(engine: &Engine, command: &str, args: &[u8]) -> Reply {
    let args: JsonValue = match decode_frame(args) {
        Ok(args) => args,
        Err(failure) => {
            return failure_reply(&FailureFrame {
                code: "invalid_arguments".to_string(),
                message: failure.into_message(),
            })
        }
    };

    match engine.dispatch(command, args) {
        Ok(value) => match encode_frame(&value) {
            Ok(frame) => Reply::Success(frame),
            Err(failure) => failure_reply(&FailureFrame {
                code: "encoding".to_string(),
                message: failure.into_message(),
            }),
        },
        Err(e) => failure_reply(&e.to_failure()),
    }
}

fn failure_reply(frame: &FailureFrame) -> Reply {
    // An empty frame decodes as a malformed-frame failure on the caller side
    Reply::Failure(encode_frame(frame).unwrap_or_default())
}

fn encode_frame<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, RawFailure> {
    let mut frame = Vec::new();
    ciborium::into_writer(value, &mut frame)
        .map_err(|e| RawFailure::Message(format!("failed to encode frame: {e}")))?;
    Ok(frame)
}

fn decode_frame<T: DeserializeOwned>(frame: &[u8]) -> Result<T, RawFailure> {
    ciborium::from_reader(frame)
        .map_err(|e| RawFailure::Message(format!("malformed frame: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_through_worker() {
        let channel = LocalChannel::in_memory().unwrap();
        channel.invoke("open", json!({"name": "db"})).await.unwrap();
        channel
            .invoke("execute", json!({"name": "db", "sql": "CREATE TABLE t(x)"}))
            .await
            .unwrap();
        channel
            .invoke(
                "execute",
                json!({
                    "name": "db",
                    "sql": "INSERT INTO t VALUES (?), (?)",
                    "params": [{"type": "real", "value": 0.25}, {"type": "blob", "value": [0, 9]}]
                }),
            )
            .await
            .unwrap();

        let rows = channel
            .invoke("get_all", json!({"name": "db", "sql": "SELECT x FROM t"}))
            .await
            .unwrap();
        assert_eq!(
            rows["rows"],
            json!([
                [{"type": "real", "value": 0.25}],
                [{"type": "blob", "value": [0, 9]}]
            ])
        );
    }

    #[tokio::test]
    async fn engine_errors_arrive_structured() {
        let channel = LocalChannel::in_memory().unwrap();
        let failure = channel
            .invoke("get_all", json!({"name": "missing", "sql": "SELECT 1"}))
            .await
            .unwrap_err();
        assert_eq!(
            failure,
            RawFailure::Structured(json!({
                "code": "database_not_found",
                "message": "database not open: missing"
            }))
        );
    }

    #[tokio::test]
    async fn clones_share_one_worker() {
        let channel = LocalChannel::in_memory().unwrap();
        let other = channel.clone();
        channel.invoke("open", json!({"name": "db"})).await.unwrap();
        other
            .invoke("execute", json!({"name": "db", "sql": "CREATE TABLE t(x)"}))
            .await
            .unwrap();
        let tables = other
            .invoke("get_all", json!({"name": "db", "sql": "SELECT name FROM sqlite_master"}))
            .await
            .unwrap();
        assert_eq!(tables["rows"], json!([[{"type": "text", "value": "t"}]]));
    }
}
