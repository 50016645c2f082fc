//! Command channel between the bridge and the engine.
//!
//! A [`Channel`] moves one named command with JSON arguments to the engine
//! and resolves with the engine's JSON result or a raw failure.
//! [`ChannelClient`] sits on top of it, turning typed argument frames into
//! JSON and every failure shape into a single [`BridgeError::Transport`].

mod local;
mod mock;

pub use local::LocalChannel;
pub use mock::{MockCall, MockChannel};

use crate::error::{BridgeError, BridgeResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A failure in the shape the transport produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFailure {
    /// A bare message string.
    Message(String),
    /// A structured object, such as `{"code": ..., "message": ...}`.
    Structured(JsonValue),
    /// The other side of the channel is gone.
    Disconnected,
}

impl RawFailure {
    /// Extracts the human-readable message.
    ///
    /// Structured failures use their `message` field, then their `error`
    /// field, then their compact JSON text.
    pub fn into_message(self) -> String {
        match self {
            RawFailure::Message(message) => message,
            RawFailure::Structured(value) => {
                for field in ["message", "error"] {
                    match value.get(field) {
                        Some(JsonValue::String(s)) => return s.clone(),
                        Some(JsonValue::Null) | None => {}
                        Some(other) => return other.to_string(),
                    }
                }
                match value {
                    JsonValue::String(s) => s,
                    other => other.to_string(),
                }
            }
            RawFailure::Disconnected => "channel disconnected".to_string(),
        }
    }
}

impl From<RawFailure> for BridgeError {
    fn from(failure: RawFailure) -> Self {
        BridgeError::transport(failure.into_message())
    }
}

/// Transport for engine commands.
///
/// Each call is delivered at most once.
pub trait Channel: Send + Sync + 'static {
    /// Sends `command` with `args` and waits for the engine's reply.
    fn invoke(
        &self,
        command: &str,
        args: JsonValue,
    ) -> impl Future<Output = Result<JsonValue, RawFailure>> + Send;
}

/// Typed, failure-normalizing client over a [`Channel`].
pub struct ChannelClient<C> {
    channel: Arc<C>,
    in_flight: Arc<AtomicUsize>,
}

impl<C> Clone for ChannelClient<C> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<C: Channel> ChannelClient<C> {
    /// Wraps a channel.
    pub fn new(channel: C) -> Self {
        Self::from_shared(Arc::new(channel))
    }

    /// Wraps a channel that is already shared.
    pub fn from_shared(channel: Arc<C>) -> Self {
        Self {
            channel,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the underlying channel.
    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// Returns the number of calls awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Sends `command` with typed arguments and decodes a typed result.
    pub async fn call<A, R>(&self, command: &str, args: &A) -> BridgeResult<R>
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let args = serde_json::to_value(args).map_err(|e| {
            BridgeError::transport(format!("failed to encode arguments of {command}: {e}"))
        })?;
        let value = self.call_raw(command, args).await?;
        serde_json::from_value(value).map_err(|e| {
            BridgeError::transport(format!("unexpected result from {command}: {e}"))
        })
    }

    /// Sends `command` with JSON arguments and returns the JSON result.
    pub async fn call_raw(&self, command: &str, args: JsonValue) -> BridgeResult<JsonValue> {
        let _guard = InFlight::enter(&self.in_flight);

        match self.channel.invoke(command, args).await {
            Ok(value) => {
                tracing::debug!(command, "call succeeded");
                Ok(value)
            }
            Err(failure) => {
                let err = BridgeError::from(failure);
                tracing::debug!(command, error = %err, "call failed");
                Err(err)
            }
        }
    }
}

impl<C> std::fmt::Debug for ChannelClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelClient")
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Counts a call as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
