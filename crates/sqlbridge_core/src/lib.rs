//! # SQLBridge
//!
//! An async SQL client that reaches a database engine through a command
//! channel and layers transactions and change notifications on top.
//!
//! This crate provides:
//! - [`ChannelClient`]: typed request/response calls over any [`Channel`]
//! - [`LocalChannel`]: an in-process channel backed by the SQLite engine
//! - [`Database`]: the facade for statements, queries and transactions
//! - [`ChangeNotifier`]: coalesced table-update events after writes
//! - Read/write lock entry points for sync collaborators
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlbridge_core::{typed_params, BridgeConfig, BridgeError, Database, LocalChannel};
//!
//! let db = Database::new("app", LocalChannel::in_memory()?, BridgeConfig::default());
//! db.open().await?;
//! db.execute("CREATE TABLE todos(id INTEGER PRIMARY KEY, title TEXT)", vec![]).await?;
//!
//! db.write_transaction(|tx| async move {
//!     tx.execute("INSERT INTO todos(title) VALUES (?)", typed_params!["milk"]).await?;
//!     tx.execute("INSERT INTO todos(title) VALUES (?)", typed_params!["eggs"]).await?;
//!     Ok::<_, BridgeError>(())
//! })
//! .await?;
//!
//! let rows = db.get_all("SELECT title FROM todos ORDER BY id", vec![]).await?;
//! assert_eq!(rows[0].get::<String>("title")?, "milk");
//! ```
//!
//! ## Transactions
//!
//! One transaction is live per database at a time. Others queue in FIFO
//! order or are rejected, per [`TransactionPolicy`]. Plain writes wait
//! for the live transaction the same way. Reads are not gated.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod config;
mod connection;
mod database;
mod error;
mod lock;
mod notify;
mod registry;
mod row;
mod transaction;

pub use channel::{Channel, ChannelClient, LocalChannel, MockCall, MockChannel, RawFailure};
pub use config::{BridgeConfig, NotifierConfig, TransactionPolicy};
pub use database::Database;
pub use error::{BridgeError, BridgeResult, ErrorKind};
pub use lock::CancellationFlag;
pub use notify::{ChangeNotifier, TableClassifier, TableUpdate};
pub use registry::DatabaseRegistry;
pub use row::Row;
pub use transaction::{TransactionContext, TransactionKind, TransactionState};

pub use sqlbridge_codec::wire::{CrudEntry, ExecuteResult};
pub use sqlbridge_codec::{typed_params, FromTypedValue, ToTypedValue, TypedValue};
pub use sqlbridge_engine::EngineConfig;
