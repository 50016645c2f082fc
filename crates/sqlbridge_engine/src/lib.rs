//! # SQLBridge Engine
//!
//! The native side of the SQLBridge command channel.
//!
//! This crate provides:
//! - Named SQLite connections, in memory or as `<name>.db` files
//! - Statement execution, queries and atomic batches
//! - Transactions with savepoint nesting and deferred outer commits
//! - A command dispatcher speaking the frames in `sqlbridge_codec::wire`
//!
//! ## Transactions
//!
//! The first `begin_transaction` on a connection opens a real transaction;
//! nested ones open savepoints. Handles are opaque UUID strings. A handle
//! that was committed or rolled back can never be used again.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod engine;
mod error;
mod outbox;
mod registry;

pub use config::EngineConfig;
pub use connection::{from_value_ref, to_sql_value, EngineConnection};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use outbox::CRUD_TABLE;
pub use registry::{ConnectionRegistry, SharedConnection};
