//! Named database instances sharing one channel.

use crate::channel::{Channel, ChannelClient};
use crate::config::BridgeConfig;
use crate::database::Database;
use crate::error::BridgeResult;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Hands out one [`Database`] per name.
///
/// Opening a name that is already open returns the existing instance, so
/// every caller shares its transaction gate and listeners.
pub struct DatabaseRegistry<C> {
    client: ChannelClient<C>,
    config: BridgeConfig,
    databases: RwLock<HashMap<String, Database<C>>>,
}

impl<C: Channel> DatabaseRegistry<C> {
    /// Creates an empty registry over `channel`.
    pub fn new(channel: C, config: BridgeConfig) -> Self {
        Self::with_client(ChannelClient::new(channel), config)
    }

    /// Creates an empty registry sharing an existing client.
    pub fn with_client(client: ChannelClient<C>, config: BridgeConfig) -> Self {
        Self {
            client,
            config,
            databases: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the open database `name`, opening it first if needed.
    pub async fn open(&self, name: &str) -> BridgeResult<Database<C>> {
        if let Some(db) = self.get(name) {
            return Ok(db);
        }

        let db = Database::with_client(name, self.client.clone(), self.config.clone());
        db.open().await?;

        // Another caller may have opened the same name meanwhile.
        let db = self
            .databases
            .write()
            .entry(name.to_string())
            .or_insert(db)
            .clone();
        Ok(db)
    }

    /// Closes and forgets `name`. Closing an unknown name does nothing.
    pub async fn close(&self, name: &str) -> BridgeResult<()> {
        let removed = self.databases.write().remove(name);
        match removed {
            Some(db) => db.close().await,
            None => Ok(()),
        }
    }

    /// Returns the open database `name`.
    pub fn get(&self, name: &str) -> Option<Database<C>> {
        self.databases.read().get(name).cloned()
    }

    /// Returns the names of all open databases.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.databases.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Closes every open database.
    ///
    /// Keeps going past failures and returns the first one.
    pub async fn close_all(&self) -> BridgeResult<()> {
        let databases: Vec<_> = self.databases.write().drain().map(|(_, db)| db).collect();
        let mut first_err = None;
        for db in databases {
            if let Err(err) = db.close().await {
                tracing::warn!(db = db.name(), error = %err, "close failed");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
