//! Registry of named connections.

use crate::config::EngineConfig;
use crate::connection::EngineConnection;
use crate::error::{EngineError, EngineResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared handle to one open connection.
pub type SharedConnection = Arc<Mutex<EngineConnection>>;

/// Maps connection names to open connections.
///
/// Opening an already-open name reuses the existing connection. Closing
/// drops the connection, which rolls back any transaction still live on it.
pub struct ConnectionRegistry {
    config: EngineConfig,
    connections: RwLock<HashMap<String, SharedConnection>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the configuration connections are opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens `name` unless it is already open.
    pub fn open(&self, name: &str) -> EngineResult<()> {
        validate_name(name)?;

        let mut connections = self.connections.write();
        if connections.contains_key(name) {
            return Ok(());
        }
        let conn = EngineConnection::open(name, &self.config)?;
        connections.insert(name.to_string(), Arc::new(Mutex::new(conn)));
        Ok(())
    }

    /// Closes `name`. Closing an unknown name succeeds.
    pub fn close(&self, name: &str) -> bool {
        let removed = self.connections.write().remove(name).is_some();
        if removed {
            tracing::info!(name, "closed database");
        }
        removed
    }

    /// Returns the connection for `name`.
    pub fn get(&self, name: &str) -> EngineResult<SharedConnection> {
        self.connections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::database_not_found(name))
    }

    /// Returns true if `name` is open.
    pub fn is_open(&self, name: &str) -> bool {
        self.connections.read().contains_key(name)
    }

    /// Returns the names of every open connection, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("config", &self.config)
            .field("open", &self.names())
            .finish()
    }
}

/// Names become file names, so they must not escape the data directory.
fn validate_name(name: &str) -> EngineResult<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_is_idempotent() {
        let registry = ConnectionRegistry::new(EngineConfig::default());
        registry.open("app").unwrap();
        let first = registry.get("app").unwrap();
        first
            .lock()
            .execute("CREATE TABLE t(x)", &[])
            .unwrap();

        registry.open("app").unwrap();
        let second = registry.get("app").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.names(), vec!["app".to_string()]);
    }

    #[test]
    fn close_is_idempotent() {
        let registry = ConnectionRegistry::new(EngineConfig::default());
        registry.open("app").unwrap();
        assert!(registry.close("app"));
        assert!(!registry.close("app"));
        assert!(!registry.is_open("app"));
        assert!(matches!(
            registry.get("app"),
            Err(EngineError::DatabaseNotFound { .. })
        ));
    }

    #[test]
    fn rejects_path_like_names() {
        let registry = ConnectionRegistry::new(EngineConfig::default());
        for name in ["", "..", "a/b", "a\\b"] {
            assert!(matches!(
                registry.open(name),
                Err(EngineError::InvalidName { .. })
            ));
        }
    }
}
