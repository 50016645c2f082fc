//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding `<name>.db` files. `None` keeps every database in memory.
    pub data_dir: Option<PathBuf>,

    /// Journal mode applied to file databases.
    pub journal_mode: String,

    /// How long SQLite waits on a locked database before failing.
    pub busy_timeout: Duration,

    /// Fragments a statement must not contain.
    pub forbidden_sql: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            journal_mode: "WAL".to_string(),
            busy_timeout: Duration::from_secs(5),
            forbidden_sql: vec!["powersync_core".to_string()],
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values (in-memory databases).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores databases as files under `dir`.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets the journal mode for file databases.
    #[must_use]
    pub fn journal_mode(mut self, mode: impl Into<String>) -> Self {
        self.journal_mode = mode.into();
        self
    }

    /// Sets the busy timeout.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Adds a forbidden SQL fragment.
    #[must_use]
    pub fn forbid(mut self, fragment: impl Into<String>) -> Self {
        self.forbidden_sql.push(fragment.into());
        self
    }

    /// Returns the path for a database name, or `None` when in memory.
    pub fn database_path(&self, name: &str) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(format!("{name}.db")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert!(config.data_dir.is_none());
        assert_eq!(config.journal_mode, "WAL");
        assert_eq!(config.forbidden_sql, vec!["powersync_core".to_string()]);
        assert!(config.database_path("app").is_none());
    }

    #[test]
    fn builder_pattern() {
        let config = EngineConfig::new()
            .data_dir("/tmp/dbs")
            .journal_mode("DELETE")
            .forbid("sqlite_master");

        assert_eq!(config.journal_mode, "DELETE");
        assert_eq!(config.forbidden_sql.len(), 2);
        assert_eq!(
            config.database_path("app"),
            Some(PathBuf::from("/tmp/dbs/app.db"))
        );
    }
}
