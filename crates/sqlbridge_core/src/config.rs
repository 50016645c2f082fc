//! Configuration for the bridge.

use std::time::Duration;

/// What a transaction does when another one is already live on the
/// same connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPolicy {
    /// Wait in FIFO order. With a timeout, waiting longer fails with a
    /// transaction-state error.
    Queue {
        /// Maximum wait, or `None` to wait indefinitely.
        timeout: Option<Duration>,
    },
    /// Fail immediately with a transaction-state error.
    Reject,
}

impl Default for TransactionPolicy {
    fn default() -> Self {
        Self::Queue { timeout: None }
    }
}

/// Configuration for the change notifier.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Table name prefixes that mark internal bookkeeping tables.
    pub internal_prefixes: Vec<String>,
    /// Marker table recorded alongside every logical write.
    pub crud_table: String,
}

impl NotifierConfig {
    /// Creates a notifier configuration with the default prefixes.
    pub fn new() -> Self {
        Self {
            internal_prefixes: vec!["ps_".to_string(), "powersync_".to_string()],
            crud_table: "ps_crud".to_string(),
        }
    }

    /// Replaces the internal table prefixes. Matching ignores case.
    #[must_use]
    pub fn with_internal_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.internal_prefixes = prefixes
            .into_iter()
            .map(|prefix| prefix.into().to_lowercase())
            .collect();
        self
    }

    /// Sets the pending-writes marker table.
    #[must_use]
    pub fn with_crud_table(mut self, table: impl Into<String>) -> Self {
        self.crud_table = table.into();
        self
    }

    /// Returns true if `table` is an internal bookkeeping table.
    pub fn is_internal(&self, table: &str) -> bool {
        let table = table.to_lowercase();
        self.internal_prefixes
            .iter()
            .any(|prefix| table.starts_with(&prefix.to_lowercase()))
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for a database facade.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    /// Change notifier settings.
    pub notifier: NotifierConfig,
    /// Behaviour of concurrent transactions.
    pub transaction_policy: TransactionPolicy,
}

impl BridgeConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the notifier configuration.
    #[must_use]
    pub fn with_notifier(mut self, notifier: NotifierConfig) -> Self {
        self.notifier = notifier;
        self
    }

    /// Sets the transaction policy.
    #[must_use]
    pub fn with_transaction_policy(mut self, policy: TransactionPolicy) -> Self {
        self.transaction_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BridgeConfig::default();
        assert_eq!(
            config.transaction_policy,
            TransactionPolicy::Queue { timeout: None }
        );
        assert_eq!(config.notifier.crud_table, "ps_crud");
        assert!(config.notifier.is_internal("ps_oplog"));
        assert!(config.notifier.is_internal("powersync_operations"));
        assert!(!config.notifier.is_internal("todos"));
    }

    #[test]
    fn builder_pattern() {
        let config = BridgeConfig::new()
            .with_transaction_policy(TransactionPolicy::Reject)
            .with_notifier(
                NotifierConfig::new()
                    .with_internal_prefixes(["sys_"])
                    .with_crud_table("sys_outbox"),
            );

        assert_eq!(config.transaction_policy, TransactionPolicy::Reject);
        assert!(config.notifier.is_internal("sys_outbox"));
        assert!(!config.notifier.is_internal("ps_crud"));
    }

    #[test]
    fn prefixes_match_regardless_of_case() {
        let notifier = NotifierConfig::new().with_internal_prefixes(["PS_"]);
        assert_eq!(notifier.internal_prefixes, vec!["ps_"]);
        assert!(notifier.is_internal("ps_oplog"));

        let notifier = NotifierConfig {
            internal_prefixes: vec!["Sys_".into()],
            ..NotifierConfig::default()
        };
        assert!(notifier.is_internal("sys_outbox"));
        assert!(!notifier.is_internal("todos"));
    }
}
