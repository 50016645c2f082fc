//! Infers the table a write statement targets.

use crate::config::NotifierConfig;
use regex_lite::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// One identifier, bare or quoted with `"`, `` ` `` or `[]`.
///
/// Bare names run to the next space, quote, bracket, paren, dot, comma
/// or semicolon, so non-ASCII letters stay part of the name.
const IDENT: &str = r#"(?:"[^"]+"|`[^`]+`|\[[^\]]+\]|[^\s"`'\[\]().,;]+)"#;

/// Leading write verb followed by an optionally schema-qualified target.
static WRITE_TARGET: LazyLock<Option<Regex>> = LazyLock::new(|| {
    let pattern = format!(
        r"(?is)^\s*(?:INSERT(?:\s+OR\s+[A-Z]+)?\s+INTO|REPLACE\s+INTO|UPDATE(?:\s+OR\s+[A-Z]+)?|DELETE\s+FROM)\s+((?:{IDENT}\s*\.\s*)*{IDENT})"
    );
    Regex::new(&pattern).ok()
});

/// Splits a qualified name into its segments.
static SEGMENT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(IDENT).ok());

/// Maps SQL text to the set of tables a change notification should name.
///
/// This is a heuristic over the statement text only. Statements it cannot
/// classify (reads, DDL, statements led by a `WITH` clause) name no tables.
#[derive(Debug, Clone)]
pub struct TableClassifier {
    config: NotifierConfig,
}

impl TableClassifier {
    /// Creates a classifier.
    pub fn new(config: NotifierConfig) -> Self {
        Self { config }
    }

    /// Returns the notifier configuration.
    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Returns the lowercase target table of a write statement.
    pub fn write_target(&self, sql: &str) -> Option<String> {
        let target = WRITE_TARGET.as_ref()?.captures(sql)?.get(1)?.as_str();
        let last = SEGMENT.as_ref()?.find_iter(target).last()?.as_str();
        Some(unquote(last).to_lowercase())
    }

    /// Returns every table a successful run of `sql` modifies.
    ///
    /// A logical target names itself and the pending-writes marker table.
    /// An internal target names every table in `registered` and itself.
    pub fn modified_tables(&self, sql: &str, registered: &[String]) -> BTreeSet<String> {
        let mut tables = BTreeSet::new();
        let Some(target) = self.write_target(sql) else {
            return tables;
        };

        if self.config.is_internal(&target) {
            tables.extend(registered.iter().map(|t| t.to_lowercase()));
        } else {
            tables.insert(self.config.crud_table.to_lowercase());
        }
        tables.insert(target);
        tables
    }
}

impl Default for TableClassifier {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}

fn unquote(ident: &str) -> &str {
    let bytes = ident.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if matches!((first, last), (b'"', b'"') | (b'`', b'`') | (b'[', b']')) {
            return &ident[1..ident.len() - 1];
        }
    }
    ident
}
