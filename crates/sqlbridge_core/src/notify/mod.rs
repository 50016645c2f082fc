//! Change notifications for modified tables.
//!
//! Writes record the tables they touched. Recorded names are pending until
//! the next scheduling tick, when one [`TableUpdate`] carrying all of them
//! goes to every listener. Several writes before the tick share one event,
//! and so do writes still awaiting the engine when the tick arrives.

mod classifier;

pub use classifier::TableClassifier;

use crate::config::NotifierConfig;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// A batch of modified table names delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableUpdate {
    /// Lowercase table names, sorted.
    pub tables: BTreeSet<String>,
}

impl TableUpdate {
    /// Returns true if `table` is part of this update.
    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(&table.to_lowercase())
    }

    /// Returns the table names in order.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }
}

#[derive(Debug, Default)]
struct Pending {
    tables: BTreeSet<String>,
    scheduled: bool,
    /// Writes in flight; a flush waits for the last one to finish.
    writers: usize,
}

struct NotifierInner {
    classifier: TableClassifier,
    registered: RwLock<Vec<String>>,
    pending: Mutex<Pending>,
    listeners: Mutex<Vec<UnboundedSender<TableUpdate>>>,
}

/// Collects modified tables and delivers them once per scheduling tick.
///
/// Cloning yields another handle to the same notifier.
#[derive(Clone)]
pub struct ChangeNotifier {
    inner: Arc<NotifierInner>,
}

impl ChangeNotifier {
    /// Creates a notifier.
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                classifier: TableClassifier::new(config),
                registered: RwLock::new(Vec::new()),
                pending: Mutex::new(Pending::default()),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Sets the logical tables an internal-table write fans out to.
    pub fn register_tables<I, S>(&self, tables: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.inner.registered.write() = tables.into_iter().map(Into::into).collect();
    }

    /// Returns the registered logical tables.
    pub fn registered_tables(&self) -> Vec<String> {
        self.inner.registered.read().clone()
    }

    /// Returns the tables a successful run of `sql` modifies.
    pub fn tables_for(&self, sql: &str) -> BTreeSet<String> {
        let registered = self.inner.registered.read();
        self.inner.classifier.modified_tables(sql, &registered)
    }

    /// Adds a listener.
    pub fn subscribe(&self) -> UnboundedReceiver<TableUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.listeners.lock().push(tx);
        rx
    }

    /// Returns the number of connected listeners.
    pub fn listener_count(&self) -> usize {
        let mut listeners = self.inner.listeners.lock();
        listeners.retain(|tx| !tx.is_closed());
        listeners.len()
    }

    /// Adds `tables` to the pending set and schedules a flush if none is
    /// scheduled.
    ///
    /// Outside a tokio runtime the flush runs immediately.
    pub fn enqueue(&self, tables: BTreeSet<String>) {
        if tables.is_empty() {
            return;
        }

        let schedule = {
            let mut pending = self.inner.pending.lock();
            pending.tables.extend(tables);
            pending.writers == 0 && !std::mem::replace(&mut pending.scheduled, true)
        };
        if schedule {
            self.schedule_flush();
        }
    }

    /// Holds back scheduled flushes until the returned guard is dropped.
    ///
    /// Writes take a hold before they are sent, so a burst of concurrent
    /// writes is delivered as one event once the last of them completes.
    pub(crate) fn hold(&self) -> WriteHold {
        self.inner.pending.lock().writers += 1;
        WriteHold {
            notifier: self.clone(),
        }
    }

    fn release(&self) {
        let schedule = {
            let mut pending = self.inner.pending.lock();
            pending.writers = pending.writers.saturating_sub(1);
            pending.writers == 0
                && !pending.tables.is_empty()
                && !std::mem::replace(&mut pending.scheduled, true)
        };
        if schedule {
            self.schedule_flush();
        }
    }

    fn schedule_flush(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let notifier = self.clone();
                handle.spawn(async move {
                    tokio::task::yield_now().await;
                    notifier.flush_when_idle();
                });
            }
            Err(_) => self.flush(),
        }
    }

    fn flush_when_idle(&self) {
        {
            let mut pending = self.inner.pending.lock();
            if pending.writers > 0 {
                // The last hold to be released schedules again
                pending.scheduled = false;
                return;
            }
        }
        self.flush();
    }

    /// Delivers the pending set to every listener and clears it.
    ///
    /// With no listener the pending set is still cleared.
    pub fn flush(&self) {
        let tables = {
            let mut pending = self.inner.pending.lock();
            pending.scheduled = false;
            std::mem::take(&mut pending.tables)
        };
        if tables.is_empty() {
            return;
        }

        let update = TableUpdate { tables };
        tracing::debug!(tables = ?update.tables, "flushing table update");

        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|tx| tx.send(update.clone()).is_ok());
        let dropped = before - listeners.len();
        if dropped > 0 {
            tracing::warn!(dropped, "removed disconnected change listeners");
        }
    }

    /// Returns the pending table names.
    pub fn pending(&self) -> BTreeSet<String> {
        self.inner.pending.lock().tables.clone()
    }
}

/// Guard returned by [`ChangeNotifier::hold`].
pub(crate) struct WriteHold {
    notifier: ChangeNotifier,
}

impl Drop for WriteHold {
    fn drop(&mut self) {
        self.notifier.release();
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("registered", &*self.inner.registered.read())
            .field("pending", &self.inner.pending.lock().tables)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn enqueues_before_tick_coalesce() {
        let notifier = ChangeNotifier::default();
        let mut rx = notifier.subscribe();

        notifier.enqueue(set(&["todos", "ps_crud"]));
        notifier.enqueue(set(&["todos"]));
        notifier.enqueue(set(&["lists"]));

        let update = rx.recv().await.unwrap();
        assert_eq!(update.tables, set(&["lists", "ps_crud", "todos"]));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(notifier.pending().is_empty());
    }

    #[tokio::test]
    async fn separate_ticks_produce_separate_events() {
        let notifier = ChangeNotifier::default();
        let mut rx = notifier.subscribe();

        notifier.enqueue(set(&["a"]));
        assert_eq!(rx.recv().await.unwrap().tables, set(&["a"]));
        notifier.enqueue(set(&["b"]));
        assert_eq!(rx.recv().await.unwrap().tables, set(&["b"]));
    }

    #[tokio::test]
    async fn flush_without_listeners_clears_pending() {
        let notifier = ChangeNotifier::default();
        notifier.enqueue(set(&["todos"]));
        assert_eq!(notifier.pending(), set(&["todos"]));
        notifier.flush();
        assert!(notifier.pending().is_empty());
    }

    #[test]
    fn empty_enqueue_schedules_nothing() {
        let notifier = ChangeNotifier::default();
        let mut rx = notifier.subscribe();
        notifier.enqueue(BTreeSet::new());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn flushes_immediately_outside_runtime() {
        let notifier = ChangeNotifier::default();
        let mut rx = notifier.subscribe();
        notifier.enqueue(set(&["todos"]));
        assert_eq!(rx.try_recv().unwrap().tables, set(&["todos"]));
    }

    #[tokio::test]
    async fn holds_defer_the_flush() {
        let notifier = ChangeNotifier::default();
        let mut rx = notifier.subscribe();

        let first = notifier.hold();
        let second = notifier.hold();
        notifier.enqueue(set(&["todos"]));
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        drop(first);
        notifier.enqueue(set(&["lists"]));
        tokio::task::yield_now().await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        drop(second);
        assert_eq!(rx.recv().await.unwrap().tables, set(&["lists", "todos"]));
        tokio::task::yield_now().await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn flush_scheduled_before_a_hold_waits_for_it() {
        let notifier = ChangeNotifier::default();
        let mut rx = notifier.subscribe();

        notifier.enqueue(set(&["todos"]));
        let hold = notifier.hold();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        drop(hold);
        assert_eq!(rx.recv().await.unwrap().tables, set(&["todos"]));
    }

    #[test]
    fn dropped_listeners_are_pruned() {
        let notifier = ChangeNotifier::default();
        let rx = notifier.subscribe();
        let mut kept = notifier.subscribe();
        assert_eq!(notifier.listener_count(), 2);

        drop(rx);
        notifier.enqueue(set(&["todos"]));
        assert!(kept.try_recv().unwrap().contains("TODOS"));
        assert_eq!(notifier.listener_count(), 1);
    }

    #[test]
    fn registered_tables_drive_fan_out() {
        let notifier = ChangeNotifier::default();
        notifier.register_tables(["todos", "lists"]);
        assert_eq!(
            notifier.tables_for("INSERT INTO ps_data__todos VALUES (1)"),
            set(&["lists", "ps_data__todos", "todos"])
        );
    }
}
