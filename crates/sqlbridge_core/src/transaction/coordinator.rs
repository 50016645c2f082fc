//! Single-flight transaction coordination for one connection.

use super::context::TransactionContext;
use super::state::TransactionKind;
use crate::channel::Channel;
use crate::config::TransactionPolicy;
use crate::connection::Connection;
use crate::error::{BridgeError, BridgeResult};
use crate::notify::ChangeNotifier;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Mutex, OwnedMutexGuard};

tokio::task_local! {
    /// Gate of the transaction whose callback runs on the current task.
    static HELD_GATE: usize;
}

/// Runs transactions on one connection, at most one at a time.
///
/// Waiting transactions are admitted in FIFO order. Plain writes outside
/// a transaction pass through the same gate, so they never land inside
/// someone else's transaction.
pub(crate) struct TransactionCoordinator<C> {
    conn: Connection<C>,
    notifier: ChangeNotifier,
    policy: TransactionPolicy,
    gate: Arc<Mutex<()>>,
}

impl<C: Channel> TransactionCoordinator<C> {
    pub(crate) fn new(
        conn: Connection<C>,
        notifier: ChangeNotifier,
        policy: TransactionPolicy,
    ) -> Self {
        Self {
            conn,
            notifier,
            policy,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Returns true while a transaction holds the gate.
    pub(crate) fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    fn gate_id(&self) -> usize {
        Arc::as_ptr(&self.gate) as usize
    }

    /// Returns true inside a transaction callback of this coordinator.
    fn held_here(&self) -> bool {
        HELD_GATE
            .try_with(|held| *held == self.gate_id())
            .unwrap_or(false)
    }

    /// Begins a transaction of `kind`, runs `f` in it and finalizes it.
    ///
    /// If the returned future is dropped before it completes, the
    /// transaction is rolled back in the background and the next one is
    /// admitted only after that rollback returns.
    pub(crate) async fn run<F, Fut, T, E>(&self, kind: TransactionKind, f: F) -> Result<T, E>
    where
        F: FnOnce(TransactionContext<C>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BridgeError>,
    {
        if self.held_here() {
            return Err(BridgeError::transaction_state(
                "a transaction is already live on this task; nest with savepoint instead",
            )
            .into());
        }

        let permit = self.acquire().await?;
        let (tx_id, permit) = self.begin(kind, permit).await?;
        tracing::debug!(db = self.conn.name(), tx_id = %tx_id, ?kind, "transaction started");

        let ctx = TransactionContext::new(self.conn.clone(), self.notifier.clone(), tx_id, kind);
        let mut guard = AbandonGuard {
            ctx: ctx.clone(),
            permit: Some(permit),
        };
        let result = HELD_GATE.scope(self.gate_id(), ctx.drive(f)).await;
        guard.disarm();
        result
    }

    /// Runs a statement outside any transaction once the gate is free.
    pub(crate) async fn exclusive<Fut, T>(&self, statement: Fut) -> BridgeResult<T>
    where
        Fut: Future<Output = BridgeResult<T>>,
    {
        if self.held_here() {
            return Err(BridgeError::transaction_state(
                "statement would wait on the transaction running on this task; \
                 issue it through the transaction context",
            ));
        }
        let _permit = self.acquire().await?;
        statement.await
    }

    async fn acquire(&self) -> BridgeResult<OwnedMutexGuard<()>> {
        let gate = Arc::clone(&self.gate);
        match self.policy {
            TransactionPolicy::Reject => gate.try_lock_owned().map_err(|_| {
                BridgeError::transaction_state("another transaction is already in progress")
            }),
            TransactionPolicy::Queue { timeout: None } => Ok(gate.lock_owned().await),
            TransactionPolicy::Queue {
                timeout: Some(timeout),
            } => tokio::time::timeout(timeout, gate.lock_owned())
                .await
                .map_err(|_| {
                    BridgeError::transaction_state(format!(
                        "timed out after {timeout:?} waiting for the current transaction"
                    ))
                }),
        }
    }

    /// Sends `begin_transaction` from a task of its own.
    ///
    /// A caller that stops waiting cannot leave a transaction open on the
    /// engine: the task rolls back whatever it began and only then
    /// releases the gate.
    async fn begin(
        &self,
        kind: TransactionKind,
        permit: OwnedMutexGuard<()>,
    ) -> BridgeResult<(String, OwnedMutexGuard<()>)> {
        let Ok(handle) = Handle::try_current() else {
            let tx_id = self.conn.begin(kind.is_write()).await?;
            return Ok((tx_id, permit));
        };

        let conn = self.conn.clone();
        let (reply, begun) = oneshot::channel();
        handle.spawn(async move {
            let result = conn.begin(kind.is_write()).await.map(|tx_id| (tx_id, permit));
            if let Err(Ok((tx_id, _permit))) = reply.send(result) {
                if let Err(err) = conn.rollback(&tx_id).await {
                    tracing::warn!(db = conn.name(), tx_id = %tx_id, error = %err, "rollback failed");
                }
            }
        });

        begun
            .await
            .map_err(|_| BridgeError::transport("begin_transaction task ended without a reply"))?
    }
}

/// Rolls back a transaction whose future was dropped mid-flight.
///
/// Holds the gate until the rollback has been answered.
struct AbandonGuard<C: Channel> {
    ctx: TransactionContext<C>,
    permit: Option<OwnedMutexGuard<()>>,
}

impl<C: Channel> AbandonGuard<C> {
    fn disarm(&mut self) {
        self.permit.take();
    }
}

impl<C: Channel> Drop for AbandonGuard<C> {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        let ctx = self.ctx.clone();
        ctx.abandon();
        tracing::warn!(tx_id = %ctx.id(), "transaction dropped before it finished; rolling back");

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    ctx.rollback_quietly().await;
                    drop(permit);
                });
            }
            Err(_) => {
                tracing::error!(tx_id = %ctx.id(), "no runtime to roll back a dropped transaction");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelClient, MockChannel, RawFailure};
    use crate::error::ErrorKind;
    use crate::transaction::TransactionState;
    use serde_json::json;
    use sqlbridge_codec::typed_params;
    use std::time::Duration;

    fn coordinator(
        mock: MockChannel,
        policy: TransactionPolicy,
    ) -> TransactionCoordinator<MockChannel> {
        let conn = Connection::new(ChannelClient::new(mock), "db");
        TransactionCoordinator::new(conn, ChangeNotifier::default(), policy)
    }

    fn commands(coordinator: &TransactionCoordinator<MockChannel>) -> Vec<String> {
        coordinator.conn.client().channel().commands()
    }

    #[tokio::test]
    async fn ok_commits_and_err_rolls_back() {
        let c = coordinator(MockChannel::healthy(), TransactionPolicy::default());

        let value: BridgeResult<i32> = c
            .run(TransactionKind::Write, |tx| async move {
                tx.execute("INSERT INTO t VALUES (?)", typed_params![1]).await?;
                Ok::<_, BridgeError>(7)
            })
            .await;
        assert_eq!(value.unwrap(), 7);

        let failed: BridgeResult<()> = c
            .run(TransactionKind::Write, |_tx| async move {
                Err(BridgeError::not_found("boom"))
            })
            .await;
        assert_eq!(failed.unwrap_err(), BridgeError::not_found("boom"));

        assert_eq!(
            commands(&c),
            vec![
                "begin_transaction",
                "execute",
                "commit_transaction",
                "begin_transaction",
                "rollback_transaction",
            ]
        );
    }

    #[tokio::test]
    async fn explicit_finalize_happens_once() {
        let c = coordinator(MockChannel::healthy(), TransactionPolicy::default());

        let result: BridgeResult<()> = c
            .run(TransactionKind::Write, |tx| async move {
                tx.commit().await?;
                tx.rollback().await?;
                tx.commit().await?;
                assert_eq!(tx.state(), TransactionState::Committed);
                Ok::<_, BridgeError>(())
            })
            .await;
        result.unwrap();
        assert_eq!(commands(&c), vec!["begin_transaction", "commit_transaction"]);
    }

    #[tokio::test]
    async fn explicit_rollback_then_error_does_not_roll_back_twice() {
        let c = coordinator(MockChannel::healthy(), TransactionPolicy::default());

        let result: BridgeResult<()> = c
            .run(TransactionKind::Read, |tx| async move {
                tx.rollback().await?;
                Err(BridgeError::transport("after rollback"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(commands(&c), vec!["begin_transaction", "rollback_transaction"]);
    }

    #[tokio::test]
    async fn statements_after_finalize_fail() {
        let c = coordinator(MockChannel::healthy(), TransactionPolicy::default());

        let escaped = c
            .run(TransactionKind::Write, |tx| async move {
                tx.commit().await?;
                let err = tx.execute("DELETE FROM t", vec![]).await.unwrap_err();
                assert_eq!(err.kind(), ErrorKind::TransactionState);
                Ok::<_, BridgeError>(tx)
            })
            .await
            .unwrap();

        let err = escaped.get_all("SELECT 1", vec![]).await.unwrap_err();
        assert_eq!(err, BridgeError::already_finalized());
    }

    #[tokio::test]
    async fn rollback_failure_keeps_original_error() {
        let mock = MockChannel::healthy();
        mock.push_failure("rollback_transaction", RawFailure::Message("disk I/O error".into()));
        let c = coordinator(mock, TransactionPolicy::default());

        let result: BridgeResult<()> = c
            .run(TransactionKind::Write, |_tx| async move {
                Err(BridgeError::transport("UNIQUE constraint failed: t.id"))
            })
            .await;
        let err = result.unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[tokio::test]
    async fn failed_commit_rolls_back_and_reports_commit_error() {
        let mock = MockChannel::healthy();
        mock.push_failure(
            "commit_transaction",
            RawFailure::Structured(json!({"code": "sqlite", "message": "database is locked"})),
        );
        let c = coordinator(mock, TransactionPolicy::default());

        let result: BridgeResult<()> = c
            .run(TransactionKind::Write, |_tx| async move { Ok(()) })
            .await;
        assert_eq!(result.unwrap_err(), BridgeError::transport("database is locked"));
        assert_eq!(
            commands(&c),
            vec!["begin_transaction", "commit_transaction", "rollback_transaction"]
        );
    }

    #[tokio::test]
    async fn callers_keep_their_own_error_type() {
        #[derive(Debug, PartialEq)]
        enum AppError {
            Bridge(BridgeError),
            Invalid,
        }
        impl From<BridgeError> for AppError {
            fn from(e: BridgeError) -> Self {
                AppError::Bridge(e)
            }
        }

        let mock = MockChannel::healthy();
        mock.push_failure("begin_transaction", RawFailure::Message("busy".into()));
        let c = coordinator(mock, TransactionPolicy::default());

        let begin_failed: Result<(), AppError> = c
            .run(TransactionKind::Write, |_tx| async move { Ok(()) })
            .await;
        assert_eq!(
            begin_failed.unwrap_err(),
            AppError::Bridge(BridgeError::transport("busy"))
        );

        let invalid: Result<(), AppError> = c
            .run(TransactionKind::Write, |_tx| async move { Err(AppError::Invalid) })
            .await;
        assert_eq!(invalid.unwrap_err(), AppError::Invalid);
    }

    #[tokio::test]
    async fn savepoint_failure_keeps_outer_transaction() {
        let mock = MockChannel::healthy();
        mock.push_response("begin_transaction", json!("outer"));
        mock.push_response("begin_transaction", json!("inner"));
        let c = coordinator(mock, TransactionPolicy::default());

        let result: BridgeResult<usize> = c
            .run(TransactionKind::Write, |tx| async move {
                let nested: BridgeResult<()> = tx
                    .savepoint(|sp| async move {
                        assert_eq!(sp.depth(), 1);
                        sp.execute("INSERT INTO todos VALUES (1)", vec![]).await?;
                        Err(BridgeError::transport("nested failure"))
                    })
                    .await;
                assert!(nested.is_err());
                assert!(tx.modified_tables().is_empty());
                assert!(!tx.is_finalized());
                Ok(tx.depth())
            })
            .await;
        assert_eq!(result.unwrap(), 0);

        let calls = c.conn.client().channel().calls();
        let finished: Vec<(String, serde_json::Value)> = calls
            .iter()
            .filter(|call| {
                call.command.ends_with("_transaction") && call.command != "begin_transaction"
            })
            .map(|call| (call.command.clone(), call.args["txId"].clone()))
            .collect();
        assert_eq!(
            finished,
            vec![
                ("rollback_transaction".to_string(), json!("inner")),
                ("commit_transaction".to_string(), json!("outer")),
            ]
        );
    }

    #[tokio::test]
    async fn savepoint_tables_publish_with_outer_commit() {
        let c = coordinator(MockChannel::healthy(), TransactionPolicy::default());
        let mut rx = c.notifier.subscribe();

        let result: BridgeResult<()> = c
            .run(TransactionKind::Write, |tx| async move {
                tx.savepoint(|sp| async move {
                    sp.execute("INSERT INTO todos VALUES (1)", vec![]).await?;
                    Ok::<_, BridgeError>(())
                })
                .await?;
                assert!(tx.modified_tables().contains("todos"));
                Ok::<_, BridgeError>(())
            })
            .await;
        result.unwrap();

        let update = rx.recv().await.unwrap();
        assert!(update.contains("todos"));
        assert!(update.contains("ps_crud"));
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back_before_the_next_begins() {
        let c = coordinator(MockChannel::healthy(), TransactionPolicy::default());

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            c.run(TransactionKind::Write, |tx| async move {
                tx.execute("INSERT INTO t VALUES (1)", vec![]).await?;
                std::future::pending::<()>().await;
                Ok::<_, BridgeError>(())
            }),
        )
        .await;
        assert!(abandoned.is_err());

        c.run(TransactionKind::Write, |tx| async move {
            tx.execute("INSERT INTO t VALUES (2)", vec![]).await?;
            Ok::<_, BridgeError>(())
        })
        .await
        .unwrap();

        assert_eq!(
            commands(&c),
            vec![
                "begin_transaction",
                "execute",
                "rollback_transaction",
                "begin_transaction",
                "execute",
                "commit_transaction",
            ]
        );
    }

    #[tokio::test]
    async fn panicking_callback_rolls_back() {
        let c = Arc::new(coordinator(MockChannel::healthy(), TransactionPolicy::default()));

        let task = {
            let c = Arc::clone(&c);
            tokio::spawn(async move {
                c.run(TransactionKind::Write, |tx| async move {
                    if !tx.id().is_empty() {
                        panic!("callback bug");
                    }
                    Ok::<_, BridgeError>(())
                })
                .await
            })
        };
        assert!(task.await.unwrap_err().is_panic());

        c.run(TransactionKind::Read, |_tx| async move { Ok::<_, BridgeError>(()) })
            .await
            .unwrap();
        assert_eq!(
            commands(&c),
            vec![
                "begin_transaction",
                "rollback_transaction",
                "begin_transaction",
                "commit_transaction",
            ]
        );
    }

    #[tokio::test]
    async fn same_task_cannot_wait_on_its_own_transaction() {
        let c = Arc::new(coordinator(MockChannel::healthy(), TransactionPolicy::default()));
        let inner = Arc::clone(&c);

        c.run(TransactionKind::Write, |_tx| async move {
            let err = inner
                .exclusive(async { Ok::<_, BridgeError>(()) })
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TransactionState);

            let nested: BridgeResult<()> = inner
                .run(TransactionKind::Write, |_tx| async move { Ok(()) })
                .await;
            assert_eq!(nested.unwrap_err().kind(), ErrorKind::TransactionState);
            Ok::<_, BridgeError>(())
        })
        .await
        .unwrap();

        inner_free(&c).await;
    }

    async fn inner_free(c: &TransactionCoordinator<MockChannel>) {
        let value = c.exclusive(async { Ok::<_, BridgeError>(5) }).await.unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn reject_policy_fails_concurrent_transaction() {
        let c = Arc::new(coordinator(MockChannel::healthy(), TransactionPolicy::Reject));
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let first = {
            let c = Arc::clone(&c);
            tokio::spawn(async move {
                c.run(TransactionKind::Write, |_tx| async move {
                    let _ = entered_tx.send(());
                    let _ = release_rx.await;
                    Ok::<_, BridgeError>(())
                })
                .await
            })
        };

        entered_rx.await.unwrap();
        assert!(c.is_busy());
        let second: BridgeResult<()> = c
            .run(TransactionKind::Write, |_tx| async move { Ok(()) })
            .await;
        assert_eq!(second.unwrap_err().kind(), ErrorKind::TransactionState);

        release_tx.send(()).unwrap();
        first.await.unwrap().unwrap();
        assert!(!c.is_busy());
    }

    #[tokio::test]
    async fn queue_policy_times_out() {
        let c = Arc::new(coordinator(
            MockChannel::healthy(),
            TransactionPolicy::Queue {
                timeout: Some(Duration::from_millis(20)),
            },
        ));
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let first = {
            let c = Arc::clone(&c);
            tokio::spawn(async move {
                c.run(TransactionKind::Write, |_tx| async move {
                    let _ = entered_tx.send(());
                    let _ = release_rx.await;
                    Ok::<_, BridgeError>(())
                })
                .await
            })
        };

        entered_rx.await.unwrap();
        let waited: BridgeResult<()> = c
            .run(TransactionKind::Write, |_tx| async move { Ok(()) })
            .await;
        let err = waited.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionState);
        assert!(err.to_string().contains("timed out"));

        release_tx.send(()).unwrap();
        first.await.unwrap().unwrap();
    }
}
