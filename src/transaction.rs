//! Multi-statement transactions on one pinned connection.
//!
//! [`QueryEngine::transaction`] checks out a connection, pins it into a child
//! engine, and runs the operations in order between `BEGIN` and `COMMIT`. The
//! first failing operation stops the sequence and the transaction is rolled
//! back. Either way the pinned connection is released exactly once, after the
//! final `COMMIT` or `ROLLBACK`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::engine::QueryEngine;
use crate::error::PgMiddlewareError;
use crate::pool::{ConnectionHandle, DriverConnection};
use crate::pool::pinned::PinnedSlot;

/// Future produced by one transaction operation.
pub type TxFuture<T> = Pin<Box<dyn Future<Output = Result<T, PgMiddlewareError>> + Send>>;

/// One step of a transaction.
///
/// The step receives the transaction's child engine; every query it runs
/// through that engine lands on the pinned connection.
///
/// ```rust,no_run
/// use pg_middleware::prelude::*;
///
/// # async fn demo(engine: QueryEngine) -> Result<(), PgMiddlewareError> {
/// let moved = engine
///     .transaction(vec![
///         TxOp::new(|tx: QueryEngine| async move {
///             tx.execute("UPDATE accounts SET balance = balance - 10 WHERE id = $1", &[RowValues::Int(1)])
///                 .await
///         }),
///         TxOp::new(|tx: QueryEngine| async move {
///             tx.execute("UPDATE accounts SET balance = balance + 10 WHERE id = $1", &[RowValues::Int(2)])
///                 .await
///         }),
///     ])
///     .await?;
/// assert_eq!(moved, Some(1));
/// # Ok(()) }
/// ```
pub struct TxOp<T> {
    run: Box<dyn FnOnce(QueryEngine) -> TxFuture<T> + Send>,
}

impl<T: 'static> TxOp<T> {
    pub fn new<F, Fut>(op: F) -> Self
    where
        F: FnOnce(QueryEngine) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, PgMiddlewareError>> + Send + 'static,
    {
        Self {
            run: Box::new(move |engine| Box::pin(op(engine))),
        }
    }
}

impl<T> fmt::Debug for TxOp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TxOp")
    }
}

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Started,
    Committed,
    RolledBack,
}

impl QueryEngine {
    /// Run `ops` atomically and return the last operation's result.
    ///
    /// An empty sequence commits an empty transaction and yields `None`.
    /// Operations must use the engine they are given; work done through any
    /// other engine is outside the transaction.
    ///
    /// If the returned future is dropped before it completes, a `ROLLBACK` is
    /// spawned on the current runtime and the connection released afterwards.
    ///
    /// # Errors
    /// - `PgMiddlewareError::Connection` if no connection can be checked out
    ///   (no statement is sent).
    /// - The first error raised by `BEGIN`, an operation, or `COMMIT`, after
    ///   the transaction has been rolled back.
    /// - `PgMiddlewareError::Rollback` if the rollback itself also failed; it
    ///   carries both errors.
    pub async fn transaction<T>(&self, ops: Vec<TxOp<T>>) -> Result<Option<T>, PgMiddlewareError>
    where
        T: Send + 'static,
    {
        let handle = self.acquire_connection().await?;
        let mut tx = Transaction::pin(self, handle);

        match tx.run(ops).await {
            Ok(value) => {
                tx.release().await;
                Ok(value)
            }
            Err(cause) => match tx.rollback().await {
                Ok(()) => Err(cause),
                Err(rollback) => {
                    warn!(cause = %cause, rollback = %rollback, "rollback failed");
                    Err(PgMiddlewareError::Rollback {
                        cause: Box::new(cause),
                        rollback: Box::new(rollback),
                    })
                }
            },
        }
    }
}

struct Transaction {
    slot: PinnedSlot,
    child: QueryEngine,
    state: TxState,
    released: bool,
}

impl Transaction {
    fn pin(parent: &QueryEngine, handle: ConnectionHandle) -> Self {
        let slot: PinnedSlot = Arc::new(Mutex::new(Some(handle)));
        Self {
            child: parent.pinned_child(Arc::clone(&slot)),
            slot,
            state: TxState::Idle,
            released: false,
        }
    }

    fn transition(&mut self, next: TxState) {
        debug!(from = ?self.state, to = ?next, "transaction state");
        self.state = next;
    }

    async fn run<T>(&mut self, ops: Vec<TxOp<T>>) -> Result<Option<T>, PgMiddlewareError> {
        self.child.execute_batch("BEGIN").await?;
        self.transition(TxState::Started);

        let mut last = None;
        for op in ops {
            last = Some((op.run)(self.child.clone()).await?);
        }

        self.child.execute_batch("COMMIT").await?;
        self.transition(TxState::Committed);
        Ok(last)
    }

    async fn rollback(&mut self) -> Result<(), PgMiddlewareError> {
        let outcome = self.child.execute_batch("ROLLBACK").await;
        self.transition(TxState::RolledBack);
        self.release().await;
        outcome
    }

    /// Hand the pinned connection back to its source; the child engine is dead afterwards.
    async fn release(&mut self) {
        let handle = self.slot.lock().await.take();
        if let Some(handle) = handle {
            handle.release();
            debug!(state = ?self.state, "transaction connection released");
        }
        self.released = true;
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let slot = Arc::clone(&self.slot);
        let committed = self.state == TxState::Committed;
        if let Ok(runtime) = Handle::try_current() {
            warn!(state = ?self.state, "transaction dropped before completion; rolling back");
            runtime.spawn(async move {
                let Some(mut handle) = slot.lock().await.take() else {
                    return;
                };
                if !committed && let Err(e) = handle.batch_execute("ROLLBACK").await {
                    warn!(error = %e, "rollback of abandoned transaction failed");
                }
                handle.release();
            });
        }
    }
}
