use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::connection::{ConnectionHandle, DriverConnection, RowStream};
use crate::error::DriverError;
use crate::results::{CustomDbRow, ResultSet};
use crate::types::{Notification, RowValues};

/// Slot holding a transaction's pinned connection until the coordinator
/// takes it out for the final release.
pub(crate) type PinnedSlot = Arc<Mutex<Option<ConnectionHandle>>>;

/// Exclusive, temporary use of a pinned connection.
///
/// Dropping it unlocks the slot; the connection itself stays checked out.
pub(crate) struct PinnedConnection {
    guard: OwnedMutexGuard<Option<ConnectionHandle>>,
}

impl PinnedConnection {
    /// Lock the slot, failing if the owner has already released the connection.
    pub(crate) async fn lock(slot: &PinnedSlot) -> Result<Self, DriverError> {
        let guard = Arc::clone(slot).lock_owned().await;
        if guard.is_none() {
            return Err(released());
        }
        Ok(Self { guard })
    }

    /// Handle around this lock whose release leaves the pinned connection alone.
    pub(crate) fn into_handle(self) -> ConnectionHandle {
        ConnectionHandle::new(
            Box::new(self),
            Box::new(|_unlock_only: Box<dyn DriverConnection>| {}),
        )
    }

    fn inner(&mut self) -> Result<&mut ConnectionHandle, DriverError> {
        self.guard.as_mut().ok_or_else(released)
    }
}

fn released() -> DriverError {
    DriverError::message("transaction connection already released")
}

#[async_trait]
impl DriverConnection for PinnedConnection {
    async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, DriverError> {
        self.inner()?.query(sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<u64, DriverError> {
        self.inner()?.execute(sql, params).await
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.inner()?.batch_execute(sql).await
    }

    fn query_stream<'a>(&'a mut self, sql: &'a str, params: &'a [RowValues]) -> RowStream<'a> {
        match self.inner() {
            Ok(conn) => conn.query_stream(sql, params),
            Err(err) => stream::once(async move { Err::<CustomDbRow, _>(err) }).boxed(),
        }
    }

    async fn next_notification(&mut self) -> Result<Option<Notification>, DriverError> {
        self.inner()?.next_notification().await
    }
}
