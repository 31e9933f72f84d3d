use std::fmt;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::error::DriverError;
use crate::results::{CustomDbRow, ResultSet};
use crate::types::{Notification, RowValues};

/// Rows produced one at a time by a streaming query.
pub type RowStream<'a> = BoxStream<'a, Result<CustomDbRow, DriverError>>;

/// Action that hands a connection back to wherever it came from.
pub type ReleaseFn = Box<dyn FnOnce(Box<dyn DriverConnection>) + Send>;

/// One live connection as seen by the engine.
///
/// Implemented by the Postgres driver in [`crate::postgres`] and by anything
/// else that wants to stand in for it (a recording fake in tests, say).
#[async_trait]
pub trait DriverConnection: Send {
    /// Run a statement and collect every row.
    async fn query(&mut self, sql: &str, params: &[RowValues])
    -> Result<ResultSet, DriverError>;

    /// Run a statement and return the number of rows affected.
    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<u64, DriverError>;

    /// Run parameterless statements over the simple-query protocol.
    async fn batch_execute(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Start a statement whose rows are pulled lazily, in result-set order.
    fn query_stream<'a>(&'a mut self, sql: &'a str, params: &'a [RowValues]) -> RowStream<'a>;

    /// Wait for the next asynchronous notification on this connection.
    ///
    /// `Ok(None)` means the connection will never deliver one (pooled
    /// connections, or a closed session).
    async fn next_notification(&mut self) -> Result<Option<Notification>, DriverError> {
        Ok(None)
    }
}

/// A live connection plus the single-use action that releases it.
///
/// `release` consumes the handle, so it cannot run twice. A handle dropped
/// without being released (panic, cancelled future) runs its release action
/// from `Drop`.
pub struct ConnectionHandle {
    connection: Option<Box<dyn DriverConnection>>,
    release: Option<ReleaseFn>,
}

impl ConnectionHandle {
    #[must_use]
    pub fn new(connection: Box<dyn DriverConnection>, release: ReleaseFn) -> Self {
        Self {
            connection: Some(connection),
            release: Some(release),
        }
    }

    /// Handle whose release simply drops the connection, for drivers where
    /// dropping is what returns or closes it (bb8 checkouts, owned clients).
    #[must_use]
    pub fn dropping(connection: Box<dyn DriverConnection>) -> Self {
        Self::new(
            connection,
            Box::new(|connection: Box<dyn DriverConnection>| drop(connection)),
        )
    }

    /// Return the connection to its source.
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let (Some(connection), Some(release)) = (self.connection.take(), self.release.take()) {
            release(connection);
        }
    }

    fn connection_mut(&mut self) -> Result<&mut (dyn DriverConnection + 'static), DriverError> {
        self.connection
            .as_deref_mut()
            .ok_or_else(|| DriverError::message("connection already released"))
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("released", &self.connection.is_none())
            .finish()
    }
}

#[async_trait]
impl DriverConnection for ConnectionHandle {
    async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, DriverError> {
        self.connection_mut()?.query(sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<u64, DriverError> {
        self.connection_mut()?.execute(sql, params).await
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.connection_mut()?.batch_execute(sql).await
    }

    fn query_stream<'a>(&'a mut self, sql: &'a str, params: &'a [RowValues]) -> RowStream<'a> {
        match self.connection_mut() {
            Ok(conn) => conn.query_stream(sql, params),
            Err(err) => stream::once(async move { Err::<CustomDbRow, _>(err) }).boxed(),
        }
    }

    async fn next_notification(&mut self) -> Result<Option<Notification>, DriverError> {
        self.connection_mut()?.next_notification().await
    }
}
