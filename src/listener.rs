use tracing::{debug, trace};

use crate::engine::QueryEngine;
use crate::error::{DriverError, PgMiddlewareError};
use crate::pool::{ConnectionHandle, DriverConnection};
use crate::query_builder::quote_identifier;
use crate::types::Notification;

impl QueryEngine {
    /// Wait for the next `NOTIFY` on `channel`.
    ///
    /// Opens a dedicated connection, issues `LISTEN`, and resolves with the
    /// first notification whose channel matches exactly; notifications on
    /// other channels are skipped. The connection is closed before this
    /// returns. There is no built-in timeout: wrap the call in
    /// `tokio::time::timeout`, and dropping the future closes the connection.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::Builder` for an unquotable channel name,
    /// `PgMiddlewareError::Connection` if the connection cannot be opened or
    /// stops delivering notifications, or `PgMiddlewareError::Query` if
    /// `LISTEN` fails.
    pub async fn listen(&self, channel: &str) -> Result<Notification, PgMiddlewareError> {
        let listen_sql = format!("LISTEN {}", quote_identifier(channel)?);
        let mut conn = self.acquire_dedicated_connection().await?;
        let outcome = wait_for(&mut conn, &listen_sql, channel).await;
        conn.release();
        debug!(channel, "listener connection closed");
        outcome
    }
}

async fn wait_for(
    conn: &mut ConnectionHandle,
    listen_sql: &str,
    channel: &str,
) -> Result<Notification, PgMiddlewareError> {
    conn.batch_execute(listen_sql)
        .await
        .map_err(|e| PgMiddlewareError::query(listen_sql, &[], e))?;
    debug!(channel, "listening");

    loop {
        let next = conn
            .next_notification()
            .await
            .map_err(|e| PgMiddlewareError::connection("notification stream failed", e))?;
        match next {
            Some(notification) if notification.channel == channel => return Ok(notification),
            Some(other) => trace!(channel = %other.channel, "ignoring notification"),
            None => {
                return Err(PgMiddlewareError::connection(
                    "notification stream ended",
                    DriverError::message(format!("connection closed while listening on {channel}")),
                ));
            }
        }
    }
}
