use futures_util::StreamExt;
use tracing::trace;

use super::QueryEngine;
use crate::error::PgMiddlewareError;
use crate::pool::DriverConnection;
use crate::results::CustomDbRow;
use crate::types::RowValues;

impl QueryEngine {
    /// Stream the rows of `sql` into `on_row`, one at a time.
    ///
    /// The next row is not pulled until `on_row` returns, so a slow callback
    /// slows the query instead of buffering the result. Resolves with the
    /// number of rows delivered once the last callback has run and the
    /// connection is released.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::Query` if the statement fails or the stream
    /// breaks part way; rows delivered before the failure stay delivered.
    pub async fn each_row<F>(
        &self,
        sql: &str,
        params: &[RowValues],
        mut on_row: F,
    ) -> Result<u64, PgMiddlewareError>
    where
        F: FnMut(CustomDbRow) + Send,
    {
        let mut conn = self.acquire_connection().await?;
        let mut delivered = 0_u64;
        let outcome = {
            let mut rows = conn.query_stream(sql, params);
            loop {
                match rows.next().await {
                    Some(Ok(row)) => {
                        on_row(row);
                        delivered += 1;
                    }
                    Some(Err(e)) => break Err(e),
                    None => break Ok(()),
                }
            }
        };
        conn.release();
        trace!(delivered, "row stream finished");
        outcome
            .map(|()| delivered)
            .map_err(|e| PgMiddlewareError::query(sql, params, e))
    }
}
