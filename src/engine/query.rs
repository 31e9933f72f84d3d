use super::QueryEngine;
use crate::error::PgMiddlewareError;
use crate::pool::DriverConnection;
use crate::results::{CustomDbRow, ResultSet};
use crate::types::RowValues;

impl QueryEngine {
    /// Run `sql` and return its first row, if any.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::Connection` if no connection is available, or
    /// `PgMiddlewareError::Query` if the statement fails.
    pub async fn fetch_one(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Option<CustomDbRow>, PgMiddlewareError> {
        let result_set = self.fetch_all(sql, params).await?;
        Ok(result_set.into_first())
    }

    /// Run `sql` and return every row in result-set order.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::Connection` if no connection is available, or
    /// `PgMiddlewareError::Query` if the statement fails.
    pub async fn fetch_all(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, PgMiddlewareError> {
        let mut conn = self.acquire_connection().await?;
        let outcome = conn.query(sql, params).await;
        conn.release();
        outcome.map_err(|e| PgMiddlewareError::query(sql, params, e))
    }

    /// Run `sql` for its effect and return the number of rows affected.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::Connection` if no connection is available, or
    /// `PgMiddlewareError::Query` if the statement fails.
    pub async fn execute(&self, sql: &str, params: &[RowValues]) -> Result<u64, PgMiddlewareError> {
        let mut conn = self.acquire_connection().await?;
        let outcome = conn.execute(sql, params).await;
        conn.release();
        outcome.map_err(|e| PgMiddlewareError::query(sql, params, e))
    }

    /// Run one or more parameterless statements, separated by `;`.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::Connection` if no connection is available, or
    /// `PgMiddlewareError::Query` if any statement fails.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), PgMiddlewareError> {
        let mut conn = self.acquire_connection().await?;
        let outcome = conn.batch_execute(sql).await;
        conn.release();
        outcome.map_err(|e| PgMiddlewareError::query(sql, &[], e))
    }
}
