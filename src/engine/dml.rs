use super::QueryEngine;
use crate::error::{DriverError, PgMiddlewareError};
use crate::query_builder::{
    Columns, QueryAndParams, build_delete, build_insert, build_update, build_upsert,
};
use crate::types::RowValues;

impl QueryEngine {
    /// Insert one row into `table`.
    ///
    /// With `returning` set, the statement ends in `RETURNING "column"` and the
    /// value of that column is handed back; otherwise the result is `None`.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::Builder` for an unquotable column name, or
    /// `PgMiddlewareError::Query` if the insert fails or (with `returning`) the
    /// server sends back no value for the column.
    pub async fn insert(
        &self,
        table: &str,
        values: &Columns<'_>,
        returning: Option<&str>,
    ) -> Result<Option<RowValues>, PgMiddlewareError> {
        let QueryAndParams { query, params } = build_insert(table, values, returning)?;

        let Some(column) = returning else {
            self.execute(&query, &params).await?;
            return Ok(None);
        };

        let value = self
            .fetch_one(&query, &params)
            .await?
            .and_then(|mut row| row.take(column));
        match value {
            Some(value) => Ok(Some(value)),
            None => Err(PgMiddlewareError::query(
                &query,
                &params,
                DriverError::message(format!(
                    "insert into {table} returned no value for column {column}"
                )),
            )),
        }
    }

    /// Update the rows of `table` matching every condition; returns rows affected.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::Builder` when `conditions` or `values` is
    /// empty (nothing is sent to the server), or `PgMiddlewareError::Query` if
    /// the update fails.
    pub async fn update(
        &self,
        table: &str,
        values: &Columns<'_>,
        conditions: &Columns<'_>,
    ) -> Result<u64, PgMiddlewareError> {
        let QueryAndParams { query, params } = build_update(table, values, conditions)?;
        self.execute(&query, &params).await
    }

    /// Insert a row, or update it when the conflict keys already exist.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::Builder` when `conflict_keys` is empty, or
    /// `PgMiddlewareError::Query` if the statement fails.
    pub async fn upsert(
        &self,
        table: &str,
        values: &Columns<'_>,
        conflict_keys: &Columns<'_>,
    ) -> Result<u64, PgMiddlewareError> {
        let QueryAndParams { query, params } = build_upsert(table, values, conflict_keys)?;
        self.execute(&query, &params).await
    }

    /// Delete the rows of `table` matching every condition.
    ///
    /// Empty `conditions` deletes the whole table.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::Query` if the delete fails.
    pub async fn remove(
        &self,
        table: &str,
        conditions: &Columns<'_>,
    ) -> Result<u64, PgMiddlewareError> {
        let QueryAndParams { query, params } = build_delete(table, conditions)?;
        self.execute(&query, &params).await
    }
}
