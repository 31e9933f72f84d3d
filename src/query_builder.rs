//! Parameterized SQL for the common write shapes.
//!
//! Every function here is pure: it turns a table name plus ordered
//! column/value pairs into SQL text with `$n` placeholders and the matching
//! parameter list. Values are always bound. Column names are quoted
//! identifiers and table names are used verbatim (so `schema.table` works),
//! which means neither may come from untrusted input.

use std::fmt::Write as _;

use crate::error::PgMiddlewareError;
use crate::types::RowValues;

/// Ordered `(column, value)` pairs; iteration order decides column and placeholder order.
pub type Columns<'a> = [(&'a str, RowValues)];

/// SQL text together with the parameters its placeholders refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAndParams {
    pub query: String,
    pub params: Vec<RowValues>,
}

/// Hands out `$1, $2, …` while collecting the bound values.
#[derive(Default)]
struct Binder {
    params: Vec<RowValues>,
}

impl Binder {
    fn bind(&mut self, value: &RowValues) -> String {
        self.params.push(value.clone());
        format!("${}", self.params.len())
    }

    fn finish(self, query: String) -> QueryAndParams {
        QueryAndParams {
            query,
            params: self.params,
        }
    }
}

/// Wrap a column (or channel) name in double quotes.
///
/// # Errors
/// Returns `PgMiddlewareError::Builder` for an empty name or one containing `"` or NUL.
pub fn quote_identifier(name: &str) -> Result<String, PgMiddlewareError> {
    if name.is_empty() {
        return Err(PgMiddlewareError::Builder("empty identifier".to_string()));
    }
    if name.contains('"') || name.contains('\0') {
        return Err(PgMiddlewareError::Builder(format!(
            "identifier {name:?} cannot be quoted verbatim"
        )));
    }
    Ok(format!("\"{name}\""))
}

fn check_table(table: &str) -> Result<(), PgMiddlewareError> {
    if table.trim().is_empty() {
        return Err(PgMiddlewareError::Builder("table name is required".to_string()));
    }
    Ok(())
}

fn quoted_list<'a>(
    columns: impl Iterator<Item = &'a str>,
) -> Result<Vec<String>, PgMiddlewareError> {
    columns.map(quote_identifier).collect()
}

/// `("a" = $1) AND ("b" = $2)`
fn where_conditions(
    conditions: &Columns<'_>,
    binder: &mut Binder,
) -> Result<String, PgMiddlewareError> {
    let mut parts = Vec::with_capacity(conditions.len());
    for (column, value) in conditions {
        parts.push(format!("({} = {})", quote_identifier(column)?, binder.bind(value)));
    }
    Ok(parts.join(" AND "))
}

/// `INSERT INTO table ("c1", …) VALUES ($1, …) [RETURNING "col"]`
///
/// An empty `values` list produces `INSERT INTO table DEFAULT VALUES`.
///
/// # Errors
/// Returns `PgMiddlewareError::Builder` for an empty table name or an unquotable identifier.
pub fn build_insert(
    table: &str,
    values: &Columns<'_>,
    returning: Option<&str>,
) -> Result<QueryAndParams, PgMiddlewareError> {
    check_table(table)?;
    let mut binder = Binder::default();
    let mut query = format!("INSERT INTO {table}");

    if values.is_empty() {
        query.push_str(" DEFAULT VALUES");
    } else {
        let columns = quoted_list(values.iter().map(|(column, _)| *column))?;
        let placeholders: Vec<String> = values.iter().map(|(_, value)| binder.bind(value)).collect();
        let _ = write!(
            query,
            " ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
    }

    if let Some(column) = returning {
        let _ = write!(query, " RETURNING {}", quote_identifier(column)?);
    }
    Ok(binder.finish(query))
}

/// `UPDATE table SET "c" = $1, … WHERE ("k" = $n) AND …`
///
/// Parameters are the values followed by the conditions.
///
/// # Errors
/// Returns `PgMiddlewareError::Builder` when `conditions` is empty (that would
/// update every row) or `values` is empty.
pub fn build_update(
    table: &str,
    values: &Columns<'_>,
    conditions: &Columns<'_>,
) -> Result<QueryAndParams, PgMiddlewareError> {
    check_table(table)?;
    if conditions.is_empty() {
        return Err(PgMiddlewareError::Builder(format!(
            "update of {table} requires at least one condition"
        )));
    }
    if values.is_empty() {
        return Err(PgMiddlewareError::Builder(format!(
            "update of {table} has no columns to set"
        )));
    }

    let mut binder = Binder::default();
    let mut assignments = Vec::with_capacity(values.len());
    for (column, value) in values {
        assignments.push(format!("{} = {}", quote_identifier(column)?, binder.bind(value)));
    }
    let filter = where_conditions(conditions, &mut binder)?;

    let query = format!("UPDATE {table} SET {} WHERE {filter}", assignments.join(", "));
    Ok(binder.finish(query))
}

/// `INSERT … ON CONFLICT (keys) DO UPDATE SET …` (or `DO NOTHING`).
///
/// Conflict-key columns come first, both as insert columns and as the
/// conflict target, then the value columns. Each value column is bound a
/// second time, to a fresh placeholder, for the `SET` clause. With no value
/// columns the statement ends in `DO NOTHING`.
///
/// # Errors
/// Returns `PgMiddlewareError::Builder` when `conflict_keys` is empty or an
/// identifier cannot be quoted.
pub fn build_upsert(
    table: &str,
    values: &Columns<'_>,
    conflict_keys: &Columns<'_>,
) -> Result<QueryAndParams, PgMiddlewareError> {
    check_table(table)?;
    if conflict_keys.is_empty() {
        return Err(PgMiddlewareError::Builder(format!(
            "upsert into {table} requires at least one conflict key"
        )));
    }

    let mut binder = Binder::default();
    let key_columns = quoted_list(conflict_keys.iter().map(|(column, _)| *column))?;
    let value_columns = quoted_list(values.iter().map(|(column, _)| *column))?;

    let placeholders: Vec<String> = conflict_keys
        .iter()
        .chain(values.iter())
        .map(|(_, value)| binder.bind(value))
        .collect();

    let insert_columns: Vec<&str> = key_columns
        .iter()
        .chain(value_columns.iter())
        .map(String::as_str)
        .collect();

    let mut query = format!(
        "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT ({})",
        insert_columns.join(", "),
        placeholders.join(", "),
        key_columns.join(", ")
    );

    if value_columns.is_empty() {
        query.push_str(" DO NOTHING");
    } else {
        let assignments: Vec<String> = value_columns
            .iter()
            .zip(values.iter())
            .map(|(column, (_, value))| format!("{column} = {}", binder.bind(value)))
            .collect();
        let _ = write!(query, " DO UPDATE SET {}", assignments.join(", "));
    }
    Ok(binder.finish(query))
}

/// `DELETE FROM table [WHERE ("k" = $1) AND …]`
///
/// No conditions means no `WHERE` clause: every row is deleted.
///
/// # Errors
/// Returns `PgMiddlewareError::Builder` for an empty table name or an unquotable identifier.
pub fn build_delete(
    table: &str,
    conditions: &Columns<'_>,
) -> Result<QueryAndParams, PgMiddlewareError> {
    check_table(table)?;
    let mut binder = Binder::default();
    let mut query = format!("DELETE FROM {table}");
    if !conditions.is_empty() {
        let filter = where_conditions(conditions, &mut binder)?;
        let _ = write!(query, " WHERE {filter}");
    }
    Ok(binder.finish(query))
}
