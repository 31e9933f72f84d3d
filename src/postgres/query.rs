use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Kind, Type};
use uuid::Uuid;

use crate::error::DriverError;
use crate::results::{CustomDbRow, ResultSet};
use crate::types::RowValues;

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// Undecoded column bytes; accepts every type so decoding can pick by `Type`.
struct RawColumn<'a>(&'a [u8]);

impl<'a> FromSql<'a> for RawColumn<'a> {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(RawColumn(raw))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Decode one binary-format column value. `None` is SQL NULL.
///
/// NUMERIC comes back as `Text` so no precision is lost; UUID as its
/// hyphenated `Text` form.
///
/// # Errors
/// Returns an error for malformed input or a type with no `RowValues` mapping.
pub fn decode_value(ty: &Type, raw: Option<&[u8]>) -> Result<RowValues, BoxError> {
    let Some(raw) = raw else {
        return Ok(RowValues::Null);
    };
    let value = match *ty {
        Type::INT2 => RowValues::Int(i64::from(i16::from_sql(ty, raw)?)),
        Type::INT4 => RowValues::Int(i64::from(i32::from_sql(ty, raw)?)),
        Type::INT8 => RowValues::Int(i64::from_sql(ty, raw)?),
        Type::OID => RowValues::Int(i64::from(u32::from_sql(ty, raw)?)),
        Type::FLOAT4 => RowValues::Float(f64::from(f32::from_sql(ty, raw)?)),
        Type::FLOAT8 => RowValues::Float(f64::from_sql(ty, raw)?),
        Type::NUMERIC => RowValues::Text(Decimal::from_sql(ty, raw)?.to_string()),
        Type::BOOL => RowValues::Bool(bool::from_sql(ty, raw)?),
        Type::UUID => RowValues::Text(Uuid::from_sql(ty, raw)?.to_string()),
        Type::TIMESTAMP => RowValues::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
        Type::TIMESTAMPTZ => {
            RowValues::Timestamp(DateTime::<Utc>::from_sql(ty, raw)?.naive_utc())
        }
        Type::DATE => {
            let date = NaiveDate::from_sql(ty, raw)?;
            date.and_hms_opt(0, 0, 0)
                .map_or(RowValues::Null, RowValues::Timestamp)
        }
        Type::JSON | Type::JSONB => RowValues::JSON(Value::from_sql(ty, raw)?),
        Type::BYTEA => RowValues::Blob(Vec::<u8>::from_sql(ty, raw)?),
        Type::CHAR => {
            let [byte] = i8::from_sql(ty, raw)?.to_ne_bytes();
            RowValues::Text(char::from(byte).to_string())
        }
        // text, varchar, bpchar, name, unknown, citext
        _ if <String as FromSql>::accepts(ty) => RowValues::Text(String::from_sql(ty, raw)?),
        // enum labels travel as their text
        _ if matches!(ty.kind(), Kind::Enum(_)) => {
            RowValues::Text(std::str::from_utf8(raw)?.to_string())
        }
        _ => return Err(format!("unsupported column type {ty}").into()),
    };
    Ok(value)
}

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `DriverError` naming the column and its type if the value cannot be decoded.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues, DriverError> {
    let column = &row.columns()[idx];
    let raw: Option<RawColumn<'_>> = row.try_get(idx)?;
    decode_value(column.type_(), raw.map(|r| r.0)).map_err(|e| {
        DriverError::message(format!(
            "cannot decode column \"{}\" of type {}: {e}",
            column.name(),
            column.type_()
        ))
    })
}

/// Column names of a row, in select-list order.
#[must_use]
pub fn column_names(row: &Row) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

/// Convert one driver row, sharing an already-built column name list.
///
/// # Errors
/// Returns `DriverError` if any column cannot be decoded.
pub fn build_row(row: &Row, column_names: Arc<Vec<String>>) -> Result<CustomDbRow, DriverError> {
    let col_count = row.columns().len();
    let mut values = Vec::with_capacity(col_count);
    for idx in 0..col_count {
        values.push(postgres_extract_value(row, idx)?);
    }
    Ok(CustomDbRow::new(column_names, values))
}

/// Build a result set from raw Postgres rows
///
/// # Errors
/// Returns errors from result processing.
pub fn build_result_set_from_rows(rows: &[Row]) -> Result<ResultSet, DriverError> {
    let mut result_set = ResultSet::with_capacity(rows.len());
    if let Some(row) = rows.first() {
        result_set.set_column_names(Arc::new(column_names(row)));
    }

    for row in rows {
        let col_count = row.columns().len();
        let mut row_values = Vec::with_capacity(col_count);
        for idx in 0..col_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}
