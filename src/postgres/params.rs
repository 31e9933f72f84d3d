use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;
use uuid::Uuid;

use crate::types::RowValues;

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// Borrowed view of middleware values in the shape `tokio_postgres` expects.
pub struct Params<'a> {
    references: Vec<&'a (dyn ToSql + Sync)>,
}

impl<'a> Params<'a> {
    #[must_use]
    pub fn convert(params: &'a [RowValues]) -> Params<'a> {
        let mut references = Vec::with_capacity(params.len());
        for p in params {
            references.push(p as &(dyn ToSql + Sync));
        }
        Params { references }
    }

    #[must_use]
    pub fn as_refs(&self) -> &[&(dyn ToSql + Sync)] {
        &self.references
    }
}

/// Why a parameter could not be encoded for the type the server inferred.
#[derive(Debug, Error)]
pub enum ParamError {
    #[error("cannot bind a {variant} value to a parameter of type {ty}")]
    Mismatch { variant: &'static str, ty: Type },

    #[error("cannot bind {value} to a parameter of type {ty}: {reason}")]
    Unrepresentable {
        value: String,
        ty: Type,
        reason: String,
    },
}

impl ParamError {
    fn mismatch(value: &RowValues, ty: &Type) -> Self {
        let variant = match value {
            RowValues::Int(_) => "Int",
            RowValues::Float(_) => "Float",
            RowValues::Text(_) => "Text",
            RowValues::Bool(_) => "Bool",
            RowValues::Timestamp(_) => "Timestamp",
            RowValues::Null => "Null",
            RowValues::JSON(_) => "JSON",
            RowValues::Blob(_) => "Blob",
        };
        Self::Mismatch {
            variant,
            ty: ty.clone(),
        }
    }

    fn unrepresentable(value: impl Into<String>, ty: &Type, reason: impl fmt::Display) -> Self {
        Self::Unrepresentable {
            value: value.into(),
            ty: ty.clone(),
            reason: reason.to_string(),
        }
    }
}

fn narrow<T: TryFrom<i64>>(value: i64, ty: &Type) -> Result<T, ParamError>
where
    T::Error: fmt::Display,
{
    T::try_from(value).map_err(|e| ParamError::unrepresentable(value.to_string(), ty, e))
}

fn parse_text<T>(text: &str, ty: &Type) -> Result<T, ParamError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    text.trim()
        .parse::<T>()
        .map_err(|e| ParamError::unrepresentable(format!("text {text:?}"), ty, e))
}

// Same spellings the server's boolin accepts.
fn parse_bool(text: &str, ty: &Type) -> Result<bool, ParamError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
        _ => Err(ParamError::unrepresentable(
            format!("text {text:?}"),
            ty,
            "not a boolean",
        )),
    }
}

fn parse_timestamp(text: &str, ty: &Type) -> Result<NaiveDateTime, ParamError> {
    let trimmed = text.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| trimmed.parse::<NaiveDateTime>())
        .map_err(|e| ParamError::unrepresentable(format!("text {text:?}"), ty, e))
}

fn is_text_type(ty: &Type) -> bool {
    <&str as ToSql>::accepts(ty)
}

impl ToSql for RowValues {
    fn to_sql(&self, ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, BoxError> {
        match self {
            RowValues::Null => Ok(IsNull::Yes),
            // Integers narrow to whatever width the server inferred for the placeholder.
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(i) => match *ty {
                Type::INT2 => narrow::<i16>(*i, ty)?.to_sql(ty, out),
                Type::INT4 => narrow::<i32>(*i, ty)?.to_sql(ty, out),
                Type::INT8 => i.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*i).to_sql(ty, out),
                _ if is_text_type(ty) => i.to_string().to_sql(ty, out),
                _ => Err(ParamError::mismatch(self, ty).into()),
            },
            #[allow(clippy::cast_possible_truncation)]
            RowValues::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::FLOAT8 => f.to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*f)
                    .map_err(|e| ParamError::unrepresentable(f.to_string(), ty, e))?
                    .to_sql(ty, out),
                _ if is_text_type(ty) => f.to_string().to_sql(ty, out),
                _ => Err(ParamError::mismatch(self, ty).into()),
            },
            // Text is parsed into whatever the placeholder expects, as the server
            // would do for an untyped literal.
            RowValues::Text(s) => match *ty {
                Type::INT2 => parse_text::<i16>(s, ty)?.to_sql(ty, out),
                Type::INT4 => parse_text::<i32>(s, ty)?.to_sql(ty, out),
                Type::INT8 => parse_text::<i64>(s, ty)?.to_sql(ty, out),
                Type::FLOAT4 => parse_text::<f32>(s, ty)?.to_sql(ty, out),
                Type::FLOAT8 => parse_text::<f64>(s, ty)?.to_sql(ty, out),
                Type::NUMERIC => parse_text::<Decimal>(s, ty)?.to_sql(ty, out),
                Type::BOOL => parse_bool(s, ty)?.to_sql(ty, out),
                Type::UUID => parse_text::<Uuid>(s, ty)?.to_sql(ty, out),
                Type::DATE => parse_text::<NaiveDate>(s, ty)?.to_sql(ty, out),
                Type::TIMESTAMP => parse_timestamp(s, ty)?.to_sql(ty, out),
                Type::TIMESTAMPTZ => parse_text::<DateTime<Utc>>(s, ty)?.to_sql(ty, out),
                Type::JSON | Type::JSONB => serde_json::from_str::<Value>(s)
                    .map_err(|e| ParamError::unrepresentable(format!("text {s:?}"), ty, e))?
                    .to_sql(ty, out),
                Type::CHAR => match s.as_bytes() {
                    [byte] => i8::from_ne_bytes([*byte]).to_sql(ty, out),
                    _ => Err(ParamError::unrepresentable(
                        format!("text {s:?}"),
                        ty,
                        "\"char\" holds exactly one byte",
                    )
                    .into()),
                },
                _ if is_text_type(ty) => s.to_sql(ty, out),
                _ => Err(ParamError::mismatch(self, ty).into()),
            },
            RowValues::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                _ if is_text_type(ty) => b.to_string().to_sql(ty, out),
                _ => Err(ParamError::mismatch(self, ty).into()),
            },
            RowValues::Timestamp(dt) => match *ty {
                Type::TIMESTAMP => dt.to_sql(ty, out),
                Type::TIMESTAMPTZ => {
                    DateTime::<Utc>::from_naive_utc_and_offset(*dt, Utc).to_sql(ty, out)
                }
                Type::DATE => dt.date().to_sql(ty, out),
                _ => Err(ParamError::mismatch(self, ty).into()),
            },
            RowValues::JSON(jsval) => match *ty {
                Type::JSON | Type::JSONB => jsval.to_sql(ty, out),
                _ => Err(ParamError::mismatch(self, ty).into()),
            },
            RowValues::Blob(bytes) => match *ty {
                Type::BYTEA => bytes.to_sql(ty, out),
                _ => Err(ParamError::mismatch(self, ty).into()),
            },
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::NUMERIC
                | Type::CHAR
                | Type::BOOL
                | Type::UUID
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::JSON
                | Type::JSONB
                | Type::BYTEA
        ) || is_text_type(ty)
    }

    to_sql_checked!();
}
