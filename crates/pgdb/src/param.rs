//! Parameter type inference and encoding.
//!
//! Every bound [`Value`] is narrowed to one of four storage types: boolean, null,
//! integer, or text. Structured values become JSON text and date/times become
//! UTC `YYYY-MM-DD HH:MM:SS` text. Other shapes are rejected.
//!
//! The parameter types of a prepared statement are inferred by the server, so a
//! [`TypedValue`] adapts its encoding to the slot it is bound to (a boolean bound
//! to an `integer` column is sent as `0`/`1`, date/time text bound to a
//! `timestamp` column is parsed back into a timestamp, JSON text bound to a
//! `jsonb` column is sent as JSON). Text bound to a numeric or boolean slot
//! is parsed; a value the slot cannot hold fails the execute.

use crate::error::{DbError, DbResult};
use crate::value::{DATETIME_FORMAT, Value};
use bytes::BytesMut;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::error::Error;
use std::str::FromStr;
use tokio_postgres::types::{IsNull, ToSql, Type};

/// Storage type a value is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    Null,
    Int,
    Text,
}

/// A value narrowed to its storage type, ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl TypedValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            TypedValue::Null => ParamType::Null,
            TypedValue::Bool(_) => ParamType::Bool,
            TypedValue::Int(_) => ParamType::Int,
            TypedValue::Text(_) => ParamType::Text,
        }
    }

    /// Render as a SQL literal.
    ///
    /// Text is single-quoted with embedded quotes doubled; this assumes
    /// `standard_conforming_strings = on` (the server default).
    pub fn to_sql_literal(&self) -> DbResult<String> {
        Ok(match self {
            TypedValue::Null => "NULL".to_string(),
            TypedValue::Bool(true) => "TRUE".to_string(),
            TypedValue::Bool(false) => "FALSE".to_string(),
            TypedValue::Int(i) => i.to_string(),
            TypedValue::Text(s) => {
                if s.contains('\0') {
                    return Err(DbError::InvalidArgument {
                        name: None,
                        type_name: "text containing NUL",
                    });
                }
                format!("'{}'", s.replace('\'', "''"))
            }
        })
    }
}

/// Infer the storage type of a value.
///
/// `name` is only used to label the error.
pub fn infer(name: Option<&str>, value: &Value) -> DbResult<TypedValue> {
    match value {
        Value::Bool(b) => Ok(TypedValue::Bool(*b)),
        Value::Null => Ok(TypedValue::Null),
        Value::Int(i) => Ok(TypedValue::Int(*i)),
        Value::Text(s) => Ok(TypedValue::Text(s.clone())),
        Value::Json(json @ (serde_json::Value::Array(_) | serde_json::Value::Object(_))) => {
            Ok(TypedValue::Text(json.to_string()))
        }
        Value::DateTime(dt) => Ok(TypedValue::Text(
            dt.with_timezone(&Utc).format(DATETIME_FORMAT).to_string(),
        )),
        other => Err(DbError::InvalidArgument {
            name: name.map(str::to_string),
            type_name: other.type_name(),
        }),
    }
}

fn is_text(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

type EncodeResult = Result<IsNull, Box<dyn Error + Sync + Send>>;

fn mismatch(what: &str, ty: &Type) -> Box<dyn Error + Sync + Send> {
    format!("cannot bind {what} to a {ty} parameter").into()
}

// Largest magnitudes a float holds without rounding.
const F32_EXACT: i64 = 1 << 24;
const F64_EXACT: i64 = 1 << 53;

fn exact_float(v: i64, limit: i64, ty: &Type) -> Result<i64, Box<dyn Error + Sync + Send>> {
    if v.unsigned_abs() > limit.unsigned_abs() {
        return Err(format!("integer {v} cannot be represented exactly as {ty}").into());
    }
    Ok(v)
}

fn encode_int(v: i64, ty: &Type, out: &mut BytesMut) -> EncodeResult {
    match *ty {
        Type::INT8 => v.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::OID => u32::try_from(v)?.to_sql(ty, out),
        Type::FLOAT8 => (exact_float(v, F64_EXACT, ty)? as f64).to_sql(ty, out),
        Type::FLOAT4 => (exact_float(v, F32_EXACT, ty)? as f32).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::Value::from(v).to_sql(ty, out),
        _ if is_text(ty) => v.to_string().as_str().to_sql(ty, out),
        _ => Err(mismatch("an integer", ty)),
    }
}

fn parse_bool(s: &str) -> Result<bool, Box<dyn Error + Sync + Send>> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" | "on" => Ok(true),
        "0" | "f" | "false" | "n" | "no" | "off" => Ok(false),
        _ => Err(format!("text {s:?} is not a boolean").into()),
    }
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> EncodeResult {
    match *ty {
        Type::BOOL => parse_bool(s)?.to_sql(ty, out),
        Type::INT8 => s.trim().parse::<i64>()?.to_sql(ty, out),
        Type::INT4 => s.trim().parse::<i32>()?.to_sql(ty, out),
        Type::INT2 => s.trim().parse::<i16>()?.to_sql(ty, out),
        Type::OID => s.trim().parse::<u32>()?.to_sql(ty, out),
        Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
        Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
        Type::NUMERIC => Decimal::from_str(s.trim())?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out),
        Type::TIMESTAMP => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)?
            .and_utc()
            .to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(s)?.to_sql(ty, out),
        _ if is_text(ty) => s.to_sql(ty, out),
        _ => Err(mismatch("text", ty)),
    }
}

impl ToSql for TypedValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> EncodeResult {
        match self {
            TypedValue::Null => Ok(IsNull::Yes),
            TypedValue::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                Type::JSON | Type::JSONB => serde_json::Value::Bool(*b).to_sql(ty, out),
                _ if is_text(ty) => (if *b { "1" } else { "0" }).to_sql(ty, out),
                _ => encode_int(i64::from(*b), ty, out),
            },
            TypedValue::Int(i) => {
                if *ty == Type::BOOL {
                    match i {
                        0 => false.to_sql(ty, out),
                        1 => true.to_sql(ty, out),
                        _ => Err(format!("integer {i} is not a boolean").into()),
                    }
                } else {
                    encode_int(*i, ty, out)
                }
            }
            TypedValue::Text(s) => encode_text(s, ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        is_text(ty)
            || matches!(
                *ty,
                Type::BOOL
                    | Type::INT2
                    | Type::INT4
                    | Type::INT8
                    | Type::OID
                    | Type::FLOAT4
                    | Type::FLOAT8
                    | Type::NUMERIC
                    | Type::JSON
                    | Type::JSONB
                    | Type::TIMESTAMP
                    | Type::TIMESTAMPTZ
                    | Type::DATE
                    | Type::UUID
            )
    }

    tokio_postgres::types::to_sql_checked!();
}
