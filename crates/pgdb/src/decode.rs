//! Native row decoding.

use crate::error::{DbError, DbResult};
use crate::value::{Record, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Type};

fn get<'a, T>(row: &'a Row, idx: usize) -> DbResult<Option<T>>
where
    T: FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| DbError::decode(row.columns()[idx].name(), e.to_string()))
}

/// Decode one column of a native row.
///
/// Timestamps without a zone are read as UTC, which is the session zone.
pub fn column_value(row: &Row, idx: usize) -> DbResult<Value> {
    let column = &row.columns()[idx];
    let ty = column.type_();
    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, idx)?.map(Value::from),
        Type::INT4 => get::<i32>(row, idx)?.map(Value::from),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::Int),
        Type::OID => get::<u32>(row, idx)?.map(Value::from),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|f| Value::Float(f64::from(f))),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(Value::Float),
        Type::NUMERIC => get::<Decimal>(row, idx)?.map(Value::Decimal),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get::<String>(row, idx)?.map(Value::Text)
        }
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx)?.map(Value::Json),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx)?
            .map(|naive| Value::from(naive.and_utc())),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx)?.map(Value::from),
        Type::DATE => get::<NaiveDate>(row, idx)?.map(Value::Date),
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(Value::Bytes),
        Type::UUID => get::<uuid::Uuid>(row, idx)?.map(Value::Uuid),
        _ => {
            return Err(DbError::decode(
                column.name(),
                format!("unsupported column type {ty}"),
            ));
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Decode a native row into an associative record.
pub fn record(row: &Row) -> DbResult<Record> {
    let mut record = Record::new();
    for (idx, column) in row.columns().iter().enumerate() {
        record.push(column.name(), column_value(row, idx)?);
    }
    Ok(record)
}
