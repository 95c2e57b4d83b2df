// src/sink/value.rs

use anyhow::{bail, Context, Result};
use arrow::{
    array::{Array, AsArray},
    datatypes::{
        DataType, Date32Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type,
        Int8Type, TimeUnit, TimestampMicrosecondType, TimestampMillisecondType,
        TimestampNanosecondType, TimestampSecondType, UInt16Type, UInt32Type, UInt64Type,
        UInt8Type,
    },
};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::error::Error;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

/// One cell of a trip row, ready to be bound as a statement parameter.
///
/// Encoding follows the type of the destination column rather than the
/// source file, so e.g. an Arrow `Int64` can land in an `integer` column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
}

impl SqlValue {
    /// Read row `row` of `array`.
    pub fn from_array(array: &dyn Array, row: usize) -> Result<SqlValue> {
        if array.is_null(row) {
            return Ok(SqlValue::Null);
        }
        let value = match array.data_type() {
            DataType::Null => SqlValue::Null,
            DataType::Boolean => SqlValue::Bool(array.as_boolean().value(row)),
            DataType::Int8 => SqlValue::Int(array.as_primitive::<Int8Type>().value(row).into()),
            DataType::Int16 => SqlValue::Int(array.as_primitive::<Int16Type>().value(row).into()),
            DataType::Int32 => SqlValue::Int(array.as_primitive::<Int32Type>().value(row).into()),
            DataType::Int64 => SqlValue::Int(array.as_primitive::<Int64Type>().value(row)),
            DataType::UInt8 => SqlValue::Int(array.as_primitive::<UInt8Type>().value(row).into()),
            DataType::UInt16 => {
                SqlValue::Int(array.as_primitive::<UInt16Type>().value(row).into())
            }
            DataType::UInt32 => {
                SqlValue::Int(array.as_primitive::<UInt32Type>().value(row).into())
            }
            DataType::UInt64 => {
                let v = array.as_primitive::<UInt64Type>().value(row);
                SqlValue::Int(i64::try_from(v).context("UInt64 value exceeds bigint range")?)
            }
            DataType::Float32 => {
                SqlValue::Float(array.as_primitive::<Float32Type>().value(row).into())
            }
            DataType::Float64 => SqlValue::Float(array.as_primitive::<Float64Type>().value(row)),
            DataType::Utf8 => SqlValue::Text(array.as_string::<i32>().value(row).to_string()),
            DataType::LargeUtf8 => SqlValue::Text(array.as_string::<i64>().value(row).to_string()),
            DataType::Binary => SqlValue::Bytes(array.as_binary::<i32>().value(row).to_vec()),
            DataType::LargeBinary => {
                SqlValue::Bytes(array.as_binary::<i64>().value(row).to_vec())
            }
            DataType::Date32 => {
                let days = array.as_primitive::<Date32Type>().value(row);
                let date = DateTime::from_timestamp(i64::from(days) * 86_400, 0)
                    .context("date out of range")?
                    .date_naive();
                SqlValue::Date(date)
            }
            DataType::Timestamp(unit, _) => {
                let ts = match unit {
                    TimeUnit::Second => DateTime::from_timestamp(
                        array.as_primitive::<TimestampSecondType>().value(row),
                        0,
                    ),
                    TimeUnit::Millisecond => DateTime::from_timestamp_millis(
                        array.as_primitive::<TimestampMillisecondType>().value(row),
                    ),
                    TimeUnit::Microsecond => DateTime::from_timestamp_micros(
                        array.as_primitive::<TimestampMicrosecondType>().value(row),
                    ),
                    TimeUnit::Nanosecond => Some(DateTime::from_timestamp_nanos(
                        array.as_primitive::<TimestampNanosecondType>().value(row),
                    )),
                };
                SqlValue::Timestamp(ts.context("timestamp out of range")?.naive_utc())
            }
            other => bail!("unsupported column type {}", other),
        };
        Ok(value)
    }

    fn render(&self) -> Option<String> {
        match self {
            SqlValue::Null | SqlValue::Bytes(_) => None,
            SqlValue::Bool(b) => Some(b.to_string()),
            SqlValue::Int(v) => Some(v.to_string()),
            SqlValue::Float(v) => Some(v.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Timestamp(t) => Some(t.to_string()),
            SqlValue::Date(d) => Some(d.to_string()),
        }
    }
}

fn is_text(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        if let SqlValue::Null = self {
            return Ok(IsNull::Yes);
        }
        if is_text(ty) {
            if let SqlValue::Text(s) = self {
                return s.to_sql(ty, out);
            }
            if let Some(s) = self.render() {
                return s.to_sql(ty, out);
            }
        }

        match (self, ty) {
            (SqlValue::Bool(b), &Type::BOOL) => b.to_sql(ty, out),

            (SqlValue::Int(v), &Type::INT2) => i16::try_from(*v)?.to_sql(ty, out),
            (SqlValue::Int(v), &Type::INT4) => i32::try_from(*v)?.to_sql(ty, out),
            (SqlValue::Int(v), &Type::INT8) => v.to_sql(ty, out),
            (SqlValue::Int(v), &Type::FLOAT4) => (*v as f32).to_sql(ty, out),
            (SqlValue::Int(v), &Type::FLOAT8) => (*v as f64).to_sql(ty, out),

            (SqlValue::Float(v), &Type::FLOAT4) => (*v as f32).to_sql(ty, out),
            (SqlValue::Float(v), &Type::FLOAT8) => v.to_sql(ty, out),

            (SqlValue::Bytes(b), &Type::BYTEA) => b.to_sql(ty, out),

            (SqlValue::Timestamp(t), &Type::TIMESTAMP) => t.to_sql(ty, out),
            (SqlValue::Timestamp(t), &Type::TIMESTAMPTZ) => t.and_utc().to_sql(ty, out),
            (SqlValue::Date(d), &Type::DATE) => d.to_sql(ty, out),
            (SqlValue::Date(d), &Type::TIMESTAMP) => d.and_time(chrono::NaiveTime::MIN).to_sql(ty, out),

            (value, ty) => Err(format!("cannot bind {:?} to a {} column", value, ty).into()),
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
                    | Type::FLOAT4
                    | Type::FLOAT8
                    | Type::BYTEA
                    | Type::TIMESTAMP
                    | Type::TIMESTAMPTZ
                    | Type::DATE
            )
    }

    to_sql_checked!();
}
