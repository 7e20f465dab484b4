//! Shared helper functions for PostgreSQL row conversion.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};
use uuid::Uuid;

use roster_core::error::{StorageError, StorageResult};
use roster_core::models::{Record, Scalar};

/// Decode every column of `row`, keyed by its output name.
pub fn row_to_record(row: &PgRow) -> StorageResult<Record> {
    let mut record = Record::new();
    for column in row.columns() {
        let value = decode_column(row, column.ordinal())?;
        record.insert(column.name(), value);
    }
    Ok(record)
}

/// Decode one column into a [`Scalar`] based on its PostgreSQL type.
///
/// `DATE` columns come back as `YYYY-MM-DD` text.
pub fn decode_column(row: &PgRow, index: usize) -> StorageResult<Scalar> {
    let column = &row.columns()[index];
    let type_name = column.type_info().name();

    let value: Scalar = match type_name {
        "UUID" => get::<Uuid>(row, index)?.into(),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => get::<String>(row, index)?.into(),
        "INT2" => get::<i16>(row, index)?.map(i64::from).into(),
        "INT4" => get::<i32>(row, index)?.map(i64::from).into(),
        "INT8" => get::<i64>(row, index)?.into(),
        "FLOAT4" => get::<f32>(row, index)?.map(f64::from).into(),
        "FLOAT8" => get::<f64>(row, index)?.into(),
        "BOOL" => get::<bool>(row, index)?.into(),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, index)?.into(),
        "TIMESTAMP" => get::<NaiveDateTime>(row, index)?
            .map(|t| t.and_utc())
            .into(),
        "DATE" => get::<NaiveDate>(row, index)?
            .map(|d| d.to_string())
            .into(),
        other => {
            return Err(StorageError::SerializationError(format!(
                "{} has unsupported type {}",
                column.name(),
                other
            )));
        }
    };
    Ok(value)
}

fn get<T>(row: &PgRow, index: usize) -> StorageResult<Option<T>>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(index).map_err(|e| {
        StorageError::SerializationError(format!("column {} could not be decoded: {}", index, e))
    })
}
