// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rendering of PostgreSQL rows into records.
//!
//! sqlx decodes by Rust type, so each column is dispatched on its reported
//! type name. Timestamps are rendered so that `parse_timestamp` reads them
//! back; `timestamptz` becomes RFC 3339 in UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rowguard_core::{Record, RowGuardError};
use sqlx::postgres::PgRow;
use sqlx::types::{JsonValue, Uuid};
use sqlx::{Column, Row, TypeInfo};

pub fn decode_row(row: &PgRow) -> Result<Record, RowGuardError> {
    let mut fields = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        let value = render(row, index, type_name).map_err(|e| RowGuardError::Decode {
            column: column.name().to_string(),
            detail: format!("{type_name}: {e}"),
        })?;
        fields.push((column.name().to_string(), value));
    }
    Ok(Record::from_pairs(fields))
}

fn render(row: &PgRow, index: usize, type_name: &str) -> Result<Option<String>, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(|v| v.to_string()),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(|v| v.to_string()),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(|v| v.to_string()),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(|v| v.to_string()),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(|v| v.to_string()),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(|v| v.to_string()),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(|v| v.to_rfc3339_opts(SecondsFormat::Micros, true)),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|v| v.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(index)?.map(|v| v.to_string()),
        "TIME" => row.try_get::<Option<NaiveTime>, _>(index)?.map(|v| v.to_string()),
        "UUID" => row.try_get::<Option<Uuid>, _>(index)?.map(|v| v.to_string()),
        "JSON" | "JSONB" => row.try_get::<Option<JsonValue>, _>(index)?.map(|v| v.to_string()),
        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(index)?.map(hex::encode),
        // TEXT, VARCHAR, BPCHAR, NAME and anything else with a text decoder.
        _ => row.try_get::<Option<String>, _>(index)?,
    };
    Ok(value)
}
