//! Cursor codec.
//!
//! A cursor is the base64 encoding of a versioned JSON payload holding the
//! sort key values of one row, in key order:
//!
//! ```text
//! {"v":1,"k":[["User.given_name",{"t":"text","v":"Ada"}],["User.user_id",{"t":"uuid","v":"…"}]]}
//! ```
//!
//! Clients treat it as opaque. Decoding checks the version and that the
//! key names match the sort key of the request it is replayed against.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use crate::error::{PaginationError, PaginationResult, StorageError};
use crate::models::{Record, Scalar};
use crate::ports::Cursor;
use crate::services::sort::EffectiveSortKey;

const CURSOR_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct CursorPayload {
    v: u8,
    k: Vec<(String, Scalar)>,
}

/// Decoded cursor content: sort key name/value pairs, in key order.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorValues {
    entries: Vec<(String, Scalar)>,
}

impl CursorValues {
    pub fn new(entries: Vec<(String, Scalar)>) -> Self {
        Self { entries }
    }

    /// Values of `record` for every part of `key`.
    pub fn from_record(record: &Record, key: &EffectiveSortKey) -> Self {
        Self {
            entries: key
                .parts()
                .iter()
                .map(|part| {
                    let name = part.key();
                    let value = record.value(&name).clone();
                    (name, value)
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[(String, Scalar)] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn into_values(self) -> Vec<Scalar> {
        self.entries.into_iter().map(|(_, v)| v).collect()
    }
}

pub fn encode(values: &CursorValues) -> PaginationResult<Cursor> {
    let payload = CursorPayload {
        v: CURSOR_VERSION,
        k: values.entries.clone(),
    };
    let json = serde_json::to_vec(&payload)
        .map_err(|e| StorageError::SerializationError(format!("cursor encoding: {e}")))?;
    Ok(Cursor::new(BASE64.encode(json)))
}

pub fn decode(cursor: &Cursor) -> PaginationResult<CursorValues> {
    let bytes = BASE64
        .decode(cursor.as_str())
        .map_err(|_| PaginationError::InvalidCursor("not valid base64".into()))?;
    let payload: CursorPayload = serde_json::from_slice(&bytes)
        .map_err(|_| PaginationError::InvalidCursor("malformed payload".into()))?;
    if payload.v != CURSOR_VERSION {
        return Err(PaginationError::InvalidCursor(format!(
            "unsupported version {}",
            payload.v
        )));
    }
    Ok(CursorValues::new(payload.k))
}

/// Decode `cursor` and check it was issued for `key`.
///
/// Every value must have the kind of its key part. Null is accepted on
/// every part but the primary key, which is never null.
///
/// Returns the boundary values in key order.
pub fn decode_for(cursor: &Cursor, key: &EffectiveSortKey) -> PaginationResult<Vec<Scalar>> {
    let values = decode(cursor)?;
    let parts = key.parts();
    let names_match = values.entries.len() == parts.len()
        && values
            .entries
            .iter()
            .zip(parts)
            .all(|((name, _), part)| *name == part.key());
    if !names_match {
        return Err(PaginationError::InvalidCursor(
            "cursor was issued for a different sort".into(),
        ));
    }

    let last = parts.len() - 1;
    for (i, ((name, value), part)) in values.entries.iter().zip(parts).enumerate() {
        let nullable = i != last;
        if !(part.kind.accepts(value) || (nullable && value.is_null())) {
            return Err(PaginationError::InvalidCursor(format!(
                "{name} holds {}, expected {}",
                value.kind_name(),
                part.kind.as_str()
            )));
        }
    }
    Ok(values.into_values())
}

/// Cursor for `record` under `key`.
pub fn cursor_for(record: &Record, key: &EffectiveSortKey) -> PaginationResult<Cursor> {
    encode(&CursorValues::from_record(record, key))
}
