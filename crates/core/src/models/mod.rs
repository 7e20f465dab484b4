//! Domain models shared by the query engine and its adapters.
//!
//! Rows travel through the engine as [`Record`]s, a map from qualified
//! column names (`"Alias.column"`) to [`Scalar`] values. Entity types are
//! built from records through [`FromRecord`], which keeps the paginator
//! independent of any concrete schema.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

// =============================================================================
// Scalar Values
// =============================================================================

/// A single column value, as fetched from or bound to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two non-null values of compatible kinds.
    ///
    /// Returns `None` when either side is null or the kinds cannot be
    /// compared, mirroring SQL's three-valued comparison.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Uuid(a), Self::Uuid(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used when sorting rows: nulls sort after every value,
    /// which matches PostgreSQL's default `NULLS LAST` for ascending order.
    pub fn sort_cmp(&self, other: &Scalar) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

/// Generates `From<T> for Scalar` for the plain value types.
macro_rules! scalar_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

scalar_from!(
    bool => Bool,
    i32 => Int,
    i64 => Int,
    f64 => Float,
    String => Text,
    &str => Text,
    Uuid => Uuid,
    DateTime<Utc> => Timestamp,
);

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

// =============================================================================
// Records
// =============================================================================

static NULL: Scalar = Scalar::Null;

/// One fetched row, keyed by qualified column name (`"User.user_id"`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<String, Scalar>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Scalar>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.values.get(key)
    }

    /// Value for `key`, or `Null` when the column is absent.
    pub fn value(&self, key: &str) -> &Scalar {
        self.values.get(key).unwrap_or(&NULL)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn uuid(&self, key: &str) -> StorageResult<Uuid> {
        match self.value(key) {
            Scalar::Uuid(v) => Ok(*v),
            other => Err(type_mismatch(key, "uuid", other)),
        }
    }

    pub fn opt_uuid(&self, key: &str) -> StorageResult<Option<Uuid>> {
        match self.value(key) {
            Scalar::Null => Ok(None),
            _ => self.uuid(key).map(Some),
        }
    }

    pub fn text(&self, key: &str) -> StorageResult<String> {
        match self.value(key) {
            Scalar::Text(v) => Ok(v.clone()),
            other => Err(type_mismatch(key, "text", other)),
        }
    }

    pub fn opt_text(&self, key: &str) -> StorageResult<Option<String>> {
        match self.value(key) {
            Scalar::Null => Ok(None),
            _ => self.text(key).map(Some),
        }
    }

    pub fn timestamp(&self, key: &str) -> StorageResult<DateTime<Utc>> {
        match self.value(key) {
            Scalar::Timestamp(v) => Ok(*v),
            other => Err(type_mismatch(key, "timestamp", other)),
        }
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn type_mismatch(key: &str, expected: &str, actual: &Scalar) -> StorageError {
    StorageError::SerializationError(format!(
        "column {key}: expected {expected}, got {}",
        actual.kind_name()
    ))
}

/// Builds a domain value from a fetched [`Record`].
pub trait FromRecord: Sized {
    fn from_record(record: &Record) -> StorageResult<Self>;
}

impl FromRecord for Record {
    fn from_record(record: &Record) -> StorageResult<Self> {
        Ok(record.clone())
    }
}

// =============================================================================
// Entities
// =============================================================================

/// Lifecycle status shared by users, organizations and memberships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    Inactive,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> StorageResult<Self> {
        match value {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(StorageError::SerializationError(format!(
                "unknown status: {other}"
            ))),
        }
    }
}

/// A person known to the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Status,
    /// Free-form `MM-YYYY` value as entered by the school.
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A school or school group owning users through memberships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: Option<String>,
    pub status: Status,
    pub owner_user_id: Option<Uuid>,
    /// Email of the owner, resolved through a left join.
    pub owner_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================
