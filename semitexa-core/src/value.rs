//! Database values and materialized result sets.
//!
//! Every statement the adapter runs materializes its rows into [`Row`]
//! values before the connection goes back to the pool. Nothing in the
//! public API can hold a live cursor across an await point.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::error::{Error, Result};

/// A single MySQL value, decoupled from the driver's row representation.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Key form used to index and group rows during relation batching.
    ///
    /// Signed and unsigned integers fold into one numeric space so a PK
    /// decoded as `UInt(5)` matches a foreign key decoded as `Int(5)`.
    /// Returns `None` for values that cannot act as a lookup key.
    pub fn as_key(&self) -> Option<ValueKey> {
        match self {
            SqlValue::Int(v) => Some(ValueKey::Int(*v as i128)),
            SqlValue::UInt(v) => Some(ValueKey::Int(*v as i128)),
            SqlValue::Bool(v) => Some(ValueKey::Int(*v as i128)),
            SqlValue::Text(v) => Some(ValueKey::Text(v.clone())),
            SqlValue::Bytes(v) => Some(ValueKey::Bytes(v.clone())),
            _ => None,
        }
    }

    /// Human-readable type tag used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::UInt(_) => "uint",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::DateTime(_) => "datetime",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
            SqlValue::Json(_) => "json",
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::UInt(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => SqlValue::Null,
        }
    }
}

/// Hashable projection of a [`SqlValue`] for map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Int(i128),
    Text(String),
    Bytes(Vec<u8>),
}

/// One materialized row: column name to value, in select order.
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: IndexMap<String, SqlValue>,
}

impl Row {
    pub fn new() -> Self {
        Self { columns: IndexMap::new() }
    }

    pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SqlValue)> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Required text column; malformed metadata rows become `SchemaState`.
    pub fn str(&self, column: &str) -> Result<&str> {
        match self.get(column) {
            Some(SqlValue::Text(s)) => Ok(s),
            Some(SqlValue::Bytes(b)) => std::str::from_utf8(b)
                .map_err(|_| Error::SchemaState(format!("column {column} is not utf-8"))),
            other => Err(Error::SchemaState(format!(
                "expected text in column {column}, got {}",
                other.map(SqlValue::kind_name).unwrap_or("nothing")
            ))),
        }
    }

    /// Optional text column; `NULL` and absence both map to `None`.
    pub fn opt_str(&self, column: &str) -> Result<Option<String>> {
        match self.get(column) {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Text(s)) => Ok(Some(s.clone())),
            Some(SqlValue::Bytes(b)) => std::str::from_utf8(b)
                .map(|s| Some(s.to_string()))
                .map_err(|_| Error::SchemaState(format!("column {column} is not utf-8"))),
            Some(other) => Err(Error::SchemaState(format!(
                "expected text in column {column}, got {}",
                other.kind_name()
            ))),
        }
    }

    /// Required integer column.
    pub fn int(&self, column: &str) -> Result<i64> {
        match self.get(column) {
            Some(SqlValue::Int(v)) => Ok(*v),
            Some(SqlValue::UInt(v)) => Ok(*v as i64),
            other => Err(Error::SchemaState(format!(
                "expected integer in column {column}, got {}",
                other.map(SqlValue::kind_name).unwrap_or("nothing")
            ))),
        }
    }

    /// Optional integer column.
    pub fn opt_int(&self, column: &str) -> Result<Option<i64>> {
        match self.get(column) {
            None | Some(SqlValue::Null) => Ok(None),
            _ => self.int(column).map(Some),
        }
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Self { columns: iter.into_iter().collect() }
    }
}

/// Fully materialized outcome of one statement.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// Server-reported affected-row count, exactly as received. The smart
    /// upsert depends on MySQL's +1/+2/+0 convention being unaltered here.
    pub affected_rows: u64,
    pub last_insert_id: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Coarse classification of a resource field's in-memory type, used by the
/// collector's compatibility matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Bytes,
    DateTime,
    Date,
    Time,
    Json,
    Uuid,
}

/// Conversion between a resource field and its database value.
///
/// Implemented for the primitive field types the ORM supports; backed
/// enumerations get an implementation through [`backed_enum!`].
pub trait ColumnValue: Sized {
    /// Coarse kind for collector validation.
    fn source_kind() -> SourceKind;

    /// Tag recorded in the schema model for diagnostics.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Whether the type itself admits absence (`Option<T>`).
    fn nullable() -> bool {
        false
    }

    fn into_value(self) -> SqlValue;

    fn from_value(value: SqlValue) -> Result<Self>;
}

fn cast_err<T: ColumnValue>(value: &SqlValue) -> Error {
    Error::Database(format!(
        "cannot cast {} into {}",
        value.kind_name(),
        T::type_name()
    ))
}

macro_rules! int_column_value {
    ($($t:ty),*) => {$(
        impl ColumnValue for $t {
            fn source_kind() -> SourceKind { SourceKind::Integer }
            fn into_value(self) -> SqlValue { SqlValue::Int(self as i64) }
            fn from_value(value: SqlValue) -> Result<Self> {
                match value {
                    SqlValue::Int(v) => Ok(v as $t),
                    SqlValue::UInt(v) => Ok(v as $t),
                    SqlValue::Bool(v) => Ok(v as $t),
                    SqlValue::Text(ref s) => s.parse().map_err(|_| cast_err::<$t>(&value)),
                    other => Err(cast_err::<$t>(&other)),
                }
            }
        }
    )*};
}

int_column_value!(i8, i16, i32, i64);

macro_rules! uint_column_value {
    ($($t:ty),*) => {$(
        impl ColumnValue for $t {
            fn source_kind() -> SourceKind { SourceKind::Integer }
            fn into_value(self) -> SqlValue { SqlValue::UInt(self as u64) }
            fn from_value(value: SqlValue) -> Result<Self> {
                match value {
                    SqlValue::Int(v) => Ok(v as $t),
                    SqlValue::UInt(v) => Ok(v as $t),
                    SqlValue::Bool(v) => Ok(v as $t),
                    SqlValue::Text(ref s) => s.parse().map_err(|_| cast_err::<$t>(&value)),
                    other => Err(cast_err::<$t>(&other)),
                }
            }
        }
    )*};
}

uint_column_value!(u8, u16, u32, u64);

impl ColumnValue for f32 {
    fn source_kind() -> SourceKind {
        SourceKind::Float
    }
    fn into_value(self) -> SqlValue {
        SqlValue::Float(self as f64)
    }
    fn from_value(value: SqlValue) -> Result<Self> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl ColumnValue for f64 {
    fn source_kind() -> SourceKind {
        SourceKind::Float
    }
    fn into_value(self) -> SqlValue {
        SqlValue::Float(self)
    }
    fn from_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Float(v) => Ok(v),
            SqlValue::Int(v) => Ok(v as f64),
            SqlValue::UInt(v) => Ok(v as f64),
            SqlValue::Text(ref s) => s.parse().map_err(|_| cast_err::<f64>(&value)),
            other => Err(cast_err::<f64>(&other)),
        }
    }
}

impl ColumnValue for bool {
    fn source_kind() -> SourceKind {
        SourceKind::Boolean
    }
    fn into_value(self) -> SqlValue {
        SqlValue::Bool(self)
    }
    fn from_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Bool(v) => Ok(v),
            SqlValue::Int(v) => Ok(v != 0),
            SqlValue::UInt(v) => Ok(v != 0),
            other => Err(cast_err::<bool>(&other)),
        }
    }
}

impl ColumnValue for String {
    fn source_kind() -> SourceKind {
        SourceKind::Text
    }
    fn into_value(self) -> SqlValue {
        SqlValue::Text(self)
    }
    fn from_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Text(s) => Ok(s),
            SqlValue::Bytes(b) => String::from_utf8(b)
                .map_err(|e| Error::Database(format!("non-utf8 text column: {e}"))),
            SqlValue::Int(v) => Ok(v.to_string()),
            SqlValue::UInt(v) => Ok(v.to_string()),
            SqlValue::Float(v) => Ok(v.to_string()),
            other => Err(cast_err::<String>(&other)),
        }
    }
}

impl ColumnValue for Vec<u8> {
    fn source_kind() -> SourceKind {
        SourceKind::Bytes
    }
    fn into_value(self) -> SqlValue {
        SqlValue::Bytes(self)
    }
    fn from_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Bytes(b) => Ok(b),
            SqlValue::Text(s) => Ok(s.into_bytes()),
            other => Err(cast_err::<Vec<u8>>(&other)),
        }
    }
}

impl ColumnValue for NaiveDateTime {
    fn source_kind() -> SourceKind {
        SourceKind::DateTime
    }
    fn into_value(self) -> SqlValue {
        SqlValue::DateTime(self)
    }
    fn from_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::DateTime(v) => Ok(v),
            SqlValue::Date(v) => v
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| Error::Database("date out of range".into())),
            SqlValue::Text(ref s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map_err(|_| cast_err::<NaiveDateTime>(&value)),
            other => Err(cast_err::<NaiveDateTime>(&other)),
        }
    }
}

impl ColumnValue for DateTime<Utc> {
    fn source_kind() -> SourceKind {
        SourceKind::DateTime
    }
    fn into_value(self) -> SqlValue {
        SqlValue::DateTime(self.naive_utc())
    }
    fn from_value(value: SqlValue) -> Result<Self> {
        NaiveDateTime::from_value(value).map(|naive| naive.and_utc())
    }
}

impl ColumnValue for NaiveDate {
    fn source_kind() -> SourceKind {
        SourceKind::Date
    }
    fn into_value(self) -> SqlValue {
        SqlValue::Date(self)
    }
    fn from_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Date(v) => Ok(v),
            SqlValue::DateTime(v) => Ok(v.date()),
            SqlValue::Text(ref s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| cast_err::<NaiveDate>(&value)),
            other => Err(cast_err::<NaiveDate>(&other)),
        }
    }
}

impl ColumnValue for NaiveTime {
    fn source_kind() -> SourceKind {
        SourceKind::Time
    }
    fn into_value(self) -> SqlValue {
        SqlValue::Time(self)
    }
    fn from_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Time(v) => Ok(v),
            SqlValue::Text(ref s) => NaiveTime::parse_from_str(s, "%H:%M:%S")
                .map_err(|_| cast_err::<NaiveTime>(&value)),
            other => Err(cast_err::<NaiveTime>(&other)),
        }
    }
}

impl ColumnValue for serde_json::Value {
    fn source_kind() -> SourceKind {
        SourceKind::Json
    }
    fn into_value(self) -> SqlValue {
        SqlValue::Json(self)
    }
    fn from_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Json(v) => Ok(v),
            SqlValue::Text(ref s) => {
                serde_json::from_str(s).map_err(|_| cast_err::<serde_json::Value>(&value))
            }
            SqlValue::Bytes(ref b) => {
                serde_json::from_slice(b).map_err(|_| cast_err::<serde_json::Value>(&value))
            }
            other => Err(cast_err::<serde_json::Value>(&other)),
        }
    }
}

impl ColumnValue for Decimal {
    fn source_kind() -> SourceKind {
        SourceKind::Decimal
    }
    fn into_value(self) -> SqlValue {
        SqlValue::Text(self.to_string())
    }
    fn from_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Text(ref s) => s.parse().map_err(|_| cast_err::<Decimal>(&value)),
            SqlValue::Int(v) => Ok(Decimal::from(v)),
            SqlValue::UInt(v) => Ok(Decimal::from(v)),
            SqlValue::Float(v) => Decimal::try_from(v).map_err(|_| {
                Error::Database("float not representable as decimal".into())
            }),
            other => Err(cast_err::<Decimal>(&other)),
        }
    }
}

impl ColumnValue for uuid::Uuid {
    fn source_kind() -> SourceKind {
        SourceKind::Uuid
    }
    fn into_value(self) -> SqlValue {
        SqlValue::Bytes(self.as_bytes().to_vec())
    }
    fn from_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Bytes(ref b) => {
                uuid::Uuid::from_slice(b).map_err(|_| cast_err::<uuid::Uuid>(&value))
            }
            SqlValue::Text(ref s) => s.parse().map_err(|_| cast_err::<uuid::Uuid>(&value)),
            other => Err(cast_err::<uuid::Uuid>(&other)),
        }
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    fn source_kind() -> SourceKind {
        T::source_kind()
    }
    fn type_name() -> &'static str {
        T::type_name()
    }
    fn nullable() -> bool {
        true
    }
    fn into_value(self) -> SqlValue {
        match self {
            Some(v) => v.into_value(),
            None => SqlValue::Null,
        }
    }
    fn from_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Implements [`ColumnValue`] for a backed enumeration.
///
/// The backing scalar decides the column's source kind; unknown database
/// values surface as an error, never as a silent default.
///
/// ```ignore
/// backed_enum!(OrderStatus as i64 {
///     OrderStatus::Draft => 0,
///     OrderStatus::Placed => 1,
///     OrderStatus::Shipped => 2,
/// });
/// ```
#[macro_export]
macro_rules! backed_enum {
    ($name:ty as $backing:ty { $($variant:path => $repr:expr),+ $(,)? }) => {
        impl $crate::value::ColumnValue for $name {
            fn source_kind() -> $crate::value::SourceKind {
                <$backing as $crate::value::ColumnValue>::source_kind()
            }
            fn into_value(self) -> $crate::value::SqlValue {
                let backing: $backing = match self {
                    $($variant => $repr,)+
                };
                $crate::value::ColumnValue::into_value(backing)
            }
            fn from_value(value: $crate::value::SqlValue) -> $crate::error::Result<Self> {
                let backing = <$backing as $crate::value::ColumnValue>::from_value(value)?;
                $(if backing == $repr { return Ok($variant); })+
                Err($crate::error::Error::Database(format!(
                    "no {} variant backed by {:?}",
                    stringify!($name),
                    backing
                )))
            }
        }
    };
}
