//! SQL value types carried between mapped properties and the wire protocol.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::ToSql;
use uuid::Uuid;

/// Type hint for NULL values so parameters bind with the correct wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

/// Owned SQL value produced by property accessors and row decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with type hint for correct parameter binding.
    Null(SqlNullType),

    /// Boolean value (bit).
    Bool(bool),

    /// 16-bit signed integer (smallint, tinyint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real).
    F32(f32),

    /// 64-bit floating point (float).
    F64(f64),

    /// Text data (nvarchar).
    String(String),

    /// Binary data (varbinary).
    Bytes(Vec<u8>),

    /// UUID/GUID value (uniqueidentifier).
    Uuid(Uuid),

    /// Decimal value with fixed precision (decimal/numeric).
    Decimal(Decimal),

    /// Timestamp without timezone (datetime2).
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset (datetimeoffset).
    DateTimeOffset(DateTime<FixedOffset>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Get the SqlNullType for this value.
    #[must_use]
    pub fn null_type(&self) -> SqlNullType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => SqlNullType::Bool,
            SqlValue::I16(_) => SqlNullType::I16,
            SqlValue::I32(_) => SqlNullType::I32,
            SqlValue::I64(_) => SqlNullType::I64,
            SqlValue::F32(_) => SqlNullType::F32,
            SqlValue::F64(_) => SqlNullType::F64,
            SqlValue::String(_) => SqlNullType::String,
            SqlValue::Bytes(_) => SqlNullType::Bytes,
            SqlValue::Uuid(_) => SqlNullType::Uuid,
            SqlValue::Decimal(_) => SqlNullType::Decimal,
            SqlValue::DateTime(_) => SqlNullType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlNullType::DateTimeOffset,
            SqlValue::Date(_) => SqlNullType::Date,
            SqlValue::Time(_) => SqlNullType::Time,
        }
    }

    /// Short name of the value's kind, used in encode diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            SqlValue::Null(_) => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::I16(_) => "i16",
            SqlValue::I32(_) => "i32",
            SqlValue::I64(_) => "i64",
            SqlValue::F32(_) => "f32",
            SqlValue::F64(_) => "f64",
            SqlValue::String(_) => "string",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::DateTime(_) => "datetime",
            SqlValue::DateTimeOffset(_) => "datetimeoffset",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
        }
    }

    /// Convert to a boxed ToSql trait object for parameterized queries.
    ///
    /// NULLs bind with their hinted type so sp_executesql declares the
    /// matching parameter type.
    pub(crate) fn to_sql_param(&self) -> Box<dyn ToSql> {
        match self {
            SqlValue::Null(t) => match t {
                SqlNullType::Bool => Box::new(Option::<bool>::None),
                SqlNullType::I16 => Box::new(Option::<i16>::None),
                SqlNullType::I32 => Box::new(Option::<i32>::None),
                SqlNullType::I64 => Box::new(Option::<i64>::None),
                SqlNullType::F32 => Box::new(Option::<f32>::None),
                SqlNullType::F64 => Box::new(Option::<f64>::None),
                SqlNullType::String => Box::new(Option::<String>::None),
                SqlNullType::Bytes => Box::new(Option::<Vec<u8>>::None),
                SqlNullType::Uuid => Box::new(Option::<Uuid>::None),
                SqlNullType::Decimal => Box::new(Option::<Decimal>::None),
                SqlNullType::DateTime => Box::new(Option::<NaiveDateTime>::None),
                SqlNullType::DateTimeOffset => {
                    Box::new(Option::<DateTime<FixedOffset>>::None)
                }
                SqlNullType::Date => Box::new(Option::<NaiveDate>::None),
                SqlNullType::Time => Box::new(Option::<NaiveTime>::None),
            },
            SqlValue::Bool(b) => Box::new(*b),
            SqlValue::I16(i) => Box::new(*i),
            SqlValue::I32(i) => Box::new(*i),
            SqlValue::I64(i) => Box::new(*i),
            SqlValue::F32(f) => Box::new(*f),
            SqlValue::F64(f) => Box::new(*f),
            SqlValue::String(s) => Box::new(s.clone()),
            SqlValue::Bytes(b) => Box::new(b.clone()),
            SqlValue::Uuid(u) => Box::new(*u),
            SqlValue::Decimal(d) => Box::new(*d),
            SqlValue::DateTime(dt) => Box::new(*dt),
            SqlValue::DateTimeOffset(dto) => Box::new(*dto),
            SqlValue::Date(d) => Box::new(*d),
            SqlValue::Time(t) => Box::new(*t),
        }
    }
}

// Accessors used by mapping `set` closures during activation. Each returns
// None on NULL or a different kind; no silent coercion between kinds.
impl SqlValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<i16> {
        match self {
            SqlValue::I16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            SqlValue::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            SqlValue::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            SqlValue::Uuid(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            SqlValue::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_datetimeoffset(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            SqlValue::DateTimeOffset(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            SqlValue::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            SqlValue::Time(v) => Some(*v),
            _ => None,
        }
    }

    /// Take ownership of a string value.
    pub fn into_string(self) -> Option<String> {
        match self {
            SqlValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Take ownership of a binary value.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            SqlValue::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::I16(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        SqlValue::F32(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for SqlValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        SqlValue::DateTimeOffset(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_null() {
        assert!(SqlValue::Null(SqlNullType::String).is_null());
        assert!(!SqlValue::I32(42).is_null());
    }

    #[test]
    fn test_null_type_of_values() {
        assert_eq!(SqlValue::Bool(true).null_type(), SqlNullType::Bool);
        assert_eq!(SqlValue::I64(1).null_type(), SqlNullType::I64);
        assert_eq!(
            SqlValue::String("x".to_string()).null_type(),
            SqlNullType::String
        );
        assert_eq!(
            SqlValue::Null(SqlNullType::Decimal).null_type(),
            SqlNullType::Decimal
        );
    }

    #[test]
    fn test_from_implementations() {
        let v: SqlValue = 42i32.into();
        assert_eq!(v, SqlValue::I32(42));

        let v: SqlValue = "hello".into();
        assert_eq!(v, SqlValue::String("hello".to_string()));

        let v: SqlValue = vec![1u8, 2, 3].into();
        assert_eq!(v, SqlValue::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn test_accessors_reject_other_kinds() {
        let v = SqlValue::I32(7);
        assert_eq!(v.as_i32(), Some(7));
        assert_eq!(v.as_i64(), None);
        assert_eq!(v.as_str(), None);

        let null = SqlValue::Null(SqlNullType::I32);
        assert_eq!(null.as_i32(), None);
    }

    #[test]
    fn test_into_string() {
        let v = SqlValue::String("owned".to_string());
        assert_eq!(v.into_string(), Some("owned".to_string()));
        assert_eq!(SqlValue::I32(1).into_string(), None);
    }
}
