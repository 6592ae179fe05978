//! Semantic SQL column types.
//!
//! A `ColumnType` is the single description a mapping gives for a column; the
//! table DDL, the table type DDL, parameter binding, and result-row decoding
//! are all derived from it.

use tiberius::Row;

use crate::core::value::{SqlNullType, SqlValue};
use crate::error::Result;

/// Semantic SQL type of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// `bit`
    Bit,
    /// `tinyint` (decoded into an i16 slot)
    TinyInt,
    /// `smallint`
    SmallInt,
    /// `int`
    Int,
    /// `bigint`
    BigInt,
    /// `real` (32-bit float)
    Real,
    /// `float` (64-bit float)
    Float,
    /// `decimal(precision, scale)`
    Decimal { precision: u8, scale: u8 },
    /// `nvarchar(n)`; `None` means `nvarchar(max)`
    NVarChar(Option<u16>),
    /// `varbinary(n)`; `None` means `varbinary(max)`
    VarBinary(Option<u16>),
    /// `uniqueidentifier`
    UniqueIdentifier,
    /// `datetime2`
    DateTime2,
    /// `date`
    Date,
    /// `time`
    Time,
    /// `datetimeoffset`
    DateTimeOffset,
}

impl ColumnType {
    /// Render the DDL type string for table and table-type columns.
    pub fn sql_type(&self) -> String {
        match self {
            ColumnType::Bit => "BIT".to_string(),
            ColumnType::TinyInt => "TINYINT".to_string(),
            ColumnType::SmallInt => "SMALLINT".to_string(),
            ColumnType::Int => "INT".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Real => "REAL".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Decimal { precision, scale } => {
                format!("DECIMAL({}, {})", precision, scale)
            }
            ColumnType::NVarChar(Some(len)) => format!("NVARCHAR({})", len),
            ColumnType::NVarChar(None) => "NVARCHAR(MAX)".to_string(),
            ColumnType::VarBinary(Some(len)) => format!("VARBINARY({})", len),
            ColumnType::VarBinary(None) => "VARBINARY(MAX)".to_string(),
            ColumnType::UniqueIdentifier => "UNIQUEIDENTIFIER".to_string(),
            ColumnType::DateTime2 => "DATETIME2".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTimeOffset => "DATETIMEOFFSET".to_string(),
        }
    }

    /// The NULL type hint used when a mapping produces no value.
    pub fn null_type(&self) -> SqlNullType {
        match self {
            ColumnType::Bit => SqlNullType::Bool,
            ColumnType::TinyInt | ColumnType::SmallInt => SqlNullType::I16,
            ColumnType::Int => SqlNullType::I32,
            ColumnType::BigInt => SqlNullType::I64,
            ColumnType::Real => SqlNullType::F32,
            ColumnType::Float => SqlNullType::F64,
            ColumnType::Decimal { .. } => SqlNullType::Decimal,
            ColumnType::NVarChar(_) => SqlNullType::String,
            ColumnType::VarBinary(_) => SqlNullType::Bytes,
            ColumnType::UniqueIdentifier => SqlNullType::Uuid,
            ColumnType::DateTime2 => SqlNullType::DateTime,
            ColumnType::Date => SqlNullType::Date,
            ColumnType::Time => SqlNullType::Time,
            ColumnType::DateTimeOffset => SqlNullType::DateTimeOffset,
        }
    }

    /// Check whether a value produced by a property accessor can be bound to
    /// a column of this type. NULL of any hint is always accepted (it is
    /// re-hinted to this column's type at encode time).
    pub fn accepts(&self, value: &SqlValue) -> bool {
        if value.is_null() {
            return true;
        }
        matches!(
            (self, value),
            (ColumnType::Bit, SqlValue::Bool(_))
                | (ColumnType::TinyInt, SqlValue::I16(_))
                | (ColumnType::SmallInt, SqlValue::I16(_))
                | (ColumnType::Int, SqlValue::I32(_))
                | (ColumnType::BigInt, SqlValue::I64(_))
                | (ColumnType::Real, SqlValue::F32(_))
                | (ColumnType::Float, SqlValue::F64(_))
                | (ColumnType::Decimal { .. }, SqlValue::Decimal(_))
                | (ColumnType::NVarChar(_), SqlValue::String(_))
                | (ColumnType::VarBinary(_), SqlValue::Bytes(_))
                | (ColumnType::UniqueIdentifier, SqlValue::Uuid(_))
                | (ColumnType::DateTime2, SqlValue::DateTime(_))
                | (ColumnType::Date, SqlValue::Date(_))
                | (ColumnType::Time, SqlValue::Time(_))
                | (ColumnType::DateTimeOffset, SqlValue::DateTimeOffset(_))
        )
    }

    /// Decode one result-row column into a `SqlValue` according to this type.
    ///
    /// NULL (or a missing value) decodes to `Null` with this type's hint; a
    /// wire type the driver cannot convert surfaces as a database error.
    pub fn decode(&self, row: &Row, idx: usize) -> Result<SqlValue> {
        let value = match self {
            ColumnType::Bit => row
                .try_get::<bool, _>(idx)?
                .map(SqlValue::Bool)
                .unwrap_or(SqlValue::Null(SqlNullType::Bool)),
            ColumnType::TinyInt => row
                .try_get::<u8, _>(idx)?
                .map(|v| SqlValue::I16(v as i16))
                .unwrap_or(SqlValue::Null(SqlNullType::I16)),
            ColumnType::SmallInt => row
                .try_get::<i16, _>(idx)?
                .map(SqlValue::I16)
                .unwrap_or(SqlValue::Null(SqlNullType::I16)),
            ColumnType::Int => row
                .try_get::<i32, _>(idx)?
                .map(SqlValue::I32)
                .unwrap_or(SqlValue::Null(SqlNullType::I32)),
            ColumnType::BigInt => row
                .try_get::<i64, _>(idx)?
                .map(SqlValue::I64)
                .unwrap_or(SqlValue::Null(SqlNullType::I64)),
            ColumnType::Real => row
                .try_get::<f32, _>(idx)?
                .map(SqlValue::F32)
                .unwrap_or(SqlValue::Null(SqlNullType::F32)),
            ColumnType::Float => row
                .try_get::<f64, _>(idx)?
                .map(SqlValue::F64)
                .unwrap_or(SqlValue::Null(SqlNullType::F64)),
            ColumnType::Decimal { .. } => row
                .try_get::<rust_decimal::Decimal, _>(idx)?
                .map(SqlValue::Decimal)
                .unwrap_or(SqlValue::Null(SqlNullType::Decimal)),
            ColumnType::NVarChar(_) => row
                .try_get::<&str, _>(idx)?
                .map(|s| SqlValue::String(s.to_string()))
                .unwrap_or(SqlValue::Null(SqlNullType::String)),
            ColumnType::VarBinary(_) => row
                .try_get::<&[u8], _>(idx)?
                .map(|b| SqlValue::Bytes(b.to_vec()))
                .unwrap_or(SqlValue::Null(SqlNullType::Bytes)),
            ColumnType::UniqueIdentifier => row
                .try_get::<uuid::Uuid, _>(idx)?
                .map(SqlValue::Uuid)
                .unwrap_or(SqlValue::Null(SqlNullType::Uuid)),
            ColumnType::DateTime2 => row
                .try_get::<chrono::NaiveDateTime, _>(idx)?
                .map(SqlValue::DateTime)
                .unwrap_or(SqlValue::Null(SqlNullType::DateTime)),
            ColumnType::Date => row
                .try_get::<chrono::NaiveDate, _>(idx)?
                .map(SqlValue::Date)
                .unwrap_or(SqlValue::Null(SqlNullType::Date)),
            ColumnType::Time => row
                .try_get::<chrono::NaiveTime, _>(idx)?
                .map(SqlValue::Time)
                .unwrap_or(SqlValue::Null(SqlNullType::Time)),
            ColumnType::DateTimeOffset => row
                .try_get::<chrono::DateTime<chrono::FixedOffset>, _>(idx)?
                .map(SqlValue::DateTimeOffset)
                .unwrap_or(SqlValue::Null(SqlNullType::DateTimeOffset)),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_type_rendering() {
        assert_eq!(ColumnType::Int.sql_type(), "INT");
        assert_eq!(ColumnType::BigInt.sql_type(), "BIGINT");
        assert_eq!(ColumnType::NVarChar(Some(200)).sql_type(), "NVARCHAR(200)");
        assert_eq!(ColumnType::NVarChar(None).sql_type(), "NVARCHAR(MAX)");
        assert_eq!(
            ColumnType::Decimal {
                precision: 18,
                scale: 4
            }
            .sql_type(),
            "DECIMAL(18, 4)"
        );
        assert_eq!(ColumnType::VarBinary(None).sql_type(), "VARBINARY(MAX)");
        assert_eq!(
            ColumnType::UniqueIdentifier.sql_type(),
            "UNIQUEIDENTIFIER"
        );
    }

    #[test]
    fn test_accepts_matching_kind() {
        assert!(ColumnType::Int.accepts(&SqlValue::I32(1)));
        assert!(ColumnType::NVarChar(Some(10)).accepts(&SqlValue::String("x".into())));
        assert!(ColumnType::Bit.accepts(&SqlValue::Bool(true)));
    }

    #[test]
    fn test_accepts_rejects_mismatched_kind() {
        assert!(!ColumnType::Int.accepts(&SqlValue::I64(1)));
        assert!(!ColumnType::Bit.accepts(&SqlValue::String("true".into())));
        assert!(!ColumnType::NVarChar(None).accepts(&SqlValue::Bytes(vec![1])));
    }

    #[test]
    fn test_accepts_any_null() {
        // NULLs are re-hinted to the column's type at encode time.
        assert!(ColumnType::Int.accepts(&SqlValue::Null(SqlNullType::String)));
        assert!(ColumnType::Date.accepts(&SqlValue::Null(SqlNullType::Date)));
    }

    #[test]
    fn test_null_type_matches_column() {
        assert_eq!(ColumnType::Int.null_type(), SqlNullType::I32);
        assert_eq!(ColumnType::TinyInt.null_type(), SqlNullType::I16);
        assert_eq!(ColumnType::NVarChar(None).null_type(), SqlNullType::String);
        assert_eq!(
            ColumnType::Decimal {
                precision: 10,
                scale: 2
            }
            .null_type(),
            SqlNullType::Decimal
        );
    }
}
