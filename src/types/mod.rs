// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

//! Scalar types and values.

use parse_display::Display;
use serde::Serialize;

pub use self::date::Date;

mod date;

/// A wrapper around floats providing implementations of `Eq`, `Ord`, and `Hash`.
pub type F64 = ordered_float::OrderedFloat<f64>;

/// The type of a scalar value.
///
/// `Null` denotes "unknown": it is the tag of the `NULL` constant and of
/// column references whose type has not been resolved against a schema yet.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataType {
    #[display("null")]
    Null,
    #[display("boolean")]
    Boolean,
    #[display("number")]
    Number,
    #[display("string")]
    String,
    #[display("date")]
    Date,
}

impl DataType {
    /// Whether two types may be compared or unioned. `Null` is compatible
    /// with everything.
    pub fn is_compatible_with(self, other: DataType) -> bool {
        self == other || self == DataType::Null || other == DataType::Null
    }
}

/// Primitive scalar value.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DataValue {
    // NOTE: Null comes first.
    // => NULL is less than any non-NULL values
    #[display("null")]
    Null,
    #[display("{0}")]
    Bool(bool),
    #[display("{0}")]
    Number(F64),
    #[display("'{0}'")]
    String(String),
    #[display("{0}")]
    Date(Date),
}

/// In-memory row type.
pub type Row = Vec<DataValue>;

impl DataValue {
    /// Returns `true` if value is null.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The type of the value. `NULL` has the unknown type.
    pub fn datatype(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Bool(_) => DataType::Boolean,
            Self::Number(_) => DataType::Number,
            Self::String(_) => DataType::String,
            Self::Date(_) => DataType::Date,
        }
    }

    /// Convert the value to `f64`.
    pub fn as_f64(&self) -> Result<f64, ConvertError> {
        match self {
            Self::Number(n) => Ok(n.into_inner()),
            v => Err(ConvertError::Cast(v.clone(), "number")),
        }
    }

    /// Convert the value to `i64`, rejecting values with a fractional part.
    pub fn as_i64(&self) -> Result<i64, ConvertError> {
        let f = self.as_f64()?;
        if f.fract() != 0.0 {
            return Err(ConvertError::Cast(self.clone(), "integer"));
        }
        Ok(f as i64)
    }
}

impl From<bool> for DataValue {
    fn from(b: bool) -> Self {
        DataValue::Bool(b)
    }
}

impl From<f64> for DataValue {
    fn from(n: f64) -> Self {
        DataValue::Number(n.into())
    }
}

impl From<i32> for DataValue {
    fn from(n: i32) -> Self {
        DataValue::Number(f64::from(n).into())
    }
}

impl From<&str> for DataValue {
    fn from(s: &str) -> Self {
        DataValue::String(s.into())
    }
}

impl From<Date> for DataValue {
    fn from(d: Date) -> Self {
        DataValue::Date(d)
    }
}

/// The error type of value conversions.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("failed to convert {0} to {1}")]
    Cast(DataValue, &'static str),
    #[error("failed to parse number {0:?}")]
    ParseNumber(String),
    #[error("failed to parse date {0:?}")]
    ParseDate(String),
}
