//! Shared utilities for archetype passes.
//!
//! This module contains dtype helpers and the hashable key representation
//! used both to group records and to match records against archetypes.

use crate::error::{ArchetypeError, Result};
use polars::prelude::*;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Category of a data type for aggregation purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtypeCategory {
    /// Integer or floating point numbers
    Numeric,
    /// Date, datetime, time or duration types
    Datetime,
    /// Boolean type
    Boolean,
    /// String/text type
    String,
    /// Other/unknown types
    Other,
}

/// Check if a DataType is an integer type.
#[inline]
pub fn is_integer_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Check if a DataType is a floating point type.
#[inline]
pub fn is_float_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Float32 | DataType::Float64)
}

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    is_integer_dtype(dtype) || is_float_dtype(dtype)
}

/// Check if a DataType is a temporal type (dates, times and durations).
#[inline]
pub fn is_datetime_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Datetime(_, _) | DataType::Date | DataType::Time | DataType::Duration(_)
    )
}

/// Get the category of a DataType.
pub fn get_dtype_category(dtype: &DataType) -> DtypeCategory {
    if is_numeric_dtype(dtype) {
        DtypeCategory::Numeric
    } else if is_datetime_dtype(dtype) {
        DtypeCategory::Datetime
    } else if matches!(dtype, DataType::Boolean) {
        DtypeCategory::Boolean
    } else if matches!(
        dtype,
        DataType::String | DataType::Categorical(_, _) | DataType::Enum(_, _)
    ) {
        DtypeCategory::String
    } else {
        DtypeCategory::Other
    }
}

/// Look up a column, mapping a miss to [`ArchetypeError::ColumnNotFound`].
pub fn require_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|col| col.as_materialized_series())
        .map_err(|_| ArchetypeError::ColumnNotFound(name.to_string()))
}

// =============================================================================
// Key Values
// =============================================================================

/// A single non-null cell value in a form that can be hashed and ordered.
///
/// Integers of every width collapse to `Int`, floats to `Float`, and every
/// other dtype is compared through its string cast.
#[derive(Debug, Clone)]
pub enum KeyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl KeyValue {
    fn rank(&self) -> u8 {
        match self {
            KeyValue::Bool(_) => 0,
            KeyValue::Int(_) => 1,
            KeyValue::Float(_) => 2,
            KeyValue::Str(_) => 3,
        }
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::Bool(a), KeyValue::Bool(b)) => a.cmp(b),
            (KeyValue::Int(a), KeyValue::Int(b)) => a.cmp(b),
            (KeyValue::Float(a), KeyValue::Float(b)) => a.total_cmp(b),
            (KeyValue::Str(a), KeyValue::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

// Must agree with `Ord`: `total_cmp` equality is bit equality.
impl Hash for KeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            KeyValue::Bool(v) => v.hash(state),
            KeyValue::Int(v) => v.hash(state),
            KeyValue::Float(v) => v.to_bits().hash(state),
            KeyValue::Str(v) => v.hash(state),
        }
    }
}

impl std::fmt::Display for KeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyValue::Bool(v) => write!(f, "{}", v),
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Float(v) => write!(f, "{}", v),
            KeyValue::Str(v) => write!(f, "{:?}", v),
        }
    }
}

/// Convert every cell of a Series into an optional [`KeyValue`], `None` for
/// nulls and NaN.
pub fn key_values(series: &Series) -> PolarsResult<Vec<Option<KeyValue>>> {
    let dtype = series.dtype();

    let values = if matches!(dtype, DataType::Boolean) {
        series
            .bool()?
            .into_iter()
            .map(|v| v.map(KeyValue::Bool))
            .collect()
    } else if is_integer_dtype(dtype) {
        let cast = series.cast(&DataType::Int64)?;
        cast.i64()?
            .into_iter()
            .map(|v| v.map(KeyValue::Int))
            .collect()
    } else if matches!(dtype, DataType::Duration(_)) {
        let cast = series.cast(&DataType::Int64)?;
        cast.i64()?
            .into_iter()
            .map(|v| v.map(KeyValue::Int))
            .collect()
    } else if is_float_dtype(dtype) {
        // NaN is missing, like null
        let cast = series.cast(&DataType::Float64)?;
        cast.f64()?
            .into_iter()
            .map(|v| v.filter(|f| !f.is_nan()).map(KeyValue::Float))
            .collect()
    } else {
        let cast = series.cast(&DataType::String)?;
        cast.str()?
            .into_iter()
            .map(|v| v.map(|s| KeyValue::Str(s.to_string())))
            .collect()
    };

    Ok(values)
}

/// Build the composite key of every row over `key_columns`.
///
/// A row gets `None` when any of its key cells is null; such rows can neither
/// form nor match an archetype.
pub fn row_keys(df: &DataFrame, key_columns: &[String]) -> Result<Vec<Option<Vec<KeyValue>>>> {
    let mut per_column = Vec::with_capacity(key_columns.len());
    for name in key_columns {
        per_column.push(key_values(require_column(df, name)?)?);
    }

    let keys = (0..df.height())
        .map(|row| {
            per_column
                .iter()
                .map(|values| values[row].clone())
                .collect::<Option<Vec<KeyValue>>>()
        })
        .collect();

    Ok(keys)
}

/// Render a composite key for log and error messages.
pub fn format_key(key: &[KeyValue]) -> String {
    let parts: Vec<String> = key.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

// =============================================================================
// Tests
// =============================================================================
