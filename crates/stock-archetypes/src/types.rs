//! Core data types for archetype passes.

use crate::utils::{DtypeCategory, get_dtype_category};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Bookkeeping column naming the pass that supplied a row's values.
pub const ARCHETYPE_COLUMN: &str = "archetype";

/// Bookkeeping column holding the size of the group behind an archetype.
pub const SAMPLE_SIZE_COLUMN: &str = "sample_size";

/// Flag value for records whose target column was already known.
pub const KNOWN_FLAG: &str = "none";

/// Aggregation-relevant classification of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Integer or floating point column, aggregated by median.
    Numeric,
    /// Categorical, text, boolean or temporal column, aggregated by mode.
    Categorical,
    /// Nested, binary or null column with no archetype aggregation.
    Unsupported,
}

impl From<DtypeCategory> for ColumnKind {
    fn from(category: DtypeCategory) -> Self {
        match category {
            DtypeCategory::Numeric => ColumnKind::Numeric,
            DtypeCategory::String | DtypeCategory::Boolean | DtypeCategory::Datetime => {
                ColumnKind::Categorical
            }
            DtypeCategory::Other => ColumnKind::Unsupported,
        }
    }
}

/// Declared type of a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnType {
    pub name: String,
    pub dtype: String,
    pub kind: ColumnKind,
}

/// Column classification of a table, computed once from its schema.
///
/// Columns keep their table order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnTypes {
    columns: Vec<ColumnType>,
}

impl ColumnTypes {
    /// Classify every column of a DataFrame.
    pub fn from_frame(df: &DataFrame) -> Self {
        let columns = df
            .get_columns()
            .iter()
            .map(|col| ColumnType {
                name: col.name().to_string(),
                dtype: col.dtype().to_string(),
                kind: get_dtype_category(col.dtype()).into(),
            })
            .collect();
        Self { columns }
    }

    /// Build a classification from explicit declarations.
    pub fn from_declarations<I, S>(declarations: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnKind)>,
        S: Into<String>,
    {
        let columns = declarations
            .into_iter()
            .map(|(name, kind)| ColumnType {
                name: name.into(),
                dtype: "declared".to_string(),
                kind,
            })
            .collect();
        Self { columns }
    }

    pub fn get(&self, name: &str) -> Option<&ColumnType> {
        self.columns.iter().find(|col| col.name == name)
    }

    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        self.get(name).map(|col| col.kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnType> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Operation used to reduce one column of a group to a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Median of the non-null values.
    Median,
    /// Most frequent non-null value, earliest row wins ties.
    ModeOrFirstOccurrence,
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Median => write!(f, "median"),
            Aggregation::ModeOrFirstOccurrence => write!(f, "mode_or_first_occurrence"),
        }
    }
}

/// Outcome of one archetype pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub archetype_name: String,
    pub key_columns: Vec<String>,
    /// Number of archetype rows the pass produced.
    pub archetypes_built: usize,
    /// Records carrying this pass's name in the `archetype` column.
    pub rows_matched: usize,
    /// Missing target values before and after the pass.
    pub missing_before: usize,
    pub missing_after: usize,
}

impl PassSummary {
    /// Target values filled by this pass.
    pub fn filled(&self) -> usize {
        self.missing_before.saturating_sub(self.missing_after)
    }
}

/// Outcome of a full multi-pass run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub target_column: String,
    pub rows: usize,
    pub passes: Vec<PassSummary>,
    pub missing_before: usize,
    pub remaining_missing: usize,
    pub duration_ms: u64,
}
