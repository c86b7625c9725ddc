//! Coverage flag for a target column.

use crate::error::Result;
use crate::types::{ARCHETYPE_COLUMN, KNOWN_FLAG, SAMPLE_SIZE_COLUMN};
use crate::utils::require_column;
use polars::prelude::*;
use tracing::debug;

/// Return a copy of `df` with the `archetype` coverage flag for `target_column`.
///
/// Rows whose target is known are flagged `"none"`; rows whose target is
/// missing get a null flag so a later imputation can label them. When the
/// flag column already exists, labels of rows with a known target are kept so
/// earlier passes keep their provenance. A row whose target is still missing
/// loses any label and `sample_size` an earlier match left behind. Row order
/// and all other columns are unchanged.
pub fn flag_known(df: &DataFrame, target_column: &str) -> Result<DataFrame> {
    let known = require_column(df, target_column)?.is_not_null();

    let existing: Vec<Option<String>> = match df.column(ARCHETYPE_COLUMN) {
        Ok(column) => {
            let labels = column.as_materialized_series().cast(&DataType::String)?;
            labels
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect()
        }
        Err(_) => vec![None; df.height()],
    };

    let flags: Vec<Option<String>> = existing
        .into_iter()
        .zip(&known)
        .map(|(label, known)| match known {
            Some(true) => Some(label.unwrap_or_else(|| KNOWN_FLAG.to_string())),
            _ => None,
        })
        .collect();

    let unknown = flags.iter().filter(|flag| flag.is_none()).count();
    debug!(
        "Flagged '{}': {} of {} rows still need a value",
        target_column,
        unknown,
        df.height()
    );

    let mut flagged = df.clone();
    flagged.with_column(Series::new(ARCHETYPE_COLUMN.into(), flags))?;
    if let Ok(column) = df.column(SAMPLE_SIZE_COLUMN) {
        let sizes = column.as_materialized_series();
        let cleared = Series::full_null(sizes.name().clone(), sizes.len(), sizes.dtype());
        flagged.replace(SAMPLE_SIZE_COLUMN, sizes.zip_with(&known, &cleared)?)?;
    }
    Ok(flagged)
}
