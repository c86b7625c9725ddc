//! Archetype imputation.
//!
//! Records are matched to archetypes on their key columns; matched archetype
//! values only ever replace missing cells.

use crate::error::{ArchetypeError, Result};
use crate::utils::{KeyValue, format_key, is_numeric_dtype, row_keys};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info};

/// Fill missing values of `df` from the matching rows of `archetypes`.
///
/// - Columns present in both tables: nulls in `df` take the matched archetype
///   value, known values are never overwritten.
/// - Columns only in `archetypes` (such as `sample_size`) are appended, null
///   for rows that matched nothing.
/// - Rows with a null key, or without a matching archetype, keep their values.
///
/// The result has exactly as many rows as `df`. Input row order is kept, but
/// callers should re-key rather than depend on it. An archetype table with
/// duplicate key combinations is rejected.
pub fn fill_with_archetype(
    df: &DataFrame,
    archetypes: &DataFrame,
    key_columns: &[String],
) -> Result<DataFrame> {
    if key_columns.is_empty() {
        return Err(ArchetypeError::InvalidConfig(
            "archetype imputation needs at least one key column".to_string(),
        ));
    }

    let lookup = index_archetypes(archetypes, key_columns)?;

    let matches: IdxCa = row_keys(df, key_columns)?
        .into_iter()
        .map(|key| key.and_then(|key| lookup.get(&key).copied()))
        .collect();
    let matched = matches.len() - matches.null_count();
    info!(
        "Matched {} of {} rows to {} archetypes",
        matched,
        df.height(),
        archetypes.height()
    );

    let mut filled = df.clone();
    for column in archetypes.get_columns() {
        let name = column.name().as_str();
        if key_columns.iter().any(|key| key == name) {
            continue;
        }

        let candidates = column.as_materialized_series().take(&matches)?;
        match df.column(name) {
            Ok(existing) => {
                let existing = existing.as_materialized_series();
                let before = existing.null_count();
                let merged = fill_missing(existing, &candidates)?;
                debug!(
                    "Filled {} missing values in '{}'",
                    before - merged.null_count(),
                    name
                );
                filled.replace(name, merged)?;
            }
            Err(_) => {
                filled.with_column(candidates)?;
            }
        }
    }

    Ok(filled)
}

/// Map every archetype key to its row, rejecting duplicate keys.
fn index_archetypes(
    archetypes: &DataFrame,
    key_columns: &[String],
) -> Result<HashMap<Vec<KeyValue>, IdxSize>> {
    let mut lookup = HashMap::with_capacity(archetypes.height());

    for (row, key) in row_keys(archetypes, key_columns)?.into_iter().enumerate() {
        // A null-keyed archetype can never be matched
        let Some(key) = key else { continue };
        if lookup.contains_key(&key) {
            return Err(ArchetypeError::DuplicateArchetype(format_key(&key)));
        }
        lookup.insert(key, row as IdxSize);
    }

    Ok(lookup)
}

/// Keep `existing` where it is known, otherwise take `candidates`.
///
/// A column with no cell to fill is returned untouched. Otherwise mixed
/// numeric dtypes are widened to Float64, which is lossy for integers beyond
/// 2^53.
fn fill_missing(existing: &Series, candidates: &Series) -> Result<Series> {
    let fillable = existing.is_null() & candidates.is_not_null();
    if !fillable.any() {
        return Ok(existing.clone());
    }

    let (existing, candidates) = if existing.dtype() == candidates.dtype() {
        (existing.clone(), candidates.clone())
    } else if is_numeric_dtype(existing.dtype()) && is_numeric_dtype(candidates.dtype()) {
        (
            existing.cast(&DataType::Float64)?,
            candidates.cast(&DataType::Float64)?,
        )
    } else {
        let cast = candidates.cast(existing.dtype()).map_err(|e| {
            ArchetypeError::Polars(e).with_context(format!(
                "Archetype column '{}' is {} but the table has {}",
                existing.name(),
                candidates.dtype(),
                existing.dtype()
            ))
        })?;
        (existing.clone(), cast)
    };

    let known = existing.is_not_null();
    Ok(existing.zip_with(&known, &candidates)?)
}
