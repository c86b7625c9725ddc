//! Archetype table construction.

use super::aggregator::{median, mode_or_first_occurrence, select_operations};
use crate::config::ArchetypeConfig;
use crate::error::{ArchetypeError, Result};
use crate::types::{
    ARCHETYPE_COLUMN, Aggregation, ColumnKind, ColumnTypes, SAMPLE_SIZE_COLUMN,
};
use crate::utils::{KeyValue, require_column, row_keys};
use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Build the archetype table of `df` for one pass.
///
/// Rows are grouped on `config.key_columns`; rows with a null key are left
/// out. Groups holding no more than `config.min_sample_size` records are
/// dropped. Every remaining group becomes one row carrying its key, one
/// aggregate per non-key, non-excluded column, `sample_size` and `archetype`.
/// Output rows are sorted by key.
///
/// Bookkeeping columns left by an earlier pass are never aggregated.
///
/// # Example
///
/// ```rust,ignore
/// let config = ArchetypeConfig::builder("dwelling_type")
///     .key_columns(["dwelling_type"])
///     .excluded_columns(["countyname"])
///     .min_sample_size(1)
///     .build()?;
/// let archetypes = build_archetypes(&stock, &config)?;
/// ```
pub fn build_archetypes(df: &DataFrame, config: &ArchetypeConfig) -> Result<DataFrame> {
    config.validate()?;

    let types = ColumnTypes::from_frame(df);
    for key in &config.key_columns {
        match types.get(key) {
            None => return Err(ArchetypeError::ColumnNotFound(key.clone())),
            Some(column) if column.kind == ColumnKind::Unsupported => {
                return Err(ArchetypeError::UnsupportedDtype {
                    column: key.clone(),
                    dtype: column.dtype.clone(),
                });
            }
            Some(_) => {}
        }
    }
    for excluded in &config.excluded_columns {
        if types.get(excluded).is_none() {
            return Err(ArchetypeError::ColumnNotFound(excluded.clone()));
        }
    }

    let mut skipped: Vec<String> = config.key_columns.clone();
    skipped.extend(config.excluded_columns.iter().cloned());
    skipped.push(ARCHETYPE_COLUMN.to_string());
    skipped.push(SAMPLE_SIZE_COLUMN.to_string());
    let operations = select_operations(&types, &skipped)?;

    // BTreeMap keeps groups in ascending key order
    let mut groups: BTreeMap<Vec<KeyValue>, Vec<IdxSize>> = BTreeMap::new();
    let mut null_key_rows = 0usize;
    for (row, key) in row_keys(df, &config.key_columns)?.into_iter().enumerate() {
        match key {
            Some(key) => groups.entry(key).or_default().push(row as IdxSize),
            None => null_key_rows += 1,
        }
    }
    if null_key_rows > 0 {
        debug!(
            "Skipped {} rows with missing '{}' keys",
            null_key_rows, config.archetype_name
        );
    }

    let total_groups = groups.len();
    let retained: Vec<Vec<IdxSize>> = groups
        .into_values()
        .filter(|rows| rows.len() > config.min_sample_size)
        .collect();

    let mut columns: Vec<Column> = Vec::with_capacity(operations.len() + config.key_columns.len() + 2);

    let first_rows = IdxCa::from_vec(
        PlSmallStr::EMPTY,
        retained.iter().map(|rows| rows[0]).collect(),
    );
    for key in &config.key_columns {
        let source = require_column(df, key)?;
        columns.push(source.take(&first_rows)?.into());
    }

    for column in types.iter() {
        let Some(operation) = operations.get(&column.name) else {
            continue;
        };
        let source = require_column(df, &column.name)?;
        let aggregated = match operation {
            Aggregation::Median => aggregate_median(source, &retained)?,
            Aggregation::ModeOrFirstOccurrence => aggregate_mode(source, &retained)?,
        };
        debug!("Aggregated '{}' with {}", column.name, operation);
        columns.push(aggregated.into());
    }

    let sample_sizes: Vec<u64> = retained.iter().map(|rows| rows.len() as u64).collect();
    columns.push(Series::new(SAMPLE_SIZE_COLUMN.into(), sample_sizes).into());
    columns.push(
        Series::new(
            ARCHETYPE_COLUMN.into(),
            vec![config.archetype_name.as_str(); retained.len()],
        )
        .into(),
    );

    info!(
        "Built {} '{}' archetypes ({} of {} groups have more than {} records)",
        retained.len(),
        config.archetype_name,
        retained.len(),
        total_groups,
        config.min_sample_size
    );

    Ok(DataFrame::new(columns)?)
}

/// Median of `source` within every group, as a Float64 Series.
fn aggregate_median(source: &Series, groups: &[Vec<IdxSize>]) -> Result<Series> {
    let mut values = Vec::with_capacity(groups.len());
    for rows in groups {
        let group = source.take(&IdxCa::from_vec(PlSmallStr::EMPTY, rows.clone()))?;
        values.push(median(&group));
    }
    Ok(Series::new(source.name().clone(), values))
}

/// Representative value of `source` within every group, keeping its dtype.
fn aggregate_mode(source: &Series, groups: &[Vec<IdxSize>]) -> Result<Series> {
    let mut picks: Vec<Option<IdxSize>> = Vec::with_capacity(groups.len());
    for rows in groups {
        let group = source.take(&IdxCa::from_vec(PlSmallStr::EMPTY, rows.clone()))?;
        picks.push(mode_or_first_occurrence(&group)?.map(|pos| rows[pos]));
    }
    let picks: IdxCa = picks.into_iter().collect();
    Ok(source.take(&picks)?)
}
