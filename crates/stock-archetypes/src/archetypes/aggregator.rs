//! Per-column aggregation of archetype groups.

use crate::error::{ArchetypeError, Result};
use crate::types::{Aggregation, ColumnKind, ColumnTypes};
use crate::utils::{KeyValue, key_values};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Choose the aggregation for every column not in `excluded_columns`.
///
/// Numeric columns get [`Aggregation::Median`], every other supported column
/// gets [`Aggregation::ModeOrFirstOccurrence`]. A non-excluded column with an
/// unsupported dtype is a schema error.
pub fn select_operations(
    types: &ColumnTypes,
    excluded_columns: &[String],
) -> Result<BTreeMap<String, Aggregation>> {
    let mut operations = BTreeMap::new();

    for column in types.iter() {
        if excluded_columns.contains(&column.name) {
            continue;
        }
        let operation = match column.kind {
            ColumnKind::Numeric => Aggregation::Median,
            ColumnKind::Categorical => Aggregation::ModeOrFirstOccurrence,
            ColumnKind::Unsupported => {
                return Err(ArchetypeError::UnsupportedDtype {
                    column: column.name.clone(),
                    dtype: column.dtype.clone(),
                });
            }
        };
        operations.insert(column.name.clone(), operation);
    }

    Ok(operations)
}

/// Median of the non-null values, `None` when there are none.
pub fn median(series: &Series) -> Option<f64> {
    series.median()
}

/// Position of the representative value of a group.
///
/// The representative is the most frequent non-null value; among equally
/// frequent values the one that occurs first wins, and the returned position
/// is that first occurrence. An empty or all-null group yields `None`.
pub fn mode_or_first_occurrence(series: &Series) -> Result<Option<usize>> {
    // value -> (count, first position)
    let mut tallies: HashMap<KeyValue, (usize, usize)> = HashMap::new();

    for (pos, value) in key_values(series)?.into_iter().enumerate() {
        if let Some(value) = value {
            tallies
                .entry(value)
                .and_modify(|(count, _)| *count += 1)
                .or_insert((1, pos));
        }
    }

    Ok(tallies
        .into_values()
        .max_by(|(count_a, pos_a), (count_b, pos_b)| {
            count_a.cmp(count_b).then(pos_b.cmp(pos_a))
        })
        .map(|(_, pos)| pos))
}
