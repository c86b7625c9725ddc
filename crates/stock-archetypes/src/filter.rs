//! Substring-based row selection.
//!
//! Used to cut a geographic subset out of the stock before building
//! archetypes, e.g. every record whose `countyname` mentions "Dublin".

use crate::error::{ArchetypeError, Result};
use crate::utils::require_column;
use polars::prelude::*;
use tracing::debug;

/// Keep the rows whose `column_name` contains one of `selected_substrings`.
///
/// Matching is case-insensitive and row order is preserved; null cells never
/// match. Every selected substring must correspond to an entry of
/// `all_substrings` (either one containing the other, ignoring case), which
/// guards against a typo silently selecting nothing. Empty selections are
/// rejected and empty `all_substrings` entries are ignored.
pub fn filter_by_substrings<S, T>(
    df: &DataFrame,
    column_name: &str,
    selected_substrings: &[S],
    all_substrings: &[T],
) -> Result<DataFrame>
where
    S: AsRef<str>,
    T: AsRef<str>,
{
    // Empty entries would recognise every selection
    let universe: Vec<String> = all_substrings
        .iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    let selected: Vec<String> = selected_substrings
        .iter()
        .map(|s| s.as_ref().to_lowercase())
        .collect();

    for (original, lowered) in selected_substrings.iter().zip(&selected) {
        if lowered.trim().is_empty() {
            return Err(ArchetypeError::InvalidConfig(format!(
                "Empty selection for '{}' would keep every row",
                column_name
            )));
        }
        let recognised = universe
            .iter()
            .any(|known| known.contains(lowered.as_str()) || lowered.contains(known.as_str()));
        if !recognised {
            return Err(ArchetypeError::InvalidConfig(format!(
                "'{}' does not match any of the known values for '{}'",
                original.as_ref(),
                column_name
            )));
        }
    }

    let values = require_column(df, column_name)?.cast(&DataType::String)?;
    let mask: BooleanChunked = values
        .str()?
        .into_iter()
        .map(|value| {
            value.is_some_and(|value| {
                let value = value.to_lowercase();
                selected.iter().any(|s| value.contains(s.as_str()))
            })
        })
        .collect();

    let filtered = df.filter(&mask)?;
    debug!(
        "Kept {} of {} rows matching {:?} in '{}'",
        filtered.height(),
        df.height(),
        selected,
        column_name
    );
    Ok(filtered)
}
