//! Imputation module for filling missing values from archetypes.
//!
//! This module provides:
//! - Coverage flagging of records that already know a target value
//! - Archetype imputation (merge on key columns, fill only missing cells)

mod archetype;
mod coverage;

pub use archetype::fill_with_archetype;
pub use coverage::flag_known;
