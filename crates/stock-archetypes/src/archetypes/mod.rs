//! Archetype construction.
//!
//! This module groups records by key columns and reduces every group to a
//! single representative row:
//! - Aggregation selection (median for numeric, mode for everything else)
//! - Group filtering by sample size

pub mod aggregator;
mod builder;

pub use aggregator::{median, mode_or_first_occurrence, select_operations};
pub use builder::build_archetypes;
