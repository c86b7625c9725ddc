//! Building Stock Archetype Library
//!
//! Fill missing attributes of building survey records from the statistics of
//! similar dwellings, built with Rust and Polars.
//!
//! # Overview
//!
//! Survey records (one row per dwelling) often lack an attribute such as a
//! wall U-value or heating fuel. This library:
//!
//! - **Builds archetypes**: groups records by key columns and reduces each
//!   sufficiently large group to one representative row (median for numeric
//!   columns, most common value otherwise)
//! - **Flags coverage**: marks the records whose target attribute is known
//! - **Imputes**: merges archetype values into records on their keys, filling
//!   only cells that are missing
//! - **Chains passes**: repeats the above from fine to coarse key granularity
//!   until the target column is complete
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use stock_archetypes::{ArchetypeConfig, ArchetypePipeline, PipelineConfig};
//! use polars::prelude::*;
//!
//! let stock = CsvReadOptions::default()
//!     .with_has_header(true)
//!     .try_into_reader_with_file_path(Some("bers.csv".into()))?
//!     .finish()?;
//!
//! // Option 1: assemble the passes in code
//! let result = ArchetypePipeline::builder()
//!     .target_column("wall_uvalue")
//!     .pass(
//!         ArchetypeConfig::builder("countyname__period_built__dwelling_type")
//!             .key_columns(["countyname", "period_built", "dwelling_type"])
//!             .min_sample_size(30)
//!             .build()?,
//!     )
//!     .pass(
//!         ArchetypeConfig::builder("period_built__dwelling_type")
//!             .key_columns(["period_built", "dwelling_type"])
//!             .excluded_columns(["countyname"])
//!             .min_sample_size(30)
//!             .build()?,
//!     )
//!     .build()?
//!     .run(&stock)?;
//!
//! // Option 2: load them from JSON
//! let config = PipelineConfig::from_json_file("passes.json")?;
//! let result = ArchetypePipeline::builder().config(config).build()?.run(&stock)?;
//!
//! println!("{} values still missing", result.summary.remaining_missing);
//! ```
//!
//! # Single steps
//!
//! The pass components are usable on their own:
//!
//! ```rust,ignore
//! use stock_archetypes::{build_archetypes, fill_with_archetype, flag_known};
//!
//! let flagged = flag_known(&stock, "wall_uvalue")?;
//! let archetypes = build_archetypes(&stock, &pass)?;
//! let filled = fill_with_archetype(&flagged, &archetypes, &pass.key_columns)?;
//! ```
//!
//! Every output row carries an `archetype` column naming the pass that filled
//! it (`"none"` when the value was already known) and a `sample_size` column
//! with the size of the group behind the archetype.

pub mod archetypes;
pub mod config;
pub mod error;
pub mod filter;
pub mod imputers;
pub mod pipeline;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use archetypes::{build_archetypes, median, mode_or_first_occurrence, select_operations};
pub use config::{
    ArchetypeConfig, ArchetypeConfigBuilder, ConfigValidationError, DEFAULT_MIN_SAMPLE_SIZE,
    PipelineConfig,
};
pub use error::{ArchetypeError, Result as ArchetypeResult, ResultExt};
pub use filter::filter_by_substrings;
pub use imputers::{fill_with_archetype, flag_known};
pub use pipeline::{
    ArchetypePipeline, ArchetypePipelineBuilder, ClosureProgressReporter, PassStage,
    PipelineResult, ProgressReporter, ProgressUpdate,
};
pub use types::{
    ARCHETYPE_COLUMN, Aggregation, ColumnKind, ColumnType, ColumnTypes, KNOWN_FLAG, PassSummary,
    RunSummary, SAMPLE_SIZE_COLUMN,
};
pub use utils::{DtypeCategory, KeyValue, get_dtype_category, is_numeric_dtype};
