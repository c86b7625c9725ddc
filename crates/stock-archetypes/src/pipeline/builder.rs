//! Multi-pass archetype pipeline.
//!
//! This module provides the [`ArchetypePipeline`] struct and its builder for
//! chaining flag → build → impute passes at progressively coarser key
//! granularity over one target column.

use crate::archetypes::build_archetypes;
use crate::config::{ArchetypeConfig, ConfigValidationError, PipelineConfig};
use crate::error::{Result, ResultExt};
use crate::imputers::{fill_with_archetype, flag_known};
use crate::pipeline::progress::{
    ClosureProgressReporter, PassStage, ProgressReporter, ProgressUpdate,
};
use crate::types::{ARCHETYPE_COLUMN, PassSummary, RunSummary, SAMPLE_SIZE_COLUMN};
use crate::utils::require_column;
use polars::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Output of [`ArchetypePipeline::run`].
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// The completed table, same row count as the input.
    pub data: DataFrame,
    /// Per-pass statistics.
    pub summary: RunSummary,
}

/// Runs archetype passes in order until the target column is complete.
///
/// Each pass flags coverage of the target, builds archetypes from the
/// current table and fills missing values; its output feeds the next pass.
/// The run stops early once the target has no missing values left.
///
/// # Example
///
/// ```rust,ignore
/// use stock_archetypes::{ArchetypeConfig, ArchetypePipeline};
///
/// let result = ArchetypePipeline::builder()
///     .target_column("wall_uvalue")
///     .pass(
///         ArchetypeConfig::builder("countyname__dwelling_type")
///             .key_columns(["countyname", "dwelling_type"])
///             .min_sample_size(30)
///             .build()?,
///     )
///     .pass(
///         ArchetypeConfig::builder("dwelling_type")
///             .key_columns(["dwelling_type"])
///             .excluded_columns(["countyname"])
///             .build()?,
///     )
///     .build()?
///     .run(&stock)?;
///
/// println!("{} values still missing", result.summary.remaining_missing);
/// ```
pub struct ArchetypePipeline {
    config: PipelineConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(ArchetypePipeline: Send, Sync);

impl ArchetypePipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> ArchetypePipelineBuilder {
        ArchetypePipelineBuilder::default()
    }

    /// The validated configuration this pipeline runs.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every pass over `df` and return the completed table.
    ///
    /// `df` is not modified. The result always carries the `archetype` and
    /// `sample_size` bookkeeping columns, even when no pass had to run.
    pub fn run(&self, df: &DataFrame) -> Result<PipelineResult> {
        let start = Instant::now();
        let target = self.config.target_column.as_str();
        let passes_total = self.config.passes.len();

        let missing_before = require_column(df, target)?.null_count();
        info!(
            "Starting {} archetype passes over '{}' ({} of {} values missing)",
            passes_total,
            target,
            missing_before,
            df.height()
        );

        let mut current = df.clone();
        let mut summaries = Vec::with_capacity(passes_total);

        for (index, pass) in self.config.passes.iter().enumerate() {
            let missing = require_column(&current, target)?.null_count();
            if missing == 0 {
                info!("'{}' is complete; skipping remaining passes", target);
                self.report(ProgressUpdate::new(
                    PassStage::Skipped,
                    &pass.archetype_name,
                    index,
                    passes_total,
                    "No missing values left",
                ));
                break;
            }

            let summary = self
                .run_pass(&mut current, pass, index)
                .context(format!("Archetype pass '{}' failed", pass.archetype_name))?;
            summaries.push(summary);
        }

        let data = Self::with_bookkeeping(current, target)?;
        let remaining_missing = require_column(&data, target)?.null_count();
        let summary = RunSummary {
            target_column: target.to_string(),
            rows: data.height(),
            passes: summaries,
            missing_before,
            remaining_missing,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Archetype passes finished: {} of {} missing '{}' values filled",
            missing_before - remaining_missing,
            missing_before,
            target
        );

        Ok(PipelineResult { data, summary })
    }

    /// Flag, build and impute for one pass, replacing `current` with the result.
    fn run_pass(
        &self,
        current: &mut DataFrame,
        pass: &ArchetypeConfig,
        index: usize,
    ) -> Result<PassSummary> {
        let target = self.config.target_column.as_str();
        let total = self.config.passes.len();
        let name = pass.archetype_name.as_str();
        let missing_before = require_column(current, target)?.null_count();

        self.report(ProgressUpdate::new(
            PassStage::Flagging,
            name,
            index,
            total,
            format!("{} records need '{}'", missing_before, target),
        ));
        let flagged = flag_known(current, target)?;

        self.report(ProgressUpdate::new(
            PassStage::Building,
            name,
            index,
            total,
            format!("Grouping on {:?}", pass.key_columns),
        ));
        let archetypes = build_archetypes(current, pass)?;
        if archetypes.height() == 0 {
            warn!(
                "Pass '{}' built no archetypes with more than {} records",
                name, pass.min_sample_size
            );
        }

        self.report(ProgressUpdate::new(
            PassStage::Imputing,
            name,
            index,
            total,
            format!("Merging {} archetypes", archetypes.height()),
        ));
        let filled = fill_with_archetype(&flagged, &archetypes, &pass.key_columns)?;
        // A match whose archetype had no target value leaves the row for a later pass
        let filled = flag_known(&filled, target)?;

        let missing_after = require_column(&filled, target)?.null_count();
        let rows_matched = Self::rows_labelled(&filled, name)?;
        debug!(
            "Pass '{}' filled {} of {} missing values",
            name,
            missing_before - missing_after,
            missing_before
        );

        self.report(ProgressUpdate::new(
            PassStage::Complete,
            name,
            index,
            total,
            format!("Filled {} values", missing_before - missing_after),
        ));

        *current = filled;
        Ok(PassSummary {
            archetype_name: name.to_string(),
            key_columns: pass.key_columns.clone(),
            archetypes_built: archetypes.height(),
            rows_matched,
            missing_before,
            missing_after,
        })
    }

    /// Count rows whose flag names `archetype_name`.
    fn rows_labelled(df: &DataFrame, archetype_name: &str) -> Result<usize> {
        let labels = require_column(df, ARCHETYPE_COLUMN)?.cast(&DataType::String)?;
        Ok(labels
            .str()?
            .into_iter()
            .filter(|label| *label == Some(archetype_name))
            .count())
    }

    /// Make sure both bookkeeping columns exist on the final table.
    fn with_bookkeeping(df: DataFrame, target: &str) -> Result<DataFrame> {
        let mut df = flag_known(&df, target)?;
        if df.column(SAMPLE_SIZE_COLUMN).is_err() {
            let sizes: Vec<Option<u64>> = vec![None; df.height()];
            df.with_column(Series::new(SAMPLE_SIZE_COLUMN.into(), sizes))?;
        }
        Ok(df)
    }

    fn report(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }
}

/// Builder for [`ArchetypePipeline`].
///
/// Either pass a whole [`PipelineConfig`] or assemble one with
/// [`target_column`](Self::target_column) and [`pass`](Self::pass).
#[derive(Default)]
pub struct ArchetypePipelineBuilder {
    config: Option<PipelineConfig>,
    target_column: Option<String>,
    passes: Vec<ArchetypeConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(ArchetypePipelineBuilder: Send);

impl ArchetypePipelineBuilder {
    /// Use a complete configuration, e.g. one loaded from JSON.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the column whose missing values drive the passes.
    pub fn target_column(mut self, column: impl Into<String>) -> Self {
        self.target_column = Some(column.into());
        self
    }

    /// Append a pass; passes run in the order they are added.
    pub fn pass(mut self, pass: ArchetypeConfig) -> Self {
        self.passes.push(pass);
        self
    }

    /// Set a progress reporter for receiving updates during a run.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// An explicit [`config`](Self::config) is extended by any passes added
    /// with [`pass`](Self::pass), and its target is replaced by
    /// [`target_column`](Self::target_column) when both are set.
    pub fn build(self) -> std::result::Result<ArchetypePipeline, ConfigValidationError> {
        let mut config = self.config.unwrap_or_else(|| PipelineConfig {
            target_column: String::new(),
            passes: Vec::new(),
        });
        if let Some(target) = self.target_column {
            config.target_column = target;
        }
        config.passes.extend(self.passes);
        config.validate()?;

        Ok(ArchetypePipeline {
            config,
            progress_reporter: self.progress_reporter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn stock() -> DataFrame {
        df![
            "countyname" => ["Co. Dublin", "Co. Dublin", "Co. Dublin", "Co. Cork", "Co. Cork", "Co. Cork", "Co. Cork"],
            "dwelling_type" => ["Detached house", "Detached house", "Detached house", "Detached house", "Detached house", "Apartment", "Apartment"],
            "wall_uvalue" => [Some(1.0), Some(2.0), None, Some(0.4), None, None, Some(0.9)],
        ]
        .unwrap()
    }

    fn county_pass() -> ArchetypeConfig {
        ArchetypeConfig::builder("countyname__dwelling_type")
            .key_columns(["countyname", "dwelling_type"])
            .min_sample_size(2)
            .build()
            .unwrap()
    }

    fn dwelling_pass() -> ArchetypeConfig {
        ArchetypeConfig::builder("dwelling_type")
            .key_columns(["dwelling_type"])
            .excluded_columns(["countyname"])
            .min_sample_size(1)
            .build()
            .unwrap()
    }

    fn labels(df: &DataFrame) -> Vec<Option<String>> {
        df.column(ARCHETYPE_COLUMN)
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    #[test]
    fn test_builder_requires_target_and_passes() {
        assert_eq!(
            ArchetypePipeline::builder().pass(dwelling_pass()).build().err(),
            Some(ConfigValidationError::EmptyTargetColumn)
        );
        assert_eq!(
            ArchetypePipeline::builder()
                .target_column("wall_uvalue")
                .build()
                .err(),
            Some(ConfigValidationError::NoPasses)
        );
    }

    #[test]
    fn test_run_chains_passes_coarser() {
        let stock = stock();
        let pipeline = ArchetypePipeline::builder()
            .target_column("wall_uvalue")
            .pass(county_pass())
            .pass(dwelling_pass())
            .build()
            .unwrap();

        let result = pipeline.run(&stock).unwrap();

        assert_eq!(result.data.height(), stock.height());
        assert_eq!(result.summary.missing_before, 3);

        // Dublin/Detached has three records and fills row 2 in the first pass.
        // Cork groups are too small, so rows 4 and 5 fall through to the
        // dwelling-type pass.
        let first = &result.summary.passes[0];
        assert_eq!(first.archetypes_built, 1);
        assert_eq!(first.filled(), 1);

        let second = &result.summary.passes[1];
        assert_eq!(second.missing_before, 2);
        assert_eq!(second.missing_after, 0);
        assert_eq!(result.summary.remaining_missing, 0);

        assert_eq!(
            labels(&result.data),
            vec![
                Some("none".to_string()),
                Some("none".to_string()),
                Some("countyname__dwelling_type".to_string()),
                Some("none".to_string()),
                Some("dwelling_type".to_string()),
                Some("dwelling_type".to_string()),
                Some("none".to_string()),
            ]
        );

        let uvalues: Vec<Option<f64>> = result
            .data
            .column("wall_uvalue")
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        // Detached across counties: [1.0, 2.0, 1.5, 0.4] (row 2 already filled) -> 1.25
        assert_eq!(uvalues[2], Some(1.5));
        assert_eq!(uvalues[4], Some(1.25));
        assert_eq!(uvalues[5], Some(0.9));
    }

    #[test]
    fn test_run_relabels_rows_filled_by_a_later_pass() {
        // Kerry bungalows match a county archetype whose wall U-value is unknown
        let stock = df![
            "countyname" => ["Co. Kerry", "Co. Kerry", "Co. Cork", "Co. Cork"],
            "dwelling_type" => ["Bungalow"; 4],
            "wall_uvalue" => [None, None, Some(1.0), Some(2.0)],
        ]
        .unwrap();

        let result = ArchetypePipeline::builder()
            .target_column("wall_uvalue")
            .pass(
                ArchetypeConfig::builder("countyname__dwelling_type")
                    .key_columns(["countyname", "dwelling_type"])
                    .min_sample_size(1)
                    .build()
                    .unwrap(),
            )
            .pass(dwelling_pass())
            .build()
            .unwrap()
            .run(&stock)
            .unwrap();

        let first = &result.summary.passes[0];
        assert_eq!(first.filled(), 0);
        assert_eq!(first.rows_matched, 0);
        let second = &result.summary.passes[1];
        assert_eq!(second.filled(), 2);
        assert_eq!(second.rows_matched, 2);

        assert_eq!(
            labels(&result.data),
            vec![
                Some("dwelling_type".to_string()),
                Some("dwelling_type".to_string()),
                Some("none".to_string()),
                Some("none".to_string()),
            ]
        );
        let sizes: Vec<Option<u64>> = result
            .data
            .column(SAMPLE_SIZE_COLUMN)
            .unwrap()
            .as_materialized_series()
            .u64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(&sizes[..2], &[Some(4), Some(4)]);
        let uvalues: Vec<Option<f64>> = result
            .data
            .column("wall_uvalue")
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(&uvalues[..2], &[Some(1.5), Some(1.5)]);
    }

    #[test]
    fn test_run_leaves_unfilled_rows_unlabelled() {
        let stock = df![
            "dwelling_type" => ["Bungalow", "Bungalow", "Apartment"],
            "wall_uvalue" => [None, None, Some(0.5)],
        ]
        .unwrap();

        let result = ArchetypePipeline::builder()
            .target_column("wall_uvalue")
            .pass(
                ArchetypeConfig::builder("dwelling_type")
                    .key_columns(["dwelling_type"])
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
            .run(&stock)
            .unwrap();

        assert_eq!(result.summary.remaining_missing, 2);
        assert_eq!(
            labels(&result.data),
            vec![None, None, Some("none".to_string())]
        );
        assert_eq!(result.data.column(SAMPLE_SIZE_COLUMN).unwrap().null_count(), 3);
    }

    #[test]
    fn test_run_stops_when_target_complete() {
        let stock = df![
            "dwelling_type" => ["Detached house", "Detached house"],
            "wall_uvalue" => [1.0, 2.0],
        ]
        .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = ArchetypePipeline::builder()
            .target_column("wall_uvalue")
            .pass(
                ArchetypeConfig::builder("dwelling_type")
                    .key_columns(["dwelling_type"])
                    .build()
                    .unwrap(),
            )
            .on_progress(move |update| {
                assert_eq!(update.stage, PassStage::Skipped);
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap()
            .run(&stock)
            .unwrap();

        assert!(result.summary.passes.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Bookkeeping columns are present regardless
        assert_eq!(
            labels(&result.data),
            vec![Some("none".to_string()), Some("none".to_string())]
        );
        assert_eq!(result.data.column(SAMPLE_SIZE_COLUMN).unwrap().null_count(), 2);
    }

    #[test]
    fn test_run_reports_every_stage() {
        let stages = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = stages.clone();

        ArchetypePipeline::builder()
            .target_column("wall_uvalue")
            .pass(dwelling_pass())
            .on_progress(move |update| sink.lock().unwrap().push(update.stage))
            .build()
            .unwrap()
            .run(&stock())
            .unwrap();

        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                PassStage::Flagging,
                PassStage::Building,
                PassStage::Imputing,
                PassStage::Complete
            ]
        );
    }

    #[test]
    fn test_run_missing_target_column() {
        let pipeline = ArchetypePipeline::builder()
            .target_column("roof_uvalue")
            .pass(dwelling_pass())
            .build()
            .unwrap();

        let err = pipeline.run(&stock()).unwrap_err();
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_run_wraps_pass_errors_with_context() {
        let pipeline = ArchetypePipeline::builder()
            .target_column("wall_uvalue")
            .pass(
                ArchetypeConfig::builder("period_built")
                    .key_columns(["period_built"])
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();

        let err = pipeline.run(&stock()).unwrap_err();
        assert!(err.to_string().contains("period_built"));
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }
}
