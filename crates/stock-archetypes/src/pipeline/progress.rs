//! Progress reporting for multi-pass archetype runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use stock_archetypes::ArchetypePipeline;
//!
//! let result = ArchetypePipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run(&stock)?;
//! ```

use serde::{Deserialize, Serialize};

/// Steps of a single archetype pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStage {
    /// Marking records whose target is already known
    Flagging,
    /// Grouping records and aggregating archetypes
    Building,
    /// Merging archetype values into the records
    Imputing,
    /// Pass finished
    Complete,
    /// Pass not run because nothing is left to fill
    Skipped,
}

impl PassStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Flagging => "Flagging Coverage",
            Self::Building => "Building Archetypes",
            Self::Imputing => "Imputing Values",
            Self::Complete => "Complete",
            Self::Skipped => "Skipped",
        }
    }
}

/// A progress update emitted while passes run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Current step within the pass
    pub stage: PassStage,

    /// Name of the pass being run
    pub archetype_name: String,

    /// Zero-based index of the pass
    pub pass_index: usize,

    /// Number of configured passes
    pub passes_total: usize,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Human-readable message describing current activity
    pub message: String,
}

impl ProgressUpdate {
    /// Create an update for `stage` of pass `pass_index`.
    pub fn new(
        stage: PassStage,
        archetype_name: impl Into<String>,
        pass_index: usize,
        passes_total: usize,
        message: impl Into<String>,
    ) -> Self {
        let within = match stage {
            PassStage::Flagging => 0.0,
            PassStage::Building => 0.2,
            PassStage::Imputing => 0.7,
            PassStage::Complete | PassStage::Skipped => 1.0,
        };
        let progress = if passes_total == 0 {
            1.0
        } else {
            ((pass_index as f32 + within) / passes_total as f32).min(1.0)
        };

        Self {
            stage,
            archetype_name: archetype_name.into(),
            pass_index,
            passes_total,
            progress,
            message: message.into(),
        }
    }
}

/// Trait for receiving progress updates during a run.
pub trait ProgressReporter: Send + Sync {
    /// Called at every step of every pass.
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    /// Creates a new closure-based progress reporter.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);
