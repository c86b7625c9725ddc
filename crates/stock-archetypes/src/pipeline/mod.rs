//! Pipeline module.
//!
//! This module chains archetype passes over a target column and reports
//! progress while they run.

mod builder;
pub mod progress;

pub use builder::{ArchetypePipeline, ArchetypePipelineBuilder, PipelineResult};
pub use progress::{ClosureProgressReporter, PassStage, ProgressReporter, ProgressUpdate};
