//! Configuration types for archetype passes.
//!
//! Every pass is described by an explicit [`ArchetypeConfig`] that is passed
//! into each call; there is no process-wide default state. A multi-pass run
//! is described by a [`PipelineConfig`], which can be loaded from JSON.

use crate::error::ArchetypeError;
use crate::types::{ARCHETYPE_COLUMN, SAMPLE_SIZE_COLUMN};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default group-size threshold for a pass.
pub const DEFAULT_MIN_SAMPLE_SIZE: usize = 1;

fn default_min_sample_size() -> usize {
    DEFAULT_MIN_SAMPLE_SIZE
}

/// Configuration for one archetype pass.
///
/// # Example
///
/// ```rust,ignore
/// use stock_archetypes::config::ArchetypeConfig;
///
/// let config = ArchetypeConfig::builder("dwelling_type")
///     .key_columns(["dwelling_type"])
///     .excluded_columns(["countyname"])
///     .min_sample_size(1)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeConfig {
    /// Label written into the `archetype` column of every row this pass produces.
    pub archetype_name: String,

    /// Columns whose values define group membership.
    pub key_columns: Vec<String>,

    /// Columns that are neither grouped on nor aggregated.
    #[serde(default)]
    pub excluded_columns: Vec<String>,

    /// Groups must contain more than this many records to become archetypes.
    /// Default: 1
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: usize,
}

impl ArchetypeConfig {
    /// Create a new configuration builder for a pass called `archetype_name`.
    pub fn builder(archetype_name: impl Into<String>) -> ArchetypeConfigBuilder {
        ArchetypeConfigBuilder {
            archetype_name: archetype_name.into(),
            ..Default::default()
        }
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.archetype_name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyArchetypeName);
        }

        if self.key_columns.is_empty() {
            return Err(ConfigValidationError::NoKeyColumns(
                self.archetype_name.clone(),
            ));
        }

        let mut seen = HashSet::new();
        for key in &self.key_columns {
            if !seen.insert(key.as_str()) {
                return Err(ConfigValidationError::DuplicateKeyColumn(key.clone()));
            }
            if self.excluded_columns.contains(key) {
                return Err(ConfigValidationError::KeyColumnExcluded(key.clone()));
            }
            if key == ARCHETYPE_COLUMN || key == SAMPLE_SIZE_COLUMN {
                return Err(ConfigValidationError::ReservedColumn(key.clone()));
            }
        }

        if self.min_sample_size < 1 {
            return Err(ConfigValidationError::InvalidSampleSize(
                self.min_sample_size,
            ));
        }

        Ok(())
    }
}

/// Builder for [`ArchetypeConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct ArchetypeConfigBuilder {
    archetype_name: String,
    key_columns: Vec<String>,
    excluded_columns: Vec<String>,
    min_sample_size: Option<usize>,
}

impl ArchetypeConfigBuilder {
    /// Set the columns to group on.
    pub fn key_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the columns to leave out of the archetype table.
    pub fn excluded_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the group-size threshold.
    ///
    /// # Arguments
    /// * `size` - Groups need strictly more records than this; must be at least 1
    pub fn min_sample_size(mut self, size: usize) -> Self {
        self.min_sample_size = Some(size);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `ArchetypeConfig` or an error if validation fails.
    pub fn build(self) -> Result<ArchetypeConfig, ConfigValidationError> {
        let config = ArchetypeConfig {
            archetype_name: self.archetype_name,
            key_columns: self.key_columns,
            excluded_columns: self.excluded_columns,
            min_sample_size: self.min_sample_size.unwrap_or(DEFAULT_MIN_SAMPLE_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Configuration for a multi-pass run over one target column.
///
/// Passes are applied in order, normally from the finest key granularity to
/// the coarsest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Column whose missing values drive the passes.
    pub target_column: String,

    /// Passes in application order.
    pub passes: Vec<ArchetypeConfig>,
}

impl PipelineConfig {
    /// Parse a configuration from a JSON string and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, ArchetypeError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ArchetypeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Validate the target column and every pass.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.target_column.trim().is_empty() {
            return Err(ConfigValidationError::EmptyTargetColumn);
        }
        if self.passes.is_empty() {
            return Err(ConfigValidationError::NoPasses);
        }

        let mut names = HashSet::new();
        for pass in &self.passes {
            pass.validate()?;
            if !names.insert(pass.archetype_name.as_str()) {
                return Err(ConfigValidationError::DuplicatePassName(
                    pass.archetype_name.clone(),
                ));
            }
            if pass.key_columns.contains(&self.target_column) {
                return Err(ConfigValidationError::TargetIsKeyColumn {
                    target: self.target_column.clone(),
                    pass: pass.archetype_name.clone(),
                });
            }
            if pass.excluded_columns.contains(&self.target_column) {
                return Err(ConfigValidationError::TargetExcluded {
                    target: self.target_column.clone(),
                    pass: pass.archetype_name.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Archetype name must not be empty")]
    EmptyArchetypeName,

    #[error("Archetype '{0}' has no key columns")]
    NoKeyColumns(String),

    #[error("Key column '{0}' is listed more than once")]
    DuplicateKeyColumn(String),

    #[error("Key column '{0}' is also excluded")]
    KeyColumnExcluded(String),

    #[error("Column '{0}' is reserved for archetype bookkeeping and cannot be a key")]
    ReservedColumn(String),

    #[error("Invalid minimum sample size: {0} (must be at least 1)")]
    InvalidSampleSize(usize),

    #[error("Target column must not be empty")]
    EmptyTargetColumn,

    #[error("Pipeline has no archetype passes")]
    NoPasses,

    #[error("Archetype pass '{0}' is defined more than once")]
    DuplicatePassName(String),

    #[error("Target column '{target}' is a key column of pass '{pass}'")]
    TargetIsKeyColumn { target: String, pass: String },

    #[error("Target column '{target}' is excluded by pass '{pass}'")]
    TargetExcluded { target: String, pass: String },
}

impl From<ConfigValidationError> for ArchetypeError {
    fn from(err: ConfigValidationError) -> Self {
        ArchetypeError::InvalidConfig(err.to_string())
    }
}
