//! Error types for archetype construction and imputation.
//!
//! Failures fall into two families: configuration errors (invalid column sets
//! or thresholds supplied by the caller) and schema errors (the table does not
//! have the columns or dtypes a pass refers to). Neither is transient, so
//! nothing in this crate retries.
//!
//! Errors are serializable so a caller can forward them as `{code, message}`.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for archetype passes.
#[derive(Error, Debug)]
pub enum ArchetypeError {
    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The archetype table holds more than one row for the same key combination.
    #[error("Archetype table has duplicate rows for key {0}")]
    DuplicateArchetype(String),

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Column dtype cannot be aggregated into an archetype value.
    #[error("Column '{column}' has unsupported dtype {dtype} for archetype aggregation")]
    UnsupportedDtype { column: String, dtype: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ArchetypeError>,
    },
}

impl ArchetypeError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ArchetypeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code for callers that branch on the failure kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::DuplicateArchetype(_) => "DUPLICATE_ARCHETYPE",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::UnsupportedDtype { .. } => "UNSUPPORTED_DTYPE",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error was caused by caller-supplied configuration.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Self::InvalidConfig(_) | Self::DuplicateArchetype(_) => true,
            Self::WithContext { source, .. } => source.is_configuration_error(),
            _ => false,
        }
    }

    /// Check if this error is a mismatch between a pass and the table schema.
    pub fn is_schema_error(&self) -> bool {
        match self {
            Self::ColumnNotFound(_) | Self::UnsupportedDtype { .. } => true,
            Self::WithContext { source, .. } => source.is_schema_error(),
            _ => false,
        }
    }
}

/// Serialized as a struct with `code` and `message` fields.
impl Serialize for ArchetypeError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("ArchetypeError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for archetype operations.
pub type Result<T> = std::result::Result<T, ArchetypeError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ArchetypeError::Polars(e).with_context(context))
    }
}
