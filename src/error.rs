//! Error handling for vimc-rs
//!
//! This module defines the crate-level error type and a Result alias. Errors
//! raised inside the pipeline engine are [`PipelineError`]s and convert into
//! [`SimError`] with `?`.

use crate::pipeline::PipelineError;
use thiserror::Error;

/// Main error type for vimc-rs operations
#[derive(Error, Debug)]
pub enum SimError {
    /// Errors raised by the pipeline engine
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors in a topology description
    #[error("Topology error: {0}")]
    Topology(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<SimError>,
    },
}

impl SimError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        SimError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The pipeline error at the root of this error, if any
    pub fn pipeline_error(&self) -> Option<&PipelineError> {
        match self {
            SimError::Pipeline(e) => Some(e),
            SimError::WithContext { source, .. } => source.pipeline_error(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        SimError::Serialization(err.to_string())
    }
}

/// Result type alias for vimc-rs operations
pub type Result<T> = std::result::Result<T, SimError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| SimError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SimError::from(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::Config("frame limits inverted".to_string());
        assert_eq!(err.to_string(), "Configuration error: frame limits inverted");
    }

    #[test]
    fn test_error_with_context() {
        let err = SimError::Topology("unknown driver".to_string());
        let with_ctx = err.with_context("Failed to build topology");
        assert!(with_ctx.to_string().contains("Failed to build topology"));
    }

    #[test]
    fn test_pipeline_error_survives_context() {
        let result: std::result::Result<(), PipelineError> =
            Err(PipelineError::NotStreaming("capture".to_string()));
        let err = result.context("dequeue").unwrap_err();
        assert!(matches!(
            err.pipeline_error(),
            Some(PipelineError::NotStreaming(_))
        ));
    }
}
