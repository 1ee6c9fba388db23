//! Pipeline-specific error types.

use crate::pipeline::id::{EntityId, LinkId};
use thiserror::Error;

/// Errors that can occur within the pipeline engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Malformed graph construction or configuration request.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown entity {0:?}")]
    UnknownEntity(EntityId),

    #[error("Unknown link {0:?}")]
    UnknownLink(LinkId),

    /// Link validation failed at stream start.
    #[error("Format mismatch on link {link:?}: {reason}")]
    FormatMismatch { link: LinkId, reason: String },

    /// A working buffer or background task could not be allocated.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Buffer {index} too small: {size} bytes, {required} required")]
    BufferTooSmall {
        index: u32,
        size: usize,
        required: usize,
    },

    #[error("Entity '{0}' is streaming")]
    AlreadyStreaming(String),

    #[error("Entity '{0}' is not streaming")]
    NotStreaming(String),
}

impl PipelineError {
    pub fn invalid(message: impl Into<String>) -> Self {
        PipelineError::InvalidArgument(message.into())
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
