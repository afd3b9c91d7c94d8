//! Texture error types.

use std::fmt;

/// Errors that can occur while creating, adopting or uploading to a texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureError {
    /// A native resource, host buffer or view descriptor could not be allocated.
    AllocationFailure(String),
    /// A requested dimension exceeds its fixed maximum.
    CapacityExceeded {
        /// Name of the offending dimension.
        dimension: &'static str,
        /// Requested value.
        requested: u32,
        /// Largest accepted value.
        max: u32,
    },
    /// The upload ring buffer could not satisfy a reservation, even after a forced submission.
    StreamingBufferExhausted {
        /// Bytes requested.
        size: u32,
    },
    /// The staging resource could not be created or written.
    StagingFailure(String),
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// The operation requires a texture that owns a resource.
    InvalidTexture,
}

impl fmt::Display for TextureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailure(msg) => write!(f, "allocation failed: {msg}"),
            Self::CapacityExceeded {
                dimension,
                requested,
                max,
            } => write!(f, "{dimension} of {requested} exceeds maximum of {max}"),
            Self::StreamingBufferExhausted { size } => {
                write!(f, "stream buffer exhausted while reserving {size} bytes")
            }
            Self::StagingFailure(msg) => write!(f, "staging upload failed: {msg}"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::InvalidTexture => write!(f, "texture has no resource"),
        }
    }
}

impl std::error::Error for TextureError {}
