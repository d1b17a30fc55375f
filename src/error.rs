//! Error taxonomy for audio resource operations
//!
//! Every failure carries a human-readable message; engine failures carry the
//! engine's own text.

use crate::dispatch::SampleType;
use crate::engine::{EngineError, ErrorCode};
use crate::format::FormatWord;

/// Errors raised by `AudioResource` and its helpers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SndError {
    /// The engine could not open/create the resource, or post-open validation failed
    #[error("Cannot open {name}: {message}")]
    Open { name: String, message: String },

    /// The format word and metadata failed the engine compatibility check
    #[error("Unsupported format {format} ({samplerate} Hz, {channels} channels)")]
    UnsupportedFormat {
        format: FormatWord,
        samplerate: u32,
        channels: u32,
    },

    /// No transfer primitive exists for the requested sample type
    #[error("Unsupported sample representation: {0}")]
    UnsupportedRepresentation(SampleType),

    /// Non-positive, inverted or overflowing frame range
    #[error("Invalid frame range: {0}")]
    InvalidRange(String),

    /// The engine refused the seek, or the resource is not seekable
    #[error("Seek failed: {0}")]
    SeekFailed(String),

    /// The engine returned an element count that does not divide by the channel count
    #[error("Malformed file: {elements} elements is not a whole number of {channels}-channel frames")]
    MalformedFile { elements: u64, channels: u32 },

    /// Operation attempted after close
    #[error("Resource closed")]
    ResourceClosed,

    /// The engine reported a failure while closing
    #[error("Cannot close {name}: {message}")]
    Close { name: String, message: String },

    /// The engine reported a read/write failure
    #[error("Engine error ({code:?}): {message}")]
    Engine { code: ErrorCode, message: String },

    /// Both the body of a scoped use and the subsequent close failed
    #[error("{body}; additionally, closing failed: {close}")]
    Scoped {
        body: Box<SndError>,
        close: Box<SndError>,
    },
}

impl From<EngineError> for SndError {
    fn from(err: EngineError) -> Self {
        SndError::Engine {
            code: err.code,
            message: err.message,
        }
    }
}

/// Result type for audio resource operations
pub type Result<T> = std::result::Result<T, SndError>;

impl SndError {
    /// Returns true for the closed-resource guard failure
    pub fn is_closed(&self) -> bool {
        matches!(self, SndError::ResourceClosed)
    }
}
