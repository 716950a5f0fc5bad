//! Error types for the analysis engine.

use thiserror::Error;

use crate::types::TrackId;

/// Errors that can occur while analyzing or editing a track.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The audio file could not be opened, probed or decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Frame-level features or activations could not be computed.
    #[error("Feature extraction error: {0}")]
    FeatureExtraction(String),

    /// The beat or structure pipeline failed with no usable fallback.
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Malformed edit input (non-finite offset, non-positive BPM, ...).
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Track not found: {0}")]
    NotFound(TrackId),

    #[error("Track {0} has not been analyzed yet")]
    NotAnalyzed(TrackId),

    #[error("Track {0} is already being analyzed")]
    AnalysisInProgress(TrackId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<symphonia::core::errors::Error> for AnalysisError {
    fn from(e: symphonia::core::errors::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
