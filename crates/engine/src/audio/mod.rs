//! Decoded audio and the shared waveform cache.

mod decode;
mod provider;

use std::path::{Path, PathBuf};

pub use decode::{load_waveform, resample};
pub use provider::{WaveformPeaks, WaveformProvider};

use crate::error::AnalysisError;
use crate::types::AudioFormat;

/// Extensions accepted for analysis.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a", "aac", "aiff", "aif"];

/// Mono audio at the analysis sample rate.
#[derive(Debug, Clone)]
pub struct Waveform {
    pub path: PathBuf,
    /// Samples normalized to -1.0..1.0.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn from_samples(path: impl Into<PathBuf>, samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            path: path.into(),
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Check if a file has a supported audio extension.
pub fn is_supported_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Resolve the format of a file, rejecting anything outside the supported set.
pub fn detect_format(path: &Path) -> Result<AudioFormat, AnalysisError> {
    if !is_supported_file(path) {
        return Err(AnalysisError::UnsupportedFormat(
            path.extension()
                .and_then(|e| e.to_str())
                .unwrap_or("<none>")
                .to_string(),
        ));
    }

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    Ok(AudioFormat::from_extension(ext))
}
