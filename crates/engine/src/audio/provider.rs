use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{load_waveform, Waveform};
use crate::error::AnalysisError;

/// Min/max envelope of a waveform for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformPeaks {
    pub peaks_positive: Vec<f32>,
    pub peaks_negative: Vec<f32>,
    /// Duration in seconds.
    pub duration: f64,
    pub sample_rate: u32,
    /// Number of buckets actually produced (can be below the request for very
    /// short files).
    pub num_points: usize,
}

/// Decodes audio files and caches the result per path.
///
/// Lookups take the read lock. Decoding runs outside any lock, so two callers
/// may decode the same file concurrently; the first insert wins and both get
/// the same `Arc`.
pub struct WaveformProvider {
    sample_rate: u32,
    cache: RwLock<HashMap<PathBuf, Arc<Waveform>>>,
}

impl WaveformProvider {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Get the decoded waveform for a file, decoding it on first use.
    pub fn load(&self, path: &Path) -> Result<Arc<Waveform>, AnalysisError> {
        if let Some(waveform) = self.cache.read().get(path) {
            return Ok(Arc::clone(waveform));
        }

        let decoded = Arc::new(load_waveform(path, self.sample_rate)?);
        log::debug!(
            "Cached {:.1}s of audio for {:?}",
            decoded.duration(),
            path
        );

        let mut cache = self.cache.write();
        let entry = cache.entry(path.to_path_buf()).or_insert(decoded);
        Ok(Arc::clone(entry))
    }

    /// Duration of a file in seconds.
    pub fn duration(&self, path: &Path) -> Result<f64, AnalysisError> {
        Ok(self.load(path)?.duration())
    }

    /// Downsample a file to `num_points` min/max pairs.
    pub fn peaks(&self, path: &Path, num_points: usize) -> Result<WaveformPeaks, AnalysisError> {
        if num_points == 0 {
            return Err(AnalysisError::Validation(
                "num_points must be positive".to_string(),
            ));
        }
        let waveform = self.load(path)?;
        Ok(compute_peaks(&waveform, num_points))
    }

    /// Drop the cached waveform for a path.
    pub fn evict(&self, path: &Path) -> bool {
        self.cache.write().remove(path).is_some()
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.cache.read().contains_key(path)
    }

    #[cfg(test)]
    pub(crate) fn insert(&self, waveform: Waveform) -> Arc<Waveform> {
        let waveform = Arc::new(waveform);
        self.cache
            .write()
            .insert(waveform.path.clone(), Arc::clone(&waveform));
        waveform
    }
}

fn compute_peaks(waveform: &Waveform, num_points: usize) -> WaveformPeaks {
    let samples = &waveform.samples;
    let samples_per_point = (samples.len() / num_points).max(1);

    // Never more buckets than samples
    let capacity = num_points.min(samples.len());
    let mut peaks_positive = Vec::with_capacity(capacity);
    let mut peaks_negative = Vec::with_capacity(capacity);

    for i in 0..num_points {
        let start = i * samples_per_point;
        if start >= samples.len() {
            break;
        }
        let end = (start + samples_per_point).min(samples.len());
        let segment = &samples[start..end];

        peaks_positive.push(segment.iter().copied().fold(f32::NEG_INFINITY, f32::max));
        peaks_negative.push(segment.iter().copied().fold(f32::INFINITY, f32::min));
    }

    WaveformPeaks {
        num_points: peaks_positive.len(),
        peaks_positive,
        peaks_negative,
        duration: waveform.duration(),
        sample_rate: waveform.sample_rate,
    }
}
