//! Frame-level audio features.
//!
//! Everything here is computed on the centered STFT grid (one frame per hop,
//! frame `t` centered on sample `t * hop_size`), so chroma, MFCC, contrast,
//! RMS and onset strength all line up frame for frame.

mod chroma;
mod contrast;
mod mfcc;
mod onset;
mod spectral;

use serde::{Deserialize, Serialize};

pub use onset::{normalize_and_smooth, OnsetEnvelope};
pub use spectral::{MelFilterbank, Spectrogram};

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;

/// Stacked chroma, MFCC and spectral contrast vectors, one column per frame.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// `columns[t]` is the feature vector of frame `t`.
    pub columns: Vec<Vec<f32>>,
    pub hop_size: usize,
    pub sample_rate: u32,
}

impl FeatureMatrix {
    pub fn num_frames(&self) -> usize {
        self.columns.len()
    }

    /// Feature dimension (0 for an empty matrix).
    pub fn dimension(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn frame_to_seconds(&self, frame: usize) -> f64 {
        frame as f64 * self.hop_size as f64 / self.sample_rate as f64
    }

    /// Mean feature vector over frames `start..end`.
    pub fn mean(&self, start: usize, end: usize) -> Vec<f32> {
        let mut mean = vec![0.0f32; self.dimension()];
        let end = end.min(self.columns.len());
        if start >= end {
            return mean;
        }
        for column in &self.columns[start..end] {
            for (acc, v) in mean.iter_mut().zip(column) {
                *acc += v;
            }
        }
        let count = (end - start) as f32;
        for v in mean.iter_mut() {
            *v /= count;
        }
        mean
    }

    /// Copy with every feature row scaled to zero mean and unit variance.
    ///
    /// Rows with no variance are left at zero so they carry no weight.
    pub fn standardized(&self) -> FeatureMatrix {
        let dims = self.dimension();
        let n = self.columns.len().max(1) as f32;

        let mut means = vec![0.0f32; dims];
        for column in &self.columns {
            for (m, v) in means.iter_mut().zip(column) {
                *m += v / n;
            }
        }
        let mut stds = vec![0.0f32; dims];
        for column in &self.columns {
            for ((s, v), m) in stds.iter_mut().zip(column).zip(&means) {
                *s += (v - m).powi(2) / n;
            }
        }
        for s in stds.iter_mut() {
            *s = s.sqrt();
        }

        let columns = self
            .columns
            .iter()
            .map(|column| {
                column
                    .iter()
                    .zip(means.iter().zip(&stds))
                    .map(|(v, (m, s))| if *s > 1e-8 { (v - m) / s } else { 0.0 })
                    .collect()
            })
            .collect();

        FeatureMatrix {
            columns,
            hop_size: self.hop_size,
            sample_rate: self.sample_rate,
        }
    }
}

/// Mel power spectrogram in decibels relative to its loudest cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MelSpectrogram {
    /// `spectrogram[band][frame]`, as displayed (bands are rows).
    pub spectrogram: Vec<Vec<f32>>,
    pub sample_rate: u32,
    pub hop_length: usize,
    pub n_mels: usize,
}

/// Computes frame features from decoded samples.
pub struct FeatureExtractor {
    config: AnalysisConfig,
}

impl FeatureExtractor {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Chroma (12) + MFCC + spectral contrast per frame.
    pub fn features(&self, samples: &[f32], sample_rate: u32) -> Result<FeatureMatrix, AnalysisError> {
        check_samples(samples)?;
        let cfg = &self.config;

        let spec = spectral::power_spectrogram(samples, sample_rate, cfg.fft_size, cfg.hop_size);
        let filterbank = MelFilterbank::new(cfg.n_mels, cfg.fft_size, sample_rate);

        let chroma = chroma::chroma(&spec);
        let mfcc = mfcc::mfcc(&spec, &filterbank, cfg.n_mfcc);
        let contrast = contrast::spectral_contrast(&spec, cfg.contrast_bands, cfg.contrast_fmin);

        let columns: Vec<Vec<f32>> = chroma
            .into_iter()
            .zip(mfcc)
            .zip(contrast)
            .map(|((mut column, mfcc), contrast)| {
                column.extend(mfcc);
                column.extend(contrast);
                column
            })
            .collect();

        if columns.iter().flatten().any(|v| !v.is_finite()) {
            return Err(AnalysisError::FeatureExtraction(
                "non-finite feature values".to_string(),
            ));
        }

        log::debug!(
            "Extracted {} feature frames of dimension {}",
            columns.len(),
            columns.first().map_or(0, Vec::len)
        );

        Ok(FeatureMatrix {
            columns,
            hop_size: cfg.hop_size,
            sample_rate,
        })
    }

    /// Frame RMS loudness on the analysis hop grid.
    pub fn rms(&self, samples: &[f32], frame_length: usize) -> Result<Vec<f32>, AnalysisError> {
        check_samples(samples)?;
        if frame_length == 0 {
            return Err(AnalysisError::FeatureExtraction(
                "frame length must be positive".to_string(),
            ));
        }
        Ok(onset::rms(samples, frame_length, self.config.hop_size))
    }

    /// Onset strength envelope (log-mel spectral flux).
    pub fn onset_envelope(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<OnsetEnvelope, AnalysisError> {
        check_samples(samples)?;
        let cfg = &self.config;
        let spec = spectral::power_spectrogram(samples, sample_rate, cfg.fft_size, cfg.hop_size);
        let filterbank = MelFilterbank::new(cfg.n_mels, cfg.fft_size, sample_rate);
        Ok(onset::onset_envelope(&spec, &filterbank))
    }

    /// Mel spectrogram in dB (reference = maximum power) for display.
    pub fn mel_spectrogram_db(
        &self,
        samples: &[f32],
        sample_rate: u32,
        n_mels: usize,
        hop_length: usize,
    ) -> Result<MelSpectrogram, AnalysisError> {
        check_samples(samples)?;
        if n_mels == 0 || hop_length == 0 {
            return Err(AnalysisError::Validation(
                "n_mels and hop_length must be positive".to_string(),
            ));
        }

        let spec = spectral::power_spectrogram(samples, sample_rate, self.config.fft_size, hop_length);
        let filterbank = MelFilterbank::new(n_mels, self.config.fft_size, sample_rate);
        let mut frames = filterbank.apply_all(&spec);

        let reference = frames.iter().flatten().copied().fold(0.0f32, f32::max);
        spectral::power_to_db(&mut frames, reference);

        // Transpose to bands x frames
        let spectrogram = (0..n_mels)
            .map(|band| frames.iter().map(|frame| frame[band]).collect())
            .collect();

        Ok(MelSpectrogram {
            spectrogram,
            sample_rate,
            hop_length,
            n_mels,
        })
    }
}

fn check_samples(samples: &[f32]) -> Result<(), AnalysisError> {
    if samples.is_empty() {
        return Err(AnalysisError::FeatureExtraction(
            "no samples to analyze".to_string(),
        ));
    }
    if samples.iter().any(|s| !s.is_finite()) {
        return Err(AnalysisError::FeatureExtraction(
            "non-finite samples in waveform".to_string(),
        ));
    }
    Ok(())
}
