//! Loudness-driven sections (drop / breakdown / verse).

use crate::audio::Waveform;
use crate::config::EnergyConfig;
use crate::error::AnalysisError;
use crate::features::FeatureExtractor;
use crate::types::{Section, SectionLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnergyState {
    Normal,
    High,
    Low,
}

impl EnergyState {
    fn label(self) -> SectionLabel {
        match self {
            Self::High => SectionLabel::Drop,
            Self::Low => SectionLabel::Breakdown,
            Self::Normal => SectionLabel::Verse,
        }
    }
}

/// Splits a track where its smoothed loudness crosses fixed thresholds.
pub struct EnergyDetector {
    config: EnergyConfig,
}

impl EnergyDetector {
    pub fn new(config: EnergyConfig) -> Self {
        Self { config }
    }

    pub fn detect(
        &self,
        waveform: &Waveform,
        extractor: &FeatureExtractor,
    ) -> Result<Vec<Section>, AnalysisError> {
        let rms = extractor.rms(&waveform.samples, self.config.frame_length)?;
        let sections = self.sections_from_rms(
            &rms,
            extractor.config().hop_size,
            waveform.sample_rate,
            waveform.duration(),
        );
        log::debug!("Found {} energy sections", sections.len());
        Ok(sections)
    }

    /// Run the state machine over a raw RMS curve.
    ///
    /// The curve is median filtered, min-max normalized and scanned from frame
    /// 1. Every state change closes the running section at that frame; the
    /// last section runs to `duration`.
    pub fn sections_from_rms(
        &self,
        rms: &[f32],
        hop_size: usize,
        sample_rate: u32,
        duration: f64,
    ) -> Vec<Section> {
        if rms.is_empty() {
            return Vec::new();
        }

        let smoothed = median_filter(rms, self.config.smoothing_frames.max(1));
        let normalized = min_max_normalize(&smoothed);
        let frame_time = |i: usize| i as f64 * hop_size as f64 / sample_rate as f64;

        let (high, low) = (self.config.high_threshold, self.config.low_threshold);
        let mut sections = Vec::new();
        let mut state = EnergyState::Normal;
        let mut section_start = 0usize;

        for (i, &value) in normalized.iter().enumerate().skip(1) {
            let next = if value > high && state != EnergyState::High {
                EnergyState::High
            } else if value < low && state != EnergyState::Low {
                EnergyState::Low
            } else if (low..=high).contains(&value) && state != EnergyState::Normal {
                EnergyState::Normal
            } else {
                state
            };

            if next != state {
                sections.push(Section::new(
                    frame_time(section_start),
                    frame_time(i),
                    state.label(),
                ));
                section_start = i;
                state = next;
            }
        }

        let start = frame_time(section_start);
        if start < duration {
            sections.push(Section::new(start, duration, state.label()));
        }
        sections
    }
}

/// Median filter with mirrored edges (`d c b a | a b c d | d c b a`).
fn median_filter(values: &[f32], size: usize) -> Vec<f32> {
    let n = values.len() as isize;
    let half = (size / 2) as isize;
    let mut window = Vec::with_capacity(size);

    (0..n)
        .map(|i| {
            window.clear();
            for offset in -half..=(size as isize - 1 - half) {
                window.push(values[reflect(i + offset, n)]);
            }
            window.sort_by(|a, b| a.total_cmp(b));
            window[window.len() / 2]
        })
        .collect()
}

fn reflect(mut idx: isize, n: isize) -> usize {
    // Short inputs may need several reflections
    loop {
        if idx < 0 {
            idx = -idx - 1;
        } else if idx >= n {
            idx = 2 * n - idx - 1;
        } else {
            return idx as usize;
        }
    }
}

fn min_max_normalize(values: &[f32]) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    values.iter().map(|v| (v - min) / (max - min + 1e-8)).collect()
}
