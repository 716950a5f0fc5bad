//! Beat, downbeat and tempo detection.
//!
//! Two trackers are available. The neural tracker decodes beat activations
//! from an [`ActivationModel`] and labels bars from its downbeat activations.
//! The onset tracker works from the audio alone and assumes 4/4. Which one
//! runs is decided once, when the [`BeatDetector`] is built.

mod adjust;
mod click;
mod meter;
mod neural;
mod tracking;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use adjust::{adjust_beats, MAX_MULTIPLIER};
pub use click::{generate_clicks, ACCENT_TOLERANCE};
pub use meter::{assign_bars, BarAssignment};
pub use neural::{ActivationModel, Activations, DownbeatActivations, SidecarActivations};
pub use tracking::{bpm_from_intervals, estimate_tempo, track_beats, TempoRange, DEFAULT_BPM};

use crate::audio::Waveform;
use crate::config::{AnalysisConfig, BeatConfig, EngineConfig};
use crate::error::AnalysisError;
use crate::features::FeatureExtractor;
use crate::outcome::Outcome;
use crate::types::BeatGrid;

/// Confidence reported for grids from the neural tracker.
pub const NEURAL_CONFIDENCE: f32 = 0.9;
/// Confidence reported for grids from the onset tracker.
pub const ONSET_CONFIDENCE: f32 = 0.7;

/// Which tracker produced a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    Neural,
    OnsetAutocorrelation,
}

impl TrackerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neural => "neural",
            Self::OnsetAutocorrelation => "onset_autocorrelation",
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Self::Neural => NEURAL_CONFIDENCE,
            Self::OnsetAutocorrelation => ONSET_CONFIDENCE,
        }
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the downbeats of a grid came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DownbeatSource {
    /// Assigned by the meter tracker.
    Tracked { beats_per_bar: usize },
    /// Every 4th beat from the first. `reason` is set when a downbeat model
    /// was tried and failed.
    Assumed { reason: Option<String> },
}

/// A detected grid and how it was obtained.
#[derive(Debug, Clone)]
pub struct BeatDetection {
    pub grid: BeatGrid,
    pub tracker: TrackerKind,
    pub downbeats: DownbeatSource,
}

enum Tracker {
    Neural(Box<dyn ActivationModel>),
    OnsetAutocorrelation(FeatureExtractor),
}

/// Detects beats with the tracker chosen at construction.
pub struct BeatDetector {
    tracker: Tracker,
    config: BeatConfig,
}

impl BeatDetector {
    /// Use the neural tracker when an activations directory is configured and
    /// exists, the onset tracker otherwise.
    pub fn new(config: &EngineConfig) -> Self {
        match &config.beats.activations_dir {
            Some(dir) if dir.is_dir() => {
                log::info!("Using neural beat tracker with activations from {:?}", dir);
                Self::with_model(config, Box::new(SidecarActivations::new(dir.clone())))
            }
            Some(dir) => {
                log::warn!(
                    "Activations directory {:?} not found, using onset beat tracker",
                    dir
                );
                Self::onset(config.analysis.clone(), config.beats.clone())
            }
            None => Self::onset(config.analysis.clone(), config.beats.clone()),
        }
    }

    /// Use the neural tracker with the given activation source.
    pub fn with_model(config: &EngineConfig, model: Box<dyn ActivationModel>) -> Self {
        Self {
            tracker: Tracker::Neural(model),
            config: config.beats.clone(),
        }
    }

    fn onset(analysis: AnalysisConfig, config: BeatConfig) -> Self {
        Self {
            tracker: Tracker::OnsetAutocorrelation(FeatureExtractor::new(analysis)),
            config,
        }
    }

    pub fn kind(&self) -> TrackerKind {
        match self.tracker {
            Tracker::Neural(_) => TrackerKind::Neural,
            Tracker::OnsetAutocorrelation(_) => TrackerKind::OnsetAutocorrelation,
        }
    }

    fn tempo_range(&self) -> TempoRange {
        TempoRange {
            min_bpm: self.config.min_bpm,
            max_bpm: self.config.max_bpm,
            prior_bpm: self.config.prior_bpm,
        }
    }

    /// Detect beats, downbeats and tempo for a decoded track.
    pub fn detect(&self, waveform: &Waveform) -> Result<BeatDetection, AnalysisError> {
        let detection = match &self.tracker {
            Tracker::Neural(model) => self.detect_neural(model.as_ref(), waveform)?,
            Tracker::OnsetAutocorrelation(extractor) => self.detect_onset(extractor, waveform)?,
        };

        log::info!(
            "Detected {} beats at {:.2} BPM ({} tracker, {} downbeats)",
            detection.grid.beats.len(),
            detection.grid.bpm,
            detection.tracker,
            detection.grid.downbeats.len()
        );
        Ok(detection)
    }

    fn detect_neural(
        &self,
        model: &dyn ActivationModel,
        waveform: &Waveform,
    ) -> Result<BeatDetection, AnalysisError> {
        let activations = model.beat_activations(&waveform.path)?;
        neural::validate_beat_activations(&activations)?;

        let beats = match estimate_tempo(&activations.values, activations.fps, self.tempo_range()) {
            Some(tempo) => {
                log::debug!("{} activations suggest {:.2} BPM", model.name(), tempo);
                frames_to_seconds(
                    &track_beats(&activations.values, activations.fps, tempo, self.config.tightness),
                    activations.fps,
                )
            }
            None => Vec::new(),
        };
        let bpm = bpm_from_intervals(&beats);

        let bars = if model.supports_downbeats() {
            model
                .downbeat_activations(&waveform.path)
                .and_then(|act| assign_bars(&beats, &act, &self.config.beats_per_bar))
                .map_or_else(
                    |e| Outcome::fallback(None, e.to_string()),
                    |bars| Outcome::Primary(Some(bars)),
                )
        } else {
            Outcome::fallback(None, "activation model has no downbeat output")
        };

        let (grid, downbeats) = match bars {
            Outcome::Primary(Some(bars)) => {
                let grid = BeatGrid {
                    downbeats: bars.downbeats(&beats),
                    beat_numbers: bars.beat_numbers,
                    beats,
                    bpm,
                    time_signature: "4/4".to_string(),
                    confidence: NEURAL_CONFIDENCE,
                };
                let source = DownbeatSource::Tracked {
                    beats_per_bar: bars.beats_per_bar,
                };
                (grid, source)
            }
            other => {
                let reason = other.reason().map(str::to_string);
                if let Some(reason) = &reason {
                    log::warn!("Downbeat tracking failed, assuming 4/4: {}", reason);
                }
                let grid = BeatGrid::assuming_four_four(beats, bpm, NEURAL_CONFIDENCE);
                (grid, DownbeatSource::Assumed { reason })
            }
        };

        Ok(BeatDetection {
            grid,
            tracker: TrackerKind::Neural,
            downbeats,
        })
    }

    fn detect_onset(
        &self,
        extractor: &FeatureExtractor,
        waveform: &Waveform,
    ) -> Result<BeatDetection, AnalysisError> {
        let envelope = extractor.onset_envelope(&waveform.samples, waveform.sample_rate)?;

        let tempo = estimate_tempo(&envelope.values, envelope.frame_rate, self.tempo_range());
        let beats = match tempo {
            Some(tempo) => {
                log::debug!("Onset autocorrelation suggests {:.2} BPM", tempo);
                frames_to_seconds(
                    &track_beats(&envelope.values, envelope.frame_rate, tempo, self.config.tightness),
                    envelope.frame_rate,
                )
            }
            None => {
                log::warn!("No tempo found in onset envelope of {:?}", waveform.path);
                Vec::new()
            }
        };
        let bpm = tempo.unwrap_or_else(|| bpm_from_intervals(&beats));

        Ok(BeatDetection {
            grid: BeatGrid::assuming_four_four(beats, bpm, ONSET_CONFIDENCE),
            tracker: TrackerKind::OnsetAutocorrelation,
            downbeats: DownbeatSource::Assumed { reason: None },
        })
    }
}

fn frames_to_seconds(frames: &[usize], fps: f32) -> Vec<f64> {
    frames.iter().map(|&f| f as f64 / fps as f64).collect()
}
