//! Track lifecycle: register, analyze, edit, export.
//!
//! [`AnalysisService`] ties the decoder cache, the beat and structure
//! pipelines and the track repository together. Every call is synchronous.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audio::{detect_format, WaveformPeaks, WaveformProvider};
use crate::beat::{
    self, ActivationModel, BeatDetection, BeatDetector, DownbeatSource, TrackerKind,
};
use crate::config::EngineConfig;
use crate::error::AnalysisError;
use crate::export::{self, ExportFormat};
use crate::features::{FeatureExtractor, MelSpectrogram};
use crate::repository::{TrackRecord, TrackRepository};
use crate::structure::StructureAnalyzer;
use crate::types::{BeatGrid, ClickEvent, StructureResult, TrackId, TrackStatus};

/// Peak pairs returned by [`AnalysisService::waveform`] when unspecified.
pub const DEFAULT_WAVEFORM_POINTS: usize = 2000;

/// Beats and structure of an analyzed track.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub id: TrackId,
    pub filename: String,
    pub duration: f64,
    pub status: TrackStatus,
    pub beats: BeatGrid,
    pub tracker: TrackerKind,
    pub downbeat_source: DownbeatSource,
    pub structure: StructureResult,
}

impl AnalysisReport {
    fn from_record(record: &TrackRecord) -> Option<Self> {
        Some(Self {
            id: record.id,
            filename: record.filename.clone(),
            duration: record.duration,
            status: record.status,
            beats: record.beats.clone()?,
            tracker: record.tracker?,
            downbeat_source: record.downbeat_source.clone()?,
            structure: record.structure.clone()?,
        })
    }
}

/// Lightweight view of a track for listings and status polls.
#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
    pub id: TrackId,
    pub filename: String,
    pub status: TrackStatus,
    pub duration: f64,
    pub bpm: Option<f64>,
    pub num_sections: Option<usize>,
    pub error: Option<String>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl From<&TrackRecord> for TrackSummary {
    fn from(record: &TrackRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename.clone(),
            status: record.status,
            duration: record.duration,
            bpm: record.beats.as_ref().map(|grid| grid.bpm),
            num_sections: record.structure.as_ref().map(|s| s.num_sections),
            error: record.error.clone(),
            analyzed_at: record.analyzed_at,
        }
    }
}

/// A manual correction of a track's grid.
///
/// Fields apply in declaration order: explicit beats, then the phase offset,
/// then the tempo override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatUpdate {
    pub beats: Option<Vec<f64>>,
    pub offset: Option<f64>,
    pub bpm: Option<f64>,
}

impl BeatUpdate {
    pub fn is_empty(&self) -> bool {
        self.beats.is_none() && self.offset.is_none() && self.bpm.is_none()
    }
}

/// Click events for a grid plus its tempo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClickTrack {
    pub clicks: Vec<ClickEvent>,
    pub bpm: f64,
}

/// Result of claiming a record for analysis.
enum Claim {
    Cached(AnalysisReport),
    Run(PathBuf),
}

/// Registers tracks and runs the analysis pipelines on demand.
pub struct AnalysisService {
    config: EngineConfig,
    provider: WaveformProvider,
    extractor: FeatureExtractor,
    detector: BeatDetector,
    structure: StructureAnalyzer,
    repository: TrackRepository,
}

impl AnalysisService {
    pub fn new(config: EngineConfig) -> Self {
        let detector = BeatDetector::new(&config);
        Self::with_detector(config, detector)
    }

    /// Use `model` for beat activations instead of the configured source.
    pub fn with_model(config: EngineConfig, model: Box<dyn ActivationModel>) -> Self {
        let detector = BeatDetector::with_model(&config, model);
        Self::with_detector(config, detector)
    }

    fn with_detector(config: EngineConfig, detector: BeatDetector) -> Self {
        log::debug!("Analysis service using the {} tracker", detector.kind());
        Self {
            provider: WaveformProvider::new(config.analysis.sample_rate),
            extractor: FeatureExtractor::new(config.analysis.clone()),
            structure: StructureAnalyzer::new(&config),
            repository: TrackRepository::new(),
            detector,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> &TrackRepository {
        &self.repository
    }

    pub fn provider(&self) -> &WaveformProvider {
        &self.provider
    }

    /// Register an audio file. Returns the existing id when the path is
    /// already registered.
    pub fn register(&self, path: impl AsRef<Path>) -> Result<TrackId, AnalysisError> {
        let path = path.as_ref();
        let format = detect_format(path)?;

        if let Some(existing) = self.repository.get_by_path(path) {
            log::info!("Track already registered: {:?}", path);
            return Ok(existing.id);
        }

        let duration = self.provider.duration(path)?;
        let (id, created) = self
            .repository
            .get_or_create(path.to_path_buf(), format, duration);
        if created {
            log::info!("Registered track {} ({:?}, {:.1}s)", id, path, duration);
        } else {
            log::info!("Track already registered: {:?}", path);
        }
        Ok(id)
    }

    /// Analyze a track with the configured section count.
    pub fn analyze(&self, id: TrackId) -> Result<AnalysisReport, AnalysisError> {
        self.analyze_with_sections(id, self.config.structure.target_sections)
    }

    /// Analyze a track, returning the stored report if it is already
    /// analyzed.
    pub fn analyze_with_sections(
        &self,
        id: TrackId,
        target_sections: usize,
    ) -> Result<AnalysisReport, AnalysisError> {
        let claim = self.repository.with_record(id, |record| match record.status {
            TrackStatus::Analyzing => Err(AnalysisError::AnalysisInProgress(id)),
            TrackStatus::Analyzed => match AnalysisReport::from_record(record) {
                Some(report) => Ok(Claim::Cached(report)),
                None => {
                    record.status = TrackStatus::Analyzing;
                    Ok(Claim::Run(record.file_path.clone()))
                }
            },
            TrackStatus::Uploaded | TrackStatus::Error => {
                record.status = TrackStatus::Analyzing;
                Ok(Claim::Run(record.file_path.clone()))
            }
        })??;

        let path = match claim {
            Claim::Cached(report) => {
                log::debug!("Track {} already analyzed", id);
                return Ok(report);
            }
            Claim::Run(path) => path,
        };

        log::info!("Analyzing track {} ({:?})", id, path);
        match self.run_pipeline(&path, target_sections) {
            Ok((detection, structure)) => {
                let report = self.repository.with_record(id, |record| {
                    record.status = TrackStatus::Analyzed;
                    record.duration = structure.duration;
                    record.beats = Some(detection.grid);
                    record.tracker = Some(detection.tracker);
                    record.downbeat_source = Some(detection.downbeats);
                    record.structure = Some(structure);
                    record.error = None;
                    record.analyzed_at = Some(Utc::now());
                    AnalysisReport::from_record(record)
                })?;
                report.ok_or_else(|| {
                    AnalysisError::Analysis(format!("track {} lost its results", id))
                })
            }
            Err(e) => {
                log::error!("Analysis of track {} failed: {}", id, e);
                let message = e.to_string();
                // The record may have been deleted while the pipeline ran
                let _ = self.repository.with_record(id, |record| {
                    record.status = TrackStatus::Error;
                    record.error = Some(message);
                });
                Err(e)
            }
        }
    }

    fn run_pipeline(
        &self,
        path: &Path,
        target_sections: usize,
    ) -> Result<(BeatDetection, StructureResult), AnalysisError> {
        let waveform = self.provider.load(path)?;
        let detection = self.detector.detect(&waveform)?;
        if let DownbeatSource::Assumed { reason: Some(reason) } = &detection.downbeats {
            log::info!("Downbeats assumed under 4/4: {}", reason);
        }
        let structure = self.structure.analyze_with_target(&waveform, target_sections)?;
        Ok((detection, structure))
    }

    pub fn status(&self, id: TrackId) -> Result<TrackSummary, AnalysisError> {
        self.repository.with_record(id, |record| TrackSummary::from(&*record))
    }

    /// Full record snapshot.
    pub fn track(&self, id: TrackId) -> Result<TrackRecord, AnalysisError> {
        self.repository.get(id)
    }

    pub fn list(&self) -> Vec<TrackSummary> {
        self.repository
            .ids()
            .into_iter()
            .filter_map(|id| self.status(id).ok())
            .collect()
    }

    /// Forget a track and its cached audio. The file itself is left in place.
    pub fn delete(&self, id: TrackId) -> Result<(), AnalysisError> {
        let record = self.repository.remove(id)?;
        self.provider.evict(&record.file_path);
        log::info!("Deleted track {} ({})", id, record.filename);
        Ok(())
    }

    /// Shift and re-densify a free-standing beat list.
    pub fn adjust_beats(
        &self,
        beats: &[f64],
        offset: Option<f64>,
        multiplier: Option<f64>,
    ) -> Result<Vec<f64>, AnalysisError> {
        beat::adjust_beats(beats, offset.unwrap_or(0.0), multiplier.unwrap_or(1.0))
    }

    /// Apply a manual correction to a track's grid and return the new grid.
    ///
    /// Either the whole update applies or none of it does.
    pub fn update_beats(&self, id: TrackId, update: BeatUpdate) -> Result<BeatGrid, AnalysisError> {
        if update.is_empty() {
            return Err(AnalysisError::Validation(
                "update must set beats, offset or bpm".to_string(),
            ));
        }
        if let Some(beats) = &update.beats {
            if beats.iter().any(|b| !b.is_finite()) {
                return Err(AnalysisError::Validation(
                    "beat times must be finite".to_string(),
                ));
            }
        }
        if let Some(bpm) = update.bpm {
            if !bpm.is_finite() || bpm <= 0.0 {
                return Err(AnalysisError::Validation(format!(
                    "bpm must be a positive number, got {}",
                    bpm
                )));
            }
        }

        let replaces_beats = update.beats.is_some() || update.offset.is_some();

        self.repository.with_record(id, |record| -> Result<BeatGrid, AnalysisError> {
            let current = record.beats.as_ref().ok_or(AnalysisError::NotAnalyzed(id))?;
            let mut grid = current.clone();

            if let Some(beats) = update.beats {
                grid.replace_beats(beats);
            }
            if let Some(offset) = update.offset {
                let shifted = beat::adjust_beats(&grid.beats, offset, 1.0)?;
                grid.replace_beats(shifted);
            }
            if let Some(bpm) = update.bpm {
                grid.bpm = bpm;
            }

            log::info!(
                "Updated grid of track {}: {} beats at {:.2} BPM",
                id,
                grid.beats.len(),
                grid.bpm
            );
            record.beats = Some(grid.clone());
            if replaces_beats {
                record.downbeat_source = Some(DownbeatSource::Assumed { reason: None });
            }
            Ok(grid)
        })?
    }

    pub fn click_track(&self, id: TrackId) -> Result<ClickTrack, AnalysisError> {
        self.repository.with_record(id, |record| -> Result<ClickTrack, AnalysisError> {
            let grid = record.beats.as_ref().ok_or(AnalysisError::NotAnalyzed(id))?;
            Ok(ClickTrack {
                clicks: beat::generate_clicks(&grid.beats, &grid.downbeats),
                bpm: grid.bpm,
            })
        })?
    }

    /// Render an analyzed track as JSON or CSV.
    pub fn export(&self, id: TrackId, format: ExportFormat) -> Result<String, AnalysisError> {
        let record = self.repository.get(id)?;
        match (record.status, &record.beats, &record.structure) {
            (TrackStatus::Analyzed, Some(beats), Some(structure)) => {
                export::render(format, &record.filename, record.duration, beats, structure)
            }
            _ => Err(AnalysisError::NotAnalyzed(id)),
        }
    }

    /// Min/max envelope of a track for display.
    pub fn waveform(&self, id: TrackId, num_points: usize) -> Result<WaveformPeaks, AnalysisError> {
        let path = self.repository.with_record(id, |record| record.file_path.clone())?;
        self.provider.peaks(&path, num_points)
    }

    /// Mel spectrogram of a track in dB relative to its loudest cell.
    pub fn spectrogram(
        &self,
        id: TrackId,
        n_mels: usize,
        hop_length: usize,
    ) -> Result<MelSpectrogram, AnalysisError> {
        let path = self.repository.with_record(id, |record| record.file_path.clone())?;
        let waveform = self.provider.load(&path)?;
        self.extractor
            .mel_spectrogram_db(&waveform.samples, waveform.sample_rate, n_mels, hop_length)
    }
}
