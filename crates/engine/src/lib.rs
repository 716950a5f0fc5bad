//! Beatgrid Engine
//!
//! Beat grid and song structure analysis for recorded music tracks.
//!
//! # Features
//!
//! - Beat, downbeat and BPM detection with a neural-activation tracker and an
//!   onset/autocorrelation fallback chosen once at construction
//! - Manual beat corrections (phase offset, tempo multiplier, explicit beats)
//! - Click track generation with accented downbeats
//! - Structural segmentation (intro/verse/chorus/bridge/outro)
//! - Energy sections (drop/breakdown) from the loudness envelope
//! - In-memory track repository with per-track locking
//! - JSON and CSV export

pub mod audio;
pub mod beat;
pub mod config;
pub mod error;
pub mod export;
pub mod features;
pub mod repository;
pub mod service;
pub mod structure;

mod outcome;
mod types;

// Re-export main types
pub use beat::{
    adjust_beats, generate_clicks, ActivationModel, BeatDetection, BeatDetector, DownbeatSource,
    TrackerKind,
};
pub use config::{ConfigManager, EngineConfig};
pub use error::AnalysisError;
pub use export::ExportFormat;
pub use outcome::{Outcome, StepSource};
pub use repository::{TrackRecord, TrackRepository};
pub use service::{AnalysisReport, AnalysisService, BeatUpdate, ClickTrack, TrackSummary};
pub use types::{
    AudioFormat, BeatGrid, ClickEvent, Section, SectionLabel, StructureResult, TrackId,
    TrackStatus,
};
