//! Core library types for the analysis engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::outcome::StepSource;

/// Bar length assumed whenever no downbeat model is available.
pub const BEATS_PER_BAR_ASSUMED: usize = 4;

/// Unique identifier for a track in the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub i64);

impl From<i64> for TrackId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<TrackId> for i64 {
    fn from(id: TrackId) -> Self {
        id.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported audio formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    Aiff,
    Flac,
    Aac,
    Ogg,
    Unknown,
}

impl AudioFormat {
    /// Determine format from file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "mp3" => Self::Mp3,
            "wav" => Self::Wav,
            "aiff" | "aif" => Self::Aiff,
            "flac" => Self::Flac,
            "aac" | "m4a" => Self::Aac,
            "ogg" => Self::Ogg,
            _ => Self::Unknown,
        }
    }

    /// Get the format as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Aiff => "aiff",
            Self::Flac => "flac",
            Self::Aac => "aac",
            Self::Ogg => "ogg",
            Self::Unknown => "unknown",
        }
    }
}

/// Lifecycle state of a track record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Uploaded,
    Analyzing,
    Analyzed,
    Error,
}

impl TrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Analyzing => "analyzing",
            Self::Analyzed => "analyzed",
            Self::Error => "error",
        }
    }
}

/// Beat grid analysis data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatGrid {
    /// Beat positions in seconds.
    pub beats: Vec<f64>,
    /// Downbeat positions in seconds (first beat of each bar).
    pub downbeats: Vec<f64>,
    /// Position of each beat within its bar, starting at 1.
    pub beat_numbers: Vec<u32>,
    /// Tempo in beats per minute.
    pub bpm: f64,
    /// Time signature, e.g. "4/4".
    pub time_signature: String,
    /// Analysis confidence (0.0-1.0).
    pub confidence: f32,
}

impl BeatGrid {
    /// Build a grid whose downbeats are every 4th beat starting at the first.
    pub fn assuming_four_four(beats: Vec<f64>, bpm: f64, confidence: f32) -> Self {
        let (downbeats, beat_numbers) = synthesize_bars(&beats);
        Self {
            beats,
            downbeats,
            beat_numbers,
            bpm,
            time_signature: "4/4".to_string(),
            confidence,
        }
    }

    /// Replace the beat positions wholesale and re-derive bars assuming 4/4.
    ///
    /// BPM and confidence are left untouched.
    pub fn replace_beats(&mut self, beats: Vec<f64>) {
        let (downbeats, beat_numbers) = synthesize_bars(&beats);
        self.beats = beats;
        self.downbeats = downbeats;
        self.beat_numbers = beat_numbers;
    }

    /// Check whether a beat time is one of the downbeats (exact value match).
    pub fn is_downbeat(&self, beat: f64) -> bool {
        self.downbeats.contains(&beat)
    }
}

/// Downbeats and 1-based beat numbers for a 4/4 bar structure anchored at
/// the first beat.
pub(crate) fn synthesize_bars(beats: &[f64]) -> (Vec<f64>, Vec<u32>) {
    let downbeats = beats
        .iter()
        .step_by(BEATS_PER_BAR_ASSUMED)
        .copied()
        .collect();
    let beat_numbers = (0..beats.len())
        .map(|i| (i % BEATS_PER_BAR_ASSUMED) as u32 + 1)
        .collect();
    (downbeats, beat_numbers)
}

/// Semantic role of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionLabel {
    Intro,
    Verse,
    Chorus,
    Bridge,
    Outro,
    Breakdown,
    Buildup,
    Drop,
    Unknown,
}

impl SectionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Verse => "verse",
            Self::Chorus => "chorus",
            Self::Bridge => "bridge",
            Self::Outro => "outro",
            Self::Breakdown => "breakdown",
            Self::Buildup => "buildup",
            Self::Drop => "drop",
            Self::Unknown => "unknown",
        }
    }

    /// Display color for the label (hex RGB).
    pub fn color(&self) -> &'static str {
        match self {
            Self::Intro => "#4CAF50",     // Green
            Self::Verse => "#2196F3",     // Blue
            Self::Chorus => "#FF9800",    // Orange
            Self::Bridge => "#9C27B0",    // Purple
            Self::Outro => "#607D8B",     // Blue grey
            Self::Breakdown => "#00BCD4", // Cyan
            Self::Buildup => "#FFEB3B",   // Yellow
            Self::Drop => "#F44336",      // Red
            Self::Unknown => "#9E9E9E",   // Grey
        }
    }
}

impl fmt::Display for SectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time range of a track sharing a structural role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    pub label: SectionLabel,
    /// Display color, always `label.color()`.
    pub color: String,
}

impl Section {
    pub fn new(start: f64, end: f64, label: SectionLabel) -> Self {
        Self {
            start,
            end,
            label,
            color: label.color().to_string(),
        }
    }
}

/// Structural segmentation of a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureResult {
    pub sections: Vec<Section>,
    pub num_sections: usize,
    /// Track duration in seconds.
    pub duration: f64,
    /// Loudness-driven partition (drop / breakdown / verse), independent of
    /// `sections`.
    #[serde(default)]
    pub energy_sections: Vec<Section>,
    /// Whether boundaries came from clustering or equal-width splitting.
    #[serde(default)]
    pub segmentation: StepSource,
    /// Whether labels used repetition clustering or treated every segment as
    /// distinct.
    #[serde(default)]
    pub labelling: StepSource,
}

/// A single click of the click track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    /// Time in seconds.
    pub time: f64,
    /// True for downbeat clicks.
    pub accent: bool,
}
