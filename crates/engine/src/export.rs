//! Export of analysis results as JSON or CSV.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::AnalysisError;
use crate::types::{BeatGrid, Section, StructureResult};

/// Output formats for [`render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(AnalysisError::Validation(format!(
                "Unknown export format: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    filename: &'a str,
    duration: f64,
    bpm: f64,
    time_signature: &'a str,
    beats: &'a [f64],
    downbeats: &'a [f64],
    sections: &'a [Section],
}

/// Render an analyzed track in the requested format.
pub fn render(
    format: ExportFormat,
    filename: &str,
    duration: f64,
    beats: &BeatGrid,
    structure: &StructureResult,
) -> Result<String, AnalysisError> {
    match format {
        ExportFormat::Json => to_json(filename, duration, beats, structure),
        ExportFormat::Csv => Ok(to_csv(beats, structure)),
    }
}

/// Pretty JSON with the grid, downbeats and sections.
pub fn to_json(
    filename: &str,
    duration: f64,
    beats: &BeatGrid,
    structure: &StructureResult,
) -> Result<String, AnalysisError> {
    let document = ExportDocument {
        filename,
        duration,
        bpm: beats.bpm,
        time_signature: &beats.time_signature,
        beats: &beats.beats,
        downbeats: &beats.downbeats,
        sections: &structure.sections,
    };
    serde_json::to_string_pretty(&document)
        .map_err(|e| AnalysisError::Analysis(format!("Failed to serialize export: {}", e)))
}

/// `time,type,label` rows: beats first, then a start and end row per section.
pub fn to_csv(beats: &BeatGrid, structure: &StructureResult) -> String {
    let mut lines = Vec::with_capacity(1 + beats.beats.len() + 2 * structure.sections.len());
    lines.push("time,type,label".to_string());

    for &beat in &beats.beats {
        let kind = if beats.is_downbeat(beat) {
            "downbeat"
        } else {
            "beat"
        };
        lines.push(format!("{:.3},{},", beat, kind));
    }

    for section in &structure.sections {
        lines.push(format!("{:.3},section_start,{}", section.start, section.label));
        lines.push(format!("{:.3},section_end,{}", section.end, section.label));
    }

    lines.join("\n")
}
