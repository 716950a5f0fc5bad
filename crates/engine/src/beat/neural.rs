//! Activation sources for the neural beat tracker.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AnalysisError;

/// Frame-rate beat likelihoods.
#[derive(Debug, Clone, PartialEq)]
pub struct Activations {
    /// Frames per second.
    pub fps: f32,
    pub values: Vec<f32>,
}

/// Frame-rate `[beat, downbeat]` likelihood pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct DownbeatActivations {
    pub fps: f32,
    pub frames: Vec<[f32; 2]>,
}

impl DownbeatActivations {
    /// Likelihood pair at a time, using the nearest frame.
    pub fn at(&self, seconds: f64) -> Option<[f32; 2]> {
        if self.frames.is_empty() || !seconds.is_finite() {
            return None;
        }
        let frame = (seconds * self.fps as f64).round().max(0.0) as usize;
        Some(self.frames[frame.min(self.frames.len() - 1)])
    }
}

/// Source of beat and downbeat activations for an audio file.
///
/// Implementations wrap a trained network or its cached output.
pub trait ActivationModel: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    fn beat_activations(&self, path: &Path) -> Result<Activations, AnalysisError>;

    fn downbeat_activations(&self, path: &Path) -> Result<DownbeatActivations, AnalysisError>;

    /// Whether `downbeat_activations` can succeed at all.
    fn supports_downbeats(&self) -> bool {
        true
    }
}

/// Reads activations written next to the audio by an external network run,
/// as `<activations_dir>/<stem>.activations.json`:
///
/// ```json
/// { "fps": 100.0, "beat": [0.01, 0.93, ...], "downbeat": [[0.01, 0.0], ...] }
/// ```
///
/// `downbeat` is optional.
pub struct SidecarActivations {
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SidecarFile {
    fps: f32,
    beat: Vec<f32>,
    #[serde(default)]
    downbeat: Option<Vec<[f32; 2]>>,
}

impl SidecarActivations {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Location of the sidecar for an audio file.
    pub fn sidecar_path(&self, audio: &Path) -> PathBuf {
        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.dir.join(format!("{}.activations.json", stem))
    }

    fn read(&self, audio: &Path) -> Result<SidecarFile, AnalysisError> {
        let path = self.sidecar_path(audio);
        let content = fs::read_to_string(&path).map_err(|e| {
            AnalysisError::FeatureExtraction(format!(
                "cannot read activations {}: {}",
                path.display(),
                e
            ))
        })?;
        let file: SidecarFile = serde_json::from_str(&content).map_err(|e| {
            AnalysisError::FeatureExtraction(format!(
                "malformed activations {}: {}",
                path.display(),
                e
            ))
        })?;

        if !(file.fps.is_finite() && file.fps > 0.0) {
            return Err(AnalysisError::FeatureExtraction(format!(
                "invalid activation frame rate {}",
                file.fps
            )));
        }
        Ok(file)
    }
}

impl ActivationModel for SidecarActivations {
    fn name(&self) -> &str {
        "sidecar"
    }

    fn beat_activations(&self, path: &Path) -> Result<Activations, AnalysisError> {
        let file = self.read(path)?;
        let activations = Activations {
            fps: file.fps,
            values: file.beat,
        };
        validate_beat_activations(&activations)?;
        Ok(activations)
    }

    fn downbeat_activations(&self, path: &Path) -> Result<DownbeatActivations, AnalysisError> {
        let file = self.read(path)?;
        let frames = file.downbeat.ok_or_else(|| {
            AnalysisError::FeatureExtraction("sidecar has no downbeat activations".to_string())
        })?;
        Ok(DownbeatActivations {
            fps: file.fps,
            frames,
        })
    }
}

pub(crate) fn validate_beat_activations(activations: &Activations) -> Result<(), AnalysisError> {
    if activations.values.is_empty() {
        return Err(AnalysisError::FeatureExtraction(
            "empty beat activations".to_string(),
        ));
    }
    if activations.values.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::FeatureExtraction(
            "non-finite beat activations".to_string(),
        ));
    }
    if !(activations.fps.is_finite() && activations.fps > 0.0) {
        return Err(AnalysisError::FeatureExtraction(format!(
            "invalid activation frame rate {}",
            activations.fps
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path_uses_stem() {
        let model = SidecarActivations::new("/cache/activations");
        assert_eq!(
            model.sidecar_path(Path::new("/music/My Song.flac")),
            PathBuf::from("/cache/activations/My Song.activations.json")
        );
    }

    #[test]
    fn test_reads_beat_and_downbeat() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("track.activations.json"),
            r#"{"fps": 100.0, "beat": [0.0, 0.9, 0.1], "downbeat": [[0.0, 0.0], [0.1, 0.8], [0.1, 0.0]]}"#,
        )
        .unwrap();

        let model = SidecarActivations::new(dir.path());
        let beats = model.beat_activations(Path::new("track.wav")).unwrap();
        assert_eq!(beats.values, vec![0.0, 0.9, 0.1]);

        let downbeats = model.downbeat_activations(Path::new("track.wav")).unwrap();
        assert_eq!(downbeats.at(0.01), Some([0.1, 0.8]));
        assert_eq!(downbeats.at(5.0), Some([0.1, 0.0]));
    }

    #[test]
    fn test_missing_downbeats_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("track.activations.json"),
            r#"{"fps": 50.0, "beat": [0.5]}"#,
        )
        .unwrap();

        let model = SidecarActivations::new(dir.path());
        assert!(model.beat_activations(Path::new("track.mp3")).is_ok());
        assert!(matches!(
            model.downbeat_activations(Path::new("track.mp3")),
            Err(AnalysisError::FeatureExtraction(_))
        ));
    }

    #[test]
    fn test_missing_and_invalid_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let model = SidecarActivations::new(dir.path());
        assert!(model.beat_activations(Path::new("absent.wav")).is_err());

        fs::write(
            dir.path().join("zero.activations.json"),
            r#"{"fps": 0.0, "beat": [0.5]}"#,
        )
        .unwrap();
        assert!(model.beat_activations(Path::new("zero.wav")).is_err());
    }
}
