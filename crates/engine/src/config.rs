use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine configuration.
///
/// Every section falls back to its defaults, so a config file only needs the
/// values it overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub analysis: AnalysisConfig,
    pub beats: BeatConfig,
    pub structure: StructureConfig,
    pub energy: EnergyConfig,
}

/// Decoding and frame analysis settings shared by all components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Sample rate every decoded waveform is resampled to.
    pub sample_rate: u32,
    /// FFT window size for spectral analysis.
    pub fft_size: usize,
    /// Hop size between FFT windows (one feature frame per hop).
    pub hop_size: usize,
    /// Number of mel bands feeding the MFCCs.
    pub n_mels: usize,
    /// Number of MFCC coefficients kept.
    pub n_mfcc: usize,
    /// Number of spectral contrast sub-bands (one extra row is the residual).
    pub contrast_bands: usize,
    /// Lowest contrast band edge in Hz.
    pub contrast_fmin: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            fft_size: 2048,
            hop_size: 512,
            n_mels: 128,
            n_mfcc: 13,
            contrast_bands: 6,
            contrast_fmin: 200.0,
        }
    }
}

/// Beat tracker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    /// Directory holding `<stem>.activations.json` files produced by a beat
    /// network. When set and present, the neural tracker is used.
    pub activations_dir: Option<PathBuf>,
    /// Minimum BPM to detect.
    pub min_bpm: f64,
    /// Maximum BPM to detect.
    pub max_bpm: f64,
    /// Centre of the tempo prior used to break octave ties.
    pub prior_bpm: f64,
    /// Trade-off between onset strength and beat regularity in the DP tracker.
    pub tightness: f32,
    /// Candidate bar lengths for the downbeat tracker.
    pub beats_per_bar: Vec<usize>,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            activations_dir: None,
            min_bpm: 60.0,
            max_bpm: 200.0,
            prior_bpm: 120.0,
            tightness: 100.0,
            beats_per_bar: vec![3, 4],
        }
    }
}

/// Structural segmentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    /// Number of sections requested from the segmenter.
    pub target_sections: usize,
    /// Upper bound on label clusters.
    pub max_clusters: usize,
    /// Seed for k-means initialisation.
    pub seed: u64,
    /// Number of k-means restarts; the lowest inertia run wins.
    pub kmeans_restarts: usize,
    pub kmeans_max_iterations: usize,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            target_sections: 8,
            max_clusters: 4,
            seed: 42,
            kmeans_restarts: 10,
            kmeans_max_iterations: 300,
        }
    }
}

/// Energy section detector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    /// RMS frame length in samples.
    pub frame_length: usize,
    /// Median filter width (frames) applied to the RMS curve.
    pub smoothing_frames: usize,
    pub high_threshold: f32,
    pub low_threshold: f32,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            frame_length: 2048,
            smoothing_frames: 51,
            high_threshold: 0.7,
            low_threshold: 0.3,
        }
    }
}

/// Persisted configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub config: EngineConfig,
    pub created_at: String,
    pub modified_at: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Failed to parse config file: {0}")]
    ParseError(String),
    #[error("Failed to serialize config: {0}")]
    SerializeError(String),
    #[error("Invalid configuration: {}", .0.join(", "))]
    ValidationError(Vec<String>),
}

/// Configuration manager for engine settings.
/// Configuration is stored as JSON, by default in the user's config directory.
pub struct ConfigManager {
    config_path: PathBuf,
    config: EngineConfig,
}

impl ConfigManager {
    /// Create a new configuration manager.
    /// If no path is provided, defaults to `<config dir>/beatgrid/config.json`.
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let config_path = config_path.unwrap_or_else(default_config_path);

        Self {
            config_path,
            config: EngineConfig::default(),
        }
    }

    /// Load settings from the configuration file.
    /// Writes a default file first if none exists.
    pub fn load(&mut self) -> Result<EngineConfig, ConfigError> {
        if !self.config_path.exists() {
            log::info!(
                "No config at {}, writing defaults",
                self.config_path.display()
            );
            self.save()?;
            return Ok(self.config.clone());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config_file: ConfigFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if config_file.version != env!("CARGO_PKG_VERSION") {
            log::warn!(
                "Config file version {} doesn't match engine version {}. Using defaults for new settings.",
                config_file.version,
                env!("CARGO_PKG_VERSION")
            );
        }

        validate(&config_file.config)?;
        self.config = config_file.config;
        log::info!("Loaded config from {}", self.config_path.display());
        Ok(self.config.clone())
    }

    /// Save current settings to the configuration file.
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            if parent != Path::new("") && parent != Path::new(".") {
                fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
            }
        }

        let now = chrono::Utc::now().to_rfc3339();
        let config_file = ConfigFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config: self.config.clone(),
            created_at: now.clone(),
            modified_at: now,
        };

        let content = serde_json::to_string_pretty(&config_file)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(&self.config_path, content).map_err(|e| ConfigError::WriteError(e.to_string()))
    }

    /// Update settings and save to file.
    pub fn update_config(&mut self, config: EngineConfig) -> Result<(), ConfigError> {
        validate(&config)?;
        self.config = config;
        self.save()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("beatgrid").join("config.json"))
        .unwrap_or_else(|| PathBuf::from("config.json"))
}

/// Check settings the engine cannot run with.
pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    let mut problems = Vec::new();

    let analysis = &config.analysis;
    if analysis.sample_rate == 0 {
        problems.push("analysis.sample_rate must be positive".to_string());
    }
    if analysis.fft_size < 16 || analysis.hop_size == 0 {
        problems.push("analysis.fft_size must be >= 16 and hop_size positive".to_string());
    }
    if analysis.n_mfcc == 0 || analysis.n_mfcc > analysis.n_mels {
        problems.push("analysis.n_mfcc must be in 1..=n_mels".to_string());
    }

    let beats = &config.beats;
    if !(beats.min_bpm > 0.0 && beats.min_bpm < beats.max_bpm) {
        problems.push("beats.min_bpm must be positive and below max_bpm".to_string());
    }
    if beats.beats_per_bar.is_empty() || beats.beats_per_bar.contains(&0) {
        problems.push("beats.beats_per_bar needs at least one positive bar length".to_string());
    }

    if config.structure.max_clusters == 0 {
        problems.push("structure.max_clusters must be positive".to_string());
    }

    let energy = &config.energy;
    if !(energy.low_threshold < energy.high_threshold) {
        problems.push("energy.low_threshold must be below high_threshold".to_string());
    }
    if energy.frame_length == 0 {
        problems.push("energy.frame_length must be positive".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(problems))
    }
}
