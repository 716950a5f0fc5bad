//! Song structure: boundaries, section labels and energy sections.

mod cluster;
mod energy;
mod label;
mod segment;

pub use cluster::KMeans;
pub use energy::EnergyDetector;
pub use label::label_segments;
pub use segment::{agglomerative, segment, uniform_boundaries};

use crate::audio::Waveform;
use crate::config::EngineConfig;
use crate::error::AnalysisError;
use crate::features::{FeatureExtractor, FeatureMatrix};
use crate::types::{Section, StructureResult};

/// Segments a track and labels the segments.
pub struct StructureAnalyzer {
    extractor: FeatureExtractor,
    energy: EnergyDetector,
    kmeans: KMeans,
    target_sections: usize,
    max_clusters: usize,
}

impl StructureAnalyzer {
    pub fn new(config: &EngineConfig) -> Self {
        let structure = &config.structure;
        Self {
            extractor: FeatureExtractor::new(config.analysis.clone()),
            energy: EnergyDetector::new(config.energy.clone()),
            kmeans: KMeans::new(
                structure.seed,
                structure.kmeans_restarts,
                structure.kmeans_max_iterations,
            ),
            target_sections: structure.target_sections,
            max_clusters: structure.max_clusters,
        }
    }

    /// Full structure analysis with the configured section count.
    pub fn analyze(&self, waveform: &Waveform) -> Result<StructureResult, AnalysisError> {
        self.analyze_with_target(waveform, self.target_sections)
    }

    pub fn analyze_with_target(
        &self,
        waveform: &Waveform,
        target_sections: usize,
    ) -> Result<StructureResult, AnalysisError> {
        let features = self
            .extractor
            .features(&waveform.samples, waveform.sample_rate)?;
        let duration = waveform.duration();

        let mut result = self.analyze_features(&features, duration, target_sections);
        result.energy_sections = self.energy.detect(waveform, &self.extractor)?;

        log::info!(
            "Found {} sections and {} energy sections in {:.1}s",
            result.num_sections,
            result.energy_sections.len(),
            duration
        );
        Ok(result)
    }

    /// Segment and label a precomputed feature matrix.
    ///
    /// Features are standardized per row first so no single feature family
    /// dominates the distances. Energy sections are left empty.
    pub fn analyze_features(
        &self,
        features: &FeatureMatrix,
        duration: f64,
        target_sections: usize,
    ) -> StructureResult {
        let standardized = features.standardized();

        let segmentation = segment(&standardized.columns, target_sections);
        let segmentation_source = segmentation.source();
        let boundaries = segmentation.into_value();
        let (frames, times) = boundary_times(&standardized, &boundaries, duration);

        let means: Vec<Vec<f32>> = frames
            .windows(2)
            .map(|w| standardized.mean(w[0], w[1]))
            .collect();
        let labelling = label_segments(&means, &times, duration, &self.kmeans, self.max_clusters);
        let labelling_source = labelling.source();

        let sections: Vec<Section> = times
            .windows(2)
            .zip(labelling.into_value())
            .map(|(w, label)| Section::new(w[0], w[1], label))
            .collect();

        StructureResult {
            num_sections: sections.len(),
            sections,
            duration,
            energy_sections: Vec::new(),
            segmentation: segmentation_source,
            labelling: labelling_source,
        }
    }
}

/// Convert frame boundaries to times ending exactly at `duration`, dropping
/// boundaries that would create zero-width sections.
fn boundary_times(
    features: &FeatureMatrix,
    boundaries: &[usize],
    duration: f64,
) -> (Vec<usize>, Vec<f64>) {
    let last = boundaries.len().saturating_sub(1);
    let mut frames: Vec<usize> = Vec::with_capacity(boundaries.len());
    let mut times: Vec<f64> = Vec::with_capacity(boundaries.len());

    for (i, &frame) in boundaries.iter().enumerate() {
        let time = if i == 0 {
            0.0
        } else if i == last {
            duration
        } else {
            features.frame_to_seconds(frame).min(duration)
        };

        match times.last() {
            Some(&prev) if time <= prev => {
                // Keep the track end when a late boundary collapses onto it
                if i == last && times.len() > 1 {
                    frames.pop();
                    times.pop();
                    frames.push(frame);
                    times.push(time);
                }
            }
            _ => {
                frames.push(frame);
                times.push(time);
            }
        }
    }

    if times.len() < 2 {
        return (Vec::new(), Vec::new());
    }
    (frames, times)
}
