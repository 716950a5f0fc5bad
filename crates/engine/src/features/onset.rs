//! Onset strength and loudness envelopes.

use super::spectral::{power_to_db, MelFilterbank, Spectrogram};

/// Onset strength sampled at the spectrogram frame rate.
#[derive(Debug, Clone)]
pub struct OnsetEnvelope {
    pub values: Vec<f32>,
    /// Frames per second.
    pub frame_rate: f32,
}

impl OnsetEnvelope {
    pub fn frame_to_seconds(&self, frame: usize) -> f64 {
        frame as f64 / self.frame_rate as f64
    }
}

/// Spectral flux on the log-mel spectrogram, normalized to 0..1.
pub fn onset_envelope(spectrogram: &Spectrogram, filterbank: &MelFilterbank) -> OnsetEnvelope {
    let mut mel = filterbank.apply_all(spectrogram);
    power_to_db(&mut mel, 1.0);

    let mut values = Vec::with_capacity(mel.len());
    values.push(0.0);
    for pair in mel.windows(2) {
        // Half-wave rectified difference (only increases)
        let rise: f32 = pair[1]
            .iter()
            .zip(&pair[0])
            .map(|(curr, prev)| (curr - prev).max(0.0))
            .sum();
        values.push(rise / filterbank.num_bands().max(1) as f32);
    }
    values.truncate(mel.len());

    normalize_and_smooth(&mut values);

    OnsetEnvelope {
        values,
        frame_rate: spectrogram.sample_rate as f32 / spectrogram.hop_size as f32,
    }
}

/// Remove the mean, scale to the maximum and apply a 3-point median.
pub fn normalize_and_smooth(odf: &mut [f32]) {
    if odf.is_empty() {
        return;
    }

    // Remove DC offset
    let mean: f32 = odf.iter().sum::<f32>() / odf.len() as f32;
    for v in odf.iter_mut() {
        *v = (*v - mean).max(0.0);
    }

    let max = odf.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        for v in odf.iter_mut() {
            *v /= max;
        }
    }

    let original = odf.to_vec();
    for i in 1..odf.len().saturating_sub(1) {
        let mut window = [original[i - 1], original[i], original[i + 1]];
        window.sort_by(|a, b| a.total_cmp(b));
        odf[i] = window[1];
    }
}

/// Frame-wise root mean square with centered, zero-padded frames.
pub fn rms(samples: &[f32], frame_length: usize, hop_size: usize) -> Vec<f32> {
    let pad = frame_length / 2;
    let num_frames = 1 + samples.len() / hop_size;

    (0..num_frames)
        .map(|t| {
            let center = t * hop_size;
            let start = center.saturating_sub(pad);
            let end = (center + frame_length - pad).min(samples.len());
            let energy: f32 = if start < end {
                samples[start..end].iter().map(|s| s * s).sum()
            } else {
                0.0
            };
            (energy / frame_length as f32).sqrt()
        })
        .collect()
}
