use super::spectral::{power_to_db_value, Spectrogram};

/// Fraction of a band's bins averaged to form its peak and valley.
const QUANTILE: f32 = 0.02;

/// Octave-band spectral contrast: peak minus valley energy (dB) per band.
///
/// Bands are `[0, fmin]`, then octaves above `fmin`; the top band runs to
/// Nyquist. Returns `n_bands + 1` values per frame.
pub fn spectral_contrast(spectrogram: &Spectrogram, n_bands: usize, fmin: f32) -> Vec<Vec<f32>> {
    let bands = band_ranges(spectrogram, n_bands, fmin);

    spectrogram
        .frames
        .iter()
        .map(|frame| {
            // Contrast is defined on magnitudes
            let magnitude: Vec<f32> = frame.iter().map(|p| p.sqrt()).collect();

            bands
                .iter()
                .map(|&(lo, hi)| {
                    if hi <= lo {
                        return 0.0;
                    }
                    let mut band = magnitude[lo..hi].to_vec();
                    band.sort_by(|a, b| a.total_cmp(b));

                    let alpha = ((QUANTILE * band.len() as f32).round() as usize).max(1);
                    let valley = band[..alpha].iter().sum::<f32>() / alpha as f32;
                    let peak = band[band.len() - alpha..].iter().sum::<f32>() / alpha as f32;

                    power_to_db_value(peak, 1.0) - power_to_db_value(valley, 1.0)
                })
                .collect()
        })
        .collect()
}

/// Half-open bin ranges for each contrast band.
fn band_ranges(spectrogram: &Spectrogram, n_bands: usize, fmin: f32) -> Vec<(usize, usize)> {
    let num_bins = spectrogram.num_bins();
    let mut edges = vec![0.0f32];
    edges.extend((0..=n_bands).map(|k| fmin * 2f32.powi(k as i32)));

    (0..=n_bands)
        .map(|k| {
            let (f_low, f_high) = (edges[k], edges[k + 1]);
            let mut lo = (0..num_bins)
                .find(|&b| spectrogram.bin_frequency(b) >= f_low)
                .unwrap_or(num_bins);
            let mut hi = (0..num_bins)
                .rfind(|&b| spectrogram.bin_frequency(b) <= f_high)
                .map_or(0, |b| b + 1);

            // Neighbouring bands share their edge bin
            if k > 0 {
                lo = lo.saturating_sub(1);
            }
            if k == n_bands {
                hi = num_bins;
            }
            (lo.min(num_bins), hi.max(lo))
        })
        .collect()
}
