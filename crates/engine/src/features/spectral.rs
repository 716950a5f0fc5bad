//! Short-time Fourier transform and mel-scale helpers.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Floor applied before taking logarithms of power values.
pub const AMIN: f32 = 1e-10;

/// Dynamic range kept by [`power_to_db`].
pub const TOP_DB: f32 = 80.0;

/// Power spectrogram, one row of `fft_size / 2 + 1` bins per frame.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub frames: Vec<Vec<f32>>,
    pub fft_size: usize,
    pub hop_size: usize,
    pub sample_rate: u32,
}

impl Spectrogram {
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Center frequency of a bin in Hz.
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.fft_size as f32
    }
}

/// Periodic Hann window.
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
        .collect()
}

/// Centered STFT power spectrogram.
///
/// The signal is zero-padded by `fft_size / 2` on both sides so frame `t` is
/// centered on sample `t * hop_size`, giving `1 + len / hop_size` frames.
pub fn power_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    fft_size: usize,
    hop_size: usize,
) -> Spectrogram {
    let mut planner = FftPlanner::new();
    let fft: Arc<dyn Fft<f32>> = planner.plan_fft_forward(fft_size);
    let window = hann_window(fft_size);

    let pad = fft_size / 2;
    let num_frames = 1 + samples.len() / hop_size;
    let num_bins = fft_size / 2 + 1;

    let mut frames = Vec::with_capacity(num_frames);
    let mut buffer = vec![Complex::new(0.0f32, 0.0); fft_size];
    let mut scratch = vec![Complex::new(0.0f32, 0.0); fft.get_inplace_scratch_len()];

    for t in 0..num_frames {
        // Index into the virtual padded signal
        let start = (t * hop_size) as isize - pad as isize;
        for (j, slot) in buffer.iter_mut().enumerate() {
            let idx = start + j as isize;
            let sample = if idx >= 0 && (idx as usize) < samples.len() {
                samples[idx as usize]
            } else {
                0.0
            };
            *slot = Complex::new(sample * window[j], 0.0);
        }

        fft.process_with_scratch(&mut buffer, &mut scratch);
        frames.push(buffer[..num_bins].iter().map(|c| c.norm_sqr()).collect());
    }

    Spectrogram {
        frames,
        fft_size,
        hop_size,
        sample_rate,
    }
}

/// Convert a power value to decibels relative to `reference`.
pub fn power_to_db_value(power: f32, reference: f32) -> f32 {
    10.0 * power.max(AMIN).log10() - 10.0 * reference.max(AMIN).log10()
}

/// Convert a power matrix to decibels, clipping to [`TOP_DB`] below the peak.
pub fn power_to_db(frames: &mut [Vec<f32>], reference: f32) {
    let mut peak = f32::NEG_INFINITY;
    for frame in frames.iter_mut() {
        for v in frame.iter_mut() {
            *v = power_to_db_value(*v, reference);
            peak = peak.max(*v);
        }
    }

    let floor = peak - TOP_DB;
    for frame in frames.iter_mut() {
        for v in frame.iter_mut() {
            *v = v.max(floor);
        }
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    // Slaney scale: linear below 1 kHz, logarithmic above
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;

    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;

    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        mel * f_sp
    }
}

/// Triangular, area-normalized mel filters between 0 Hz and Nyquist.
#[derive(Debug, Clone)]
pub struct MelFilterbank {
    /// Per band: first non-zero bin and its weights.
    filters: Vec<(usize, Vec<f32>)>,
}

impl MelFilterbank {
    pub fn new(n_mels: usize, fft_size: usize, sample_rate: u32) -> Self {
        let num_bins = fft_size / 2 + 1;
        let fmax = sample_rate as f32 / 2.0;
        let mel_max = hz_to_mel(fmax);

        let edges: Vec<f32> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
            .collect();
        let bin_freqs: Vec<f32> = (0..num_bins)
            .map(|b| b as f32 * sample_rate as f32 / fft_size as f32)
            .collect();

        let filters = (0..n_mels)
            .map(|m| {
                let (lo, center, hi) = (edges[m], edges[m + 1], edges[m + 2]);
                let enorm = 2.0 / (hi - lo);

                let weights: Vec<f32> = bin_freqs
                    .iter()
                    .map(|&f| {
                        let lower = (f - lo) / (center - lo);
                        let upper = (hi - f) / (hi - center);
                        lower.min(upper).max(0.0) * enorm
                    })
                    .collect();

                let first = weights.iter().position(|&w| w > 0.0).unwrap_or(0);
                let last = weights.iter().rposition(|&w| w > 0.0).unwrap_or(0);
                let band = if last >= first {
                    weights[first..=last].to_vec()
                } else {
                    Vec::new()
                };
                (first, band)
            })
            .collect();

        Self { filters }
    }

    pub fn num_bands(&self) -> usize {
        self.filters.len()
    }

    /// Project one power spectrum frame onto the mel bands.
    pub fn apply(&self, spectrum: &[f32]) -> Vec<f32> {
        self.filters
            .iter()
            .map(|(first, weights)| {
                weights
                    .iter()
                    .zip(&spectrum[*first..])
                    .map(|(w, p)| w * p)
                    .sum()
            })
            .collect()
    }

    /// Mel power spectrogram, one row of bands per frame.
    pub fn apply_all(&self, spectrogram: &Spectrogram) -> Vec<Vec<f32>> {
        spectrogram
            .frames
            .iter()
            .map(|frame| self.apply(frame))
            .collect()
    }
}
