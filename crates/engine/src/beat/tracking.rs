//! Tempo estimation and dynamic-programming beat tracking.
//!
//! Both operate on a frame-rate likelihood curve: an onset strength envelope
//! or the beat activations of a neural network.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Fallback tempo when a grid has too few beats to measure.
pub const DEFAULT_BPM: f64 = 120.0;

/// Width of the tempo prior in octaves.
const PRIOR_OCTAVES: f64 = 1.0;

/// Tempo search range and prior.
#[derive(Debug, Clone, Copy)]
pub struct TempoRange {
    pub min_bpm: f64,
    pub max_bpm: f64,
    pub prior_bpm: f64,
}

/// Estimate a global tempo from the autocorrelation of `odf`.
///
/// Lags are weighted by a log-normal prior centred on `prior_bpm` so the
/// preferred octave wins when several lags correlate equally well. Returns
/// `None` when the curve carries no periodicity in range.
pub fn estimate_tempo(odf: &[f32], frame_rate: f32, range: TempoRange) -> Option<f64> {
    if odf.len() < 4 || frame_rate <= 0.0 {
        return None;
    }

    let autocorr = compute_autocorrelation(odf);
    let fr = frame_rate as f64;

    let min_lag = ((60.0 * fr / range.max_bpm).floor() as usize).max(1);
    let max_lag = ((60.0 * fr / range.min_bpm).ceil() as usize).min(odf.len() - 2);
    if max_lag <= min_lag {
        return None;
    }

    let weighted: Vec<f32> = (0..=max_lag)
        .map(|lag| {
            if lag < min_lag {
                return 0.0;
            }
            let bpm = 60.0 * fr / lag as f64;
            autocorr[lag].max(0.0) * tempo_prior(bpm, range.prior_bpm)
        })
        .collect();

    let (best_lag, best_score) = weighted
        .iter()
        .enumerate()
        .skip(min_lag)
        .fold((0, 0.0f32), |best, (lag, &score)| {
            if score > best.1 {
                (lag, score)
            } else {
                best
            }
        });

    if best_score <= 0.0 {
        return None;
    }

    let lag = interpolate_peak(&weighted, best_lag);
    Some(60.0 * fr / lag)
}

/// Log-normal tempo weighting, 1.0 at the prior.
pub fn tempo_prior(bpm: f64, prior_bpm: f64) -> f32 {
    let octaves = (bpm / prior_bpm).log2();
    (-0.5 * (octaves / PRIOR_OCTAVES).powi(2)).exp() as f32
}

/// Autocorrelation via FFT (Wiener-Khinchin theorem), normalized so lag 0 is 1.
fn compute_autocorrelation(signal: &[f32]) -> Vec<f32> {
    let n = signal.len().next_power_of_two() * 2;

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut buffer: Vec<Complex<f32>> = signal
        .iter()
        .map(|&x| Complex::new(x, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(n)
        .collect();

    fft.process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    ifft.process(&mut buffer);

    let zero_lag = buffer[0].re;
    if zero_lag <= 0.0 {
        return vec![0.0; n];
    }
    buffer.iter().map(|c| c.re / zero_lag).collect()
}

/// Parabolic interpolation for sub-frame peak accuracy.
fn interpolate_peak(values: &[f32], peak_idx: usize) -> f64 {
    if peak_idx == 0 || peak_idx + 1 >= values.len() {
        return peak_idx as f64;
    }

    let y0 = values[peak_idx - 1] as f64;
    let y1 = values[peak_idx] as f64;
    let y2 = values[peak_idx + 1] as f64;

    let denominator = 2.0 * (2.0 * y1 - y0 - y2);
    if denominator.abs() < 1e-10 {
        return peak_idx as f64;
    }

    let offset = (y0 - y2) / denominator;
    peak_idx as f64 + offset.clamp(-0.5, 0.5)
}

/// Find beat frames that maximize cumulative likelihood at a fixed tempo.
///
/// Each beat links to the best predecessor between 0.8 and 1.2 periods back,
/// penalised by `tightness * (deviation / period)^2`. A frame starts a new
/// chain only when that window holds no earlier frame. Returns frames in
/// increasing order.
pub fn track_beats(odf: &[f32], frame_rate: f32, bpm: f64, tightness: f32) -> Vec<usize> {
    const NO_PREDECESSOR: usize = usize::MAX;

    if odf.is_empty() || bpm <= 0.0 || !bpm.is_finite() {
        return Vec::new();
    }
    if odf.iter().all(|&v| v <= 0.0) {
        return Vec::new();
    }

    let period = 60.0 * frame_rate as f64 / bpm;
    if period < 1.0 {
        return Vec::new();
    }

    let n = odf.len();
    let mut score = vec![0.0f32; n];
    let mut backpointer = vec![NO_PREDECESSOR; n];

    for t in 0..n {
        let earliest = t as f64 - period * 1.2;
        let latest = t as f64 - period * 0.8;
        if latest < 0.0 {
            score[t] = odf[t];
            continue;
        }

        let search_start = earliest.max(0.0).ceil() as usize;
        let search_end = (latest.floor() as usize).min(t - 1);

        let mut best_score = f32::NEG_INFINITY;
        let mut best_prev = NO_PREDECESSOR;
        for prev in search_start..=search_end {
            let deviation = (t - prev) as f64 - period;
            let penalty = tightness * ((deviation / period) as f32).powi(2);
            let candidate = score[prev] - penalty;
            if candidate > best_score {
                best_score = candidate;
                best_prev = prev;
            }
        }

        if best_prev == NO_PREDECESSOR {
            score[t] = odf[t];
        } else {
            score[t] = odf[t] + best_score;
            backpointer[t] = best_prev;
        }
    }

    // Best ending position within the last beat period
    let search_start = n.saturating_sub(period.ceil() as usize);
    let mut best_end = search_start;
    for i in search_start..n {
        if score[i] > score[best_end] {
            best_end = i;
        }
    }

    let mut beats = vec![best_end];
    let mut current = best_end;
    while backpointer[current] != NO_PREDECESSOR {
        current = backpointer[current];
        beats.push(current);
    }
    beats.reverse();

    // Drop leading/trailing beats that sit on silence
    let first = beats.iter().position(|&b| odf[b] > 0.0).unwrap_or(beats.len());
    let last = beats.iter().rposition(|&b| odf[b] > 0.0).map_or(0, |i| i + 1);
    if first >= last {
        return Vec::new();
    }
    beats[first..last].to_vec()
}

/// Tempo from the median inter-beat interval, or [`DEFAULT_BPM`] with fewer
/// than two beats.
pub fn bpm_from_intervals(beats: &[f64]) -> f64 {
    if beats.len() < 2 {
        return DEFAULT_BPM;
    }

    let mut intervals: Vec<f64> = beats.windows(2).map(|w| w[1] - w[0]).collect();
    intervals.sort_by(|a, b| a.total_cmp(b));

    let mid = intervals.len() / 2;
    let median = if intervals.len() % 2 == 0 {
        (intervals[mid - 1] + intervals[mid]) / 2.0
    } else {
        intervals[mid]
    };

    if median > 0.0 {
        60.0 / median
    } else {
        DEFAULT_BPM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGE: TempoRange = TempoRange {
        min_bpm: 60.0,
        max_bpm: 200.0,
        prior_bpm: 120.0,
    };

    /// Impulse train with a peak every `period` frames starting at `phase`.
    fn pulses(len: usize, period: usize, phase: usize) -> Vec<f32> {
        (0..len)
            .map(|i| if i >= phase && (i - phase) % period == 0 { 1.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_tempo_prior_peaks_at_center() {
        let w120 = tempo_prior(120.0, 120.0);
        let w60 = tempo_prior(60.0, 120.0);
        let w240 = tempo_prior(240.0, 120.0);

        assert!((w120 - 1.0).abs() < 1e-6);
        assert!(w60 < w120);
        // Symmetric in octaves
        assert!((w60 - w240).abs() < 1e-6);
    }

    #[test]
    fn test_estimate_tempo_from_pulse_train() {
        // 100 fps, pulse every 50 frames = 120 BPM
        let odf = pulses(3000, 50, 7);
        let bpm = estimate_tempo(&odf, 100.0, RANGE).unwrap();
        assert!((bpm - 120.0).abs() < 1.0, "got {}", bpm);

        // Pulse every 40 frames = 150 BPM
        let odf = pulses(3000, 40, 0);
        let bpm = estimate_tempo(&odf, 100.0, RANGE).unwrap();
        assert!((bpm - 150.0).abs() < 1.5, "got {}", bpm);
    }

    #[test]
    fn test_estimate_tempo_without_signal() {
        assert!(estimate_tempo(&vec![0.0; 1000], 100.0, RANGE).is_none());
        assert!(estimate_tempo(&[1.0, 0.0], 100.0, RANGE).is_none());
    }

    #[test]
    fn test_track_beats_follows_pulses() {
        let odf = pulses(1000, 50, 13);
        let beats = track_beats(&odf, 100.0, 120.0, 100.0);

        let expected: Vec<usize> = (13..1000).step_by(50).collect();
        assert_eq!(beats, expected);
    }

    #[test]
    fn test_track_beats_no_spurious_first_frame() {
        let odf = pulses(600, 50, 30);
        let beats = track_beats(&odf, 100.0, 120.0, 100.0);

        assert_eq!(beats.first(), Some(&30));
        assert!(beats.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_track_beats_keeps_first_beat_with_fractional_period() {
        // Period just over 50 frames, as parabolic interpolation yields
        let odf = pulses(2000, 50, 0);
        let bpm = 60.0 * 100.0 / 50.00013;
        let beats = track_beats(&odf, 100.0, bpm, 100.0);

        assert_eq!(beats.len(), 40);
        assert_eq!(&beats[..3], &[0, 50, 100]);

        let estimated = estimate_tempo(&odf, 100.0, RANGE).unwrap();
        assert_eq!(track_beats(&odf, 100.0, estimated, 100.0).first(), Some(&0));
    }

    #[test]
    fn test_track_beats_silence() {
        assert!(track_beats(&vec![0.0; 500], 100.0, 120.0, 100.0).is_empty());
        assert!(track_beats(&[], 100.0, 120.0, 100.0).is_empty());
    }

    #[test]
    fn test_bpm_from_intervals() {
        assert_eq!(bpm_from_intervals(&[]), DEFAULT_BPM);
        assert_eq!(bpm_from_intervals(&[1.0]), DEFAULT_BPM);
        assert!((bpm_from_intervals(&[0.0, 0.5, 1.0, 1.5]) - 120.0).abs() < 1e-9);
        // One bad interval does not move the median
        assert!((bpm_from_intervals(&[0.0, 0.5, 1.0, 2.5, 3.0]) - 120.0).abs() < 1e-9);
    }
}
