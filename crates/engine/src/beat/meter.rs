//! Bar position assignment from downbeat activations.

use super::neural::DownbeatActivations;
use crate::error::AnalysisError;

const EPSILON: f32 = 1e-6;

/// Bar length and per-beat bar positions chosen by the meter tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct BarAssignment {
    pub beats_per_bar: usize,
    /// 1-based position of each beat in its bar.
    pub beat_numbers: Vec<u32>,
}

impl BarAssignment {
    /// Beats that open a bar.
    pub fn downbeats(&self, beats: &[f64]) -> Vec<f64> {
        beats
            .iter()
            .zip(&self.beat_numbers)
            .filter(|(_, n)| **n == 1)
            .map(|(b, _)| *b)
            .collect()
    }
}

/// Score every (bar length, phase) hypothesis and keep the most likely.
///
/// A hypothesis puts a downbeat on every beat `i` with `(i + phase) % M == 0`.
/// Its score is the log-likelihood of the downbeat activation on those beats
/// and of the beat activation on the rest. Ties keep the earlier candidate.
pub fn assign_bars(
    beats: &[f64],
    activations: &DownbeatActivations,
    candidates: &[usize],
) -> Result<BarAssignment, AnalysisError> {
    if beats.is_empty() {
        return Err(AnalysisError::Analysis(
            "no beats to assign bar positions to".to_string(),
        ));
    }
    if activations.frames.is_empty() {
        return Err(AnalysisError::Analysis(
            "empty downbeat activations".to_string(),
        ));
    }

    let observed = beats
        .iter()
        .map(|&t| {
            let [beat, downbeat] = activations.at(t).ok_or_else(|| {
                AnalysisError::Analysis(format!("cannot sample activations at {}", t))
            })?;
            if !beat.is_finite() || !downbeat.is_finite() {
                return Err(AnalysisError::Analysis(
                    "non-finite downbeat activations".to_string(),
                ));
            }
            Ok(((beat.max(0.0) + EPSILON).ln(), (downbeat.max(0.0) + EPSILON).ln()))
        })
        .collect::<Result<Vec<(f32, f32)>, AnalysisError>>()?;

    let mut best: Option<(f32, usize, usize)> = None;
    for &meter in candidates.iter().filter(|&&m| m > 0) {
        for phase in 0..meter {
            let score: f32 = observed
                .iter()
                .enumerate()
                .map(|(i, &(beat, downbeat))| {
                    if (i + phase) % meter == 0 {
                        downbeat
                    } else {
                        beat
                    }
                })
                .sum();

            if best.map_or(true, |(best_score, _, _)| score > best_score) {
                best = Some((score, meter, phase));
            }
        }
    }

    let (_, beats_per_bar, phase) = best
        .ok_or_else(|| AnalysisError::Analysis("no candidate bar lengths".to_string()))?;

    let beat_numbers = (0..beats.len())
        .map(|i| ((i + phase) % beats_per_bar) as u32 + 1)
        .collect();

    Ok(BarAssignment {
        beats_per_bar,
        beat_numbers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Activations at 100 fps with a beat every 50 frames and a downbeat on
    /// every `meter`-th beat starting at beat `first_downbeat`.
    fn activations(num_beats: usize, meter: usize, first_downbeat: usize) -> (Vec<f64>, DownbeatActivations) {
        let mut frames = vec![[0.0f32, 0.0f32]; num_beats * 50 + 50];
        let mut beats = Vec::new();
        for i in 0..num_beats {
            let frame = i * 50 + 10;
            beats.push(frame as f64 / 100.0);
            frames[frame] = if i >= first_downbeat && (i - first_downbeat) % meter == 0 {
                [0.1, 0.9]
            } else {
                [0.9, 0.05]
            };
        }
        (beats, DownbeatActivations { fps: 100.0, frames })
    }

    #[test]
    fn test_four_four_with_pickup() {
        let (beats, act) = activations(16, 4, 1);
        let bars = assign_bars(&beats, &act, &[3, 4]).unwrap();

        assert_eq!(bars.beats_per_bar, 4);
        assert_eq!(&bars.beat_numbers[..6], &[4, 1, 2, 3, 4, 1]);
        assert_eq!(bars.downbeats(&beats)[0], beats[1]);
    }

    #[test]
    fn test_three_four() {
        let (beats, act) = activations(12, 3, 0);
        let bars = assign_bars(&beats, &act, &[3, 4]).unwrap();

        assert_eq!(bars.beats_per_bar, 3);
        assert_eq!(&bars.beat_numbers[..4], &[1, 2, 3, 1]);
    }

    #[test]
    fn test_invalid_input() {
        let (beats, mut act) = activations(4, 4, 0);
        assert!(assign_bars(&[], &act, &[4]).is_err());
        assert!(assign_bars(&beats, &act, &[]).is_err());

        act.frames[10] = [f32::NAN, 0.5];
        assert!(assign_bars(&beats, &act, &[4]).is_err());
    }
}
