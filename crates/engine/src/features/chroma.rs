//! Pitch-class energy profile.

use super::spectral::Spectrogram;

pub const NUM_CHROMA: usize = 12;

/// Lowest frequency folded into a pitch class (below this is rumble).
const MIN_CHROMA_HZ: f32 = 27.5;

/// Map each spectrogram frame onto 12 pitch classes (C = 0), normalized so the
/// strongest class in a frame is 1.
pub fn chroma(spectrogram: &Spectrogram) -> Vec<Vec<f32>> {
    let bin_classes: Vec<Option<usize>> = (0..spectrogram.num_bins())
        .map(|bin| pitch_class(spectrogram.bin_frequency(bin)))
        .collect();

    spectrogram
        .frames
        .iter()
        .map(|frame| {
            let mut profile = vec![0.0f32; NUM_CHROMA];
            for (power, class) in frame.iter().zip(&bin_classes) {
                if let Some(class) = class {
                    profile[*class] += power;
                }
            }

            let max = profile.iter().copied().fold(0.0f32, f32::max);
            if max > 0.0 {
                for v in profile.iter_mut() {
                    *v /= max;
                }
            }
            profile
        })
        .collect()
}

fn pitch_class(freq: f32) -> Option<usize> {
    if freq < MIN_CHROMA_HZ {
        return None;
    }
    // MIDI note number, A4 = 69
    let midi = 69.0 + 12.0 * (freq / 440.0).log2();
    Some((midi.round() as i64).rem_euclid(NUM_CHROMA as i64) as usize)
}
