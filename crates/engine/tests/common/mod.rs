//! Synthetic audio for integration tests.

#![allow(dead_code)]

use std::f32::consts::PI;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Check if detected BPM matches expected within tolerance.
pub fn is_bpm_match(expected: f64, detected: f64, tolerance_percent: f64) -> bool {
    let tolerance = expected * tolerance_percent / 100.0;
    (detected - expected).abs() <= tolerance
}

/// Match the expected tempo or a half/double/third multiple of it.
pub fn is_octave_tolerant_match(expected: f64, detected: f64, tolerance_percent: f64) -> bool {
    [1.0, 2.0, 0.5, 3.0, 1.0 / 3.0, 1.5, 2.0 / 3.0]
        .iter()
        .any(|&mult| is_bpm_match(expected * mult, detected, tolerance_percent))
}

/// A 1 kHz sine click at each beat.
pub fn generate_click_track(bpm: f64, duration_secs: f64, sample_rate: u32) -> Vec<f32> {
    let total_samples = (duration_secs * sample_rate as f64) as usize;
    let beat_interval_samples = (60.0 / bpm * sample_rate as f64) as usize;
    let click_duration_samples = (0.02 * sample_rate as f64) as usize;

    let mut samples = vec![0.0f32; total_samples];
    let mut beat_pos = 0;
    while beat_pos < total_samples {
        for i in 0..click_duration_samples.min(total_samples - beat_pos) {
            let t = i as f32 / sample_rate as f32;
            let envelope = 1.0 - (i as f32 / click_duration_samples as f32);
            samples[beat_pos + i] = (2.0 * PI * 1000.0 * t).sin() * envelope * 0.8;
        }
        beat_pos += beat_interval_samples;
    }
    samples
}

/// Four-on-the-floor kick with snares on 2 and 4 and eighth-note hi-hats.
pub fn generate_kick_pattern(bpm: f64, duration_secs: f64, sample_rate: u32) -> Vec<f32> {
    let total_samples = (duration_secs * sample_rate as f64) as usize;
    let beat_interval_samples = (60.0 / bpm * sample_rate as f64) as usize;
    let eighth_interval = beat_interval_samples / 2;

    let mut samples = vec![0.0f32; total_samples];
    let mut pos = 0usize;
    let mut beat_in_bar = 0;

    while pos < total_samples {
        add_kick(&mut samples, pos, sample_rate, 0.8);
        if beat_in_bar == 1 || beat_in_bar == 3 {
            add_snare(&mut samples, pos, sample_rate);
        }
        add_hihat(&mut samples, pos, sample_rate);
        if pos + eighth_interval < total_samples {
            add_hihat(&mut samples, pos + eighth_interval, sample_rate);
        }
        pos += beat_interval_samples;
        beat_in_bar = (beat_in_bar + 1) % 4;
    }

    normalize(&mut samples);
    samples
}

/// A quiet pad, then a loud kick section, then the pad again.
///
/// Each part lasts `part_secs`.
pub fn generate_arrangement(bpm: f64, part_secs: f64, sample_rate: u32) -> Vec<f32> {
    let part_samples = (part_secs * sample_rate as f64) as usize;
    let beat_interval_samples = (60.0 / bpm * sample_rate as f64) as usize;

    let pad = |i: usize| {
        let t = i as f32 / sample_rate as f32;
        ((2.0 * PI * 220.0 * t).sin() + (2.0 * PI * 277.2 * t).sin()) * 0.02
    };

    let mut samples: Vec<f32> = (0..part_samples * 3).map(pad).collect();

    // Sustained bass under the loud part keeps its loudness steady between hits
    for i in part_samples..part_samples * 2 {
        let t = i as f32 / sample_rate as f32;
        samples[i] += (2.0 * PI * 55.0 * t).sin() * 0.4;
    }

    let mut pos = part_samples;
    while pos < part_samples * 2 {
        add_kick(&mut samples, pos, sample_rate, 0.9);
        add_snare(&mut samples, pos + beat_interval_samples / 2, sample_rate);
        pos += beat_interval_samples;
    }

    normalize(&mut samples);
    samples
}

fn add_kick(samples: &mut [f32], pos: usize, sample_rate: u32, gain: f32) {
    let duration = (0.15 * sample_rate as f64) as usize;
    for i in 0..duration.min(samples.len().saturating_sub(pos)) {
        let t = i as f32 / sample_rate as f32;
        // Pitch sweep from 190 Hz down to 40 Hz
        let freq = 150.0 * (-t * 25.0).exp() + 40.0;
        let envelope = (-t * 15.0).exp();
        let click = if i < 50 {
            (1.0 - i as f32 / 50.0) * 0.3
        } else {
            0.0
        };
        samples[pos + i] += ((2.0 * PI * freq * t).sin() * envelope + click) * gain;
    }
}

fn add_snare(samples: &mut [f32], pos: usize, sample_rate: u32) {
    let duration = (0.12 * sample_rate as f64) as usize;
    for i in 0..duration.min(samples.len().saturating_sub(pos)) {
        let t = i as f32 / sample_rate as f32;
        let body = (2.0 * PI * 180.0 * t).sin() * (-t * 20.0).exp();
        let noise = (t * 12345.6789).sin() * (-t * 30.0).exp();
        samples[pos + i] += (body * 0.3 + noise * 0.4) * 0.5;
    }
}

fn add_hihat(samples: &mut [f32], pos: usize, sample_rate: u32) {
    let duration = (0.05 * sample_rate as f64) as usize;
    for i in 0..duration.min(samples.len().saturating_sub(pos)) {
        let t = i as f32 / sample_rate as f32;
        let noise =
            (t * 54321.0).sin() * 0.5 + (t * 98765.0).sin() * 0.3 + (t * 23456.0).sin() * 0.2;
        samples[pos + i] += noise * (-t * 40.0).exp() * 0.15;
    }
}

fn normalize(samples: &mut [f32]) {
    let max_val = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    if max_val > 0.0 {
        for s in samples.iter_mut() {
            *s /= max_val * 1.1;
        }
    }
}

/// Write samples as a 16-bit mono PCM WAV file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) {
    let num_samples = samples.len() as u32;
    let byte_rate = sample_rate * 2;
    let data_size = num_samples * 2;
    let file_size = 36 + data_size;

    let mut file = fs::File::create(path).unwrap();

    file.write_all(b"RIFF").unwrap();
    file.write_all(&file_size.to_le_bytes()).unwrap();
    file.write_all(b"WAVE").unwrap();

    file.write_all(b"fmt ").unwrap();
    file.write_all(&16u32.to_le_bytes()).unwrap();
    file.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
    file.write_all(&1u16.to_le_bytes()).unwrap(); // mono
    file.write_all(&sample_rate.to_le_bytes()).unwrap();
    file.write_all(&byte_rate.to_le_bytes()).unwrap();
    file.write_all(&2u16.to_le_bytes()).unwrap();
    file.write_all(&16u16.to_le_bytes()).unwrap();

    file.write_all(b"data").unwrap();
    file.write_all(&data_size.to_le_bytes()).unwrap();
    for &sample in samples {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        file.write_all(&sample_i16.to_le_bytes()).unwrap();
    }
}
