//! Tempo and beat placement on synthetic audio written to disk.
//!
//! Every file goes through the full decode and resample path before the
//! detector sees it.

mod common;

use std::fs;

use beatgrid_engine::audio::load_waveform;
use beatgrid_engine::beat::{DownbeatSource, ONSET_CONFIDENCE};
use beatgrid_engine::{BeatDetector, EngineConfig, TrackerKind};

use common::{generate_click_track, generate_kick_pattern, is_octave_tolerant_match, write_wav};

fn detect_file(samples: &[f32], sample_rate: u32, name: &str) -> beatgrid_engine::BeatDetection {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join(name);
    write_wav(&path, samples, sample_rate);

    let config = EngineConfig::default();
    let waveform = load_waveform(&path, config.analysis.sample_rate).unwrap();
    BeatDetector::new(&config).detect(&waveform).unwrap()
}

#[test]
fn test_synthetic_120bpm_click() {
    let samples = generate_click_track(120.0, 30.0, 44100);
    let detection = detect_file(&samples, 44100, "click_120bpm.wav");

    assert_eq!(detection.tracker, TrackerKind::OnsetAutocorrelation);
    assert!(
        is_octave_tolerant_match(120.0, detection.grid.bpm, 5.0),
        "Expected ~120 BPM (or octave), got {:.2}",
        detection.grid.bpm
    );
    assert_eq!(detection.grid.confidence, ONSET_CONFIDENCE);
    assert_eq!(detection.downbeats, DownbeatSource::Assumed { reason: None });
}

#[test]
fn test_synthetic_128bpm_kick() {
    let samples = generate_kick_pattern(128.0, 30.0, 44100);
    let detection = detect_file(&samples, 44100, "kick_128bpm.wav");

    assert!(
        is_octave_tolerant_match(128.0, detection.grid.bpm, 5.0),
        "Expected ~128 BPM (or octave), got {:.2}",
        detection.grid.bpm
    );
}

#[test]
fn test_synthetic_various_tempos() {
    for &expected_bpm in &[90.0, 110.0, 140.0] {
        let samples = generate_kick_pattern(expected_bpm, 30.0, 22050);
        let detection =
            detect_file(&samples, 22050, &format!("kick_{:.0}bpm.wav", expected_bpm));

        assert!(
            is_octave_tolerant_match(expected_bpm, detection.grid.bpm, 5.0),
            "For {:.0} BPM: expected match (or octave), got {:.2}",
            expected_bpm,
            detection.grid.bpm
        );
    }
}

#[test]
fn test_grid_invariants_on_kick_pattern() {
    let samples = generate_kick_pattern(120.0, 20.0, 22050);
    let grid = detect_file(&samples, 22050, "grid.wav").grid;

    assert!(grid.beats.len() > 10);
    assert!(grid.beats.windows(2).all(|w| w[0] < w[1]));
    assert!(grid.beats.iter().all(|&b| (0.0..=20.0).contains(&b)));
    assert_eq!(grid.beat_numbers.len(), grid.beats.len());

    // Downbeats are every 4th beat from the first
    let expected: Vec<f64> = grid.beats.iter().step_by(4).copied().collect();
    assert_eq!(grid.downbeats, expected);
    assert!(grid
        .beat_numbers
        .iter()
        .enumerate()
        .all(|(i, &n)| n as usize == i % 4 + 1));
    assert_eq!(grid.time_signature, "4/4");
}

#[test]
fn test_neural_tracker_reads_sidecar() {
    let temp_dir = tempfile::tempdir().unwrap();
    let audio = temp_dir.path().join("song.wav");
    write_wav(&audio, &generate_click_track(120.0, 20.0, 22050), 22050);

    // A beat every 50 frames at 100 fps, a downbeat on every 4th beat
    let beat: Vec<f32> = (0..2000)
        .map(|i| if i % 50 == 0 { 1.0 } else { 0.01 })
        .collect();
    let downbeat: Vec<[f32; 2]> = (0..2000)
        .map(|i| {
            if i % 200 == 0 {
                [0.1, 0.9]
            } else if i % 50 == 0 {
                [0.9, 0.05]
            } else {
                [0.01, 0.01]
            }
        })
        .collect();
    let sidecar = serde_json::json!({ "fps": 100.0, "beat": beat, "downbeat": downbeat });
    fs::write(
        temp_dir.path().join("song.activations.json"),
        serde_json::to_string(&sidecar).unwrap(),
    )
    .unwrap();

    let mut config = EngineConfig::default();
    config.beats.activations_dir = Some(temp_dir.path().to_path_buf());
    let detector = BeatDetector::new(&config);
    assert_eq!(detector.kind(), TrackerKind::Neural);

    let waveform = load_waveform(&audio, config.analysis.sample_rate).unwrap();
    let detection = detector.detect(&waveform).unwrap();
    let grid = &detection.grid;

    assert!((grid.bpm - 120.0).abs() < 1.0, "got {:.2} BPM", grid.bpm);
    assert_eq!(grid.confidence, 0.9);
    assert_eq!(detection.downbeats, DownbeatSource::Tracked { beats_per_bar: 4 });
    assert_eq!(&grid.beat_numbers[..5], &[1, 2, 3, 4, 1]);
    assert!(grid.downbeats.iter().all(|d| grid.beats.contains(d)));
}

#[test]
fn test_missing_sidecar_is_an_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    let audio = temp_dir.path().join("orphan.wav");
    write_wav(&audio, &generate_click_track(120.0, 5.0, 22050), 22050);

    let mut config = EngineConfig::default();
    config.beats.activations_dir = Some(temp_dir.path().to_path_buf());

    let waveform = load_waveform(&audio, config.analysis.sample_rate).unwrap();
    assert!(BeatDetector::new(&config).detect(&waveform).is_err());
}
