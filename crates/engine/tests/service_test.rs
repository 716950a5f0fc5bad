//! End-to-end service tests on WAV files in a temp directory.

mod common;

use std::fs;

use beatgrid_engine::{
    AnalysisError, AnalysisService, BeatUpdate, EngineConfig, ExportFormat, SectionLabel,
    TrackStatus,
};

use common::{generate_arrangement, generate_kick_pattern, is_octave_tolerant_match, write_wav};

#[test]
fn test_full_lifecycle() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("track.wav");
    write_wav(&path, &generate_kick_pattern(124.0, 40.0, 44100), 44100);

    let service = AnalysisService::new(EngineConfig::default());
    let id = service.register(&path).unwrap();
    assert_eq!(service.status(id).unwrap().status, TrackStatus::Uploaded);

    let report = service.analyze(id).unwrap();
    assert_eq!(report.status, TrackStatus::Analyzed);
    assert_eq!(report.filename, "track.wav");
    assert!((report.duration - 40.0).abs() < 0.05);
    assert!(
        is_octave_tolerant_match(124.0, report.beats.bpm, 5.0),
        "got {:.2} BPM",
        report.beats.bpm
    );

    let structure = &report.structure;
    assert!(structure.num_sections >= 1 && structure.num_sections <= 8);
    assert_eq!(structure.num_sections, structure.sections.len());
    assert_eq!(structure.sections[0].start, 0.0);
    assert_eq!(structure.sections.last().unwrap().end, report.duration);
    for pair in structure.sections.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
        assert!(pair[0].start < pair[0].end);
    }
    assert!(structure.sections.iter().all(|s| s.color == s.label.color()));

    let listed = service.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].bpm, Some(report.beats.bpm));

    service.delete(id).unwrap();
    assert!(path.exists(), "delete must leave the audio file alone");
    assert!(matches!(service.status(id), Err(AnalysisError::NotFound(_))));
}

#[test]
fn test_energy_sections_follow_loudness() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("arrangement.wav");
    write_wav(&path, &generate_arrangement(128.0, 20.0, 22050), 22050);

    let service = AnalysisService::new(EngineConfig::default());
    let id = service.register(&path).unwrap();
    let report = service.analyze(id).unwrap();
    let energy = &report.structure.energy_sections;

    assert!(!energy.is_empty());
    assert_eq!(energy[0].start, 0.0);
    assert_eq!(energy.last().unwrap().end, report.duration);
    for pair in energy.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
    assert!(energy.iter().all(|s| matches!(
        s.label,
        SectionLabel::Drop | SectionLabel::Breakdown | SectionLabel::Verse
    )));

    // The loud middle part reads as a drop
    let middle = energy
        .iter()
        .find(|s| s.start <= 30.0 && s.end >= 30.0)
        .unwrap();
    assert_eq!(middle.label, SectionLabel::Drop);
}

#[test]
fn test_corrupt_file_is_rejected_at_registration() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("broken.mp3");
    fs::write(&path, b"definitely not an mp3 stream").unwrap();

    let service = AnalysisService::new(EngineConfig::default());
    assert!(matches!(
        service.register(&path),
        Err(AnalysisError::Decode(_))
    ));
    assert!(service.list().is_empty());

    assert!(matches!(
        service.register(temp_dir.path().join("missing.wav")),
        Err(AnalysisError::Io(_))
    ));
}

#[test]
fn test_edit_and_export() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("edit.wav");
    write_wav(&path, &generate_kick_pattern(120.0, 15.0, 22050), 22050);

    let service = AnalysisService::new(EngineConfig::default());
    let id = service.register(&path).unwrap();
    assert!(matches!(
        service.export(id, ExportFormat::Csv),
        Err(AnalysisError::NotAnalyzed(_))
    ));
    service.analyze(id).unwrap();

    let grid = service
        .update_beats(
            id,
            BeatUpdate {
                beats: Some((1..=8).map(f64::from).collect()),
                ..BeatUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(grid.downbeats, vec![1.0, 5.0]);
    assert_eq!(grid.beat_numbers, vec![1, 2, 3, 4, 1, 2, 3, 4]);

    let clicks = service.click_track(id).unwrap();
    assert_eq!(clicks.clicks.len(), 8);
    assert_eq!(clicks.clicks.iter().filter(|c| c.accent).count(), 2);

    let csv = service.export(id, ExportFormat::Csv).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "time,type,label");
    assert_eq!(lines[1], "1.000,downbeat,");
    assert_eq!(lines[2], "2.000,beat,");
    let section_rows = lines.iter().filter(|l| l.contains(",section_")).count();
    assert_eq!(
        section_rows,
        2 * service.track(id).unwrap().structure.unwrap().num_sections
    );

    let json: serde_json::Value =
        serde_json::from_str(&service.export(id, ExportFormat::Json).unwrap()).unwrap();
    assert_eq!(json["filename"], "edit.wav");
    assert_eq!(json["time_signature"], "4/4");
    assert_eq!(json["beats"].as_array().unwrap().len(), 8);
}

#[test]
fn test_display_data_from_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("display.wav");
    write_wav(&path, &generate_kick_pattern(120.0, 5.0, 22050), 22050);

    let service = AnalysisService::new(EngineConfig::default());
    let id = service.register(&path).unwrap();

    let peaks = service.waveform(id, 500).unwrap();
    assert_eq!(peaks.num_points, 500);
    assert_eq!(peaks.peaks_positive.len(), peaks.peaks_negative.len());
    assert!(peaks
        .peaks_positive
        .iter()
        .zip(&peaks.peaks_negative)
        .all(|(hi, lo)| hi >= lo));

    let spectrogram = service.spectrogram(id, 128, 512).unwrap();
    assert_eq!(spectrogram.n_mels, 128);
    assert_eq!(spectrogram.spectrogram.len(), 128);
    assert!(spectrogram
        .spectrogram
        .iter()
        .flatten()
        .all(|&db| (-80.0 - 1e-3..=1e-3).contains(&db)));
}
