//! In-memory track store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::beat::{DownbeatSource, TrackerKind};
use crate::error::AnalysisError;
use crate::types::{AudioFormat, BeatGrid, StructureResult, TrackId, TrackStatus};

/// Everything known about a registered track.
#[derive(Debug, Clone, Serialize)]
pub struct TrackRecord {
    pub id: TrackId,
    pub file_path: PathBuf,
    /// Display name (file name without directories).
    pub filename: String,
    pub format: AudioFormat,
    /// Duration in seconds.
    pub duration: f64,
    pub status: TrackStatus,
    pub beats: Option<BeatGrid>,
    /// Tracker that produced `beats`.
    pub tracker: Option<TrackerKind>,
    pub downbeat_source: Option<DownbeatSource>,
    pub structure: Option<StructureResult>,
    /// Message of the most recent failed analysis.
    pub error: Option<String>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl TrackRecord {
    fn new(id: TrackId, file_path: PathBuf, format: AudioFormat, duration: f64) -> Self {
        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id,
            file_path,
            filename,
            format,
            duration,
            status: TrackStatus::Uploaded,
            beats: None,
            tracker: None,
            downbeat_source: None,
            structure: None,
            error: None,
            analyzed_at: None,
        }
    }
}

/// Track records keyed by id.
///
/// The map sits behind a read-write lock; each record behind its own mutex,
/// so work on one track never blocks another.
pub struct TrackRepository {
    next_id: AtomicI64,
    records: RwLock<HashMap<TrackId, Arc<Mutex<TrackRecord>>>>,
}

impl Default for TrackRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackRepository {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Return the track registered for `file_path`, creating it if absent.
    ///
    /// The lookup and the insert happen under one write lock, so concurrent
    /// callers with the same path all get the same id. The flag is true when
    /// this call created the record.
    pub fn get_or_create(
        &self,
        file_path: PathBuf,
        format: AudioFormat,
        duration: f64,
    ) -> (TrackId, bool) {
        let mut records = self.records.write();
        let existing = records
            .values()
            .map(|handle| handle.lock())
            .find(|record| record.file_path == file_path)
            .map(|record| record.id);
        if let Some(id) = existing {
            return (id, false);
        }

        let id = TrackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let record = TrackRecord::new(id, file_path, format, duration);
        records.insert(id, Arc::new(Mutex::new(record)));
        (id, true)
    }

    /// Snapshot of a record.
    pub fn get(&self, id: TrackId) -> Result<TrackRecord, AnalysisError> {
        self.with_record(id, |record| record.clone())
    }

    /// Find a track by its file path.
    pub fn get_by_path(&self, path: &Path) -> Option<TrackRecord> {
        let handles: Vec<Arc<Mutex<TrackRecord>>> = self.records.read().values().cloned().collect();
        handles
            .iter()
            .map(|handle| handle.lock())
            .find(|record| record.file_path == path)
            .map(|record| TrackRecord::clone(&record))
    }

    /// Run `f` with exclusive access to one record.
    pub fn with_record<R>(
        &self,
        id: TrackId,
        f: impl FnOnce(&mut TrackRecord) -> R,
    ) -> Result<R, AnalysisError> {
        let handle = self
            .records
            .read()
            .get(&id)
            .cloned()
            .ok_or(AnalysisError::NotFound(id))?;
        let mut record = handle.lock();
        Ok(f(&mut record))
    }

    /// Remove a record, returning its last state.
    pub fn remove(&self, id: TrackId) -> Result<TrackRecord, AnalysisError> {
        let handle = self
            .records
            .write()
            .remove(&id)
            .ok_or(AnalysisError::NotFound(id))?;
        let record = TrackRecord::clone(&handle.lock());
        Ok(record)
    }

    /// All ids in ascending order.
    pub fn ids(&self) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self.records.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let repo = TrackRepository::new();
        let (id, created) =
            repo.get_or_create(PathBuf::from("/music/song.mp3"), AudioFormat::Mp3, 180.0);
        assert!(created);

        let record = repo.get(id).unwrap();
        assert_eq!(record.filename, "song.mp3");
        assert_eq!(record.status, TrackStatus::Uploaded);
        assert!(record.beats.is_none());
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_ids_are_unique_and_sorted() {
        let repo = TrackRepository::new();
        let a = repo.get_or_create(PathBuf::from("a.wav"), AudioFormat::Wav, 1.0).0;
        let b = repo.get_or_create(PathBuf::from("b.wav"), AudioFormat::Wav, 1.0).0;

        assert_ne!(a, b);
        assert_eq!(repo.ids(), vec![a, b]);
        assert_eq!(
            repo.get_by_path(Path::new("b.wav")).map(|r| r.id),
            Some(b)
        );
    }

    #[test]
    fn test_get_or_create_shares_one_record_per_path() {
        let repo = TrackRepository::new();
        let (first, created) =
            repo.get_or_create(PathBuf::from("/music/a.wav"), AudioFormat::Wav, 3.0);
        assert!(created);

        let ids: Vec<TrackId> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        repo.get_or_create(PathBuf::from("/music/a.wav"), AudioFormat::Wav, 3.0)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .map(|(id, created)| {
                    assert!(!created);
                    id
                })
                .collect()
        });

        assert!(ids.iter().all(|&id| id == first));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_with_record_mutates() {
        let repo = TrackRepository::new();
        let id = repo.get_or_create(PathBuf::from("a.flac"), AudioFormat::Flac, 2.0).0;

        repo.with_record(id, |record| record.status = TrackStatus::Analyzing)
            .unwrap();
        assert_eq!(repo.get(id).unwrap().status, TrackStatus::Analyzing);
    }

    #[test]
    fn test_missing_track() {
        let repo = TrackRepository::new();
        let id = repo.get_or_create(PathBuf::from("a.ogg"), AudioFormat::Ogg, 2.0).0;
        repo.remove(id).unwrap();

        assert!(repo.is_empty());
        assert!(matches!(repo.get(id), Err(AnalysisError::NotFound(missing)) if missing == id));
        assert!(matches!(repo.remove(id), Err(AnalysisError::NotFound(_))));
    }
}
