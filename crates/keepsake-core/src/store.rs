//! Generic per-kind JSON record store.
//!
//! Each record lives in its own file, `<root>/<kind>/<id>.json`. Writes take an
//! exclusive lock on that file and reads a shared one, each scoped to a single
//! call. There is no global lock: unrelated ids never contend, and concurrent
//! writes to the same id serialize on the OS-level lock (last writer wins).
//!
//! The public API never returns errors for expected conditions. A missing or
//! unparsable record is `None`, a failed write is `false`, and the cause is
//! logged.

use crate::error::{Result, StoreError};
use crate::model::Record;
use crate::paths::StoragePaths;
use crate::safe_io::{read_locked, write_locked};
use chrono::Utc;
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Operations shared by the flat and the date-partitioned stores.
///
/// All calls are synchronous, blocking file I/O. Async callers should run
/// them on a blocking worker.
pub trait RecordStorage<R: Record>: Send + Sync {
    /// Persist `record`, replacing any previous version. False on I/O failure.
    fn save(&self, record: &R) -> bool;

    /// Load a record by id. `None` if missing or unreadable.
    fn load(&self, id: &str) -> Option<R>;

    /// Remove a record. True when removed and when already absent.
    fn delete(&self, id: &str) -> bool;

    fn exists(&self, id: &str) -> bool;

    /// All record ids, sorted.
    fn list_ids(&self) -> Vec<String>;

    fn load_all(&self) -> Vec<R> {
        self.list_ids()
            .iter()
            .filter_map(|id| self.load(id))
            .collect()
    }

    fn count(&self) -> usize {
        self.list_ids().len()
    }

    /// The `limit` most recently created records, newest first.
    fn list_recent(&self, limit: usize) -> Vec<R> {
        let mut records = self.load_all();
        sort_by_recency(&mut records);
        records.truncate(limit);
        records
    }

    /// Delete every expired record and return how many were removed.
    fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        for id in self.list_ids() {
            let Some(record) = self.load(&id) else {
                continue;
            };
            if record.is_expired_at(now) && self.delete(&id) {
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!("removed {} expired {} record(s)", removed, R::KIND);
        }
        removed
    }
}

/// Flat store for one record kind (tasks, plans).
pub struct RecordStore<R> {
    root: PathBuf,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Record> RecordStore<R> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            _marker: PhantomData,
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.record_file(R::KIND, id)
    }
}

impl<R> StoragePaths for RecordStore<R> {
    fn data_root(&self) -> &Path {
        &self.root
    }
}

impl<R: Record> RecordStorage<R> for RecordStore<R> {
    fn save(&self, record: &R) -> bool {
        let id = record.id();
        if let Err(e) = validate_id(id) {
            log::warn!("refusing to save {}: {}", R::KIND, e);
            return false;
        }
        match write_record(&self.path_for(id), record) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("failed to save {} {}: {}", R::KIND, id, e);
                false
            }
        }
    }

    fn load(&self, id: &str) -> Option<R> {
        validate_id(id).ok()?;
        load_logged(&self.path_for(id))
    }

    fn delete(&self, id: &str) -> bool {
        if let Err(e) = validate_id(id) {
            log::warn!("refusing to delete {}: {}", R::KIND, e);
            return false;
        }
        match remove_record_file(&self.path_for(id)) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("failed to delete {} {}: {}", R::KIND, id, e);
                false
            }
        }
    }

    fn exists(&self, id: &str) -> bool {
        validate_id(id).is_ok() && self.path_for(id).is_file()
    }

    fn list_ids(&self) -> Vec<String> {
        json_ids_in(&self.kind_dir(R::KIND))
    }
}

// ============================================================================
// Shared helpers (also used by the partitioned checkpoint store)
// ============================================================================

/// Reject ids that are empty or could escape the record directory.
pub(crate) fn validate_id(id: &str) -> Result<()> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0'])
        || id.starts_with('.');
    if bad {
        Err(StoreError::InvalidId(id.to_string()))
    } else {
        Ok(())
    }
}

pub(crate) fn write_record<R: Record>(path: &Path, record: &R) -> Result<()> {
    let bytes = record.encode()?;
    write_locked(path, &bytes)?;
    Ok(())
}

pub(crate) fn read_record<R: Record>(path: &Path) -> Result<R> {
    let bytes = read_locked(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound(path.display().to_string())
        } else {
            StoreError::Io(e)
        }
    })?;
    R::decode(&bytes)
}

/// Load a record, treating every failure as absent. Parse and I/O failures are
/// logged; a missing file is not.
pub(crate) fn load_logged<R: Record>(path: &Path) -> Option<R> {
    match read_record(path) {
        Ok(record) => Some(record),
        Err(StoreError::NotFound(_)) => None,
        Err(e) => {
            log::warn!("[{}] {}: treating as absent", path.display(), e);
            None
        }
    }
}

pub(crate) fn remove_record_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Sorted stems of the `*.json` files directly inside `dir`.
pub(crate) fn json_ids_in(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            log::warn!("cannot list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut ids: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                return None;
            }
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .collect();
    ids.sort();
    ids
}

/// Newest first; equal timestamps fall back to id order.
pub(crate) fn sort_by_recency<R: Record>(records: &mut [R]) {
    records.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| a.id().cmp(b.id()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Plan, Task, TaskStatus};
    use chrono::{TimeDelta, TimeZone};
    use tempfile::TempDir;

    fn task_store() -> (RecordStore<Task>, TempDir) {
        let dir = TempDir::new().unwrap();
        (RecordStore::new(dir.path()), dir)
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (store, dir) = task_store();
        let mut task = Task::new("Review PR").with_tags(["review"]);
        task.start();

        assert!(store.save(&task));
        assert!(dir.path().join("tasks").join(format!("{}.json", task.id())).exists());

        let loaded = store.load(task.id()).unwrap();
        assert_eq!(loaded, task);
        assert_eq!(loaded.status, TaskStatus::InProgress);
    }

    #[test]
    fn test_save_overwrites() {
        let (store, _dir) = task_store();
        let mut task = Task::new("a fairly long original description");
        assert!(store.save(&task));

        task.content = "short".into();
        assert!(store.save(&task));
        assert_eq!(store.load(task.id()).unwrap().content, "short");
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_load_missing_is_none() {
        let (store, _dir) = task_store();
        assert!(store.load("does-not-exist").is_none());
        assert!(!store.exists("does-not-exist"));
    }

    #[test]
    fn test_corrupt_file_is_absent() {
        let (store, dir) = task_store();
        let tasks = dir.path().join("tasks");
        fs::create_dir_all(&tasks).unwrap();
        fs::write(tasks.join("broken.json"), b"{not json").unwrap();

        assert!(store.exists("broken"));
        assert!(store.load("broken").is_none());
        assert!(store.load_all().is_empty());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (store, _dir) = task_store();
        let task = Task::new("x");
        store.save(&task);

        assert!(store.delete(task.id()));
        assert!(!store.exists(task.id()));
        assert!(store.delete(task.id()));
        assert!(store.delete("never-existed"));
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let (store, _dir) = task_store();
        let mut task = Task::new("x");
        for bad in ["", "..", "../escape", "a/b", ".hidden"] {
            task.meta.id = bad.to_string();
            assert!(!store.save(&task), "saved with id {:?}", bad);
            assert!(store.load(bad).is_none());
            assert!(!store.delete(bad));
        }
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_list_ids_sorted_and_ignores_other_files() {
        let (store, dir) = task_store();
        for id in ["b", "a", "c"] {
            let mut task = Task::new(id);
            task.meta.id = id.to_string();
            store.save(&task);
        }
        fs::write(dir.path().join("tasks").join("stray.tmp"), b"").unwrap();

        assert_eq!(store.list_ids(), vec!["a", "b", "c"]);
        assert_eq!(store.count(), 3);
        assert_eq!(store.load_all().len(), 3);
    }

    #[test]
    fn test_list_recent_orders_newest_first_with_id_tiebreak() {
        let (store, _dir) = task_store();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        for (id, offset) in [("old", 0), ("new-b", 2), ("new-a", 2), ("mid", 1)] {
            let mut task = Task::new(id).with_created_at(base + TimeDelta::hours(offset));
            task.meta.id = id.to_string();
            store.save(&task);
        }

        let ids: Vec<_> = store.list_recent(3).into_iter().map(|t| t.meta.id).collect();
        assert_eq!(ids, vec!["new-a", "new-b", "mid"]);
    }

    #[test]
    fn test_cleanup_expired() {
        let (store, _dir) = task_store();
        let expired = Task::new("old")
            .with_created_at(Utc::now() - TimeDelta::days(10))
            .with_ttl(TimeDelta::days(1));
        let fresh = Task::new("fresh").with_ttl(TimeDelta::days(1));
        let forever = Task::new("forever");
        for t in [&expired, &fresh, &forever] {
            store.save(t);
        }

        assert!(expired.is_expired());
        assert_eq!(store.cleanup_expired(), 1);
        assert!(store.load(expired.id()).is_none());
        assert_eq!(store.count(), 2);
        assert_eq!(store.cleanup_expired(), 0);
    }

    #[test]
    fn test_kinds_are_isolated() {
        let dir = TempDir::new().unwrap();
        let tasks: RecordStore<Task> = RecordStore::new(dir.path());
        let plans: RecordStore<Plan> = RecordStore::new(dir.path());

        tasks.save(&Task::new("t"));
        plans.save(&Plan::new("p"));
        assert_eq!(tasks.count(), 1);
        assert_eq!(plans.count(), 1);
        assert!(dir.path().join("plans").is_dir());
    }
}
