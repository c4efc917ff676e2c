//! Date-partitioned checkpoint storage.
//!
//! Checkpoints accumulate without bound, so they are sharded into one directory
//! per UTC creation date:
//!
//! ```text
//! <root>/checkpoints/
//! ├── 2024-01-05/
//! │   ├── 3f0c...json
//! │   └── 9a11...json
//! └── 2024-01-06/
//!     └── 77be...json
//! ```
//!
//! The partition is derived from `created_at` once, at save time. Date-range
//! queries only open the partitions that can contain matches.
//!
//! # Lookup cost
//!
//! `load(id)` does not know the date, so it probes each partition in turn
//! (O(#partitions)). Callers that do know the date should use
//! [`CheckpointStore::load_in`].

use crate::model::{Checkpoint, Record, RecordKind};
use crate::paths::{StoragePaths, parse_partition};
use crate::store::{
    RecordStorage, json_ids_in, load_logged, remove_record_file, sort_by_recency, validate_id,
    write_record,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Checkpoint store sharded by creation date.
pub struct CheckpointStore {
    root: PathBuf,
}

impl StoragePaths for CheckpointStore {
    fn data_root(&self) -> &Path {
        &self.root
    }
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Partition a checkpoint is stored under.
    pub fn partition_of(checkpoint: &Checkpoint) -> NaiveDate {
        checkpoint.created_at().date_naive()
    }

    /// Existing partitions, oldest first. Directories whose names are not dates
    /// are ignored.
    pub fn list_partitions(&self) -> Vec<NaiveDate> {
        let dir = self.kind_dir(RecordKind::Checkpoint);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                log::warn!("cannot list partitions in {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut dates: Vec<NaiveDate> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().and_then(parse_partition))
            .collect();
        dates.sort();
        dates
    }

    /// Load a checkpoint when its partition is already known.
    pub fn load_in(&self, partition: NaiveDate, id: &str) -> Option<Checkpoint> {
        validate_id(id).ok()?;
        load_logged(&self.checkpoint_file(partition, id))
    }

    /// Checkpoints whose partition falls within `[start, end]` (by UTC date),
    /// newest first.
    pub fn list_by_date_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Checkpoint> {
        let (first, last) = (start.date_naive(), end.date_naive());
        let mut checkpoints: Vec<Checkpoint> = self
            .list_partitions()
            .into_iter()
            .filter(|date| *date >= first && *date <= last)
            .flat_map(|date| self.load_partition(date))
            .collect();
        sort_by_recency(&mut checkpoints);
        checkpoints
    }

    /// Checkpoints recorded during the given session, newest first.
    pub fn find_by_session(&self, session_id: &str) -> Vec<Checkpoint> {
        self.filter_recent(|cp| cp.work_context.session_id.as_deref() == Some(session_id))
    }

    /// Checkpoints carrying any of `tags`, newest first.
    pub fn find_by_tag<S: AsRef<str>>(&self, tags: &[S]) -> Vec<Checkpoint> {
        self.filter_recent(|cp| tags.iter().any(|t| cp.tags().contains(t.as_ref())))
    }

    /// Checkpoints taken on the given git branch, newest first.
    pub fn find_by_branch(&self, branch: &str) -> Vec<Checkpoint> {
        self.filter_recent(|cp| cp.work_context.git_branch.as_deref() == Some(branch))
    }

    /// Remove partition directories that no longer hold any file.
    pub fn remove_empty_partitions(&self) -> usize {
        let mut removed = 0;
        for date in self.list_partitions() {
            let dir = self.partition_dir(date);
            let empty = fs::read_dir(&dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !empty {
                continue;
            }
            match fs::remove_dir(&dir) {
                Ok(()) => removed += 1,
                Err(e) => log::debug!("keeping partition {}: {}", dir.display(), e),
            }
        }
        removed
    }

    fn load_partition(&self, date: NaiveDate) -> Vec<Checkpoint> {
        let dir = self.partition_dir(date);
        json_ids_in(&dir)
            .iter()
            .filter_map(|id| load_logged(&dir.join(format!("{}.json", id))))
            .collect()
    }

    fn filter_recent<F>(&self, keep: F) -> Vec<Checkpoint>
    where
        F: Fn(&Checkpoint) -> bool,
    {
        let mut matches: Vec<Checkpoint> = self.load_all().into_iter().filter(|cp| keep(cp)).collect();
        sort_by_recency(&mut matches);
        matches
    }

    /// Partitions holding a file for `id`.
    fn locate(&self, id: &str) -> Vec<PathBuf> {
        self.list_partitions()
            .into_iter()
            .map(|date| self.checkpoint_file(date, id))
            .filter(|path| path.is_file())
            .collect()
    }
}

impl RecordStorage<Checkpoint> for CheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> bool {
        let id = checkpoint.id();
        if let Err(e) = validate_id(id) {
            log::warn!("refusing to save checkpoint: {}", e);
            return false;
        }
        let path = self.checkpoint_file(Self::partition_of(checkpoint), id);
        if let Err(e) = write_record(&path, checkpoint) {
            log::warn!("failed to save checkpoint {}: {}", id, e);
            return false;
        }

        // A changed created_at moves the record; drop copies in other partitions.
        let mut ok = true;
        for stale in self.locate(id).into_iter().filter(|p| *p != path) {
            if let Err(e) = remove_record_file(&stale) {
                log::warn!("failed to remove stale copy {}: {}", stale.display(), e);
                ok = false;
            }
        }
        ok
    }

    fn load(&self, id: &str) -> Option<Checkpoint> {
        validate_id(id).ok()?;
        self.list_partitions()
            .into_iter()
            .find_map(|date| load_logged(&self.checkpoint_file(date, id)))
    }

    fn delete(&self, id: &str) -> bool {
        if let Err(e) = validate_id(id) {
            log::warn!("refusing to delete checkpoint: {}", e);
            return false;
        }
        let mut ok = true;
        for path in self.locate(id) {
            if let Err(e) = remove_record_file(&path) {
                log::warn!("failed to delete checkpoint {}: {}", path.display(), e);
                ok = false;
            }
        }
        ok
    }

    fn exists(&self, id: &str) -> bool {
        validate_id(id).is_ok() && !self.locate(id).is_empty()
    }

    fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .list_partitions()
            .into_iter()
            .flat_map(|date| json_ids_in(&self.partition_dir(date)))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    fn load_all(&self) -> Vec<Checkpoint> {
        self.list_partitions()
            .into_iter()
            .flat_map(|date| self.load_partition(date))
            .collect()
    }

    fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        for date in self.list_partitions() {
            for checkpoint in self.load_partition(date) {
                if !checkpoint.is_expired_at(now) {
                    continue;
                }
                match remove_record_file(&self.checkpoint_file(date, checkpoint.id())) {
                    Ok(()) => removed += 1,
                    Err(e) => log::warn!("failed to delete checkpoint {}: {}", checkpoint.id(), e),
                }
            }
        }
        let pruned = self.remove_empty_partitions();
        if removed > 0 || pruned > 0 {
            log::info!(
                "removed {} expired checkpoint(s), {} empty partition(s)",
                removed,
                pruned
            );
        }
        removed
    }
}
