//! Lifecycle of the on-disk search index and serialized writer access.
//!
//! The handle moves through `Uninitialized → Open | Failed` exactly once, in
//! [`IndexManager::ensure_open`]. A failed index degrades every search to an
//! empty result and every write to `false`; the record store keeps working.
//!
//! Writers are acquired per call and released (committed, merged, dropped)
//! before returning, so no index lock outlives a single operation. Contention
//! with another process's writer is retried with backoff.

use super::document::IndexDocument;
use super::retry::attempt;
use super::schema::{IndexFields, build_schema};
use crate::config::IndexSettings;
use crate::error::{Result, StoreError};
use crate::model::{Checkpoint, Plan, RecordKind, Task};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tantivy::collector::Count;
use tantivy::query::TermQuery;
use tantivy::schema::IndexRecordOption;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, Term};

/// File the engine writes once an index exists in a directory.
const META_FILE: &str = "meta.json";

/// An opened index with its resolved fields.
#[derive(Clone)]
pub(crate) struct IndexHandle {
    pub(crate) index: Index,
    pub(crate) fields: IndexFields,
}

impl IndexHandle {
    /// Fresh point-in-time searcher. The reader is dropped with the searcher's
    /// last use.
    pub(crate) fn searcher(&self) -> Result<Searcher> {
        let reader: IndexReader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(reader.searcher())
    }
}

enum IndexState {
    Uninitialized,
    Open(IndexHandle),
    Failed(String),
}

/// Externally visible lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    Uninitialized,
    Open,
    Failed(String),
}

/// Document counts and on-disk footprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub total_docs: u64,
    pub per_type: BTreeMap<RecordKind, u64>,
    pub index_size_mb: f64,
}

impl IndexStats {
    /// Flat map: `total_docs`, `index_size_mb` and one `<type>_count` per kind.
    pub fn as_map(&self) -> BTreeMap<String, serde_json::Value> {
        let mut map = BTreeMap::new();
        map.insert("total_docs".to_string(), self.total_docs.into());
        map.insert("index_size_mb".to_string(), self.index_size_mb.into());
        for kind in RecordKind::ALL {
            let count = self.per_type.get(&kind).copied().unwrap_or(0);
            map.insert(format!("{}_count", kind), count.into());
        }
        map
    }
}

/// Owner of the index directory. Shared behind an `Arc` by the writer side
/// and the query engine.
pub struct IndexManager {
    dir: PathBuf,
    settings: IndexSettings,
    state: Mutex<IndexState>,
    last_seq: AtomicI64,
}

impl IndexManager {
    /// Does no I/O; the index is opened on first use.
    pub fn new(dir: impl Into<PathBuf>, settings: IndexSettings) -> Self {
        Self {
            dir: dir.into(),
            settings,
            state: Mutex::new(IndexState::Uninitialized),
            last_seq: AtomicI64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    pub fn state(&self) -> IndexStatus {
        match &*self.lock_state() {
            IndexState::Uninitialized => IndexStatus::Uninitialized,
            IndexState::Open(_) => IndexStatus::Open,
            IndexState::Failed(reason) => IndexStatus::Failed(reason.clone()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open or create the index. Stale lock markers are cleared first; a failed
    /// open is retried once after another cleanup, then the manager is marked
    /// failed for the rest of its life.
    pub(crate) fn ensure_open(&self) -> Result<IndexHandle> {
        let mut state = self.lock_state();
        match &*state {
            IndexState::Open(handle) => return Ok(handle.clone()),
            IndexState::Failed(reason) => return Err(StoreError::IndexUnavailable(reason.clone())),
            IndexState::Uninitialized => {}
        }

        self.cleanup_locks(false);
        let opened = self.open_or_create().or_else(|first| {
            log::warn!("opening index at {} failed ({}), retrying", self.dir.display(), first);
            self.cleanup_locks(false);
            self.open_or_create()
        });

        match opened {
            Ok(handle) => {
                log::debug!("index open at {}", self.dir.display());
                *state = IndexState::Open(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                let reason = e.to_string();
                log::error!("index at {} unavailable: {}", self.dir.display(), reason);
                *state = IndexState::Failed(reason.clone());
                Err(StoreError::IndexUnavailable(reason))
            }
        }
    }

    fn open_or_create(&self) -> Result<IndexHandle> {
        fs::create_dir_all(&self.dir)?;
        let index = if self.dir.join(META_FILE).exists() {
            Index::open_in_dir(&self.dir)?
        } else {
            log::info!("creating search index at {}", self.dir.display());
            Index::create_in_dir(&self.dir, build_schema())?
        };
        let fields = IndexFields::from_schema(&index.schema())?;
        Ok(IndexHandle { index, fields })
    }

    /// Remove writer lock markers left in the index directory.
    ///
    /// Without `force`, only markers older than the stale threshold go. Returns
    /// whether anything was removed. A forced cleanup while another process is
    /// writing can admit a second writer; reserve it for recovery.
    pub fn cleanup_locks(&self, force: bool) -> bool {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return false,
            Err(e) => {
                log::warn!("cannot scan {} for locks: {}", self.dir.display(), e);
                return false;
            }
        };

        let max_age = self.settings.stale_lock_age();
        let now = SystemTime::now();
        let mut removed = false;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("lock") {
                continue;
            }
            if !force {
                let age = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok());
                // Unknown age or future mtime: leave it alone
                if !age.is_some_and(|age| age > max_age) {
                    continue;
                }
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    log::info!("removed lock marker {}", path.display());
                    removed = true;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("cannot remove lock {}: {}", path.display(), e),
            }
        }
        removed
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Run `write_fn` against a freshly acquired writer and commit.
    ///
    /// Returns false when the index is unavailable, when the writer lock stays
    /// busy for every attempt, or on any other engine error.
    pub fn with_writer<F>(&self, write_fn: F) -> bool
    where
        F: Fn(&mut IndexWriter, &IndexFields) -> tantivy::Result<()>,
    {
        let handle = match self.ensure_open() {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("index write skipped: {}", e);
                return false;
            }
        };

        let backoff = self.settings.backoff();
        let result = attempt(
            &backoff,
            |_| self.write_once(&handle, &write_fn),
            StoreError::is_transient,
        );
        match result {
            Ok(()) => true,
            Err(e) if e.is_transient() => {
                log::warn!(
                    "index writer still busy after {} attempt(s): {}",
                    backoff.max_attempts,
                    e
                );
                false
            }
            Err(e) => {
                log::error!("index write failed: {}", e);
                false
            }
        }
    }

    fn write_once<F>(&self, handle: &IndexHandle, write_fn: &F) -> Result<()>
    where
        F: Fn(&mut IndexWriter, &IndexFields) -> tantivy::Result<()>,
    {
        let mut writer: IndexWriter = handle
            .index
            .writer_with_num_threads(1, self.settings.writer_memory_bytes())?;
        if let Err(e) = write_fn(&mut writer, &handle.fields) {
            writer.rollback()?;
            return Err(e.into());
        }
        writer.commit()?;
        writer.wait_merging_threads()?;
        Ok(())
    }

    /// Write stamp for `indexed_seq`: epoch microseconds, strictly increasing
    /// within this manager.
    fn next_seq(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let step = |last: i64| now.max(last.saturating_add(1));
        let prev = self
            .last_seq
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(step(last)))
            .unwrap_or_else(|last| last);
        step(prev)
    }

    fn upsert(&self, doc: IndexDocument) -> bool {
        let seq = self.next_seq();
        self.with_writer(|writer, fields| {
            writer.delete_term(Term::from_field_text(fields.doc_id, &doc.doc_id));
            let mut tantivy_doc = doc.to_tantivy(fields);
            tantivy_doc.add_i64(fields.indexed_seq, seq);
            writer.add_document(tantivy_doc)?;
            Ok(())
        })
    }

    pub fn index_checkpoint(&self, checkpoint: &Checkpoint) -> bool {
        self.upsert(IndexDocument::from(checkpoint))
    }

    pub fn index_task(&self, task: &Task) -> bool {
        self.upsert(IndexDocument::from(task))
    }

    pub fn index_plan(&self, plan: &Plan) -> bool {
        self.upsert(IndexDocument::from(plan))
    }

    /// Delete every document with this id. True also when none existed.
    pub fn remove_document(&self, doc_id: &str) -> bool {
        self.with_writer(|writer, fields| {
            writer.delete_term(Term::from_field_text(fields.doc_id, doc_id));
            Ok(())
        })
    }

    /// Drop every document, keeping the index itself.
    pub fn clear(&self) -> bool {
        self.with_writer(|writer, _| {
            writer.delete_all_documents()?;
            Ok(())
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Totals from a fresh searcher. Zeroed stats when the index is unavailable.
    pub fn get_index_stats(&self) -> IndexStats {
        match self.collect_stats() {
            Ok(stats) => stats,
            Err(e) => {
                log::warn!("index stats unavailable: {}", e);
                IndexStats::default()
            }
        }
    }

    fn collect_stats(&self) -> Result<IndexStats> {
        let handle = self.ensure_open()?;
        let searcher = handle.searcher()?;

        let mut per_type = BTreeMap::new();
        for kind in RecordKind::ALL {
            let query = TermQuery::new(
                Term::from_field_text(handle.fields.doc_type, kind.as_ref()),
                IndexRecordOption::Basic,
            );
            per_type.insert(kind, searcher.search(&query, &Count)? as u64);
        }

        Ok(IndexStats {
            total_docs: searcher.num_docs(),
            per_type,
            index_size_mb: dir_size_bytes(&self.dir) as f64 / (1024.0 * 1024.0),
        })
    }
}

/// Total size of the regular files directly inside `dir`.
fn dir_size_bytes(dir: &Path) -> u64 {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.metadata().ok())
                .filter(|m| m.is_file())
                .map(|m| m.len())
                .sum()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn manager() -> (IndexManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let settings = IndexSettings {
            writer_memory_mb: Some(15),
            retry_base_delay_ms: Some(1),
            retry_max_jitter_ms: Some(1),
            ..Default::default()
        };
        (IndexManager::new(dir.path().join("index"), settings), dir)
    }

    fn backdate(path: &Path, by: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn test_lazy_open() {
        let (manager, _dir) = manager();
        assert_eq!(manager.state(), IndexStatus::Uninitialized);
        assert!(!manager.dir().exists());

        manager.ensure_open().unwrap();
        assert_eq!(manager.state(), IndexStatus::Open);
        assert!(manager.dir().join(META_FILE).exists());
    }

    #[test]
    fn test_reopen_existing_index() {
        let (manager, dir) = manager();
        assert!(manager.index_task(&Task::new("persisted")));
        drop(manager);

        let again = IndexManager::new(dir.path().join("index"), IndexSettings::default());
        assert_eq!(again.get_index_stats().total_docs, 1);
    }

    #[test]
    fn test_upsert_replaces_document() {
        let (manager, _dir) = manager();
        let mut task = Task::new("first");
        assert!(manager.index_task(&task));
        task.content = "second".into();
        assert!(manager.index_task(&task));

        let stats = manager.get_index_stats();
        assert_eq!(stats.total_docs, 1);
        assert_eq!(stats.per_type[&RecordKind::Task], 1);
    }

    #[test]
    fn test_write_stamps_strictly_increase() {
        let (manager, _dir) = manager();
        let stamps: Vec<i64> = (0..100).map(|_| manager.next_seq()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_stats_per_type_and_map() {
        let (manager, _dir) = manager();
        manager.index_checkpoint(&Checkpoint::new("c"));
        manager.index_task(&Task::new("t1"));
        manager.index_task(&Task::new("t2"));

        let map = manager.get_index_stats().as_map();
        assert_eq!(map["total_docs"], 3);
        assert_eq!(map["checkpoint_count"], 1);
        assert_eq!(map["task_count"], 2);
        assert_eq!(map["plan_count"], 0);
        assert!(map["index_size_mb"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_remove_and_clear() {
        let (manager, _dir) = manager();
        let task = Task::new("gone soon");
        let plan = Plan::new("stays until clear");
        manager.index_task(&task);
        manager.index_plan(&plan);

        assert!(manager.remove_document(task.id()));
        assert!(manager.remove_document("never-indexed"));
        assert_eq!(manager.get_index_stats().total_docs, 1);

        assert!(manager.clear());
        assert_eq!(manager.get_index_stats().total_docs, 0);
    }

    #[test]
    fn test_unopenable_index_fails_once_and_degrades() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("index");
        fs::write(&blocker, b"not a directory").unwrap();
        let manager = IndexManager::new(&blocker, IndexSettings::default());

        assert!(!manager.index_task(&Task::new("x")));
        assert!(matches!(manager.state(), IndexStatus::Failed(_)));
        assert_eq!(manager.get_index_stats(), IndexStats::default());
        assert!(!manager.remove_document("x"));
    }

    #[test]
    fn test_cleanup_locks_respects_age() {
        let (manager, _dir) = manager();
        fs::create_dir_all(manager.dir()).unwrap();
        let old = manager.dir().join(".tantivy-writer.lock");
        let young = manager.dir().join(".tantivy-meta.lock");
        let other = manager.dir().join("meta.json.bak");
        for path in [&old, &young, &other] {
            fs::write(path, b"").unwrap();
        }
        backdate(&old, Duration::from_secs(600));
        backdate(&other, Duration::from_secs(600));

        assert!(manager.cleanup_locks(false));
        assert!(!old.exists());
        assert!(young.exists());
        assert!(other.exists());

        assert!(!manager.cleanup_locks(false));
        assert!(manager.cleanup_locks(true));
        assert!(!young.exists());
        assert!(!manager.cleanup_locks(true));
    }

    #[test]
    fn test_cleanup_locks_without_dir() {
        let (manager, _dir) = manager();
        assert!(!manager.cleanup_locks(true));
    }
}
