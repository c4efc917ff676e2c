//! `Memory`: the stores and the search index behind one data root.
//!
//! Writes go to the record store first; indexing follows on a best-effort
//! basis and never fails a save. Deletes mirror that order. When the index
//! drifts (lost directory, crashed writer, failed upserts) `reindex` rebuilds
//! it from the stores.

use crate::config::{KeepsakeConfig, resolve_home};
use crate::error::Result;
use crate::index::{IndexManager, QueryEngine};
use crate::model::{Checkpoint, Plan, Record, Task, TaskStatus};
use crate::partition::CheckpointStore;
use crate::paths::StoragePaths;
use crate::store::{RecordStorage, RecordStore};
use crate::sweeper::{SweepReport, sweep_expired};
use chrono::{TimeDelta, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of [`Memory::reindex`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub checkpoints: usize,
    pub tasks: usize,
    pub plans: usize,
    /// Records whose index write failed.
    pub failures: usize,
}

/// Everything an agent session needs to persist and search its memory.
///
/// `Send + Sync`; share it behind an `Arc`. All methods block on file I/O.
pub struct Memory {
    root: PathBuf,
    config: KeepsakeConfig,
    checkpoints: CheckpointStore,
    tasks: RecordStore<Task>,
    plans: RecordStore<Plan>,
    index: Arc<IndexManager>,
    query: QueryEngine,
}

impl Memory {
    /// Open the memory rooted at `root`, creating the directory if needed.
    ///
    /// Reads `config.toml` (an invalid file is an error) and clears stale index
    /// lock markers left by crashed processes.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let config = KeepsakeConfig::load(&root)?;

        let index = Arc::new(IndexManager::new(root.index_dir(), config.index.clone()));
        index.cleanup_locks(false);

        Ok(Self {
            checkpoints: CheckpointStore::new(&root),
            tasks: RecordStore::new(&root),
            plans: RecordStore::new(&root),
            query: QueryEngine::new(Arc::clone(&index)),
            index,
            config,
            root,
        })
    }

    /// Open the memory at the resolved data root (`--home` > `KEEPSAKE_HOME` >
    /// `~/.keepsake`).
    pub fn load(home_override: Option<PathBuf>) -> Result<Self> {
        Self::open(resolve_home(home_override)?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &KeepsakeConfig {
        &self.config
    }

    /// TTL for records whose creator did not choose one.
    pub fn default_ttl(&self) -> TimeDelta {
        self.config.default_ttl()
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn tasks(&self) -> &RecordStore<Task> {
        &self.tasks
    }

    pub fn plans(&self) -> &RecordStore<Plan> {
        &self.plans
    }

    pub fn index(&self) -> &IndexManager {
        &self.index
    }

    pub fn query(&self) -> &QueryEngine {
        &self.query
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> bool {
        let saved = self.checkpoints.save(checkpoint);
        if saved {
            self.index_best_effort(checkpoint, |index| index.index_checkpoint(checkpoint));
        }
        saved
    }

    pub fn save_task(&self, task: &Task) -> bool {
        let saved = self.tasks.save(task);
        if saved {
            self.index_best_effort(task, |index| index.index_task(task));
        }
        saved
    }

    pub fn save_plan(&self, plan: &Plan) -> bool {
        let saved = self.plans.save(plan);
        if saved {
            self.index_best_effort(plan, |index| index.index_plan(plan));
        }
        saved
    }

    pub fn delete_checkpoint(&self, id: &str) -> bool {
        let deleted = self.checkpoints.delete(id);
        if deleted {
            self.unindex_best_effort(id);
        }
        deleted
    }

    pub fn delete_task(&self, id: &str) -> bool {
        let deleted = self.tasks.delete(id);
        if deleted {
            self.unindex_best_effort(id);
        }
        deleted
    }

    pub fn delete_plan(&self, id: &str) -> bool {
        let deleted = self.plans.delete(id);
        if deleted {
            self.unindex_best_effort(id);
        }
        deleted
    }

    fn index_best_effort<R: Record>(&self, record: &R, write: impl FnOnce(&IndexManager) -> bool) {
        if !write(&self.index) {
            log::warn!(
                "{} {} saved but not indexed; run reindex to repair",
                R::KIND,
                record.id()
            );
        }
    }

    fn unindex_best_effort(&self, id: &str) {
        if !self.index.remove_document(id) {
            log::warn!("{} deleted but still in search index", id);
        }
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop every index entry and re-index all stored records.
    pub fn reindex(&self) -> ReindexReport {
        let mut report = ReindexReport::default();
        if !self.index.clear() {
            log::error!("reindex aborted: index could not be cleared");
            report.failures = self.checkpoints.count() + self.tasks.count() + self.plans.count();
            return report;
        }

        for checkpoint in self.checkpoints.load_all() {
            tally(self.index.index_checkpoint(&checkpoint), &mut report.checkpoints, &mut report.failures);
        }
        for task in self.tasks.load_all() {
            tally(self.index.index_task(&task), &mut report.tasks, &mut report.failures);
        }
        for plan in self.plans.load_all() {
            tally(self.index.index_plan(&plan), &mut report.plans, &mut report.failures);
        }
        log::info!(
            "reindexed {} checkpoint(s), {} task(s), {} plan(s), {} failure(s)",
            report.checkpoints,
            report.tasks,
            report.plans,
            report.failures
        );
        report
    }

    /// Remove expired records from every store and the index.
    pub fn sweep_expired(&self) -> SweepReport {
        sweep_expired(&self.checkpoints, &self.tasks, &self.plans, &self.index, Utc::now())
    }

    // ========================================================================
    // Task and plan lookups
    // ========================================================================

    /// Tasks in the given status, newest first.
    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.tasks
            .list_recent(usize::MAX)
            .into_iter()
            .filter(|task| task.status == status)
            .collect()
    }

    /// Tasks listed by a plan, in plan order. Ids that no longer resolve are
    /// skipped.
    pub fn tasks_for_plan(&self, plan_id: &str) -> Vec<Task> {
        let Some(plan) = self.plans.load(plan_id) else {
            return Vec::new();
        };
        plan.task_ids.iter().filter_map(|id| self.tasks.load(id)).collect()
    }
}

fn tally(ok: bool, indexed: &mut usize, failures: &mut usize) {
    if ok {
        *indexed += 1;
    } else {
        *failures += 1;
    }
}
