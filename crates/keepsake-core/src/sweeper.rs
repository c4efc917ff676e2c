//! Expiry sweep across all stores.
//!
//! Store deletion is authoritative. Index removal is best effort: a leftover
//! index entry for a deleted record only produces a hit that no longer
//! resolves, so failures are counted and logged rather than retried.

use crate::index::IndexManager;
use crate::model::{Checkpoint, Plan, Record, Task};
use crate::partition::CheckpointStore;
use crate::store::{RecordStorage, RecordStore};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Records removed per kind, plus index removals that failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checkpoints: usize,
    pub tasks: usize,
    pub plans: usize,
    pub index_failures: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.checkpoints + self.tasks + self.plans
    }
}

/// Delete every record expired at `now` and drop its index entry.
pub fn sweep_expired(
    checkpoints: &CheckpointStore,
    tasks: &RecordStore<Task>,
    plans: &RecordStore<Plan>,
    index: &IndexManager,
    now: DateTime<Utc>,
) -> SweepReport {
    let mut report = SweepReport::default();
    report.checkpoints = sweep_store::<Checkpoint, _>(checkpoints, index, now, &mut report.index_failures);
    report.tasks = sweep_store::<Task, _>(tasks, index, now, &mut report.index_failures);
    report.plans = sweep_store::<Plan, _>(plans, index, now, &mut report.index_failures);
    checkpoints.remove_empty_partitions();

    if report.total() > 0 {
        log::info!(
            "expiry sweep removed {} checkpoint(s), {} task(s), {} plan(s)",
            report.checkpoints,
            report.tasks,
            report.plans
        );
    }
    report
}

fn sweep_store<R, S>(store: &S, index: &IndexManager, now: DateTime<Utc>, index_failures: &mut usize) -> usize
where
    R: Record,
    S: RecordStorage<R>,
{
    let mut removed = 0;
    for id in store.list_ids() {
        let Some(record) = store.load(&id) else {
            continue;
        };
        if !record.is_expired_at(now) || !store.delete(&id) {
            continue;
        }
        removed += 1;
        if !index.remove_document(&id) {
            log::warn!("expired {} {} left in search index", R::KIND, id);
            *index_failures += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexSettings;
    use chrono::TimeDelta;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_sweep_counts_per_kind_and_tolerates_index_failure() {
        let dir = TempDir::new().unwrap();
        let checkpoints = CheckpointStore::new(dir.path());
        let tasks: RecordStore<Task> = RecordStore::new(dir.path());
        let plans: RecordStore<Plan> = RecordStore::new(dir.path());
        // A file where the index directory should be: every index write fails
        let blocked = dir.path().join("index");
        fs::write(&blocked, b"").unwrap();
        let index = IndexManager::new(&blocked, IndexSettings::default());

        let now = Utc::now();
        let old = now - TimeDelta::days(3);
        checkpoints.save(&Checkpoint::new("old").with_created_at(old).with_ttl(TimeDelta::days(1)));
        checkpoints.save(&Checkpoint::new("kept"));
        tasks.save(&Task::new("old").with_created_at(old).with_ttl(TimeDelta::hours(1)));
        tasks.save(&Task::new("old too").with_created_at(old).with_ttl(TimeDelta::hours(2)));
        plans.save(&Plan::new("kept").with_ttl(TimeDelta::days(30)));

        let report = sweep_expired(&checkpoints, &tasks, &plans, &index, now);
        assert_eq!(
            report,
            SweepReport {
                checkpoints: 1,
                tasks: 2,
                plans: 0,
                index_failures: 3,
            }
        );
        assert_eq!(checkpoints.count(), 1);
        assert_eq!(tasks.count(), 0);
        assert_eq!(plans.count(), 1);
        assert_eq!(checkpoints.list_partitions().len(), 1);
    }
}
