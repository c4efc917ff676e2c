//! Path computation for the data root.
//!
//! All path methods are pure computations with no I/O. Layout:
//!
//! ```text
//! <root>/config.toml
//! <root>/tasks/<id>.json
//! <root>/plans/<id>.json
//! <root>/checkpoints/<yyyy-mm-dd>/<id>.json
//! <root>/index/
//! ```

use crate::model::RecordKind;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Format of checkpoint partition directory names.
pub const PARTITION_FORMAT: &str = "%Y-%m-%d";

/// Trait providing path computation for everything under the data root.
pub trait StoragePaths {
    /// The data root directory
    fn data_root(&self) -> &Path;

    /// Directory holding records of one kind
    fn kind_dir(&self, kind: RecordKind) -> PathBuf {
        self.data_root().join(kind.dir_name())
    }

    /// JSON file of a non-partitioned record
    fn record_file(&self, kind: RecordKind, id: &str) -> PathBuf {
        self.kind_dir(kind).join(format!("{}.json", id))
    }

    /// Date partition directory for checkpoints
    fn partition_dir(&self, date: NaiveDate) -> PathBuf {
        self.kind_dir(RecordKind::Checkpoint)
            .join(date.format(PARTITION_FORMAT).to_string())
    }

    /// JSON file of a checkpoint inside its partition
    fn checkpoint_file(&self, date: NaiveDate, id: &str) -> PathBuf {
        self.partition_dir(date).join(format!("{}.json", id))
    }

    /// Search index directory
    fn index_dir(&self) -> PathBuf {
        self.data_root().join("index")
    }

    /// Optional configuration file
    fn config_file(&self) -> PathBuf {
        self.data_root().join("config.toml")
    }
}

impl StoragePaths for PathBuf {
    fn data_root(&self) -> &Path {
        self
    }
}

/// Parse a partition directory name back into its date.
pub fn parse_partition(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, PARTITION_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let root = PathBuf::from("/data");
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();

        assert_eq!(root.record_file(RecordKind::Task, "t1"), PathBuf::from("/data/tasks/t1.json"));
        assert_eq!(
            root.checkpoint_file(date, "c1"),
            PathBuf::from("/data/checkpoints/2024-01-05/c1.json")
        );
        assert_eq!(root.index_dir(), PathBuf::from("/data/index"));
    }

    #[test]
    fn test_parse_partition() {
        assert_eq!(parse_partition("2024-01-05"), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(parse_partition("2024-13-05"), None);
        assert_eq!(parse_partition("notes"), None);
    }
}
