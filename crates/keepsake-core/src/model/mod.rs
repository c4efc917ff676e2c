//! Record types persisted by the stores.
//!
//! Every record variant embeds a [`RecordMeta`] (id, timestamps, expiry, tags)
//! and implements [`Record`], which is all the generic store needs to persist
//! it. Cross-record references (task → checkpoint, plan → tasks) are plain id
//! strings resolved by lookup.

pub mod checkpoint;
pub mod plan;
pub mod task;
pub mod ttl;

pub use checkpoint::{Checkpoint, Highlight, Importance, WorkContext};
pub use plan::{Plan, PlanStatus, PlanStep};
pub use task::{Task, TaskPriority, TaskStatus};
pub use ttl::{default_ttl, parse_ttl};

use crate::error::Result;
use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

/// The record variants known to the store and the index schema.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Checkpoint,
    Task,
    Plan,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Checkpoint, RecordKind::Task, RecordKind::Plan];

    /// Directory under the data root holding records of this kind.
    pub fn dir_name(self) -> &'static str {
        match self {
            RecordKind::Checkpoint => "checkpoints",
            RecordKind::Task => "tasks",
            RecordKind::Plan => "plans",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Fields shared by every record variant. Flattened into the record's JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl RecordMeta {
    /// Fresh metadata with a random id, created now.
    pub fn new() -> Self {
        Self::with_created_at(Utc::now())
    }

    pub fn with_created_at(created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at,
            updated_at: None,
            ttl_expiry: None,
            tags: BTreeSet::new(),
        }
    }

    /// Mark the record as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

impl Default for RecordMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile-time description of a persistable record.
///
/// The store relies only on this trait: `encode`/`decode` for the on-disk
/// JSON, `id` for the file name and `expiry` for sweeps.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync {
    const KIND: RecordKind;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.meta().created_at
    }

    fn expiry(&self) -> Option<DateTime<Utc>> {
        self.meta().ttl_expiry
    }

    fn tags(&self) -> &BTreeSet<String> {
        &self.meta().tags
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Expired strictly after the expiry instant. No expiry means never.
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry().is_some_and(|expiry| now > expiry)
    }

    fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.meta_mut().created_at = created_at;
        self
    }

    /// Set `ttl_expiry` relative to the creation time. A `ttl` that overflows
    /// the date range falls back to [`default_ttl()`].
    fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        let created = self.created_at();
        let expiry = created.checked_add_signed(ttl).or_else(|| {
            log::debug!("ttl {:?} overflows from {}, using default", ttl, created);
            created.checked_add_signed(default_ttl())
        });
        self.meta_mut().ttl_expiry = expiry;
        self
    }

    fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta_mut().tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Implements the accessor half of [`Record`] for a struct with a `meta` field.
macro_rules! impl_record {
    ($ty:ty, $kind:expr) => {
        impl $crate::model::Record for $ty {
            const KIND: $crate::model::RecordKind = $kind;

            fn meta(&self) -> &$crate::model::RecordMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::model::RecordMeta {
                &mut self.meta
            }
        }
    };
}
pub(crate) use impl_record;
