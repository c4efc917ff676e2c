//! keepsake-core: persistent, searchable memory for an AI agent
//!
//! Stores checkpoints, tasks and plans as JSON files under one data root and
//! keeps a full-text index over them.
//!
//! # Quick Start
//!
//! ```no_run
//! use keepsake_core::{Checkpoint, Memory, Record, SearchFilters};
//!
//! fn main() -> keepsake_core::Result<()> {
//!     let memory = Memory::load(None)?;
//!
//!     let checkpoint = Checkpoint::new("Implemented OAuth2 login").with_tags(["auth"]);
//!     memory.save_checkpoint(&checkpoint);
//!
//!     let filters = SearchFilters::default().within_days(7);
//!     for hit in memory.query().search_cross_project("oauth2", 10, &filters, true) {
//!         println!("{} {:?}", hit.doc_id, hit.highlights);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Every operation is blocking file I/O. Async callers should run them on a
//! blocking worker.
//!
//! For lower-level access, use the stores and the index modules directly.

pub mod config;
pub mod error;
pub mod index;
mod memory;
pub mod model;
pub mod partition;
pub mod paths;
pub mod safe_io;
pub mod store;
pub mod sweeper;

pub use config::{IndexSettings, KeepsakeConfig, resolve_home};
pub use error::{Result, StoreError};
pub use index::{IndexManager, IndexStats, IndexStatus, QueryEngine, SearchFilters, SearchResult};
pub use memory::{Memory, ReindexReport};
pub use model::{
    Checkpoint, Highlight, Importance, Plan, PlanStatus, PlanStep, Record, RecordKind, RecordMeta,
    Task, TaskPriority, TaskStatus, WorkContext, parse_ttl,
};
pub use partition::CheckpointStore;
pub use store::{RecordStorage, RecordStore};
pub use sweeper::SweepReport;
