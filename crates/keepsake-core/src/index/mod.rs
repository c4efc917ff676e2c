//! Full-text search index over stored records.
//!
//! Uses tantivy with a fixed schema. The index is a derived, eventually
//! consistent copy of the record store: losing it loses nothing that
//! `Memory::reindex` cannot rebuild.

pub mod document;
pub mod manager;
pub mod query;
pub mod retry;
pub mod schema;

pub use document::IndexDocument;
pub use manager::{IndexManager, IndexStats, IndexStatus};
pub use query::{QueryEngine, SearchFilters, SearchResult, WILDCARD};
pub use retry::{Backoff, attempt};
pub use schema::IndexFields;
