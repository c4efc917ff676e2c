//! Fixed search schema shared by the writer and the query engine.
//!
//! Free text goes into tokenized `TEXT` fields; identifiers, enums and paths
//! are indexed verbatim (`STRING`) so they can be used as exact filters.
//! `created_at` is epoch seconds, fast-indexed for range filters and recency
//! sorts. `indexed_seq` is stamped at write time and orders documents whose
//! relevance scores tie. Changing a field here requires a rebuild (`Memory::reindex`) of any
//! index created with the old schema.

use tantivy::schema::{FAST, Field, INDEXED, STORED, STRING, Schema, TEXT};

pub const DOC_ID: &str = "doc_id";
pub const DOC_TYPE: &str = "doc_type";
pub const TITLE: &str = "title";
pub const CONTENT: &str = "content";
pub const DESCRIPTION: &str = "description";
pub const STATUS: &str = "status";
pub const PRIORITY: &str = "priority";
pub const TAGS: &str = "tags";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const PROJECT_ID: &str = "project_id";
pub const PROJECT_PATH: &str = "project_path";
pub const CHECKPOINT_ID: &str = "checkpoint_id";
pub const PLAN_ID: &str = "plan_id";
pub const ACTIVE_FILES: &str = "active_files";
pub const GIT_BRANCH: &str = "git_branch";
pub const SEARCH_TEXT: &str = "search_text";
pub const INDEXED_SEQ: &str = "indexed_seq";

/// Build the schema used for every new index.
pub fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field(DOC_ID, STRING | STORED);
    builder.add_text_field(DOC_TYPE, STRING | STORED);
    builder.add_text_field(TITLE, TEXT | STORED);
    builder.add_text_field(CONTENT, TEXT | STORED);
    builder.add_text_field(DESCRIPTION, TEXT | STORED);
    builder.add_text_field(STATUS, STRING | STORED);
    builder.add_text_field(PRIORITY, STRING | STORED);
    builder.add_text_field(TAGS, STRING | STORED);
    builder.add_i64_field(CREATED_AT, INDEXED | STORED | FAST);
    builder.add_i64_field(UPDATED_AT, STORED);
    builder.add_text_field(PROJECT_ID, STRING | STORED);
    builder.add_text_field(PROJECT_PATH, STRING | STORED);
    builder.add_text_field(CHECKPOINT_ID, STRING | STORED);
    builder.add_text_field(PLAN_ID, STRING | STORED);
    builder.add_text_field(ACTIVE_FILES, STRING | STORED);
    builder.add_text_field(GIT_BRANCH, STRING | STORED);
    builder.add_text_field(SEARCH_TEXT, TEXT | STORED);
    builder.add_i64_field(INDEXED_SEQ, STORED | FAST);
    builder.build()
}

/// Field handles resolved against an opened index's schema.
#[derive(Debug, Clone, Copy)]
pub struct IndexFields {
    pub doc_id: Field,
    pub doc_type: Field,
    pub title: Field,
    pub content: Field,
    pub description: Field,
    pub status: Field,
    pub priority: Field,
    pub tags: Field,
    pub created_at: Field,
    pub updated_at: Field,
    pub project_id: Field,
    pub project_path: Field,
    pub checkpoint_id: Field,
    pub plan_id: Field,
    pub active_files: Field,
    pub git_branch: Field,
    pub search_text: Field,
    pub indexed_seq: Field,
}

impl IndexFields {
    /// Fails if the schema lacks any expected field (e.g. an index written by
    /// an incompatible version).
    pub fn from_schema(schema: &Schema) -> tantivy::Result<Self> {
        Ok(Self {
            doc_id: schema.get_field(DOC_ID)?,
            doc_type: schema.get_field(DOC_TYPE)?,
            title: schema.get_field(TITLE)?,
            content: schema.get_field(CONTENT)?,
            description: schema.get_field(DESCRIPTION)?,
            status: schema.get_field(STATUS)?,
            priority: schema.get_field(PRIORITY)?,
            tags: schema.get_field(TAGS)?,
            created_at: schema.get_field(CREATED_AT)?,
            updated_at: schema.get_field(UPDATED_AT)?,
            project_id: schema.get_field(PROJECT_ID)?,
            project_path: schema.get_field(PROJECT_PATH)?,
            checkpoint_id: schema.get_field(CHECKPOINT_ID)?,
            plan_id: schema.get_field(PLAN_ID)?,
            active_files: schema.get_field(ACTIVE_FILES)?,
            git_branch: schema.get_field(GIT_BRANCH)?,
            search_text: schema.get_field(SEARCH_TEXT)?,
            indexed_seq: schema.get_field(INDEXED_SEQ)?,
        })
    }

    /// Fields the free-text query parser searches.
    pub fn text_fields(&self) -> [Field; 4] {
        [self.title, self.content, self.description, self.search_text]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_resolves_all_fields() {
        let schema = build_schema();
        let fields = IndexFields::from_schema(&schema).unwrap();
        assert_eq!(schema.fields().count(), 18);
        assert_eq!(schema.get_field_name(fields.search_text), SEARCH_TEXT);
        assert!(schema.get_field_entry(fields.created_at).is_fast());
        assert!(schema.get_field_entry(fields.indexed_seq).is_fast());
    }

    #[test]
    fn test_missing_field_is_error() {
        let mut builder = Schema::builder();
        builder.add_text_field(DOC_ID, STRING | STORED);
        assert!(IndexFields::from_schema(&builder.build()).is_err());
    }
}
