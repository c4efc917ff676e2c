//! Checkpoints: snapshots of work in progress, with embedded highlights.

use super::{RecordKind, RecordMeta};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A snapshot of what the agent was doing, partitioned on disk by creation date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub description: String,
    #[serde(default)]
    pub work_context: WorkContext,
    #[serde(default)]
    pub highlights: Vec<Highlight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

super::impl_record!(Checkpoint, RecordKind::Checkpoint);

impl Checkpoint {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            description: description.into(),
            work_context: WorkContext::default(),
            highlights: Vec::new(),
            notes: None,
        }
    }

    pub fn with_context(mut self, work_context: WorkContext) -> Self {
        self.work_context = work_context;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn add_highlight(&mut self, highlight: Highlight) {
        self.highlights.push(highlight);
        self.meta.touch();
    }

    pub fn project_id(&self) -> Option<&str> {
        self.work_context.project_id.as_deref()
    }
}

/// Where the work was happening. Filled in by the caller (git and tool layers).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    #[serde(default)]
    pub active_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// A notable moment inside a checkpoint. Files are referenced by path only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub content: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub importance: Importance,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub related_files: Vec<String>,
}

fn default_category() -> String {
    "general".to_string()
}

impl Highlight {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            category: default_category(),
            importance: Importance::default(),
            timestamp: Utc::now(),
            tags: BTreeSet::new(),
            related_files: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_files.extend(files.into_iter().map(Into::into));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;

    #[test]
    fn test_json_uses_explicit_utc_offset() {
        let cp = Checkpoint::new("Fixed login bug");
        let json = String::from_utf8(cp.encode().unwrap()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let created = value["created_at"].as_str().unwrap();
        assert!(
            created.ends_with('Z') || created.ends_with("+00:00"),
            "timestamp without offset: {}",
            created
        );
        // Flattened metadata sits at the top level
        assert_eq!(value["id"], cp.id());
        assert_eq!(value["description"], "Fixed login bug");
    }

    #[test]
    fn test_naive_timestamp_is_rejected() {
        let json = r#"{"id":"x","created_at":"2024-01-05T10:00:00","description":"d"}"#;
        assert!(Checkpoint::decode(json.as_bytes()).is_err());
    }

    #[test]
    fn test_offset_timestamp_is_normalized_to_utc() {
        let json = r#"{"id":"x","created_at":"2024-01-05T12:00:00+02:00","description":"d"}"#;
        let cp = Checkpoint::decode(json.as_bytes()).unwrap();
        assert_eq!(cp.created_at().to_rfc3339(), "2024-01-05T10:00:00+00:00");
        assert!(cp.highlights.is_empty());
        assert_eq!(cp.work_context, WorkContext::default());
    }

    #[test]
    fn test_round_trip_with_highlights() {
        let mut cp = Checkpoint::new("Refactor auth")
            .with_notes("halfway through")
            .with_context(WorkContext {
                project_id: Some("proj-a".into()),
                git_branch: Some("main".into()),
                active_files: vec!["src/auth.rs".into()],
                ..Default::default()
            })
            .with_tags(["auth", "refactor"]);
        cp.add_highlight(
            Highlight::new("Found token refresh race")
                .with_category("discovery")
                .with_importance(Importance::High)
                .with_files(["src/token.rs"]),
        );

        let decoded = Checkpoint::decode(&cp.encode().unwrap()).unwrap();
        assert_eq!(decoded, cp);
        assert_eq!(decoded.project_id(), Some("proj-a"));
    }
}
