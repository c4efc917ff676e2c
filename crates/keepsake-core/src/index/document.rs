//! Denormalized, write-only projection of a record for the search index.

use super::schema::IndexFields;
use crate::model::{Checkpoint, Plan, Record, RecordKind, Task};
use chrono::{DateTime, Utc};
use tantivy::TantivyDocument;

/// What gets written to the index for one record. Never read back as a record:
/// the JSON store stays the source of truth.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub doc_id: String,
    pub doc_type: RecordKind,
    pub title: String,
    pub content: String,
    pub description: String,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub project_id: Option<String>,
    pub project_path: Option<String>,
    pub checkpoint_id: Option<String>,
    pub plan_id: Option<String>,
    pub active_files: Vec<String>,
    pub git_branch: Option<String>,
    /// Catch-all text: description, notes, tags, file paths, highlight and
    /// step text.
    pub search_text: String,
}

impl IndexDocument {
    fn base<R: Record>(record: &R, title: String) -> Self {
        Self {
            doc_id: record.id().to_string(),
            doc_type: R::KIND,
            title,
            content: String::new(),
            description: String::new(),
            status: None,
            priority: None,
            tags: record.tags().iter().cloned().collect(),
            created_at: record.created_at(),
            updated_at: record.meta().updated_at,
            project_id: None,
            project_path: None,
            checkpoint_id: None,
            plan_id: None,
            active_files: Vec::new(),
            git_branch: None,
            search_text: String::new(),
        }
    }

    pub(crate) fn to_tantivy(&self, f: &IndexFields) -> TantivyDocument {
        let mut doc = TantivyDocument::default();
        doc.add_text(f.doc_id, &self.doc_id);
        doc.add_text(f.doc_type, self.doc_type.as_ref());
        doc.add_text(f.title, &self.title);
        doc.add_text(f.content, &self.content);
        doc.add_text(f.description, &self.description);
        doc.add_text(f.search_text, &self.search_text);
        doc.add_i64(f.created_at, self.created_at.timestamp());
        if let Some(updated) = self.updated_at {
            doc.add_i64(f.updated_at, updated.timestamp());
        }

        let optional = [
            (f.status, &self.status),
            (f.priority, &self.priority),
            (f.project_id, &self.project_id),
            (f.project_path, &self.project_path),
            (f.checkpoint_id, &self.checkpoint_id),
            (f.plan_id, &self.plan_id),
            (f.git_branch, &self.git_branch),
        ];
        for (field, value) in optional {
            if let Some(value) = value {
                doc.add_text(field, value);
            }
        }
        for tag in &self.tags {
            doc.add_text(f.tags, tag);
        }
        for path in &self.active_files {
            doc.add_text(f.active_files, path);
        }
        doc
    }
}

/// Join non-empty parts with newlines.
fn join_text<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").trim().to_string()
}

impl From<&Checkpoint> for IndexDocument {
    fn from(cp: &Checkpoint) -> Self {
        let ctx = &cp.work_context;
        let mut doc = Self::base(cp, first_line(&cp.description));

        doc.description = cp.description.clone();
        doc.content = join_text(cp.highlights.iter().map(|h| h.content.as_str()));
        doc.project_id = ctx.project_id.clone();
        doc.project_path = ctx.project_path.clone();
        doc.git_branch = ctx.git_branch.clone();
        doc.active_files = ctx.active_files.clone();

        let mut parts: Vec<&str> = vec![cp.description.as_str()];
        parts.extend(cp.notes.as_deref());
        parts.extend(cp.tags().iter().map(String::as_str));
        parts.extend(ctx.active_files.iter().map(String::as_str));
        for h in &cp.highlights {
            parts.push(h.content.as_str());
            parts.push(h.category.as_str());
            parts.extend(h.tags.iter().map(String::as_str));
            parts.extend(h.related_files.iter().map(String::as_str));
        }
        doc.search_text = join_text(parts);
        doc
    }
}

impl From<&Task> for IndexDocument {
    fn from(task: &Task) -> Self {
        let mut doc = Self::base(task, first_line(&task.content));

        doc.content = task.content.clone();
        doc.description = task.notes.clone().unwrap_or_default();
        doc.status = Some(task.status.as_ref().to_string());
        doc.priority = Some(task.priority.as_ref().to_string());
        doc.project_id = task.project_id.clone();
        doc.checkpoint_id = task.checkpoint_id.clone();
        doc.plan_id = task.plan_id.clone();

        let mut parts: Vec<&str> = vec![task.content.as_str()];
        parts.extend(task.notes.as_deref());
        parts.extend(task.tags().iter().map(String::as_str));
        doc.search_text = join_text(parts);
        doc
    }
}

impl From<&Plan> for IndexDocument {
    fn from(plan: &Plan) -> Self {
        let mut doc = Self::base(plan, plan.title.clone());

        doc.description = plan.description.clone().unwrap_or_default();
        doc.content = join_text(plan.steps.iter().map(|s| s.description.as_str()));
        doc.status = Some(plan.status.as_ref().to_string());
        doc.project_id = plan.project_id.clone();

        let mut parts: Vec<&str> = vec![plan.title.as_str()];
        parts.extend(plan.description.as_deref());
        parts.extend(plan.tags().iter().map(String::as_str));
        parts.extend(plan.steps.iter().map(|s| s.description.as_str()));
        doc.search_text = join_text(parts);
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Highlight, TaskStatus, WorkContext};

    #[test]
    fn test_checkpoint_projection() {
        let mut cp = Checkpoint::new("Implemented OAuth2 login\nwith refresh tokens")
            .with_notes("remember PKCE")
            .with_context(WorkContext {
                project_id: Some("proj-a".into()),
                git_branch: Some("feature/auth".into()),
                active_files: vec!["src/auth.rs".into()],
                ..Default::default()
            })
            .with_tags(["auth"]);
        cp.add_highlight(Highlight::new("token refresh race").with_files(["src/token.rs"]));

        let doc = IndexDocument::from(&cp);
        assert_eq!(doc.doc_type, RecordKind::Checkpoint);
        assert_eq!(doc.title, "Implemented OAuth2 login");
        assert_eq!(doc.project_id.as_deref(), Some("proj-a"));
        assert_eq!(doc.content, "token refresh race");
        for needle in ["PKCE", "auth", "src/auth.rs", "src/token.rs", "token refresh race"] {
            assert!(doc.search_text.contains(needle), "missing {}", needle);
        }
    }

    #[test]
    fn test_task_projection() {
        let mut task = Task::new("Write migration").with_project("proj-b");
        task.plan_id = Some("plan-1".into());
        task.complete();

        let doc = IndexDocument::from(&task);
        assert_eq!(doc.status.as_deref(), Some(TaskStatus::Done.as_ref()));
        assert_eq!(doc.priority.as_deref(), Some("medium"));
        assert_eq!(doc.plan_id.as_deref(), Some("plan-1"));
        assert!(doc.updated_at.is_some());
    }

    #[test]
    fn test_plan_projection_includes_steps() {
        let mut plan = Plan::new("Storage rewrite").with_description("partition by day");
        plan.add_step("benchmark current layout", Vec::<String>::new());

        let doc = IndexDocument::from(&plan);
        assert_eq!(doc.title, "Storage rewrite");
        assert_eq!(doc.status.as_deref(), Some("draft"));
        assert!(doc.search_text.contains("benchmark current layout"));
        assert!(doc.search_text.contains("partition by day"));
    }
}
