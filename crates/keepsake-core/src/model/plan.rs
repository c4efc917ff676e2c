//! Plans: ordered steps with intra-plan dependencies.

use super::{RecordKind, RecordMeta};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{AsRefStr, EnumString};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Draft,
    Active,
    Completed,
    Abandoned,
}

/// One step of a plan. `depends_on` names sibling step ids only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    /// Tasks carried out under this plan, by id.
    #[serde(default)]
    pub task_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

super::impl_record!(Plan, RecordKind::Plan);

impl Plan {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            title: title.into(),
            description: None,
            status: PlanStatus::default(),
            steps: Vec::new(),
            task_ids: Vec::new(),
            project_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Append a step and return its id (`step-<n>`).
    pub fn add_step<I, S>(&mut self, description: impl Into<String>, depends_on: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut n = self.steps.len() + 1;
        let mut id = format!("step-{}", n);
        while self.step(&id).is_some() {
            n += 1;
            id = format!("step-{}", n);
        }
        self.steps.push(PlanStep {
            id: id.clone(),
            description: description.into(),
            completed: false,
            completed_at: None,
            depends_on: depends_on.into_iter().map(Into::into).collect(),
        });
        self.meta.touch();
        id
    }

    pub fn step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Mark a step completed. Returns false for an unknown id.
    ///
    /// Completing the last open step moves the plan to `Completed`.
    pub fn complete_step(&mut self, step_id: &str) -> bool {
        let now = Utc::now();
        let Some(step) = self.steps.iter_mut().find(|s| s.id == step_id) else {
            return false;
        };
        if !step.completed {
            step.completed = true;
            step.completed_at = Some(now);
        }
        self.meta.updated_at = Some(now);

        if self.steps.iter().all(|s| s.completed) {
            self.status = PlanStatus::Completed;
        } else if self.status == PlanStatus::Draft {
            self.status = PlanStatus::Active;
        }
        true
    }

    /// `(completed, total)` step counts.
    pub fn progress(&self) -> (usize, usize) {
        let done = self.steps.iter().filter(|s| s.completed).count();
        (done, self.steps.len())
    }

    /// Open steps whose dependencies are all completed.
    ///
    /// A dependency on an id that is not a step of this plan never counts as
    /// satisfied.
    pub fn ready_steps(&self) -> Vec<&PlanStep> {
        self.steps
            .iter()
            .filter(|s| !s.completed)
            .filter(|s| {
                s.depends_on
                    .iter()
                    .all(|dep| self.step(dep).is_some_and(|d| d.completed))
            })
            .collect()
    }
}
