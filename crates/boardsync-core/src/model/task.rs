use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};

use super::ParseEnumError;

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl Priority {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}

/// A unit of work living in exactly one column of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Task {
    /// Build a task from a draft under the given id.
    #[must_use]
    pub fn from_draft(id: impl Into<String>, draft: &TaskDraft) -> Self {
        Self {
            id: id.into(),
            title: draft.title.trim().to_string(),
            description: draft.description.clone(),
            priority: draft.priority,
            deadline: draft.deadline,
            labels: normalize_labels(&draft.labels),
        }
    }

    /// The creation payload equivalent to this task's current fields.
    #[must_use]
    pub fn to_draft(&self) -> TaskDraft {
        TaskDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            deadline: self.deadline,
            labels: self.labels.clone(),
        }
    }
}

/// Fields supplied when creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub deadline: Option<NaiveDate>,
    pub labels: Vec<String>,
}

impl TaskDraft {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update of a task. `None` leaves a field untouched; for
/// `deadline`, `Some(None)` clears it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "super::double_option"
    )]
    pub deadline: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl TaskPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.deadline.is_none()
            && self.labels.is_none()
    }

    /// Normalize free-text fields the same way creation does.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if let Some(title) = self.title.as_mut() {
            *title = title.trim().to_string();
        }
        if let Some(labels) = self.labels.as_mut() {
            *labels = normalize_labels(labels);
        }
        self
    }

    /// Apply every present field to `task`.
    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(deadline) = self.deadline {
            task.deadline = deadline;
        }
        if let Some(labels) = &self.labels {
            task.labels.clone_from(labels);
        }
    }

    /// Adopt the server's value for each patched field that the local copy
    /// still holds as sent. Fields edited again locally since dispatch keep
    /// their newer local value.
    pub fn adopt_confirmed(&self, local: &mut Task, server: &Task) {
        if self.title.as_ref() == Some(&local.title) {
            local.title.clone_from(&server.title);
        }
        if self.description.as_ref() == Some(&local.description) {
            local.description.clone_from(&server.description);
        }
        if self.priority == Some(local.priority) {
            local.priority = server.priority;
        }
        if self.deadline == Some(local.deadline) {
            local.deadline = server.deadline;
        }
        if self.labels.as_ref() == Some(&local.labels) {
            local.labels.clone_from(&server.labels);
        }
    }

    /// Patch that turns `from` into `to`, or `None` when they already agree.
    #[must_use]
    pub fn diff(from: &Task, to: &Task) -> Option<Self> {
        let patch = Self {
            title: (from.title != to.title).then(|| to.title.clone()),
            description: (from.description != to.description).then(|| to.description.clone()),
            priority: (from.priority != to.priority).then_some(to.priority),
            deadline: (from.deadline != to.deadline).then_some(to.deadline),
            labels: (from.labels != to.labels).then(|| to.labels.clone()),
        };
        (!patch.is_empty()).then_some(patch)
    }
}

/// Trim, drop blanks, and de-duplicate labels while keeping first-seen order.
fn normalize_labels(labels: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        let trimmed = label.trim();
        if !trimmed.is_empty() && !out.iter().any(|l| l == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    out
}

pub(crate) fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Deserialize::deserialize(de).map(Some)
}
