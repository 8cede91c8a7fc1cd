use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{fmt, str::FromStr};

use super::{Identity, ParseEnumError, Task};

/// The three fixed workflow columns of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Todo,
    InProgress,
    Done,
}

impl Column {
    pub const ALL: [Self; 3] = [Self::Todo, Self::InProgress, Self::Done];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Column {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" => Ok(Self::Todo),
            "in_progress" | "inprogress" | "doing" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(ParseEnumError {
                expected: "column",
                got: s.to_string(),
            }),
        }
    }
}

/// Tasks of one project grouped by column.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Columns {
    pub todo: Vec<Task>,
    pub in_progress: Vec<Task>,
    pub done: Vec<Task>,
}

impl Columns {
    #[must_use]
    pub fn get(&self, column: Column) -> &[Task] {
        match column {
            Column::Todo => &self.todo,
            Column::InProgress => &self.in_progress,
            Column::Done => &self.done,
        }
    }

    pub fn get_mut(&mut self, column: Column) -> &mut Vec<Task> {
        match column {
            Column::Todo => &mut self.todo,
            Column::InProgress => &mut self.in_progress,
            Column::Done => &mut self.done,
        }
    }

    /// Every task with the column that holds it.
    pub fn iter(&self) -> impl Iterator<Item = (Column, &Task)> {
        Column::ALL
            .into_iter()
            .flat_map(move |column| self.get(column).iter().map(move |task| (column, task)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.todo.len() + self.in_progress.len() + self.done.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column and position of a task, by linear scan over the fixed columns.
    #[must_use]
    pub fn position(&self, task_id: &str) -> Option<(Column, usize)> {
        Column::ALL.into_iter().find_map(|column| {
            self.get(column)
                .iter()
                .position(|task| task.id == task_id)
                .map(|index| (column, index))
        })
    }

    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.position(task_id)
            .map(|(column, index)| &self.get(column)[index])
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        let (column, index) = self.position(task_id)?;
        self.get_mut(column).get_mut(index)
    }

    /// Remove a task wherever it lives.
    pub fn remove(&mut self, task_id: &str) -> Option<(Column, Task)> {
        let (column, index) = self.position(task_id)?;
        Some((column, self.get_mut(column).remove(index)))
    }

    /// Latest task deadline across all columns.
    #[must_use]
    pub fn latest_deadline(&self) -> Option<NaiveDate> {
        self.iter().filter_map(|(_, task)| task.deadline).max()
    }
}

/// A project record with its tasks embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    pub created_by: Identity,
    #[serde(default)]
    pub members: BTreeSet<Identity>,
    #[serde(default)]
    pub tasks: Columns,
}

impl Project {
    /// Build a fresh project; the creator is always a member.
    #[must_use]
    pub fn from_draft(id: impl Into<String>, draft: &ProjectDraft, creator: Identity) -> Self {
        let mut members = BTreeSet::new();
        members.insert(creator.clone());
        Self {
            id: id.into(),
            name: draft.name.trim().to_string(),
            description: draft.description.clone(),
            color: draft.color.clone(),
            deadline: draft.deadline,
            created_by: creator,
            members,
            tasks: Columns::default(),
        }
    }

    /// Restore the creator-is-member invariant on records from elsewhere.
    #[must_use]
    pub fn with_creator_membership(mut self) -> Self {
        if !self.members.contains(&self.created_by) {
            self.members.insert(self.created_by.clone());
        }
        self
    }

    #[must_use]
    pub fn to_draft(&self) -> ProjectDraft {
        ProjectDraft {
            name: self.name.clone(),
            description: self.description.clone(),
            color: self.color.clone(),
            deadline: self.deadline,
        }
    }
}

/// Fields supplied when creating a project.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectDraft {
    pub name: String,
    pub description: String,
    pub color: String,
    pub deadline: Option<NaiveDate>,
}

impl ProjectDraft {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Partial update of a project's scalar fields. For `deadline`,
/// `Some(None)` clears it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "super::double_option"
    )]
    pub deadline: Option<Option<NaiveDate>>,
}

impl ProjectPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.color.is_none()
            && self.deadline.is_none()
    }

    #[must_use]
    pub fn normalized(mut self) -> Self {
        if let Some(name) = self.name.as_mut() {
            *name = name.trim().to_string();
        }
        self
    }

    pub fn apply(&self, project: &mut Project) {
        if let Some(name) = &self.name {
            project.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            project.description.clone_from(description);
        }
        if let Some(color) = &self.color {
            project.color.clone_from(color);
        }
        if let Some(deadline) = self.deadline {
            project.deadline = deadline;
        }
    }

    /// Adopt the server's value for each patched field the local copy still
    /// holds as sent.
    pub fn adopt_confirmed(&self, local: &mut Project, server: &Project) {
        if self.name.as_ref() == Some(&local.name) {
            local.name.clone_from(&server.name);
        }
        if self.description.as_ref() == Some(&local.description) {
            local.description.clone_from(&server.description);
        }
        if self.color.as_ref() == Some(&local.color) {
            local.color.clone_from(&server.color);
        }
        if self.deadline == Some(local.deadline) {
            local.deadline = server.deadline;
        }
    }

    /// Patch that turns the scalar fields of `from` into those of `to`.
    #[must_use]
    pub fn diff(from: &ProjectDraft, to: &Project) -> Option<Self> {
        let patch = Self {
            name: (from.name != to.name).then(|| to.name.clone()),
            description: (from.description != to.description).then(|| to.description.clone()),
            color: (from.color != to.color).then(|| to.color.clone()),
            deadline: (from.deadline != to.deadline).then_some(to.deadline),
        };
        (!patch.is_empty()).then_some(patch)
    }
}

/// A request to move a task between columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMove {
    pub task_id: String,
    pub from: Column,
    pub to: Column,
}

#[cfg(test)]
mod tests {
    use super::{Column, Columns, Project, ProjectDraft, ProjectPatch};
    use crate::model::{Identity, Task, TaskDraft};
    use std::str::FromStr;

    fn ident(raw: &str) -> Identity {
        Identity::parse(raw).expect("valid identity")
    }

    #[test]
    fn creator_is_always_member() {
        let project = Project::from_draft("p1", &ProjectDraft::named("Alpha"), ident("a@x.com"));
        assert!(project.members.contains(&ident("a@x.com")));

        let mut stripped = project;
        stripped.members.clear();
        let fixed = stripped.with_creator_membership();
        assert_eq!(fixed.members.len(), 1);
    }

    #[test]
    fn column_serde_and_parse() {
        assert_eq!(
            serde_json::to_string(&Column::InProgress).expect("serialize"),
            "\"in_progress\""
        );
        assert_eq!(Column::from_str("Doing").expect("alias"), Column::InProgress);
        assert!(Column::from_str("backlog").is_err());
    }

    #[test]
    fn columns_position_and_remove() {
        let mut columns = Columns::default();
        columns.todo.push(Task::from_draft("t1", &TaskDraft::titled("one")));
        columns.done.push(Task::from_draft("t2", &TaskDraft::titled("two")));

        assert_eq!(columns.position("t2"), Some((Column::Done, 0)));
        assert_eq!(columns.len(), 2);
        let (column, task) = columns.remove("t1").expect("present");
        assert_eq!(column, Column::Todo);
        assert_eq!(task.title, "one");
        assert!(columns.position("t1").is_none());
        assert_eq!(columns.len(), 1);
    }

    #[test]
    fn project_patch_diff_and_apply() {
        let mut project =
            Project::from_draft("p1", &ProjectDraft::named("Alpha"), ident("a@x.com"));
        let sent = project.to_draft();
        project.color = "#ff0000".into();
        let patch = ProjectPatch::diff(&sent, &project).expect("color changed");
        assert_eq!(patch.color.as_deref(), Some("#ff0000"));
        assert!(patch.name.is_none());

        let mut other = Project::from_draft("p2", &sent, ident("a@x.com"));
        patch.apply(&mut other);
        assert_eq!(other.color, "#ff0000");
    }
}
