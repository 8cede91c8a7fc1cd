//! Board data model: identities, projects with column-grouped tasks, and
//! chat messages.

mod chat;
mod identity;
mod project;
mod task;

pub use chat::ChatMessage;
pub use identity::{Identity, ParseIdentityError};
pub use project::{Column, Columns, Project, ProjectDraft, ProjectPatch, TaskMove};
pub use task::{Priority, Task, TaskDraft, TaskPatch};

use std::fmt;

pub(crate) use task::double_option;

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}
