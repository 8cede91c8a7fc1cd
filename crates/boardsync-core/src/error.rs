use std::fmt;

use crate::model::Identity;

/// Machine-readable error codes for callers that surface rejections to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotSignedIn,
    ProjectNotFound,
    TaskNotFound,
    AccessDenied,
    DeadlineExceedsProject,
    DeadlineBeforeTasks,
    InvalidInput,
    UnknownThread,
    SnapshotFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotSignedIn => "E1001",
            Self::ProjectNotFound => "E2001",
            Self::TaskNotFound => "E2002",
            Self::AccessDenied => "E2003",
            Self::DeadlineExceedsProject => "E2004",
            Self::DeadlineBeforeTasks => "E2005",
            Self::InvalidInput => "E2006",
            Self::UnknownThread => "E2007",
            Self::SnapshotFailed => "E5001",
        }
    }

    /// Short human-facing summary for logs and UI messages.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotSignedIn => "No acting identity",
            Self::ProjectNotFound => "Project not found",
            Self::TaskNotFound => "Task not found",
            Self::AccessDenied => "Not a member of this project",
            Self::DeadlineExceedsProject => "Task deadline is after the project deadline",
            Self::DeadlineBeforeTasks => "Project deadline is before an existing task deadline",
            Self::InvalidInput => "Invalid input",
            Self::UnknownThread => "Chat thread not available",
            Self::SnapshotFailed => "Snapshot read/write failed",
        }
    }

    /// Optional remediation hint.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotSignedIn => Some("Sign in before mutating the board."),
            Self::ProjectNotFound | Self::TaskNotFound | Self::InvalidInput => None,
            Self::AccessDenied => Some("Ask the project creator to add you as a collaborator."),
            Self::DeadlineExceedsProject => {
                Some("Pick a task deadline on or before the project deadline.")
            }
            Self::DeadlineBeforeTasks => {
                Some("Move task deadlines earlier first, or pick a later project deadline.")
            }
            Self::UnknownThread => Some("Activate the thread before sending."),
            Self::SnapshotFailed => Some("Check disk space and write permissions."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Synchronous rejection of a board action.
///
/// Returned before any optimistic mutation; a rejected action leaves the
/// store untouched and dispatches nothing to the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("no acting identity is signed in")]
    NoActor,

    #[error("not found: {id}")]
    NotFound { id: String, code: ErrorCode },

    #[error("{actor} is not a member of project {project}")]
    Forbidden { actor: Identity, project: String },

    #[error("task deadline {task} is after project deadline {project}")]
    DeadlineExceedsProject {
        task: chrono::NaiveDate,
        project: chrono::NaiveDate,
    },

    #[error("project deadline {project} is before task deadline {task}")]
    DeadlineBeforeTasks {
        project: chrono::NaiveDate,
        task: chrono::NaiveDate,
    },

    #[error("invalid input: {reason}")]
    Invalid { reason: String },

    #[error("chat thread {thread} is not active")]
    UnknownThread { thread: String },
}

impl ActionError {
    pub(crate) fn project_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            id: id.into(),
            code: ErrorCode::ProjectNotFound,
        }
    }

    pub(crate) fn task_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            id: id.into(),
            code: ErrorCode::TaskNotFound,
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    /// Stable error code for this rejection.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NoActor => ErrorCode::NotSignedIn,
            Self::NotFound { code, .. } => *code,
            Self::Forbidden { .. } => ErrorCode::AccessDenied,
            Self::DeadlineExceedsProject { .. } => ErrorCode::DeadlineExceedsProject,
            Self::DeadlineBeforeTasks { .. } => ErrorCode::DeadlineBeforeTasks,
            Self::Invalid { .. } => ErrorCode::InvalidInput,
            Self::UnknownThread { .. } => ErrorCode::UnknownThread,
        }
    }
}

/// Failure of a best-effort call to the remote authority.
///
/// These are logged by the engine and never returned to action callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote authority unreachable")]
    Offline,

    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("remote has no record of {id}")]
    NotFound { id: String },

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Failure reading or writing the on-disk store snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to access snapshot {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot {path} is not valid JSON: {source}")]
    Json {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SnapshotError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::SnapshotFailed
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionError, ErrorCode, SnapshotError};
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::NotSignedIn,
            ErrorCode::ProjectNotFound,
            ErrorCode::TaskNotFound,
            ErrorCode::AccessDenied,
            ErrorCode::DeadlineExceedsProject,
            ErrorCode::DeadlineBeforeTasks,
            ErrorCode::InvalidInput,
            ErrorCode::UnknownThread,
            ErrorCode::SnapshotFailed,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::DeadlineExceedsProject.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn action_errors_map_to_codes() {
        assert_eq!(ActionError::NoActor.code(), ErrorCode::NotSignedIn);
        assert_eq!(
            ActionError::task_not_found("t1").code(),
            ErrorCode::TaskNotFound
        );
        assert_eq!(
            ActionError::project_not_found("p1").code(),
            ErrorCode::ProjectNotFound
        );
        assert_eq!(ActionError::invalid("empty").code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn snapshot_errors_carry_their_code() {
        let err = SnapshotError::Io {
            path: "board.json".into(),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(err.code(), ErrorCode::SnapshotFailed);
        assert!(err.to_string().contains("board.json"));
    }
}
