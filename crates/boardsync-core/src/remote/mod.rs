//! Remote Sync Client boundary.
//!
//! The engine calls these request/response functions but does not own the
//! authority behind them. Every call is best-effort: a failure is logged by
//! the caller and the local optimistic state stands.

mod memory;

pub use memory::{FaultInjector, MemoryRemote, RemoteCall};

use std::fmt;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::model::{
    ChatMessage, Column, Identity, Project, ProjectDraft, ProjectPatch, Task, TaskDraft,
    TaskMove, TaskPatch,
};

/// Names of remote operations, for logging and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    ListProjects,
    CreateProject,
    UpdateProject,
    DeleteProject,
    AddMember,
    CreateTask,
    UpdateTask,
    DeleteTask,
    MoveTask,
    ChatHistory,
    SendChatMessage,
}

impl RemoteOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ListProjects => "list_projects",
            Self::CreateProject => "create_project",
            Self::UpdateProject => "update_project",
            Self::DeleteProject => "delete_project",
            Self::AddMember => "add_member",
            Self::CreateTask => "create_task",
            Self::UpdateTask => "update_task",
            Self::DeleteTask => "delete_task",
            Self::MoveTask => "move_task",
            Self::ChatHistory => "chat_history",
            Self::SendChatMessage => "send_chat_message",
        }
    }
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The remote authority's request/response surface.
///
/// Futures are not `Send`: the engine runs on one cooperative thread per
/// tab and drives these calls from a `tokio::task::LocalSet`.
#[async_trait(?Send)]
pub trait RemoteClient {
    /// Projects the actor can access.
    async fn list_projects(&self, actor: &Identity) -> Result<Vec<Project>, RemoteError>;

    /// Create a project; the server assigns the id and canonical owner.
    async fn create_project(
        &self,
        actor: &Identity,
        draft: &ProjectDraft,
    ) -> Result<Project, RemoteError>;

    async fn update_project(
        &self,
        project_id: &str,
        patch: &ProjectPatch,
    ) -> Result<Project, RemoteError>;

    async fn delete_project(&self, project_id: &str) -> Result<(), RemoteError>;

    async fn add_member(&self, project_id: &str, identity: &Identity) -> Result<(), RemoteError>;

    async fn create_task(
        &self,
        project_id: &str,
        column: Column,
        draft: &TaskDraft,
    ) -> Result<Task, RemoteError>;

    async fn update_task(
        &self,
        project_id: &str,
        task_id: &str,
        patch: &TaskPatch,
    ) -> Result<Task, RemoteError>;

    async fn delete_task(&self, project_id: &str, task_id: &str) -> Result<(), RemoteError>;

    /// Move a task; may return the full updated project.
    async fn move_task(
        &self,
        project_id: &str,
        request: &TaskMove,
    ) -> Result<Option<Project>, RemoteError>;

    async fn chat_history(&self, thread_id: &str) -> Result<Vec<ChatMessage>, RemoteError>;

    /// Persist a message. The client-generated id is kept so history and
    /// broadcast copies dedupe against each other.
    async fn send_chat_message(&self, message: &ChatMessage) -> Result<ChatMessage, RemoteError>;
}
