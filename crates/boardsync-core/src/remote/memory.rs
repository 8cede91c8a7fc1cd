//! In-memory remote authority.
//!
//! Implements the server side of [`RemoteClient`] with real semantics (id
//! assignment, canonical owner, membership, chat history) and exposes
//! controls for failure and latency: an offline switch, a hold/release gate
//! that keeps calls in flight until released, and an optional
//! [`FaultInjector`].

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;
use tracing::trace;

use super::{RemoteClient, RemoteOp};
use crate::access::can_access;
use crate::error::RemoteError;
use crate::model::{
    ChatMessage, Column, Identity, Project, ProjectDraft, ProjectPatch, Task, TaskDraft,
    TaskMove, TaskPatch,
};

/// Decides whether a given call should fail.
pub trait FaultInjector {
    fn should_fail(&self, op: RemoteOp) -> bool;
}

/// One request seen by the remote, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub op: RemoteOp,
    pub target: String,
}

#[derive(Debug, Default)]
struct ServerState {
    next_project: u64,
    next_task: u64,
    projects: BTreeMap<String, Project>,
    chat: BTreeMap<String, Vec<ChatMessage>>,
}

impl ServerState {
    fn project_mut(&mut self, id: &str) -> Result<&mut Project, RemoteError> {
        self.projects
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound { id: id.to_string() })
    }
}

/// Server-side copy of the task deadline rule; 422 like a validation
/// failure over HTTP.
fn check_task_deadline(
    limit: Option<NaiveDate>,
    deadline: Option<NaiveDate>,
) -> Result<(), RemoteError> {
    match (deadline, limit) {
        (Some(task), Some(limit)) if task > limit => Err(RemoteError::Rejected {
            status: 422,
            message: format!("task deadline {task} is after project deadline {limit}"),
        }),
        _ => Ok(()),
    }
}

pub struct MemoryRemote {
    state: RefCell<ServerState>,
    calls: RefCell<Vec<RemoteCall>>,
    offline: Cell<bool>,
    held: Cell<bool>,
    gate: Notify,
    move_snapshots: Cell<bool>,
    faults: Option<Box<dyn FaultInjector>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RefCell::new(ServerState::default()),
            calls: RefCell::new(Vec::new()),
            offline: Cell::new(false),
            held: Cell::new(false),
            gate: Notify::new(),
            move_snapshots: Cell::new(true),
            faults: None,
        }
    }

    #[must_use]
    pub fn with_faults(faults: Box<dyn FaultInjector>) -> Self {
        Self {
            faults: Some(faults),
            ..Self::new()
        }
    }

    /// Fail every subsequent call with [`RemoteError::Offline`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    /// Keep every call in flight until [`release`](Self::release).
    pub fn hold(&self) {
        self.held.set(true);
    }

    pub fn release(&self) {
        self.held.set(false);
        self.gate.notify_waiters();
    }

    /// Whether `move_task` answers with a full project snapshot.
    pub fn set_move_snapshots(&self, enabled: bool) {
        self.move_snapshots.set(enabled);
    }

    /// Seed a server-side project, e.g. one created from another device.
    pub fn seed_project(&self, project: Project) {
        let project = project.with_creator_membership();
        self.state
            .borrow_mut()
            .projects
            .insert(project.id.clone(), project);
    }

    #[must_use]
    pub fn project(&self, id: &str) -> Option<Project> {
        self.state.borrow().projects.get(id).cloned()
    }

    #[must_use]
    pub fn project_count(&self) -> usize {
        self.state.borrow().projects.len()
    }

    #[must_use]
    pub fn chat_log(&self, thread_id: &str) -> Vec<ChatMessage> {
        self.state
            .borrow()
            .chat
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.borrow().clone()
    }

    #[must_use]
    pub fn call_count(&self, op: RemoteOp) -> usize {
        self.calls.borrow().iter().filter(|call| call.op == op).count()
    }

    async fn enter(&self, op: RemoteOp, target: &str) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push(RemoteCall {
            op,
            target: target.to_string(),
        });
        while self.held.get() {
            self.gate.notified().await;
        }
        if self.offline.get() {
            trace!(%op, target, "remote offline");
            return Err(RemoteError::Offline);
        }
        if self.faults.as_ref().is_some_and(|f| f.should_fail(op)) {
            trace!(%op, target, "injected remote fault");
            return Err(RemoteError::Transport(format!("injected fault on {op}")));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl RemoteClient for MemoryRemote {
    async fn list_projects(&self, actor: &Identity) -> Result<Vec<Project>, RemoteError> {
        self.enter(RemoteOp::ListProjects, actor.as_str()).await?;
        Ok(self
            .state
            .borrow()
            .projects
            .values()
            .filter(|project| can_access(actor, project))
            .cloned()
            .collect())
    }

    async fn create_project(
        &self,
        actor: &Identity,
        draft: &ProjectDraft,
    ) -> Result<Project, RemoteError> {
        self.enter(RemoteOp::CreateProject, &draft.name).await?;
        let mut state = self.state.borrow_mut();
        state.next_project += 1;
        let project = Project::from_draft(format!("p{}", state.next_project), draft, actor.clone());
        state.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn update_project(
        &self,
        project_id: &str,
        patch: &ProjectPatch,
    ) -> Result<Project, RemoteError> {
        self.enter(RemoteOp::UpdateProject, project_id).await?;
        let mut state = self.state.borrow_mut();
        let project = state.project_mut(project_id)?;
        patch.apply(project);
        Ok(project.clone())
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), RemoteError> {
        self.enter(RemoteOp::DeleteProject, project_id).await?;
        let mut state = self.state.borrow_mut();
        if state.projects.remove(project_id).is_none() {
            return Err(RemoteError::NotFound {
                id: project_id.to_string(),
            });
        }
        // Tasks go with the project record; chat threads are cascaded here.
        let suffix = format!(":{project_id}");
        state
            .chat
            .retain(|thread, _| thread != project_id && !thread.ends_with(&suffix));
        Ok(())
    }

    async fn add_member(&self, project_id: &str, identity: &Identity) -> Result<(), RemoteError> {
        self.enter(RemoteOp::AddMember, project_id).await?;
        let mut state = self.state.borrow_mut();
        state.project_mut(project_id)?.members.insert(identity.clone());
        Ok(())
    }

    async fn create_task(
        &self,
        project_id: &str,
        column: Column,
        draft: &TaskDraft,
    ) -> Result<Task, RemoteError> {
        self.enter(RemoteOp::CreateTask, project_id).await?;
        let mut state = self.state.borrow_mut();
        check_task_deadline(state.project_mut(project_id)?.deadline, draft.deadline)?;
        state.next_task += 1;
        let task = Task::from_draft(format!("t{}", state.next_task), draft);
        state
            .project_mut(project_id)?
            .tasks
            .get_mut(column)
            .push(task.clone());
        Ok(task)
    }

    async fn update_task(
        &self,
        project_id: &str,
        task_id: &str,
        patch: &TaskPatch,
    ) -> Result<Task, RemoteError> {
        self.enter(RemoteOp::UpdateTask, task_id).await?;
        let mut state = self.state.borrow_mut();
        let project = state.project_mut(project_id)?;
        let limit = project.deadline;
        let task = project
            .tasks
            .task_mut(task_id)
            .ok_or_else(|| RemoteError::NotFound {
                id: task_id.to_string(),
            })?;
        let mut updated = task.clone();
        patch.apply(&mut updated);
        check_task_deadline(limit, updated.deadline)?;
        *task = updated;
        Ok(task.clone())
    }

    async fn delete_task(&self, project_id: &str, task_id: &str) -> Result<(), RemoteError> {
        self.enter(RemoteOp::DeleteTask, task_id).await?;
        let mut state = self.state.borrow_mut();
        state
            .project_mut(project_id)?
            .tasks
            .remove(task_id)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound {
                id: task_id.to_string(),
            })
    }

    async fn move_task(
        &self,
        project_id: &str,
        request: &TaskMove,
    ) -> Result<Option<Project>, RemoteError> {
        self.enter(RemoteOp::MoveTask, &request.task_id).await?;
        let snapshots = self.move_snapshots.get();
        let mut state = self.state.borrow_mut();
        let project = state.project_mut(project_id)?;
        let (_, task) =
            project
                .tasks
                .remove(&request.task_id)
                .ok_or_else(|| RemoteError::NotFound {
                    id: request.task_id.clone(),
                })?;
        project.tasks.get_mut(request.to).push(task);
        Ok(snapshots.then(|| project.clone()))
    }

    async fn chat_history(&self, thread_id: &str) -> Result<Vec<ChatMessage>, RemoteError> {
        self.enter(RemoteOp::ChatHistory, thread_id).await?;
        Ok(self.chat_log(thread_id))
    }

    async fn send_chat_message(&self, message: &ChatMessage) -> Result<ChatMessage, RemoteError> {
        self.enter(RemoteOp::SendChatMessage, &message.thread_id)
            .await?;
        let mut state = self.state.borrow_mut();
        let log = state.chat.entry(message.thread_id.clone()).or_default();
        if !log.iter().any(|existing| existing.id == message.id) {
            log.push(message.clone());
        }
        Ok(message.clone())
    }
}
