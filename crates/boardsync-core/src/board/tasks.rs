//! Task mutations inside a project's columns.

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::{Board, Dispatched, reconcile, spawn};
use crate::error::ActionError;
use crate::ids::is_provisional;
use crate::model::{Column, Project, Task, TaskDraft, TaskMove, TaskPatch};
use crate::remote::RemoteOp;

/// Reject a task deadline later than the project's.
fn check_deadline(project: &Project, task: Option<NaiveDate>) -> Result<(), ActionError> {
    match (task, project.deadline) {
        (Some(task), Some(limit)) if task > limit => Err(ActionError::DeadlineExceedsProject {
            task,
            project: limit,
        }),
        _ => Ok(()),
    }
}

impl Board {
    /// Follow a provisional task id to its confirmed id, if it has one.
    fn resolve_task(&self, task_id: &str) -> String {
        self.ctx.store.borrow().resolve_id(task_id)
    }

    /// Append a new task to `column` under a provisional id.
    ///
    /// When the project itself is still provisional, the create is sent once
    /// the project's own creation is confirmed.
    pub fn create_task(
        &self,
        project_id: &str,
        column: Column,
        draft: TaskDraft,
    ) -> Result<Dispatched<String>, ActionError> {
        let (_, located) = self.authorize(project_id)?;
        if draft.title.trim().is_empty() {
            return Err(ActionError::invalid("task title must not be blank"));
        }
        check_deadline(&located.project, draft.deadline)?;

        let task_id = self.ids.provisional(self.clock.now());
        let task = Task::from_draft(task_id.clone(), &draft);
        let sent = task.to_draft();
        let project_id = located.project.id.clone();
        self.ctx.store.borrow_mut().modify(&project_id, |project| {
            project.tasks.get_mut(column).push(task);
        });
        debug!(project = %project_id, task = %task_id, %column, "created provisional task");

        if is_provisional(&project_id) {
            return Ok(Dispatched::local(task_id));
        }

        let ctx = self.ctx.clone();
        let temp_id = task_id.clone();
        let pending = spawn(async move {
            reconcile::confirm_task_create(ctx, project_id, column, temp_id, sent).await;
        });
        Ok(Dispatched {
            value: task_id,
            pending: Some(pending),
        })
    }

    /// Edit a task's fields in place.
    pub fn update_task(
        &self,
        project_id: &str,
        task_id: &str,
        patch: TaskPatch,
    ) -> Result<Dispatched<()>, ActionError> {
        let (_, located) = self.authorize(project_id)?;
        let resolved = self.resolve_task(task_id);
        let task_id = resolved.as_str();
        let current = located
            .project
            .tasks
            .task(task_id)
            .ok_or_else(|| ActionError::task_not_found(task_id))?;
        let patch = patch.normalized();
        if patch.title.as_deref().is_some_and(str::is_empty) {
            return Err(ActionError::invalid("task title must not be blank"));
        }
        let deadline = patch.deadline.unwrap_or(current.deadline);
        check_deadline(&located.project, deadline)?;
        if patch.is_empty() {
            return Ok(Dispatched::local(()));
        }

        let project_id = located.project.id.clone();
        let task_id = task_id.to_string();
        self.ctx.store.borrow_mut().modify(&project_id, |project| {
            if let Some(task) = project.tasks.task_mut(&task_id) {
                patch.apply(task);
            }
        });

        if is_provisional(&project_id) || is_provisional(&task_id) {
            return Ok(Dispatched::local(()));
        }

        let ctx = self.ctx.clone();
        let pending = spawn(async move {
            match ctx.remote.update_task(&project_id, &task_id, &patch).await {
                Ok(server) => {
                    ctx.store.borrow_mut().modify(&project_id, |project| {
                        if let Some(local) = project.tasks.task_mut(&task_id) {
                            patch.adopt_confirmed(local, &server);
                        }
                    });
                }
                Err(err) => {
                    warn!(op = %RemoteOp::UpdateTask, project = %project_id, task = %task_id, error = %err, "remote task update failed; keeping local edit");
                }
            }
        });
        Ok(Dispatched {
            value: (),
            pending: Some(pending),
        })
    }

    /// Remove a task from its column.
    pub fn delete_task(
        &self,
        project_id: &str,
        task_id: &str,
    ) -> Result<Dispatched<()>, ActionError> {
        let (_, located) = self.authorize(project_id)?;
        let resolved = self.resolve_task(task_id);
        let task_id = resolved.as_str();
        if located.project.tasks.task(task_id).is_none() {
            return Err(ActionError::task_not_found(task_id));
        }

        let project_id = located.project.id.clone();
        let task_id = task_id.to_string();
        self.ctx
            .store
            .borrow_mut()
            .modify(&project_id, |project| project.tasks.remove(&task_id));

        if is_provisional(&project_id) || is_provisional(&task_id) {
            return Ok(Dispatched::local(()));
        }

        let ctx = self.ctx.clone();
        let pending = spawn(async move {
            if let Err(err) = ctx.remote.delete_task(&project_id, &task_id).await {
                warn!(op = %RemoteOp::DeleteTask, project = %project_id, task = %task_id, error = %err, "remote task delete failed");
            }
        });
        Ok(Dispatched {
            value: (),
            pending: Some(pending),
        })
    }

    /// Move a task to the end of column `to`. Moving to the column it is
    /// already in does nothing.
    ///
    /// A project snapshot returned by the remote only contributes members;
    /// task placement and scalar fields stay as they are locally, so an
    /// earlier move that never reached the remote is not reverted.
    pub fn move_task(
        &self,
        project_id: &str,
        task_id: &str,
        to: Column,
    ) -> Result<Dispatched<()>, ActionError> {
        let (_, located) = self.authorize(project_id)?;
        let resolved = self.resolve_task(task_id);
        let task_id = resolved.as_str();
        let (from, _) = located
            .project
            .tasks
            .position(task_id)
            .ok_or_else(|| ActionError::task_not_found(task_id))?;
        if from == to {
            return Ok(Dispatched::local(()));
        }

        let project_id = located.project.id.clone();
        let request = TaskMove {
            task_id: task_id.to_string(),
            from,
            to,
        };
        self.ctx.store.borrow_mut().modify(&project_id, |project| {
            if let Some((_, task)) = project.tasks.remove(&request.task_id) {
                project.tasks.get_mut(to).push(task);
            }
        });
        debug!(project = %project_id, task = %request.task_id, %from, %to, "moved task");

        if is_provisional(&project_id) || is_provisional(task_id) {
            return Ok(Dispatched::local(()));
        }

        let ctx = self.ctx.clone();
        let pending = spawn(async move {
            match ctx.remote.move_task(&project_id, &request).await {
                Ok(Some(snapshot)) => {
                    ctx.store.borrow_mut().modify(&project_id, |local| {
                        local.members.extend(snapshot.members.iter().cloned());
                    });
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(op = %RemoteOp::MoveTask, project = %project_id, task = %request.task_id, error = %err, "remote move failed; keeping local placement");
                }
            }
        });
        Ok(Dispatched {
            value: (),
            pending: Some(pending),
        })
    }
}
