//! Folding confirmed creates back into the store.
//!
//! A create response arrives after the store may have moved on: the
//! provisional record can have been edited, given tasks, moved between
//! columns, or deleted. Each continuation re-locates its target by the
//! provisional id, merges the server record with what accrued locally, and
//! then replays the local changes the server has not seen yet. Chat threads
//! opened under the provisional id move to the confirmed one.

use tracing::{debug, info, warn};

use super::SyncContext;
use crate::ids::is_provisional;
use crate::model::{
    Column, Identity, ProjectDraft, ProjectPatch, Task, TaskDraft, TaskMove, TaskPatch,
};
use crate::remote::RemoteOp;

pub(super) async fn confirm_project_create(
    ctx: SyncContext,
    provisional_id: String,
    actor: Identity,
    sent: ProjectDraft,
) {
    let server = match ctx.remote.create_project(&actor, &sent).await {
        Ok(project) => project.with_creator_membership(),
        Err(err) => {
            warn!(op = %RemoteOp::CreateProject, provisional = %provisional_id, error = %err, "remote create failed; project stays local-only");
            return;
        }
    };
    let real_id = server.id.clone();

    let located = ctx.store.borrow().locate(&provisional_id);
    let Some(located) = located else {
        debug!(provisional = %provisional_id, real = %real_id, "project deleted before confirmation");
        if let Err(err) = ctx.remote.delete_project(&real_id).await {
            warn!(op = %RemoteOp::DeleteProject, project = %real_id, error = %err, "compensating delete failed");
        }
        return;
    };
    let local = located.project;

    let edits = ProjectPatch::diff(&sent, &local);
    let mut merged = server.clone();
    if let Some(patch) = &edits {
        patch.apply(&mut merged);
    }
    merged.members.extend(local.members.iter().cloned());
    merged.tasks = local.tasks.clone();
    for (column, task) in server.tasks.iter() {
        if merged.tasks.position(&task.id).is_none() {
            merged.tasks.get_mut(column).push(task.clone());
        }
    }
    ctx.store
        .borrow_mut()
        .relocate(&provisional_id, server.created_by.clone(), merged);
    let threads = ctx.chat.rekey_project(&provisional_id, &real_id);
    info!(provisional = %provisional_id, real = %real_id, owner = %server.created_by, "project confirmed");

    if let Some(patch) = edits {
        match ctx.remote.update_project(&real_id, &patch).await {
            Ok(confirmed) => {
                ctx.store
                    .borrow_mut()
                    .modify(&real_id, |project| patch.adopt_confirmed(project, &confirmed));
            }
            Err(err) => {
                warn!(op = %RemoteOp::UpdateProject, project = %real_id, error = %err, "replaying local edits failed");
            }
        }
    }

    for member in local.members.difference(&server.members) {
        if let Err(err) = ctx.remote.add_member(&real_id, member).await {
            warn!(op = %RemoteOp::AddMember, project = %real_id, member = %member, error = %err, "replaying collaborator failed");
        }
    }

    let deferred: Vec<(Column, String, TaskDraft)> = local
        .tasks
        .iter()
        .filter(|(_, task)| is_provisional(&task.id))
        .map(|(column, task)| (column, task.id.clone(), task.to_draft()))
        .collect();
    for (column, temp_id, draft) in deferred {
        confirm_task_create(ctx.clone(), real_id.clone(), column, temp_id, draft).await;
    }

    ctx.chat.catch_up(threads).await;
}

pub(super) async fn confirm_task_create(
    ctx: SyncContext,
    project_id: String,
    column: Column,
    temp_id: String,
    sent: TaskDraft,
) {
    let server = match ctx.remote.create_task(&project_id, column, &sent).await {
        Ok(task) => task,
        Err(err) => {
            warn!(op = %RemoteOp::CreateTask, project = %project_id, provisional = %temp_id, error = %err, "remote task create failed; task stays local-only");
            return;
        }
    };
    let real_id = server.id.clone();

    let outcome = ctx
        .store
        .borrow_mut()
        .modify(&project_id, |project| {
            let (local_column, index) = project.tasks.position(&temp_id)?;
            let slot = &mut project.tasks.get_mut(local_column)[index];
            let edits = TaskPatch::diff(&Task::from_draft(temp_id.clone(), &sent), slot);
            let mut merged = server.clone();
            if let Some(patch) = &edits {
                patch.apply(&mut merged);
            }
            *slot = merged;
            Some((local_column, edits))
        })
        .flatten();

    let Some((local_column, edits)) = outcome else {
        let project_alive = ctx.store.borrow().locate(&project_id).is_some();
        if project_alive {
            debug!(project = %project_id, provisional = %temp_id, real = %real_id, "task deleted before confirmation");
            if let Err(err) = ctx.remote.delete_task(&project_id, &real_id).await {
                warn!(op = %RemoteOp::DeleteTask, project = %project_id, task = %real_id, error = %err, "compensating delete failed");
            }
        }
        return;
    };
    ctx.store.borrow_mut().record_alias(&temp_id, &real_id);
    debug!(project = %project_id, provisional = %temp_id, real = %real_id, "task confirmed");

    if let Some(patch) = edits {
        match ctx.remote.update_task(&project_id, &real_id, &patch).await {
            Ok(confirmed) => {
                ctx.store.borrow_mut().modify(&project_id, |project| {
                    if let Some(task) = project.tasks.task_mut(&real_id) {
                        patch.adopt_confirmed(task, &confirmed);
                    }
                });
            }
            Err(err) => {
                warn!(op = %RemoteOp::UpdateTask, project = %project_id, task = %real_id, error = %err, "replaying task edits failed");
            }
        }
    }

    if local_column != column {
        let request = TaskMove {
            task_id: real_id.clone(),
            from: column,
            to: local_column,
        };
        if let Err(err) = ctx.remote.move_task(&project_id, &request).await {
            warn!(op = %RemoteOp::MoveTask, project = %project_id, task = %real_id, error = %err, "replaying task move failed");
        }
    }
}
