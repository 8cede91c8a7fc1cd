//! Project mutations: create, edit, delete, add collaborator, and the
//! initial board load.

use tracing::{debug, info, warn};

use super::{Board, Dispatched, reconcile, spawn};
use crate::error::ActionError;
use crate::ids::is_provisional;
use crate::model::{Identity, Project, ProjectDraft, ProjectPatch};
use crate::remote::RemoteOp;

impl Board {
    /// Create a project under a provisional id in the actor's partition.
    ///
    /// Returns the provisional id. When the remote create succeeds the
    /// record is re-keyed to the server id (see [`Board::project`], which
    /// follows the alias).
    pub fn create_project(&self, draft: ProjectDraft) -> Result<Dispatched<String>, ActionError> {
        let actor = self.require_actor()?;
        if draft.name.trim().is_empty() {
            return Err(ActionError::invalid("project name must not be blank"));
        }

        let provisional_id = self.ids.provisional(self.clock.now());
        let project = Project::from_draft(provisional_id.clone(), &draft, actor.clone());
        let sent = project.to_draft();
        self.ctx.store.borrow_mut().insert(actor.clone(), project);
        debug!(id = %provisional_id, actor = %actor, "created provisional project");

        let ctx = self.ctx.clone();
        let id = provisional_id.clone();
        let pending = spawn(async move {
            reconcile::confirm_project_create(ctx, id, actor, sent).await;
        });
        Ok(Dispatched {
            value: provisional_id,
            pending: Some(pending),
        })
    }

    /// Edit a project's scalar fields.
    pub fn update_project(
        &self,
        project_id: &str,
        patch: ProjectPatch,
    ) -> Result<Dispatched<()>, ActionError> {
        let (_, located) = self.authorize(project_id)?;
        let patch = patch.normalized();
        if patch.name.as_deref().is_some_and(str::is_empty) {
            return Err(ActionError::invalid("project name must not be blank"));
        }
        if let Some(Some(deadline)) = patch.deadline {
            if let Some(latest) = located.project.tasks.latest_deadline() {
                if latest > deadline {
                    return Err(ActionError::DeadlineBeforeTasks {
                        project: deadline,
                        task: latest,
                    });
                }
            }
        }
        if patch.is_empty() {
            return Ok(Dispatched::local(()));
        }

        let id = located.project.id.clone();
        self.ctx
            .store
            .borrow_mut()
            .modify(&id, |project| patch.apply(project));

        if is_provisional(&id) {
            // Replayed against the real id once creation is confirmed.
            return Ok(Dispatched::local(()));
        }

        let ctx = self.ctx.clone();
        let pending = spawn(async move {
            match ctx.remote.update_project(&id, &patch).await {
                Ok(server) => {
                    ctx.store
                        .borrow_mut()
                        .modify(&id, |local| patch.adopt_confirmed(local, &server));
                }
                Err(err) => {
                    warn!(op = %RemoteOp::UpdateProject, project = %id, error = %err, "remote update failed; keeping local edit");
                }
            }
        });
        Ok(Dispatched {
            value: (),
            pending: Some(pending),
        })
    }

    /// Remove a project locally and, unless it is provisional, remotely.
    ///
    /// Cascading task and chat deletion is the remote authority's job; the
    /// local chat threads of the project are closed.
    pub fn delete_project(&self, project_id: &str) -> Result<Dispatched<()>, ActionError> {
        let (_, located) = self.authorize(project_id)?;
        let id = located.project.id.clone();
        self.ctx.store.borrow_mut().remove(&id);
        self.ctx.chat.forget_project(&id);

        if is_provisional(&id) {
            // A create still in flight sees the gap and deletes the real id.
            return Ok(Dispatched::local(()));
        }

        let ctx = self.ctx.clone();
        let pending = spawn(async move {
            if let Err(err) = ctx.remote.delete_project(&id).await {
                warn!(op = %RemoteOp::DeleteProject, project = %id, error = %err, "remote delete failed");
            }
        });
        Ok(Dispatched {
            value: (),
            pending: Some(pending),
        })
    }

    /// Add a collaborator. Adding an existing member is a no-op.
    pub fn add_collaborator(
        &self,
        project_id: &str,
        collaborator: &str,
    ) -> Result<Dispatched<()>, ActionError> {
        let (_, located) = self.authorize(project_id)?;
        let member = Identity::parse(collaborator)
            .map_err(|err| ActionError::invalid(err.to_string()))?;
        if located.project.members.contains(&member) {
            return Ok(Dispatched::local(()));
        }

        let id = located.project.id.clone();
        self.ctx.store.borrow_mut().modify(&id, |project| {
            project.members.insert(member.clone());
        });

        if is_provisional(&id) {
            return Ok(Dispatched::local(()));
        }

        let ctx = self.ctx.clone();
        let pending = spawn(async move {
            if let Err(err) = ctx.remote.add_member(&id, &member).await {
                warn!(op = %RemoteOp::AddMember, project = %id, member = %member, error = %err, "remote add-member failed; keeping local member");
            }
        });
        Ok(Dispatched {
            value: (),
            pending: Some(pending),
        })
    }

    /// Fetch the actor's projects from the remote and insert the ones this
    /// store does not know yet. Projects already present locally, and ones
    /// deleted locally, are left alone.
    pub fn load_projects(&self) -> Result<Dispatched<()>, ActionError> {
        let actor = self.require_actor()?;
        let ctx = self.ctx.clone();
        let pending = spawn(async move {
            let projects = match ctx.remote.list_projects(&actor).await {
                Ok(projects) => projects,
                Err(err) => {
                    warn!(op = %RemoteOp::ListProjects, actor = %actor, error = %err, "board load failed");
                    return;
                }
            };
            let mut store = ctx.store.borrow_mut();
            let mut inserted = 0_usize;
            for project in projects {
                if store.locate(&project.id).is_some() || store.is_tombstoned(&project.id) {
                    continue;
                }
                let project = project.with_creator_membership();
                store.insert(project.created_by.clone(), project);
                inserted += 1;
            }
            info!(actor = %actor, inserted, "loaded remote projects");
        });
        Ok(Dispatched {
            value: (),
            pending: Some(pending),
        })
    }
}
