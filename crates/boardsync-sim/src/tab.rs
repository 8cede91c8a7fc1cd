use std::collections::BTreeMap;
use std::rc::Rc;

use boardsync_core::config::SyncConfig;
use boardsync_core::ids::{IdGenerator, is_provisional};
use boardsync_core::{
    ActionError, Board, Column, Dispatched, Identity, LocalBus, Project, ProjectDraft,
    RemoteClient, SnapshotError, TaskDraft, TaskPatch, ThreadKey,
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::clock::SimulatedClock;
use crate::rng::DeterministicRng;

/// Stable identifier for a simulated tab.
pub type TabId = usize;

/// Id of the project every tab is a member of from the start.
pub const SHARED_PROJECT: &str = "shared";

/// What a tab tried to do in a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabAction {
    CreateProject,
    CreateTask,
    MoveTask,
    EditTask,
    DeleteTask,
    DeleteProject,
    AddCollaborator,
    SendMessage,
    LoadProjects,
}

/// How the board answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    Applied { dispatched: bool },
    Rejected { code: String },
    /// No suitable target (e.g. no tasks to move).
    Skipped,
    /// A move changed the number of tasks in its project.
    ConservationBreach {
        project: String,
        before: usize,
        after: usize,
    },
}

/// Observable state of one tab after the simulation drained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabState {
    pub tab: TabId,
    pub identity: Identity,
    pub projects: Vec<Project>,
    /// Active thread id to message ids in arrival order.
    pub threads: BTreeMap<String, Vec<String>>,
    /// Provisional ids still in the store although their confirmed id is
    /// known.
    pub stale_provisional: Vec<String>,
}

/// One browser tab: a signed-in board plus the randomness driving it.
pub struct SimulatedTab {
    id: TabId,
    identity: Identity,
    board: Board,
    clock: Rc<SimulatedClock>,
    rng: DeterministicRng,
    peers: Vec<Identity>,
    threads: Vec<ThreadKey>,
    pending: Vec<JoinHandle<()>>,
}

impl SimulatedTab {
    /// # Errors
    ///
    /// Returns [`SnapshotError`] when `sync` names a snapshot that cannot be
    /// loaded.
    pub fn new(
        id: TabId,
        identity: Identity,
        sync: &SyncConfig,
        remote: Rc<dyn RemoteClient>,
        bus: LocalBus,
        clock: Rc<SimulatedClock>,
        mut rng: DeterministicRng,
    ) -> Result<Self, SnapshotError> {
        let board = Board::from_config(sync, remote, bus)?
            .with_clock(clock.clone())
            .with_ids(IdGenerator::seeded(rng.next_u64()));
        board.sign_in(identity.clone());
        Ok(Self {
            id,
            identity,
            board,
            clock,
            rng,
            peers: Vec::new(),
            threads: Vec::new(),
            pending: Vec::new(),
        })
    }

    #[must_use]
    pub const fn id(&self) -> TabId {
        self.id
    }

    /// Load the board and open the shared general thread plus a direct
    /// thread with each of `peers`.
    pub async fn join(&mut self, peers: Vec<Identity>) -> Result<(), ActionError> {
        self.board.load_projects()?.settled().await;
        let mut keys = vec![ThreadKey::general(SHARED_PROJECT)];
        keys.extend(
            peers
                .iter()
                .filter(|peer| **peer != self.identity)
                .map(|peer| ThreadKey::direct(SHARED_PROJECT, self.identity.clone(), peer.clone())),
        );
        for key in keys {
            if self.threads.contains(&key) {
                continue;
            }
            let opened = self.board.open_thread(&key)?;
            self.threads.push(opened.settled().await);
        }
        self.peers = peers;
        Ok(())
    }

    /// Perform one random action for `round`.
    pub fn step(&mut self, round: u64) -> (TabAction, ActionOutcome) {
        self.clock.set_round(round);
        let action = match self.rng.next_bounded(100) {
            0..=9 => TabAction::CreateProject,
            10..=29 => TabAction::CreateTask,
            30..=54 => TabAction::MoveTask,
            55..=64 => TabAction::EditTask,
            65..=71 => TabAction::DeleteTask,
            72..=73 => TabAction::DeleteProject,
            74..=79 => TabAction::AddCollaborator,
            80..=94 => TabAction::SendMessage,
            _ => TabAction::LoadProjects,
        };
        let outcome = match action {
            TabAction::CreateProject => self.create_project(),
            TabAction::CreateTask => self.create_task(),
            TabAction::MoveTask => self.move_task(),
            TabAction::EditTask => self.edit_task(),
            TabAction::DeleteTask => self.delete_task(),
            TabAction::DeleteProject => self.delete_project(),
            TabAction::AddCollaborator => self.add_collaborator(),
            TabAction::SendMessage => self.send_message(),
            TabAction::LoadProjects => {
                let result = self.board.load_projects();
                self.track(result)
            }
        };
        debug!(tab = self.id, round, ?action, ?outcome, "tab step");
        (action, outcome)
    }

    /// Move broadcast messages into threads.
    pub fn deliver(&self) -> usize {
        self.board.deliver_chat()
    }

    /// Wait for every remote round trip this tab started.
    pub async fn settle(&mut self) {
        for handle in std::mem::take(&mut self.pending) {
            if let Err(err) = handle.await {
                warn!(tab = self.id, error = %err, "tab continuation aborted");
            }
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> TabState {
        let store = self.board.store();
        let store = store.borrow();
        let mut stale = Vec::new();
        let mut projects = Vec::new();
        for (_, project) in store.projects() {
            let ids = std::iter::once(project.id.as_str())
                .chain(project.tasks.iter().map(|(_, task)| task.id.as_str()));
            stale.extend(
                ids.filter(|id| is_provisional(id) && store.resolve_id(id) != *id)
                    .map(str::to_string),
            );
            projects.push(Project::clone(project));
        }
        let threads = self
            .board
            .chat()
            .active_threads()
            .into_iter()
            .map(|thread| {
                let ids = self
                    .board
                    .chat()
                    .messages(&thread)
                    .iter()
                    .map(|m| m.id.to_string())
                    .collect();
                (thread, ids)
            })
            .collect();
        TabState {
            tab: self.id,
            identity: self.identity.clone(),
            projects,
            threads,
            stale_provisional: stale,
        }
    }

    fn track<T>(&mut self, result: Result<Dispatched<T>, ActionError>) -> ActionOutcome {
        match result {
            Ok(dispatched) => {
                let sent = dispatched.dispatched();
                if let Some(handle) = dispatched.pending {
                    self.pending.push(handle);
                }
                ActionOutcome::Applied { dispatched: sent }
            }
            Err(err) => ActionOutcome::Rejected {
                code: err.code().code().to_string(),
            },
        }
    }

    fn pick_project(&mut self) -> Option<Rc<Project>> {
        let visible = self.board.visible_projects();
        self.rng.pick(&visible).cloned()
    }

    fn pick_task(&mut self, project: &Project) -> Option<String> {
        let ids: Vec<String> = project.tasks.iter().map(|(_, t)| t.id.clone()).collect();
        self.rng.pick(&ids).cloned()
    }

    fn pick_column(&mut self) -> Column {
        self.rng.pick(&Column::ALL).copied().unwrap_or(Column::Todo)
    }

    /// A deadline some days after the simulated "today", or none.
    fn maybe_deadline(&mut self) -> Option<NaiveDate> {
        if !self.rng.hit_rate_percent(40) {
            return None;
        }
        let days = i64::try_from(self.rng.next_bounded(30)).unwrap_or(0);
        let today = boardsync_core::clock::Clock::now(&*self.clock).date_naive();
        Some(today + Duration::days(days))
    }

    fn create_project(&mut self) -> ActionOutcome {
        let draft = ProjectDraft {
            name: format!("{} project {}", self.identity, self.rng.next_bounded(1_000)),
            deadline: self.maybe_deadline(),
            ..ProjectDraft::default()
        };
        let result = self.board.create_project(draft);
        self.track(result)
    }

    fn create_task(&mut self) -> ActionOutcome {
        let Some(project) = self.pick_project() else {
            return ActionOutcome::Skipped;
        };
        let column = self.pick_column();
        let draft = TaskDraft {
            title: format!("task {}", self.rng.next_bounded(10_000)),
            deadline: self.maybe_deadline(),
            ..TaskDraft::default()
        };
        let result = self.board.create_task(&project.id, column, draft);
        self.track(result)
    }

    fn move_task(&mut self) -> ActionOutcome {
        let Some(project) = self.pick_project() else {
            return ActionOutcome::Skipped;
        };
        let Some(task_id) = self.pick_task(&project) else {
            return ActionOutcome::Skipped;
        };
        let to = self.pick_column();
        let before = project.tasks.len();
        let result = self.board.move_task(&project.id, &task_id, to);
        let outcome = self.track(result);
        let after = self
            .board
            .project(&project.id)
            .map_or(0, |current| current.tasks.len());
        if before == after {
            outcome
        } else {
            ActionOutcome::ConservationBreach {
                project: project.id.clone(),
                before,
                after,
            }
        }
    }

    fn edit_task(&mut self) -> ActionOutcome {
        let Some(project) = self.pick_project() else {
            return ActionOutcome::Skipped;
        };
        let Some(task_id) = self.pick_task(&project) else {
            return ActionOutcome::Skipped;
        };
        let patch = TaskPatch {
            title: Some(format!("edited {}", self.rng.next_bounded(10_000))),
            deadline: self.rng.hit_rate_percent(30).then(|| self.maybe_deadline()),
            ..TaskPatch::default()
        };
        let result = self.board.update_task(&project.id, &task_id, patch);
        self.track(result)
    }

    fn delete_task(&mut self) -> ActionOutcome {
        let Some(project) = self.pick_project() else {
            return ActionOutcome::Skipped;
        };
        let Some(task_id) = self.pick_task(&project) else {
            return ActionOutcome::Skipped;
        };
        let result = self.board.delete_task(&project.id, &task_id);
        self.track(result)
    }

    fn delete_project(&mut self) -> ActionOutcome {
        let Some(project) = self.pick_project() else {
            return ActionOutcome::Skipped;
        };
        if project.id == SHARED_PROJECT {
            return ActionOutcome::Skipped;
        }
        let result = self.board.delete_project(&project.id);
        self.track(result)
    }

    fn add_collaborator(&mut self) -> ActionOutcome {
        let Some(project) = self.pick_project() else {
            return ActionOutcome::Skipped;
        };
        let Some(peer) = self.rng.pick(&self.peers).cloned() else {
            return ActionOutcome::Skipped;
        };
        let result = self.board.add_collaborator(&project.id, peer.as_str());
        self.track(result)
    }

    fn send_message(&mut self) -> ActionOutcome {
        let Some(key) = self.rng.pick(&self.threads).cloned() else {
            return ActionOutcome::Skipped;
        };
        let text = format!("note {} from {}", self.rng.next_bounded(10_000), self.identity);
        let result = self.board.send_message(&key, &text);
        self.track(result)
    }
}
