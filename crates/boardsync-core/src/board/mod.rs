//! Mutation action layer.
//!
//! Every operation follows the same template:
//!
//! 1. read the acting identity (reject when nobody is signed in),
//! 2. locate the project and check membership,
//! 3. run domain validation against the pre-mutation local state,
//! 4. apply the change to the store synchronously,
//! 5. hand the remote call to a local task (fire-and-forget),
//! 6. fold a successful response back into the store; a failed one is
//!    logged and the optimistic state stays as the local truth.
//!
//! Remote work is spawned with [`tokio::task::spawn_local`], so a [`Board`]
//! must be driven from inside a `tokio::task::LocalSet`.

mod chat;
mod projects;
mod reconcile;
mod tasks;

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::access::can_mutate;
use crate::chat::{ChatEngine, LocalBus};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{ActionError, SnapshotError};
use crate::ids::IdGenerator;
use crate::model::{Identity, Project};
use crate::remote::RemoteClient;
use crate::store::{BoardStore, Located, SharedStore, SnapshotFile};

/// Result of an accepted action: the synchronous outcome plus the handle of
/// the remote round trip, when one was dispatched.
#[derive(Debug)]
pub struct Dispatched<T> {
    pub value: T,
    pub pending: Option<JoinHandle<()>>,
}

impl<T> Dispatched<T> {
    pub(crate) const fn local(value: T) -> Self {
        Self {
            value,
            pending: None,
        }
    }

    /// Whether a remote call was issued.
    #[must_use]
    pub const fn dispatched(&self) -> bool {
        self.pending.is_some()
    }

    /// Wait for the remote round trip (and its reconciliation) to finish.
    pub async fn settled(self) -> T {
        if let Some(handle) = self.pending {
            if let Err(err) = handle.await {
                warn!(error = %err, "remote continuation did not complete");
            }
        }
        self.value
    }
}

/// Handles a continuation needs; cloned into every spawned task.
#[derive(Clone)]
pub(crate) struct SyncContext {
    pub store: SharedStore,
    pub remote: Rc<dyn RemoteClient>,
    pub chat: ChatEngine,
}

/// One client's view of the board: the entity store, the acting identity,
/// the remote client, and the chat engine.
pub struct Board {
    ctx: SyncContext,
    clock: Rc<dyn Clock>,
    ids: IdGenerator,
    actor: RefCell<Option<Identity>>,
}

impl Board {
    /// An in-memory board using the system clock and random ids.
    #[must_use]
    pub fn new(remote: Rc<dyn RemoteClient>, bus: LocalBus) -> Self {
        let chat = ChatEngine::new(Rc::clone(&remote), bus);
        Self {
            ctx: SyncContext {
                store: BoardStore::new().into_shared(),
                remote,
                chat,
            },
            clock: Rc::new(SystemClock),
            ids: IdGenerator::from_entropy(),
            actor: RefCell::new(None),
        }
    }

    /// Build a board from resolved configuration.
    ///
    /// `bus` is shared by every board of the process; build it once with
    /// [`ChatConfig::local_bus`](crate::config::ChatConfig::local_bus) so the
    /// configured channel capacity applies.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] when a configured snapshot cannot be loaded.
    pub fn from_config(
        config: &SyncConfig,
        remote: Rc<dyn RemoteClient>,
        bus: LocalBus,
    ) -> Result<Self, SnapshotError> {
        let mut board = Self::new(remote, bus);
        board.ctx.chat.set_hydrate_history(config.chat.hydrate_history);
        if let Some(path) = &config.store.snapshot_path {
            board = board.with_store(BoardStore::open(SnapshotFile::new(path))?);
        }
        Ok(board)
    }

    #[must_use]
    pub fn with_store(mut self, store: BoardStore) -> Self {
        self.ctx.store = store.into_shared();
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_ids(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Set the acting identity.
    pub fn sign_in(&self, identity: Identity) {
        debug!(actor = %identity, "signed in");
        *self.actor.borrow_mut() = Some(identity);
    }

    pub fn sign_out(&self) {
        *self.actor.borrow_mut() = None;
    }

    #[must_use]
    pub fn actor(&self) -> Option<Identity> {
        self.actor.borrow().clone()
    }

    /// Shared handle to the entity store.
    #[must_use]
    pub fn store(&self) -> SharedStore {
        Rc::clone(&self.ctx.store)
    }

    #[must_use]
    pub const fn chat(&self) -> &ChatEngine {
        &self.ctx.chat
    }

    /// Current record for a project id (provisional ids follow aliases).
    #[must_use]
    pub fn project(&self, project_id: &str) -> Option<Rc<Project>> {
        self.ctx.store.borrow().project(project_id)
    }

    /// Projects the signed-in identity can see; empty when signed out.
    #[must_use]
    pub fn visible_projects(&self) -> Vec<Rc<Project>> {
        self.actor()
            .map(|actor| self.ctx.store.borrow().visible_to(&actor))
            .unwrap_or_default()
    }

    fn require_actor(&self) -> Result<Identity, ActionError> {
        self.actor().ok_or(ActionError::NoActor)
    }

    /// Steps 1 and 2 of the action template.
    fn authorize(&self, project_id: &str) -> Result<(Identity, Located), ActionError> {
        let actor = self.require_actor()?;
        let located = self
            .ctx
            .store
            .borrow()
            .locate(project_id)
            .ok_or_else(|| ActionError::project_not_found(project_id))?;
        if !can_mutate(&actor, &located.project) {
            return Err(ActionError::Forbidden {
                actor,
                project: located.project.id.clone(),
            });
        }
        Ok((actor, located))
    }
}

fn spawn(work: impl Future<Output = ()> + 'static) -> JoinHandle<()> {
    tokio::task::spawn_local(work)
}
