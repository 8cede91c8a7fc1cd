//! Partitioned, in-memory entity store.
//!
//! Index shape: `partition key -> project id -> Project`. The partition key
//! is the owner identity as last confirmed by the remote authority; a
//! provisional project lives under the acting identity's partition until its
//! creation is reconciled.
//!
//! Projects are held as `Rc<Project>` and mutated through `Rc::make_mut`,
//! so a handle taken before a mutation keeps showing the old record and
//! observers can compare handles with `Rc::ptr_eq`.

mod locate;
mod snapshot;

pub use locate::{Located, locate};
pub use snapshot::SnapshotFile;

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::access::can_access;
use crate::error::SnapshotError;
use crate::ids::is_provisional;
use crate::model::{Identity, Project};
use snapshot::SnapshotView;

/// Store handle shared by the action layer and its continuations.
pub type SharedStore = Rc<RefCell<BoardStore>>;

type Partition = BTreeMap<String, Rc<Project>>;

#[derive(Debug, Default)]
pub struct BoardStore {
    partitions: BTreeMap<Identity, Partition>,
    aliases: HashMap<String, String>,
    /// Confirmed ids removed locally; a board load must not resurrect them.
    tombstones: BTreeSet<String>,
    revision: u64,
    snapshot: Option<SnapshotFile>,
}

impl BoardStore {
    /// An empty store that lives only in memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by a snapshot file, loading it when present.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] when an existing snapshot cannot be read or
    /// parsed.
    pub fn open(snapshot: SnapshotFile) -> Result<Self, SnapshotError> {
        let data = snapshot.load()?.unwrap_or_default();
        debug!(
            path = %snapshot.path().display(),
            partitions = data.partitions.len(),
            "opened store snapshot"
        );
        Ok(Self {
            partitions: data.partitions,
            aliases: data.aliases,
            tombstones: data.tombstones,
            revision: data.revision,
            snapshot: Some(snapshot),
        })
    }

    #[must_use]
    pub fn into_shared(self) -> SharedStore {
        Rc::new(RefCell::new(self))
    }

    /// Monotonic change counter, bumped on every commit.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Follow the provisional -> real id mapping, if any.
    #[must_use]
    pub fn resolve_id(&self, id: &str) -> String {
        let mut current = id;
        // Aliases only ever point from provisional to real ids, so chains are
        // at most one hop; the bound guards against a corrupt snapshot.
        for _ in 0..4 {
            match self.aliases.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.to_string()
    }

    /// Locate a project by id, following aliases.
    #[must_use]
    pub fn locate(&self, project_id: &str) -> Option<Located> {
        locate(&self.partitions, &self.resolve_id(project_id))
    }

    #[must_use]
    pub fn project(&self, project_id: &str) -> Option<Rc<Project>> {
        self.locate(project_id).map(|found| found.project)
    }

    #[must_use]
    pub fn partition(&self, key: &Identity) -> Option<&BTreeMap<String, Rc<Project>>> {
        self.partitions.get(key)
    }

    /// Every project with the partition holding it.
    pub fn projects(&self) -> impl Iterator<Item = (&Identity, &Rc<Project>)> {
        self.partitions
            .iter()
            .flat_map(|(key, entities)| entities.values().map(move |project| (key, project)))
    }

    /// Projects `actor` may see, in partition then id order.
    #[must_use]
    pub fn visible_to(&self, actor: &Identity) -> Vec<Rc<Project>> {
        self.projects()
            .filter(|(_, project)| can_access(actor, project))
            .map(|(_, project)| Rc::clone(project))
            .collect()
    }

    #[must_use]
    pub fn project_count(&self) -> usize {
        self.partitions.values().map(BTreeMap::len).sum()
    }

    /// Insert or replace a project under `partition`.
    pub fn insert(&mut self, partition: Identity, project: Project) {
        self.partitions
            .entry(partition)
            .or_default()
            .insert(project.id.clone(), Rc::new(project));
        self.commit();
    }

    /// Mutate a project in place (copy-on-write). Returns `None` when the
    /// project is no longer in the store.
    pub fn modify<R>(&mut self, project_id: &str, f: impl FnOnce(&mut Project) -> R) -> Option<R> {
        let id = self.resolve_id(project_id);
        let slot = self
            .partitions
            .values_mut()
            .find_map(|entities| entities.get_mut(&id))?;
        let out = f(Rc::make_mut(slot));
        self.commit();
        Some(out)
    }

    /// Remove a project from whichever partition holds it.
    pub fn remove(&mut self, project_id: &str) -> Option<Rc<Project>> {
        let id = self.resolve_id(project_id);
        let removed = self
            .partitions
            .values_mut()
            .find_map(|entities| entities.remove(&id));
        if removed.is_some() {
            if !is_provisional(&id) {
                self.tombstones.insert(id);
            }
            self.partitions.retain(|_, entities| !entities.is_empty());
            self.commit();
        }
        removed
    }

    /// Swap a provisional record for its confirmed counterpart.
    ///
    /// Removes `provisional_id` from every partition, inserts `project` under
    /// `owner` at its real id, and records the alias, all in one commit.
    pub fn relocate(&mut self, provisional_id: &str, owner: Identity, project: Project) {
        let mut removed = 0_usize;
        for entities in self.partitions.values_mut() {
            if entities.remove(provisional_id).is_some() {
                removed += 1;
            }
        }
        self.partitions.retain(|_, entities| !entities.is_empty());
        debug!(
            provisional = provisional_id,
            real = %project.id,
            owner = %owner,
            removed,
            "relocated provisional project"
        );
        self.aliases
            .insert(provisional_id.to_string(), project.id.clone());
        self.partitions
            .entry(owner)
            .or_default()
            .insert(project.id.clone(), Rc::new(project));
        self.commit();
    }

    #[must_use]
    pub fn is_tombstoned(&self, project_id: &str) -> bool {
        self.tombstones.contains(project_id)
    }

    /// Remember that `provisional_id` is now known as `real_id`.
    pub fn record_alias(&mut self, provisional_id: &str, real_id: &str) {
        self.aliases
            .insert(provisional_id.to_string(), real_id.to_string());
        self.commit();
    }

    fn commit(&mut self) {
        self.revision += 1;
        if let Some(snapshot) = &self.snapshot {
            let view = SnapshotView {
                revision: self.revision,
                partitions: &self.partitions,
                aliases: &self.aliases,
                tombstones: &self.tombstones,
            };
            if let Err(err) = snapshot.write(&view) {
                warn!(code = %err.code(), error = %err, "failed to persist store snapshot");
            }
        }
    }
}
