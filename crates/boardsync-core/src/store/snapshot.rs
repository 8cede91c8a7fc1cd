//! On-change JSON snapshot of the entity store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::model::{Identity, Project};

type Partitions = BTreeMap<Identity, BTreeMap<String, Rc<Project>>>;

#[derive(Serialize)]
pub(super) struct SnapshotView<'a> {
    pub revision: u64,
    pub partitions: &'a Partitions,
    pub aliases: &'a HashMap<String, String>,
    pub tombstones: &'a BTreeSet<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct SnapshotData {
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub partitions: Partitions,
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    #[serde(default)]
    pub tombstones: BTreeSet<String>,
}

/// Location of the snapshot file. Writes are atomic (temp file + rename).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(super) fn load(&self) -> Result<Option<SnapshotData>, SnapshotError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path).map_err(|source| SnapshotError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| SnapshotError::Json {
                path: self.path.clone(),
                source,
            })
    }

    pub(super) fn write(&self, view: &SnapshotView<'_>) -> Result<(), SnapshotError> {
        let io_err = |source| SnapshotError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_vec(view).map_err(|source| SnapshotError::Json {
            path: self.path.clone(),
            source,
        })?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}
