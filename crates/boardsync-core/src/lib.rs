//! boardsync-core library.
//!
//! An optimistic, local-first sync engine for a collaborative task board:
//! projects with column-grouped tasks, per-project chat, and a remote
//! authority that is mirrored on a best-effort basis.
//!
//! # Conventions
//!
//! - **Errors**: action rejections are [`error::ActionError`]; remote
//!   failures ([`error::RemoteError`]) are logged and never returned to
//!   action callers.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).
//! - **Concurrency**: one cooperative thread per tab. Remote continuations
//!   run on a `tokio::task::LocalSet` and re-locate their target before
//!   touching the store.

pub mod access;
pub mod board;
pub mod chat;
pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod model;
pub mod remote;
pub mod store;

pub use board::{Board, Dispatched};
pub use chat::{ChatEngine, LocalBus, ThreadKey, ThreadPhase};
pub use error::{ActionError, ErrorCode, RemoteError, SnapshotError};
pub use model::{
    ChatMessage, Column, Identity, Priority, Project, ProjectDraft, ProjectPatch, Task, TaskDraft,
    TaskPatch,
};
pub use remote::{MemoryRemote, RemoteClient};
pub use store::{BoardStore, SharedStore};
