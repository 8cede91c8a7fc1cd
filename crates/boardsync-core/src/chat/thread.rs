use serde::{Deserialize, Serialize};

use super::channel::channel_name;
use crate::model::Identity;

/// Identity of a chat thread within a project.
///
/// A direct-message thread stores its two participants sorted, so both
/// sides derive the same thread id and channel without a lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThreadKey {
    General {
        project_id: String,
    },
    Direct {
        project_id: String,
        participants: [Identity; 2],
    },
}

impl ThreadKey {
    #[must_use]
    pub fn general(project_id: impl Into<String>) -> Self {
        Self::General {
            project_id: project_id.into(),
        }
    }

    #[must_use]
    pub fn direct(project_id: impl Into<String>, a: Identity, b: Identity) -> Self {
        let participants = if a <= b { [a, b] } else { [b, a] };
        Self::Direct {
            project_id: project_id.into(),
            participants,
        }
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        match self {
            Self::General { project_id } | Self::Direct { project_id, .. } => project_id,
        }
    }

    /// `<project id>` for the general thread, `<lo>:<hi>:<project id>` for a
    /// direct-message thread. Identities cannot contain `:`, so distinct
    /// participant pairs never share an id.
    #[must_use]
    pub fn thread_id(&self) -> String {
        match self {
            Self::General { project_id } => project_id.clone(),
            Self::Direct {
                project_id,
                participants: [lo, hi],
            } => format!("{lo}:{hi}:{project_id}"),
        }
    }

    #[must_use]
    pub fn channel(&self) -> String {
        channel_name(&self.thread_id())
    }

    /// Whether `identity` may post in this thread. Any project member may
    /// post in the general thread.
    #[must_use]
    pub fn is_participant(&self, identity: &Identity) -> bool {
        match self {
            Self::General { .. } => true,
            Self::Direct { participants, .. } => participants.contains(identity),
        }
    }

    /// Same thread re-keyed onto another project id.
    #[must_use]
    pub(crate) fn with_project(&self, project_id: String) -> Self {
        match self {
            Self::General { .. } => Self::General { project_id },
            Self::Direct { participants, .. } => Self::Direct {
                project_id,
                participants: participants.clone(),
            },
        }
    }
}
