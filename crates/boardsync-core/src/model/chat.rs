use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Identity;

/// One chat message in a general or direct-message thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub thread_id: String,
    pub sender: Identity,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}
