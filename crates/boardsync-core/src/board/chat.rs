//! Chat actions: open, post to, and close project threads.

use super::{Board, Dispatched};
use crate::access::can_access;
use crate::chat::ThreadKey;
use crate::error::ActionError;
use crate::model::{ChatMessage, Identity};

impl Board {
    /// Check the actor may use `key` and re-key it onto the project's
    /// current id.
    fn authorize_thread(&self, key: &ThreadKey) -> Result<(Identity, ThreadKey), ActionError> {
        let actor = self.require_actor()?;
        let located = self
            .ctx
            .store
            .borrow()
            .locate(key.project_id())
            .ok_or_else(|| ActionError::project_not_found(key.project_id()))?;
        if !can_access(&actor, &located.project) || !key.is_participant(&actor) {
            return Err(ActionError::Forbidden {
                actor,
                project: located.project.id.clone(),
            });
        }
        Ok((actor, key.with_project(located.project.id.clone())))
    }

    /// Activate a thread: subscribe to its channel and, the first time,
    /// hydrate its history. Returns the thread key under the project's
    /// current id.
    pub fn open_thread(&self, key: &ThreadKey) -> Result<Dispatched<ThreadKey>, ActionError> {
        let (_, resolved) = self.authorize_thread(key)?;
        let pending = self.ctx.chat.activate(&resolved);
        Ok(Dispatched {
            value: resolved,
            pending,
        })
    }

    /// Post a message as the signed-in identity. The thread must be open.
    pub fn send_message(
        &self,
        key: &ThreadKey,
        text: &str,
    ) -> Result<Dispatched<ChatMessage>, ActionError> {
        let (sender, resolved) = self.authorize_thread(key)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ActionError::invalid("message text must not be blank"));
        }
        let message = ChatMessage {
            id: self.ids.message_id(),
            thread_id: resolved.thread_id(),
            sender,
            text: text.to_string(),
            timestamp: self.clock.now(),
        };
        let pending = self.ctx.chat.send(message.clone())?;
        Ok(Dispatched {
            value: message,
            pending,
        })
    }

    /// Deactivate a thread. Closing a thread that is not open does nothing.
    pub fn close_thread(&self, key: &ThreadKey) {
        let project_id = self.ctx.store.borrow().resolve_id(key.project_id());
        self.ctx.chat.deactivate(&key.with_project(project_id).thread_id());
    }

    /// Move buffered broadcast messages into their threads.
    pub fn deliver_chat(&self) -> usize {
        self.ctx.chat.deliver_pending()
    }
}
