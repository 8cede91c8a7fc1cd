//! Chat synchronization engine.
//!
//! Each thread moves through `Uninitialized -> Hydrating -> Live` on its
//! first activation. Activation also opens the thread's bus subscription
//! (`chat-<threadId>`). Inbound messages, local sends, and hydrated history
//! all pass through one dedupe check on the message id, so a message seen
//! through several paths is listed once. Order is arrival order.

mod channel;
mod thread;

pub use channel::{DEFAULT_CHANNEL_CAPACITY, LocalBus, Subscription, channel_name};
pub use thread::ThreadKey;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::ActionError;
use crate::ids::is_provisional;
use crate::model::ChatMessage;
use crate::remote::{RemoteClient, RemoteOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPhase {
    Uninitialized,
    Hydrating,
    Live,
}

#[derive(Debug)]
struct ThreadState {
    key: ThreadKey,
    phase: ThreadPhase,
    messages: Vec<ChatMessage>,
    seen: HashSet<Uuid>,
    subscription: Option<Subscription>,
}

impl ThreadState {
    fn new(key: ThreadKey) -> Self {
        Self {
            key,
            phase: ThreadPhase::Uninitialized,
            messages: Vec::new(),
            seen: HashSet::new(),
            subscription: None,
        }
    }

    /// Append unless the id is already listed.
    fn accept(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Replace the list with `history`, keeping messages that arrived while
    /// the fetch was in flight and are not part of it.
    fn hydrate(&mut self, history: Vec<ChatMessage>) {
        let local = std::mem::take(&mut self.messages);
        self.seen.clear();
        for message in history.into_iter().chain(local) {
            self.accept(message);
        }
    }

    fn is_active(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_open)
    }
}

type Threads = Rc<RefCell<HashMap<String, ThreadState>>>;

/// A thread moved onto a confirmed project id, with the messages it listed
/// while the project was provisional.
pub(crate) struct RekeyedThread {
    thread_id: String,
    provisional_messages: Vec<ChatMessage>,
}

#[derive(Clone)]
pub struct ChatEngine {
    threads: Threads,
    bus: LocalBus,
    remote: Rc<dyn RemoteClient>,
    hydrate_history: bool,
}

impl ChatEngine {
    #[must_use]
    pub fn new(remote: Rc<dyn RemoteClient>, bus: LocalBus) -> Self {
        Self {
            threads: Rc::new(RefCell::new(HashMap::new())),
            bus,
            remote,
            hydrate_history: true,
        }
    }

    /// Whether first activation fetches remote history.
    pub fn set_hydrate_history(&mut self, enabled: bool) {
        self.hydrate_history = enabled;
    }

    #[must_use]
    pub const fn bus(&self) -> &LocalBus {
        &self.bus
    }

    /// Subscribe to a thread and, on its first activation, hydrate it.
    ///
    /// Returns the handle of the history fetch when one was started.
    /// Activating an active thread does nothing; re-activating a closed one
    /// only re-subscribes.
    pub fn activate(&self, key: &ThreadKey) -> Option<JoinHandle<()>> {
        let thread_id = key.thread_id();
        let mut threads = self.threads.borrow_mut();
        let state = threads
            .entry(thread_id.clone())
            .or_insert_with(|| ThreadState::new(key.clone()));
        if !state.is_active() {
            state.subscription = Some(self.bus.subscribe(&key.channel()));
        }
        if state.phase != ThreadPhase::Uninitialized {
            return None;
        }

        if !self.hydrate_history || is_provisional(key.project_id()) {
            state.phase = ThreadPhase::Live;
            debug!(thread = %thread_id, "thread live without history");
            return None;
        }
        state.phase = ThreadPhase::Hydrating;
        drop(threads);

        Some(tokio::task::spawn_local(fetch_history(
            Rc::clone(&self.threads),
            Rc::clone(&self.remote),
            thread_id,
        )))
    }

    /// Close the thread's subscription. Messages already listed are kept.
    pub fn deactivate(&self, thread_id: &str) {
        if let Some(state) = self.threads.borrow_mut().get_mut(thread_id) {
            if let Some(subscription) = state.subscription.as_mut() {
                subscription.close();
            }
        }
    }

    /// Drop every thread of `project_id`.
    pub fn forget_project(&self, project_id: &str) {
        self.threads.borrow_mut().retain(|_, state| {
            let keep = state.key.project_id() != project_id;
            if !keep {
                if let Some(subscription) = state.subscription.as_mut() {
                    subscription.close();
                }
            }
            keep
        });
    }

    /// Move every thread of `provisional_id` onto `real_id`.
    ///
    /// Threads keep their messages and dedupe set. An open thread drains
    /// its old subscription and subscribes to the new channel, so callers
    /// holding the provisional key keep posting into the same list.
    pub(crate) fn rekey_project(
        &self,
        provisional_id: &str,
        real_id: &str,
    ) -> Vec<RekeyedThread> {
        let mut threads = self.threads.borrow_mut();
        let stale: Vec<String> = threads
            .iter()
            .filter(|(_, state)| state.key.project_id() == provisional_id)
            .map(|(id, _)| id.clone())
            .collect();

        let mut moved = Vec::with_capacity(stale.len());
        for old_id in stale {
            let Some(mut state) = threads.remove(&old_id) else {
                continue;
            };
            let key = state.key.with_project(real_id.to_string());
            let thread_id = key.thread_id();

            let mut inbound = Vec::new();
            if let Some(subscription) = state.subscription.as_mut() {
                while let Some(message) = subscription.try_next() {
                    inbound.push(message);
                }
                if subscription.is_open() {
                    subscription.close();
                    *subscription = self.bus.subscribe(&key.channel());
                }
            }
            for message in inbound {
                state.accept(message);
            }
            for message in &mut state.messages {
                message.thread_id.clone_from(&thread_id);
            }
            state.key = key;
            if self.hydrate_history {
                state.phase = ThreadPhase::Hydrating;
            }

            debug!(from = %old_id, to = %thread_id, messages = state.messages.len(), "moved thread to confirmed project");
            moved.push(RekeyedThread {
                thread_id: thread_id.clone(),
                provisional_messages: state.messages.clone(),
            });
            threads.insert(thread_id, state);
        }
        moved
    }

    /// Persist what re-keyed threads listed while provisional, then hydrate
    /// each of them once.
    pub(crate) async fn catch_up(&self, moved: Vec<RekeyedThread>) {
        for thread in moved {
            for message in &thread.provisional_messages {
                if let Err(err) = self.remote.send_chat_message(message).await {
                    warn!(op = %RemoteOp::SendChatMessage, thread = %thread.thread_id, id = %message.id, error = %err, "persisting provisional chat message failed");
                }
            }
            if self.hydrate_history {
                fetch_history(
                    Rc::clone(&self.threads),
                    Rc::clone(&self.remote),
                    thread.thread_id,
                )
                .await;
            }
        }
    }

    /// Drain every open subscription into its thread. Returns how many new
    /// messages were listed.
    pub fn deliver_pending(&self) -> usize {
        let mut delivered = 0;
        for state in self.threads.borrow_mut().values_mut() {
            let mut inbound = Vec::new();
            if let Some(subscription) = state.subscription.as_mut() {
                while let Some(message) = subscription.try_next() {
                    inbound.push(message);
                }
            }
            for message in inbound {
                if state.accept(message) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// List a locally composed message, publish it to the bus, and persist
    /// it remotely unless the thread's project is provisional.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::UnknownThread`] when the thread is not active.
    pub fn send(&self, message: ChatMessage) -> Result<Option<JoinHandle<()>>, ActionError> {
        let (channel, provisional) = {
            let mut threads = self.threads.borrow_mut();
            let state = threads
                .get_mut(&message.thread_id)
                .filter(|state| state.is_active())
                .ok_or_else(|| ActionError::UnknownThread {
                    thread: message.thread_id.clone(),
                })?;
            state.accept(message.clone());
            (state.key.channel(), is_provisional(state.key.project_id()))
        };
        let reached = self.bus.publish(&channel, message.clone());
        trace!(thread = %message.thread_id, id = %message.id, reached, "published chat message");

        if provisional {
            return Ok(None);
        }
        let remote = Rc::clone(&self.remote);
        Ok(Some(tokio::task::spawn_local(async move {
            if let Err(err) = remote.send_chat_message(&message).await {
                warn!(op = %RemoteOp::SendChatMessage, thread = %message.thread_id, id = %message.id, error = %err, "remote chat persist failed");
            }
        })))
    }

    /// Messages of a thread in arrival order.
    #[must_use]
    pub fn messages(&self, thread_id: &str) -> Vec<ChatMessage> {
        self.threads
            .borrow()
            .get(thread_id)
            .map(|state| state.messages.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn phase(&self, thread_id: &str) -> ThreadPhase {
        self.threads
            .borrow()
            .get(thread_id)
            .map_or(ThreadPhase::Uninitialized, |state| state.phase)
    }

    #[must_use]
    pub fn is_active(&self, thread_id: &str) -> bool {
        self.threads
            .borrow()
            .get(thread_id)
            .is_some_and(ThreadState::is_active)
    }

    /// Ids of threads currently subscribed.
    #[must_use]
    pub fn active_threads(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .threads
            .borrow()
            .iter()
            .filter(|(_, state)| state.is_active())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

/// Fetch a thread's history and merge it into whatever the thread already
/// lists, then mark it live.
async fn fetch_history(threads: Threads, remote: Rc<dyn RemoteClient>, thread_id: String) {
    let fetched = remote.chat_history(&thread_id).await;
    let mut threads = threads.borrow_mut();
    let Some(state) = threads.get_mut(&thread_id) else {
        trace!(thread = %thread_id, "thread forgotten during hydration");
        return;
    };
    match fetched {
        Ok(history) => {
            debug!(thread = %thread_id, fetched = history.len(), "hydrated thread");
            state.hydrate(history);
        }
        Err(err) => {
            warn!(op = %RemoteOp::ChatHistory, thread = %thread_id, error = %err, "history fetch failed; keeping local messages");
        }
    }
    state.phase = ThreadPhase::Live;
}

#[cfg(test)]
mod tests {
    use super::{ChatEngine, LocalBus, ThreadKey, ThreadPhase};
    use crate::model::{ChatMessage, Identity};
    use crate::remote::{MemoryRemote, RemoteClient, RemoteOp};
    use chrono::Utc;
    use std::rc::Rc;
    use uuid::Uuid;

    fn message(thread: &str, text: &str) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            thread_id: thread.into(),
            sender: Identity::parse("a@x.com").expect("identity"),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    fn engine(remote: &Rc<MemoryRemote>, bus: &LocalBus) -> ChatEngine {
        let remote: Rc<dyn RemoteClient> = remote.clone();
        ChatEngine::new(remote, bus.clone())
    }

    #[tokio::test]
    async fn provisional_thread_goes_live_without_fetch() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let remote = Rc::new(MemoryRemote::new());
                let chat = engine(&remote, &LocalBus::default());
                let key = ThreadKey::general("temp-1-abcdef");

                assert!(chat.activate(&key).is_none());
                assert_eq!(chat.phase("temp-1-abcdef"), ThreadPhase::Live);
                assert!(remote.calls().is_empty());
            })
            .await;
    }

    #[tokio::test]
    async fn echo_of_own_send_is_listed_once() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let remote = Rc::new(MemoryRemote::new());
                let chat = engine(&remote, &LocalBus::default());
                let key = ThreadKey::general("temp-1-abcdef");
                chat.activate(&key);

                let sent = message("temp-1-abcdef", "hello");
                assert!(chat.send(sent.clone()).expect("active").is_none());
                assert_eq!(chat.deliver_pending(), 0);
                assert_eq!(chat.messages("temp-1-abcdef"), vec![sent]);
            })
            .await;
    }

    #[tokio::test]
    async fn send_to_inactive_thread_is_rejected() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let remote = Rc::new(MemoryRemote::new());
                let chat = engine(&remote, &LocalBus::default());
                let key = ThreadKey::general("temp-1-abcdef");
                chat.activate(&key);
                chat.deactivate("temp-1-abcdef");
                chat.deactivate("temp-1-abcdef");

                assert!(chat.send(message("temp-1-abcdef", "late")).is_err());
                assert!(!chat.is_active("temp-1-abcdef"));
            })
            .await;
    }

    #[tokio::test]
    async fn hydration_keeps_messages_that_raced_the_fetch() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let remote = Rc::new(MemoryRemote::new());
                let stored = message("p1", "from history");
                remote
                    .send_chat_message(&stored)
                    .await
                    .expect("seed history");

                let bus = LocalBus::default();
                let chat = engine(&remote, &bus);
                remote.hold();
                let fetch = chat.activate(&ThreadKey::general("p1")).expect("fetch");
                assert_eq!(chat.phase("p1"), ThreadPhase::Hydrating);

                let raced = message("p1", "during fetch");
                bus.publish("chat-p1", raced.clone());
                bus.publish("chat-p1", stored.clone());
                assert_eq!(chat.deliver_pending(), 2);

                remote.release();
                fetch.await.expect("hydrated");

                assert_eq!(chat.phase("p1"), ThreadPhase::Live);
                assert_eq!(chat.messages("p1"), vec![stored, raced]);
            })
            .await;
    }

    #[tokio::test]
    async fn rekeyed_thread_listens_on_the_confirmed_channel() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let remote = Rc::new(MemoryRemote::new());
                let bus = LocalBus::default();
                let mut chat = engine(&remote, &bus);
                chat.set_hydrate_history(false);
                chat.activate(&ThreadKey::general("temp-1-abcdef"));
                chat.send(message("temp-1-abcdef", "early")).expect("active");

                let moved = chat.rekey_project("temp-1-abcdef", "p7");
                assert_eq!(chat.active_threads(), vec!["p7".to_string()]);
                assert_eq!(chat.phase("p7"), ThreadPhase::Live);
                assert_eq!(bus.subscriber_count("chat-temp-1-abcdef"), 0);

                bus.publish("chat-p7", message("p7", "from another tab"));
                assert_eq!(chat.deliver_pending(), 1);

                chat.catch_up(moved).await;
                let log = remote.chat_log("p7");
                assert_eq!(log.len(), 1);
                assert_eq!(log[0].text, "early");
                assert_eq!(log[0].thread_id, "p7");
                assert_eq!(remote.call_count(RemoteOp::ChatHistory), 0);
                assert_eq!(chat.messages("p7").len(), 2);
            })
            .await;
    }
}
