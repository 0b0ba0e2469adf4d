//! Inbound event payloads and the per-backend event router.
//!
//! Each backend instance owns one [`EventRouter`]; the host pushes every
//! protocol event (stanza arrival, library callback) through it in order.
//! Handlers run synchronously on the emitting task, one after another.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    serde::{Deserialize, Serialize},
    tracing::trace,
};

use crate::account::{AccountRef, JoinProperties, UserInfo};

/// Emitted when the backend confirms a room join.
pub const CHAT_JOINED: &str = "chat-joined";
/// Emitted for every inbound direct message.
pub const RECEIVED_IM_MSG: &str = "received-im-msg";
/// Emitted when someone invites the account to a room.
pub const CHAT_INVITED: &str = "chat-invite";
/// Emitted by the library backend when a user-info request completes.
pub const USER_INFO_RESPONSE: &str = "user-info-response";
/// Emitted by the library backend when a buddy icon has been fetched.
pub const BUDDY_ICON: &str = "buddy-icon";

/// Event name for the reply to the info-query with id `id`.
pub fn iq_event_name(id: &str) -> String {
    format!("iq.{id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub name: String,
}

/// A confirmed room join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatJoined {
    pub conversation: Conversation,
    pub account: AccountRef,
}

impl ChatJoined {
    pub fn new(conversation: impl Into<String>, account: AccountRef) -> Self {
        Self {
            conversation: Conversation {
                name: conversation.into(),
            },
            account,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedIm {
    pub account: AccountRef,
    pub sender: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInvite {
    pub account: AccountRef,
    pub sender: String,
    pub message: String,
    pub room_name: String,
    pub join_properties: JoinProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfoResponse {
    pub info: UserInfo,
}

/// Raw buddy icon bytes delivered by the library backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuddyIcon {
    pub account: AccountRef,
    pub who: String,
    pub icon_ref: String,
    pub data: Vec<u8>,
}

/// Identifies one subscription for [`EventRouter::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Subscription<E> {
    id: SubscriptionId,
    once: bool,
    handler: Handler<E>,
}

/// Name-keyed publish/subscribe dispatch for one backend's events.
pub struct EventRouter<E> {
    subscriptions: Mutex<HashMap<String, Vec<Subscription<E>>>>,
    next_id: AtomicU64,
}

impl<E> Default for EventRouter<E> {
    fn default() -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<E> fmt::Debug for EventRouter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("EventRouter")
            .field("events", &subs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<E> EventRouter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `handler` for every `name` event until unsubscribed.
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&E) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.add(name.into(), false, Arc::new(handler))
    }

    /// Call `handler` for the next `name` event only.
    pub fn subscribe_once(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&E) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.add(name.into(), true, Arc::new(handler))
    }

    fn add(&self, name: String, once: bool, handler: Handler<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        subs.entry(name).or_default().push(Subscription { id, once, handler });
        id
    }

    /// Remove a subscription. Returns `false` if it already fired (one-shot)
    /// or was never registered.
    pub fn unsubscribe(&self, name: &str, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        let Some(list) = subs.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            subs.remove(name);
        }
        removed
    }

    /// Deliver `event` to every `name` subscriber and return how many ran.
    ///
    /// The subscriber list is snapshotted before dispatch, so handlers may
    /// subscribe or unsubscribe without deadlocking.
    pub fn emit(&self, name: &str, event: &E) -> usize {
        let handlers: Vec<Handler<E>> = {
            let mut subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
            let Some(list) = subs.get_mut(name) else {
                trace!(event = name, "no subscribers");
                return 0;
            };
            let handlers = list.iter().map(|s| Arc::clone(&s.handler)).collect();
            list.retain(|s| !s.once);
            if list.is_empty() {
                subs.remove(name);
            }
            handlers
        };
        trace!(event = name, subscribers = handlers.len(), "dispatching");
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn listener_count(&self, name: &str) -> usize {
        let subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        subs.get(name).map_or(0, Vec::len)
    }
}
