//! [`BridgeAccount`] adapter over the legacy IM library.
//!
//! Nearly every call delegates straight to [`PurpleLibrary`] once
//! [`BridgeAccount::find_account`] has bound a library handle. The library's
//! `chat-joined` callback names the account but carries nothing that ties
//! it to the join request, so only one join per account can be in flight
//! and the properties of the join being waited on live in a single slot.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex, RwLock, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    tracing::{debug, info, warn},
};

use imbridge_accounts::{
    AccountFactory, AccountRef, BridgeAccount, Buddy, Capability, ChatJoined, CorrelationRegistry,
    Error, EventRouter, JoinOption, JoinProperties, Pending, ProtocolDescriptor, RemoteId, Result,
    SubscriptionId, UserInfo,
    events::{BUDDY_ICON, CHAT_JOINED, USER_INFO_RESPONSE},
    message::BasicMessage,
};

use crate::{
    events::PurpleEvent,
    library::{AccountHandle, PurpleLibrary},
    remote_call,
};

struct AccountInner {
    username: String,
    remote_id: RemoteId,
    protocol: Arc<ProtocolDescriptor>,
    library: Arc<dyn PurpleLibrary>,
    router: Arc<EventRouter<PurpleEvent>>,
    handle: RwLock<Option<AccountHandle>>,
    enabled: AtomicBool,
    /// Last-write-wins; cleared by the caller once consumed.
    waiting_join: Mutex<Option<JoinProperties>>,
    join_properties: Mutex<HashMap<String, JoinProperties>>,
    joined_rooms: Mutex<HashSet<String>>,
    joins: CorrelationRegistry<ChatJoined>,
    user_info: CorrelationRegistry<UserInfo>,
    avatars: CorrelationRegistry<Vec<u8>>,
    subscriptions: Vec<(&'static str, SubscriptionId)>,
}

impl AccountInner {
    fn bound(&self) -> Result<AccountHandle> {
        let handle = self.handle.read().unwrap_or_else(|e| e.into_inner());
        (*handle).ok_or(Error::NotBound)
    }

    fn bind(&self, account: AccountHandle) {
        *self.handle.write().unwrap_or_else(|e| e.into_inner()) = Some(account);
        self.enabled
            .store(self.library.get_enabled(account), Ordering::SeqCst);
    }

    fn is_ours(&self, account: &AccountRef) -> bool {
        account.remote_id() == self.remote_id
    }

    /// Correlation key for this account's single in-flight join.
    fn join_key(&self) -> String {
        format!("{CHAT_JOINED}:{}", self.remote_id)
    }

    /// Drop membership of every room joined with `properties`.
    fn forget_rooms(&self, properties: &JoinProperties) {
        let rooms: Vec<String> = self
            .join_properties
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, stored)| {
                !stored.is_empty()
                    && stored
                        .iter()
                        .all(|(key, value)| properties.get(key) == Some(value))
            })
            .map(|(room, _)| room.clone())
            .collect();
        let mut joined = self.joined_rooms.lock().unwrap_or_else(|e| e.into_inner());
        for room in rooms {
            if joined.remove(&room) {
                debug!(remote_id = %self.remote_id, room = %room, "room membership cleared");
            }
        }
    }

    fn on_event(&self, event: &PurpleEvent) {
        match event {
            PurpleEvent::ChatJoined(joined) if self.is_ours(&joined.account) => {
                let room = &joined.conversation.name;
                self.joined_rooms
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(room.clone());
                let waiting = self
                    .waiting_join
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .clone();
                if let Some(properties) = waiting {
                    self.join_properties
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(room.clone(), properties);
                }
                if !self.joins.resolve(&self.join_key(), joined.clone()) {
                    debug!(
                        remote_id = %self.remote_id,
                        room = %room,
                        "unsolicited or late chat-joined"
                    );
                }
            },
            PurpleEvent::UserInfo(response) if self.is_ours(&response.info.account) => {
                self.user_info
                    .resolve(&response.info.who, response.info.clone());
            },
            PurpleEvent::BuddyIcon(icon) if self.is_ours(&icon.account) => {
                self.avatars
                    .resolve(&avatar_key(&icon.who, &icon.icon_ref), icon.data.clone());
            },
            _ => {},
        }
    }
}

impl Drop for AccountInner {
    fn drop(&mut self) {
        for (name, id) in &self.subscriptions {
            self.router.unsubscribe(name, *id);
        }
    }
}

fn avatar_key(who: &str, icon_ref: &str) -> String {
    format!("{who}#{icon_ref}")
}

/// An account held by the legacy IM library.
#[derive(Clone)]
pub struct PurpleAccount {
    inner: Arc<AccountInner>,
}

impl PurpleAccount {
    pub fn new(
        username: impl Into<String>,
        protocol: Arc<ProtocolDescriptor>,
        library: Arc<dyn PurpleLibrary>,
        router: Arc<EventRouter<PurpleEvent>>,
    ) -> Self {
        let username = username.into();
        let remote_id = RemoteId::derive(&username, protocol.id());
        let inner = Arc::new_cyclic(|weak: &Weak<AccountInner>| {
            let subscriptions = [CHAT_JOINED, USER_INFO_RESPONSE, BUDDY_ICON]
                .into_iter()
                .map(|name| {
                    let weak = weak.clone();
                    let id = router.subscribe(name, move |event: &PurpleEvent| {
                        if let Some(inner) = weak.upgrade() {
                            inner.on_event(event);
                        }
                    });
                    (name, id)
                })
                .collect();
            AccountInner {
                username,
                remote_id,
                protocol,
                library,
                router,
                handle: RwLock::new(None),
                enabled: AtomicBool::new(false),
                waiting_join: Mutex::new(None),
                join_properties: Mutex::new(HashMap::new()),
                joined_rooms: Mutex::new(HashSet::new()),
                joins: CorrelationRegistry::new("purple.join"),
                user_info: CorrelationRegistry::new("purple.user_info"),
                avatars: CorrelationRegistry::new("purple.avatar"),
                subscriptions,
            }
        });
        Self { inner }
    }

    pub fn username(&self) -> &str {
        &self.inner.username
    }

    /// Properties of the join currently being waited on, if any.
    pub fn waiting_join_properties(&self) -> Option<JoinProperties> {
        self.inner
            .waiting_join
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clear_waiting_join(&self) -> Option<JoinProperties> {
        self.inner
            .waiting_join
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Decline an invitation to the room described by `properties`.
    pub fn reject_room(&self, properties: &JoinProperties) -> Result<()> {
        let account = self.inner.bound()?;
        self.inner.library.reject_chat(account, properties)?;
        self.inner.forget_rooms(properties);
        remote_call("purple.reject_chat");
        Ok(())
    }
}

#[async_trait]
impl BridgeAccount for PurpleAccount {
    fn remote_id(&self) -> &RemoteId {
        &self.inner.remote_id
    }

    fn protocol(&self) -> &Arc<ProtocolDescriptor> {
        &self.inner.protocol
    }

    fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.inner
            .bound()
            .is_ok_and(|account| self.inner.library.is_connected(account))
    }

    fn find_account(&self) -> Result<()> {
        let inner = &self.inner;
        let account = inner
            .library
            .find_account(&inner.username, inner.protocol.id())
            .ok_or_else(|| Error::AccountNotFound {
                username: inner.username.clone(),
                protocol_id: inner.protocol.id().to_string(),
            })?;
        inner.bind(account);
        debug!(remote_id = %inner.remote_id, enabled = self.is_enabled(), "bound library account");
        Ok(())
    }

    fn create_account(&self, password: Option<&str>) -> Result<()> {
        let inner = &self.inner;
        inner
            .protocol
            .require(Capability::AccountCreation, "create_account")?;
        let account = inner
            .library
            .new_account(&inner.username, inner.protocol.id(), password)?;
        inner.bind(account);
        info!(remote_id = %inner.remote_id, "created library account");
        Ok(())
    }

    fn set_enabled(&self, enabled: bool) -> Result<()> {
        let inner = &self.inner;
        inner
            .protocol
            .require(Capability::Enablement, "set_enabled")?;
        let account = inner.bound()?;
        inner.library.set_enabled(account, enabled)?;
        inner.enabled.store(enabled, Ordering::SeqCst);
        info!(remote_id = %inner.remote_id, enabled, "account enablement changed");
        Ok(())
    }

    async fn send_direct_message(&self, recipient: &str, message: &BasicMessage) -> Result<()> {
        let account = self.inner.bound()?;
        self.inner
            .library
            .send_im(account, recipient, &message.body)?;
        remote_call("purple.send_im");
        Ok(())
    }

    async fn send_room_message(&self, room: &str, message: &BasicMessage) -> Result<()> {
        self.inner
            .protocol
            .require(Capability::RoomMessages, "send_room_message")?;
        let account = self.inner.bound()?;
        self.inner
            .library
            .send_chat(account, room, &message.body)?;
        remote_call("purple.send_chat");
        Ok(())
    }

    async fn join_room(
        &self,
        properties: JoinProperties,
        timeout: Duration,
        record_as_waiting: bool,
    ) -> Result<Pending<ChatJoined>> {
        let inner = &self.inner;
        inner.protocol.require(Capability::RoomJoin, "join_room")?;
        let account = inner.bound()?;
        let pending = inner.joins.register(inner.join_key(), timeout)?;
        let previous = record_as_waiting.then(|| {
            let previous = inner
                .waiting_join
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .replace(properties.clone());
            if previous.is_some() {
                warn!(remote_id = %inner.remote_id, "replacing uncleared waiting join properties");
            }
            previous
        });
        if let Err(e) = inner.library.join_chat(account, &properties) {
            if let Some(previous) = previous {
                *inner.waiting_join.lock().unwrap_or_else(|e| e.into_inner()) = previous;
            }
            warn!(remote_id = %inner.remote_id, error = %e, "join call failed");
            return Err(e.into());
        }
        info!(remote_id = %inner.remote_id, "join requested");
        remote_call("purple.join_chat");
        Ok(pending)
    }

    async fn leave_room(&self, properties: &JoinProperties) -> Result<()> {
        let account = self.inner.bound()?;
        self.inner.library.leave_chat(account, properties)?;
        self.inner.forget_rooms(properties);
        remote_call("purple.leave_chat");
        Ok(())
    }

    fn is_in_room(&self, room: &str) -> bool {
        self.inner
            .joined_rooms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(room)
    }

    fn buddy(&self, user: &str) -> Result<Option<Buddy>> {
        self.inner.protocol.require(Capability::BuddyList, "buddy")?;
        let account = self.inner.bound()?;
        Ok(self.inner.library.find_buddy(account, user))
    }

    fn join_property(&self, room: &str, key: &str) -> Option<String> {
        let props = self
            .inner
            .join_properties
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        props.get(room)?.get(key).cloned()
    }

    fn set_join_properties(&self, room: &str, properties: JoinProperties) {
        let mut props = self
            .inner
            .join_properties
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        props.insert(room.to_string(), properties);
    }

    async fn lookup_user_info(&self, who: &str) -> Result<Pending<UserInfo>> {
        let inner = &self.inner;
        inner.protocol.require(Capability::UserInfo, "lookup_user_info")?;
        let account = inner.bound()?;
        let pending = inner.user_info.register(who, USER_INFO_TIMEOUT)?;
        inner.library.get_user_info(account, who)?;
        remote_call("purple.get_user_info");
        Ok(pending)
    }

    async fn fetch_avatar(&self, icon_ref: &str, who: &str) -> Result<Pending<Vec<u8>>> {
        let inner = &self.inner;
        inner.protocol.require(Capability::Avatars, "fetch_avatar")?;
        let account = inner.bound()?;
        let pending = inner
            .avatars
            .register(avatar_key(who, icon_ref), AVATAR_TIMEOUT)?;
        inner.library.request_buddy_icon(account, who, icon_ref)?;
        remote_call("purple.request_buddy_icon");
        Ok(pending)
    }

    fn join_options(&self) -> Result<Vec<JoinOption>> {
        let account = self.inner.bound()?;
        Ok(self.inner.library.chat_params(account))
    }
}

const USER_INFO_TIMEOUT: Duration = Duration::from_secs(10);
const AVATAR_TIMEOUT: Duration = Duration::from_secs(5);

/// Every capability the library exposes; individual protocol plugins may
/// be described with fewer.
pub fn purple_protocol(id: &str, display_name: &str) -> Arc<ProtocolDescriptor> {
    Arc::new(ProtocolDescriptor::new(id, display_name, [
        Capability::Enablement,
        Capability::AccountCreation,
        Capability::DirectMessages,
        Capability::RoomMessages,
        Capability::RoomJoin,
        Capability::UserInfo,
        Capability::Avatars,
        Capability::BuddyList,
    ]))
}

/// Builds [`PurpleAccount`]s for one protocol plugin.
pub struct PurpleAccountFactory {
    protocol: Arc<ProtocolDescriptor>,
    library: Arc<dyn PurpleLibrary>,
    router: Arc<EventRouter<PurpleEvent>>,
}

impl PurpleAccountFactory {
    pub fn new(
        protocol: Arc<ProtocolDescriptor>,
        library: Arc<dyn PurpleLibrary>,
        router: Arc<EventRouter<PurpleEvent>>,
    ) -> Self {
        Self {
            protocol,
            library,
            router,
        }
    }
}

impl AccountFactory for PurpleAccountFactory {
    fn protocol(&self) -> Arc<ProtocolDescriptor> {
        Arc::clone(&self.protocol)
    }

    fn create(&self, username: &str) -> Result<Arc<dyn BridgeAccount>> {
        Ok(Arc::new(PurpleAccount::new(
            username,
            Arc::clone(&self.protocol),
            Arc::clone(&self.library),
            Arc::clone(&self.router),
        )))
    }
}
