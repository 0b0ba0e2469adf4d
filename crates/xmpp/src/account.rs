//! Native XMPP implementation of [`BridgeAccount`].
//!
//! Room joins are confirmed out of band: the join presence goes out on the
//! stream, and the server's self-presence later arrives through the router
//! as a `chat-joined` event. Last known membership (handles, waiting set) is
//! updated by every confirmation, while each caller's wait is a separate
//! one-shot [`Pending`] value that settles at most once.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use {
    async_trait::async_trait,
    base64::{Engine, engine::general_purpose::STANDARD},
    jid::{BareJid, FullJid, Jid},
    minidom::Element,
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use imbridge_accounts::{
    AccountFactory, AccountRef, BridgeAccount, Buddy, ChatJoined, Conversation,
    CorrelationRegistry, Error, EventRouter, JoinOption, JoinProperties, Pending, PresenceCache,
    ProtocolDescriptor, RemoteId, Result, SubscriptionId, UserInfo,
    events::{CHAT_JOINED, iq_event_name},
    join_property,
    message::BasicMessage,
};

use crate::{
    XMPP_PROTOCOL_ID,
    config::{CONFLICT_SUFFIX, XmppAccountConfig},
    events::XmppEvent,
    outbound::{self, MessageKind},
    remote_call,
    sent::SentMessageLog,
    stanza::{NS_VCARD, child_ignore_case, to_xml},
    writer::StanzaWriter,
    xmpp_protocol,
};

const ROOM: &str = "room";
const SERVER: &str = "server";
const HANDLE: &str = "handle";

/// Collaborators shared by every account on one XMPP stream.
#[derive(Clone)]
pub struct XmppConnection {
    pub writer: Arc<dyn StanzaWriter>,
    pub presence: Arc<dyn PresenceCache>,
    pub router: Arc<EventRouter<XmppEvent>>,
}

#[derive(Default)]
struct RoomState {
    /// Per room (`room@server`). Entries are never removed.
    join_properties: HashMap<String, JoinProperties>,
    /// Handle most recently requested per room, awaiting confirmation.
    requested: HashMap<String, String>,
    waiting: HashSet<String>,
}

struct AccountInner {
    jid: BareJid,
    remote_id: RemoteId,
    protocol: Arc<ProtocolDescriptor>,
    config: XmppAccountConfig,
    connection: XmppConnection,
    rooms: Mutex<RoomState>,
    joins: CorrelationRegistry<ChatJoined>,
    user_info: CorrelationRegistry<UserInfo>,
    avatars: CorrelationRegistry<Vec<u8>>,
    sent: Mutex<SentMessageLog>,
    joined_sub: SubscriptionId,
}

impl AccountInner {
    /// `jid/resource`, the address every outbound stanza is sent from.
    fn from_address(&self) -> String {
        format!("{}/{}", self.jid, self.config.resource)
    }

    fn default_handle(&self) -> &str {
        match self.jid.node() {
            Some(node) => node.as_str(),
            None => self.jid.domain().as_str(),
        }
    }

    fn account_ref(&self) -> AccountRef {
        AccountRef::new(self.jid.to_string(), XMPP_PROTOCOL_ID)
    }

    fn on_chat_joined(&self, joined: &ChatJoined) {
        if joined.account.remote_id() != self.remote_id {
            return;
        }
        let room = &joined.conversation.name;
        let handle = {
            let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
            let handle = rooms.requested.remove(room).or_else(|| {
                rooms
                    .join_properties
                    .get(room)
                    .and_then(|p| p.get(HANDLE).cloned())
            });
            let Some(handle) = handle else {
                debug!(
                    remote_id = %self.remote_id,
                    room = %room,
                    "join confirmed for a room never requested"
                );
                return;
            };
            rooms
                .join_properties
                .entry(room.clone())
                .or_default()
                .insert(HANDLE.into(), handle.clone());
            rooms.waiting.remove(room);
            handle
        };
        let key = format!("{room}/{handle}");
        if self.joins.resolve(&key, joined.clone()) {
            info!(remote_id = %self.remote_id, room = %room, handle = %handle, "joined room");
        } else {
            debug!(
                remote_id = %self.remote_id,
                room = %room,
                "late join confirmation, membership updated"
            );
        }
    }

    /// Undo the local bookkeeping of a join whose presence never went out.
    fn forget_join(&self, room: &str, handle: &str) {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        if rooms.requested.get(room).is_some_and(|h| h == handle) {
            rooms.requested.remove(room);
        }
        rooms.waiting.remove(room);
    }

    fn next_message_id(&self, message: &BasicMessage) -> String {
        message.id.clone().unwrap_or_else(|| {
            format!("{}{}", self.config.message_id_prefix, Uuid::new_v4().simple())
        })
    }

    async fn send_message(
        &self,
        kind: MessageKind,
        to: &str,
        message: &BasicMessage,
    ) -> Result<String> {
        let id = self.next_message_id(message);
        let stanza = outbound::message(kind, to, &self.from_address(), &id, message)?;
        // Recorded first so a reflected copy is recognised even if it races the write.
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(&id);
        self.connection.writer.write_stanza(stanza).await?;
        Ok(id)
    }
}

impl Drop for AccountInner {
    fn drop(&mut self) {
        self.connection
            .router
            .unsubscribe(CHAT_JOINED, self.joined_sub);
    }
}

/// An account on a native XMPP stream, addressed by its bare JID.
#[derive(Clone)]
pub struct XmppAccount {
    inner: Arc<AccountInner>,
}

impl XmppAccount {
    /// Any resource on `jid` is dropped; the account is addressed by its
    /// bare JID and sends from the configured resource.
    pub fn new(jid: &Jid, config: XmppAccountConfig, connection: XmppConnection) -> Self {
        let bare = jid.to_bare();
        let remote_id = RemoteId::derive(&bare.to_string(), XMPP_PROTOCOL_ID);
        let sent = SentMessageLog::new(config.sent_message_ttl(), config.sent_message_max_entries);
        let inner = Arc::new_cyclic(|weak: &Weak<AccountInner>| {
            let weak = weak.clone();
            let joined_sub = connection.router.subscribe(CHAT_JOINED, move |event: &XmppEvent| {
                if let (XmppEvent::ChatJoined(joined), Some(inner)) = (event, weak.upgrade()) {
                    inner.on_chat_joined(joined);
                }
            });
            AccountInner {
                jid: bare,
                remote_id,
                protocol: xmpp_protocol(),
                config,
                connection,
                rooms: Mutex::new(RoomState::default()),
                joins: CorrelationRegistry::new("xmpp.join"),
                user_info: CorrelationRegistry::new("xmpp.user_info"),
                avatars: CorrelationRegistry::new("xmpp.avatar"),
                sent: Mutex::new(sent),
                joined_sub,
            }
        });
        debug!(remote_id = %inner.remote_id, "xmpp account created");
        Self { inner }
    }

    pub fn jid(&self) -> &BareJid {
        &self.inner.jid
    }

    pub fn config(&self) -> &XmppAccountConfig {
        &self.inner.config
    }

    /// Retry a join rejected with a nick conflict, once.
    ///
    /// `from` is the occupant address the conflict came back from. The retry
    /// asks for the same handle with [`CONFLICT_SUFFIX`] appended; a handle
    /// that already carries the suffix fails with
    /// [`Error::ConflictExhausted`] and nothing is written.
    pub async fn retry_join(&self, from: &FullJid) -> Result<Pending<ChatJoined>> {
        let handle = from.resource().as_str();
        let bare = from.to_bare();
        if handle.ends_with(CONFLICT_SUFFIX) {
            warn!(
                remote_id = %self.inner.remote_id,
                room = %bare,
                handle,
                "nick conflict on retried handle, giving up"
            );
            return Err(Error::ConflictExhausted {
                handle: handle.to_string(),
                marker: CONFLICT_SUFFIX.into(),
            });
        }
        let room = from.node().ok_or_else(|| Error::MissingJoinProperty {
            key: ROOM.into(),
        })?;
        info!(
            remote_id = %self.inner.remote_id,
            room = %bare,
            handle,
            "retrying join after nick conflict"
        );
        let properties = JoinProperties::from([
            (ROOM.to_string(), room.as_str().to_string()),
            (SERVER.to_string(), from.domain().as_str().to_string()),
            (HANDLE.to_string(), format!("{handle}{CONFLICT_SUFFIX}")),
        ]);
        self.join_room(properties, self.inner.config.join_timeout(), true)
            .await
    }

    /// Decline a room by sending `unavailable` to the joined address.
    ///
    /// Any join still waiting for that room is dropped from the waiting set.
    pub async fn reject_room(&self, properties: &JoinProperties) -> Result<()> {
        let room = format!(
            "{}@{}",
            join_property(properties, ROOM)?,
            join_property(properties, SERVER)?
        );
        self.inner
            .rooms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .waiting
            .remove(&room);
        self.leave_room(properties).await
    }

    /// True if `id` belongs to a message this account sent recently.
    pub fn was_sent_by_bridge(&self, id: &str) -> bool {
        self.inner
            .sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }

    pub fn is_waiting(&self, room: &str) -> bool {
        let rooms = self.inner.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms.waiting.contains(room)
    }

    /// Rooms with a join sent but not yet confirmed, sorted.
    pub fn waiting_rooms(&self) -> Vec<String> {
        let rooms = self.inner.rooms.lock().unwrap_or_else(|e| e.into_inner());
        let mut waiting: Vec<_> = rooms.waiting.iter().cloned().collect();
        waiting.sort();
        waiting
    }

    pub fn conversation(&self, _name: &str) -> Result<Conversation> {
        Err(Error::not_supported(XMPP_PROTOCOL_ID, "conversation"))
    }
}

#[async_trait]
impl BridgeAccount for XmppAccount {
    fn remote_id(&self) -> &RemoteId {
        &self.inner.remote_id
    }

    fn protocol(&self) -> &Arc<ProtocolDescriptor> {
        &self.inner.protocol
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn find_account(&self) -> Result<()> {
        Ok(())
    }

    fn create_account(&self, _password: Option<&str>) -> Result<()> {
        Err(Error::not_supported(XMPP_PROTOCOL_ID, "create_account"))
    }

    fn set_enabled(&self, _enabled: bool) -> Result<()> {
        Err(Error::not_supported(XMPP_PROTOCOL_ID, "set_enabled"))
    }

    async fn send_direct_message(&self, recipient: &str, message: &BasicMessage) -> Result<()> {
        let id = self
            .inner
            .send_message(MessageKind::Chat, recipient, message)
            .await?;
        debug!(remote_id = %self.inner.remote_id, recipient, id = %id, "sent direct message");
        remote_call("xmpp.message.im");
        Ok(())
    }

    async fn send_room_message(&self, room: &str, message: &BasicMessage) -> Result<()> {
        let id = self
            .inner
            .send_message(MessageKind::GroupChat, room, message)
            .await?;
        debug!(remote_id = %self.inner.remote_id, room, id = %id, "sent room message");
        remote_call("xmpp.message.groupchat");
        Ok(())
    }

    async fn join_room(
        &self,
        properties: JoinProperties,
        timeout: Duration,
        record_as_waiting: bool,
    ) -> Result<Pending<ChatJoined>> {
        let inner = &self.inner;
        let room = format!(
            "{}@{}",
            join_property(&properties, ROOM)?,
            join_property(&properties, SERVER)?
        );
        let handle = properties
            .get(HANDLE)
            .cloned()
            .unwrap_or_else(|| inner.default_handle().to_string());
        let to = format!("{room}/{handle}");
        let from = inner.from_address();
        let presence = to_xml(&outbound::join_presence(&to, &from))?;

        let pending = inner.joins.register(to.clone(), timeout)?;
        {
            let mut rooms = inner.rooms.lock().unwrap_or_else(|e| e.into_inner());
            if record_as_waiting {
                rooms.waiting.insert(room.clone());
            }
            rooms.requested.insert(room.clone(), handle.clone());
            let mut stored = properties;
            stored.remove(HANDLE);
            rooms.join_properties.entry(room.clone()).or_default().extend(stored);
        }

        info!(remote_id = %inner.remote_id, to = %to, from = %from, "joining room");
        if let Err(e) = inner.connection.writer.write_stanza(presence).await {
            inner.forget_join(&room, &handle);
            return Err(e);
        }
        remote_call("xmpp.presence.join");
        Ok(pending)
    }

    async fn leave_room(&self, properties: &JoinProperties) -> Result<()> {
        let inner = &self.inner;
        let room = format!(
            "{}@{}",
            join_property(properties, ROOM)?,
            join_property(properties, SERVER)?
        );
        let handle = properties
            .get(HANDLE)
            .cloned()
            .or_else(|| self.join_property(&room, HANDLE))
            .unwrap_or_else(|| inner.default_handle().to_string());
        let to = format!("{room}/{handle}");
        let presence = to_xml(&outbound::leave_presence(&to, &inner.from_address()))?;
        inner.connection.writer.write_stanza(presence).await?;
        info!(remote_id = %inner.remote_id, to = %to, "left room");
        remote_call("xmpp.presence.left");
        Ok(())
    }

    fn is_in_room(&self, room: &str) -> bool {
        let Some(handle) = self.join_property(room, HANDLE) else {
            debug!(remote_id = %self.inner.remote_id, room, "no handle recorded for room");
            return false;
        };
        self.inner
            .connection
            .presence
            .status(&format!("{room}/{handle}"))
            .is_some_and(|status| status.online)
    }

    fn buddy(&self, _user: &str) -> Result<Option<Buddy>> {
        Ok(None)
    }

    fn join_property(&self, room: &str, key: &str) -> Option<String> {
        let rooms = self.inner.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms.join_properties.get(room)?.get(key).cloned()
    }

    fn set_join_properties(&self, room: &str, properties: JoinProperties) {
        let mut rooms = self.inner.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms.join_properties.insert(room.to_string(), properties);
    }

    async fn lookup_user_info(&self, who: &str) -> Result<Pending<UserInfo>> {
        let inner = &self.inner;
        let pending = inner
            .user_info
            .register(who, inner.config.user_info_timeout())?;

        let fallback = UserInfo {
            who: who.to_string(),
            account: inner.account_ref(),
            nickname: Some(fallback_nickname(who)),
            avatar: inner
                .connection
                .presence
                .status(who)
                .and_then(|status| status.photo_id),
        };
        let id = Uuid::new_v4().to_string();
        let event = iq_event_name(&id);
        let registry = inner.user_info.clone();
        let sub = inner.connection.router.subscribe_once(event.as_str(), move |ev: &XmppEvent| {
            let XmppEvent::Stanza(reply) = ev else {
                return;
            };
            let mut info = fallback.clone();
            if let Some(nickname) = vcard_nickname(reply) {
                info.nickname = Some(nickname);
            }
            let who = info.who.clone();
            registry.resolve(&who, info);
        });
        let router = Arc::clone(&inner.connection.router);
        let pending = pending.with_cleanup(move || {
            router.unsubscribe(&event, sub);
        });

        debug!(remote_id = %inner.remote_id, who, id = %id, "requesting vcard for user info");
        let query = to_xml(&outbound::vcard_query(&inner.from_address(), who, &id))?;
        inner.connection.writer.write_stanza(query).await?;
        remote_call("xmpp.iq.vc2");
        Ok(pending)
    }

    async fn fetch_avatar(&self, icon_ref: &str, who: &str) -> Result<Pending<Vec<u8>>> {
        let inner = &self.inner;
        let to = who.parse::<Jid>().map_err(crate::Error::from)?.to_bare();
        let id = Uuid::new_v4().to_string();
        let pending = inner
            .avatars
            .register(id.clone(), inner.config.avatar_timeout())?;

        let event = iq_event_name(&id);
        let registry = inner.avatars.clone();
        let key = id.clone();
        let sub = inner.connection.router.subscribe_once(event.as_str(), move |ev: &XmppEvent| {
            let XmppEvent::Stanza(reply) = ev else {
                return;
            };
            match vcard_photo(&key, reply) {
                Ok(bytes) => registry.resolve(&key, bytes),
                Err(e) => registry.reject(&key, e),
            };
        });
        let router = Arc::clone(&inner.connection.router);
        let pending = pending.with_cleanup(move || {
            router.unsubscribe(&event, sub);
        });

        info!(remote_id = %inner.remote_id, who, icon_ref, id = %id, "fetching avatar");
        let query = to_xml(&outbound::vcard_query(&inner.from_address(), &to.to_string(), &id))?;
        inner.connection.writer.write_stanza(query).await?;
        remote_call("xmpp.iq.vc2");
        Ok(pending)
    }

    fn join_options(&self) -> Result<Vec<JoinOption>> {
        Ok(vec![
            JoinOption::new(SERVER, SERVER, true),
            JoinOption::new(ROOM, ROOM, true),
            JoinOption::new(HANDLE, HANDLE, false),
        ])
    }
}

/// Resource for occupant addresses, otherwise the local part.
fn fallback_nickname(who: &str) -> String {
    let Ok(jid) = who.parse::<Jid>() else {
        return who.to_string();
    };
    if let Some(resource) = jid.resource() {
        return resource.as_str().to_string();
    }
    match jid.node() {
        Some(node) => node.as_str().to_string(),
        None => jid.domain().as_str().to_string(),
    }
}

fn vcard_of(reply: &Element) -> Option<&Element> {
    reply
        .get_child("vCard", NS_VCARD)
        .or_else(|| child_ignore_case(reply, "vCard"))
}

fn vcard_nickname(reply: &Element) -> Option<String> {
    let vcard = vcard_of(reply)?;
    ["NICKNAME", "FN"].into_iter().find_map(|field| {
        let text = child_ignore_case(vcard, field)?.text();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    })
}

fn vcard_photo(id: &str, reply: &Element) -> Result<Vec<u8>> {
    let binval = vcard_of(reply)
        .and_then(|v| child_ignore_case(v, "PHOTO"))
        .and_then(|p| child_ignore_case(p, "BINVAL"))
        .map(Element::text)
        .ok_or_else(|| Error::missing_payload(iq_event_name(id), "vCard > PHOTO > BINVAL"))?;
    let compact: String = binval.split_whitespace().collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(crate::Error::from)?;
    Ok(bytes)
}

/// Builds [`XmppAccount`]s that share one stream.
pub struct XmppAccountFactory {
    config: XmppAccountConfig,
    connection: XmppConnection,
}

impl XmppAccountFactory {
    pub fn new(config: XmppAccountConfig, connection: XmppConnection) -> Self {
        Self { config, connection }
    }
}

impl AccountFactory for XmppAccountFactory {
    fn protocol(&self) -> Arc<ProtocolDescriptor> {
        xmpp_protocol()
    }

    fn create(&self, username: &str) -> Result<Arc<dyn BridgeAccount>> {
        let jid: Jid = username.parse().map_err(crate::Error::from)?;
        Ok(Arc::new(XmppAccount::new(
            &jid,
            self.config.clone(),
            self.connection.clone(),
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::*,
        crate::writer::MemoryWriter,
        imbridge_accounts::{MemoryPresenceCache, PresenceStatus},
    };

    fn setup() -> (XmppAccount, Arc<MemoryWriter>, Arc<MemoryPresenceCache>) {
        let writer = Arc::new(MemoryWriter::new());
        let presence = Arc::new(MemoryPresenceCache::new());
        let connection = XmppConnection {
            writer: writer.clone(),
            presence: presence.clone(),
            router: Arc::new(EventRouter::new()),
        };
        let jid: Jid = "bot@example.org".parse().unwrap();
        let account = XmppAccount::new(&jid, XmppAccountConfig::default(), connection);
        (account, writer, presence)
    }

    fn parse(xml: &str) -> Element {
        xml.parse().unwrap()
    }

    #[test]
    fn fallback_nickname_prefers_resource() {
        assert_eq!(fallback_nickname("room@muc.example.org/alice"), "alice");
        assert_eq!(fallback_nickname("bob@example.org"), "bob");
        assert_eq!(fallback_nickname("example.org"), "example.org");
    }

    #[test]
    fn vcard_nickname_falls_back_to_full_name() {
        let reply = parse(concat!(
            "<iq xmlns='jabber:client' type='result'><vCard xmlns='vcard-temp'>",
            "<NICKNAME>  </NICKNAME><FN>Alice Liddell</FN>",
            "</vCard></iq>",
        ));
        assert_eq!(vcard_nickname(&reply).as_deref(), Some("Alice Liddell"));
        assert_eq!(vcard_nickname(&parse("<iq xmlns='jabber:client'/>")), None);
    }

    #[test]
    fn vcard_photo_decodes_wrapped_base64() {
        let reply = parse(concat!(
            "<iq xmlns='jabber:client' type='result'><vCard xmlns='vcard-temp'>",
            "<photo><binval>aGVs\nbG8=</binval></photo>",
            "</vCard></iq>",
        ));
        assert_eq!(vcard_photo("q1", &reply).unwrap(), b"hello");
    }

    #[test]
    fn vcard_photo_without_binval_is_missing_payload() {
        let reply = parse("<iq xmlns='jabber:client'><vCard xmlns='vcard-temp'/></iq>");
        assert!(matches!(
            vcard_photo("q1", &reply),
            Err(Error::MissingPayload { .. })
        ));
    }

    #[test]
    fn join_options_list_server_room_handle() {
        let (account, ..) = setup();
        let ids: Vec<_> = account
            .join_options()
            .unwrap()
            .into_iter()
            .map(|o| (o.identifier, o.required))
            .collect();
        assert_eq!(ids, [
            ("server".to_string(), true),
            ("room".to_string(), true),
            ("handle".to_string(), false),
        ]);
    }

    #[test]
    fn is_in_room_reads_presence_for_recorded_handle() {
        let (account, _, presence) = setup();
        let room = "lobby@conference.example.org";
        assert!(!account.is_in_room(room));
        account.set_join_properties(room, JoinProperties::from([(
            "handle".to_string(),
            "bot".to_string(),
        )]));
        assert!(!account.is_in_room(room));
        presence.set("lobby@conference.example.org/bot", PresenceStatus {
            online: true,
            photo_id: None,
        });
        assert!(account.is_in_room(room));
    }

    #[test]
    fn capability_stubs() {
        let (account, ..) = setup();
        assert!(account.is_enabled());
        assert!(account.is_connected());
        assert!(account.find_account().is_ok());
        assert!(account.buddy("alice@example.org").unwrap().is_none());
        assert!(matches!(
            account.create_account(Some("pw")),
            Err(Error::NotSupported { .. })
        ));
        assert!(matches!(
            account.conversation("lobby"),
            Err(Error::NotSupported { .. })
        ));
    }

    #[tokio::test]
    async fn join_without_handle_uses_local_part() {
        let (account, writer, _) = setup();
        let props = JoinProperties::from([
            ("room".to_string(), "lobby".to_string()),
            ("server".to_string(), "conference.example.org".to_string()),
        ]);
        let _pending = account
            .join_room(props, Duration::from_secs(5), false)
            .await
            .unwrap();
        let written = writer.take();
        assert_eq!(written.len(), 1);
        let presence = parse(&written[0]);
        assert_eq!(presence.attr("to"), Some("lobby@conference.example.org/bot"));
        assert_eq!(presence.attr("from"), Some("bot@example.org/bridge"));
        assert!(!account.is_waiting("lobby@conference.example.org"));
    }

    #[tokio::test]
    async fn join_missing_server_fails_before_writing() {
        let (account, writer, _) = setup();
        let props = JoinProperties::from([("room".to_string(), "lobby".to_string())]);
        let err = account
            .join_room(props, Duration::from_secs(5), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingJoinProperty { ref key } if key == "server"));
        assert!(writer.written().is_empty());
    }

    #[tokio::test]
    async fn leave_uses_recorded_handle() {
        let (account, writer, _) = setup();
        account.set_join_properties(
            "lobby@conference.example.org",
            JoinProperties::from([("handle".to_string(), "bot[m]".to_string())]),
        );
        let props = JoinProperties::from([
            ("room".to_string(), "lobby".to_string()),
            ("server".to_string(), "conference.example.org".to_string()),
        ]);
        account.leave_room(&props).await.unwrap();
        let presence = parse(&writer.take()[0]);
        assert_eq!(presence.attr("to"), Some("lobby@conference.example.org/bot[m]"));
        assert_eq!(presence.attr("type"), Some("unavailable"));
    }

    #[tokio::test]
    async fn reject_clears_waiting_and_sends_unavailable() {
        let (account, writer, _) = setup();
        let props = JoinProperties::from([
            ("room".to_string(), "lobby".to_string()),
            ("server".to_string(), "conference.example.org".to_string()),
        ]);
        let _pending = account
            .join_room(props.clone(), Duration::from_secs(5), true)
            .await
            .unwrap();
        assert!(account.is_waiting("lobby@conference.example.org"));
        writer.take();

        account.reject_room(&props).await.unwrap();
        assert!(!account.is_waiting("lobby@conference.example.org"));
        let written = writer.take();
        assert_eq!(written.len(), 1);
        assert_eq!(parse(&written[0]).attr("type"), Some("unavailable"));
    }

    #[tokio::test]
    async fn sent_ids_are_remembered() {
        let (account, writer, _) = setup();
        account
            .send_direct_message(
                "alice@example.org",
                &BasicMessage::text("hi").with_id("fixed-id"),
            )
            .await
            .unwrap();
        assert!(account.was_sent_by_bridge("fixed-id"));
        assert!(!account.was_sent_by_bridge("other"));
        let message = parse(&writer.written()[0]);
        assert_eq!(message.attr("type"), Some("chat"));
        assert_eq!(message.attr("id"), Some("fixed-id"));
    }

    #[tokio::test]
    async fn generated_ids_carry_prefix() {
        let (account, writer, _) = setup();
        account
            .send_room_message("lobby@conference.example.org", &BasicMessage::text("hi"))
            .await
            .unwrap();
        let message = parse(&writer.written()[0]);
        assert!(message.attr("id").is_some_and(|id| id.starts_with("pbridge")));
    }
}
