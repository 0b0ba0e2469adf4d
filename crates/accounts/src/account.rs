use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::{
    Error, Result,
    correlation::Pending,
    events::ChatJoined,
    message::BasicMessage,
    protocol::ProtocolDescriptor,
};

/// Backend-defined properties needed to join a room, keyed by field
/// identifier (see [`BridgeAccount::join_options`]).
pub type JoinProperties = BTreeMap<String, String>;

/// Look up a required join property.
pub fn join_property<'a>(props: &'a JoinProperties, key: &str) -> Result<&'a str> {
    props
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::MissingJoinProperty { key: key.into() })
}

/// Stable cross-system key for one logical remote account.
///
/// Derived from the (local username, protocol id) pair. Both components are
/// percent-escaped before joining so that distinct pairs never collide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn derive(username: &str, protocol_id: &str) -> Self {
        Self(format!(
            "{}://{}",
            escape_component(protocol_id),
            escape_component(username)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            ':' => out.push_str("%3A"),
            _ => out.push(ch),
        }
    }
    out
}

/// The account half of an inbound event: which local account it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub username: String,
    pub protocol_id: String,
}

impl AccountRef {
    pub fn new(username: impl Into<String>, protocol_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            protocol_id: protocol_id.into(),
        }
    }

    pub fn remote_id(&self) -> RemoteId {
        RemoteId::derive(&self.username, &self.protocol_id)
    }
}

/// One field of the join form a caller must fill in for [`BridgeAccount::join_room`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOption {
    pub identifier: String,
    pub label: String,
    pub required: bool,
}

impl JoinOption {
    pub fn new(identifier: impl Into<String>, label: impl Into<String>, required: bool) -> Self {
        Self {
            identifier: identifier.into(),
            label: label.into(),
            required,
        }
    }
}

/// A contact as reported by the backend's buddy list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buddy {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,
}

/// Result of a user-info lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub who: String,
    pub account: AccountRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Opaque avatar reference, passed back to [`BridgeAccount::fetch_avatar`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// The uniform account contract every backend implements.
///
/// Calls that return `Result<Pending<_>>` fail immediately for capability or
/// precondition errors; correlation failures (timeouts, missing payloads) are
/// only reported when the returned [`Pending`] is awaited.
#[async_trait]
pub trait BridgeAccount: Send + Sync {
    fn remote_id(&self) -> &RemoteId;

    fn protocol(&self) -> &Arc<ProtocolDescriptor>;

    fn is_enabled(&self) -> bool;

    fn is_connected(&self) -> bool;

    /// Bind this object to the backend's own account record.
    fn find_account(&self) -> Result<()>;

    /// Register a brand new account with the backend.
    fn create_account(&self, password: Option<&str>) -> Result<()>;

    fn set_enabled(&self, enabled: bool) -> Result<()>;

    async fn send_direct_message(&self, recipient: &str, message: &BasicMessage) -> Result<()>;

    async fn send_room_message(&self, room: &str, message: &BasicMessage) -> Result<()>;

    /// Start joining a room. The returned value settles once the backend
    /// confirms the join, or with [`Error::Timeout`] after `timeout`.
    async fn join_room(
        &self,
        properties: JoinProperties,
        timeout: Duration,
        record_as_waiting: bool,
    ) -> Result<Pending<ChatJoined>>;

    async fn leave_room(&self, properties: &JoinProperties) -> Result<()>;

    /// Membership as last observed locally. Never queries the backend.
    fn is_in_room(&self, room: &str) -> bool;

    fn buddy(&self, user: &str) -> Result<Option<Buddy>>;

    fn join_property(&self, room: &str, key: &str) -> Option<String>;

    fn set_join_properties(&self, room: &str, properties: JoinProperties);

    async fn lookup_user_info(&self, who: &str) -> Result<Pending<UserInfo>>;

    async fn fetch_avatar(&self, icon_ref: &str, who: &str) -> Result<Pending<Vec<u8>>>;

    fn join_options(&self) -> Result<Vec<JoinOption>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn remote_id_is_deterministic() {
        assert_eq!(
            RemoteId::derive("alice", "prpl-jabber"),
            RemoteId::derive("alice", "prpl-jabber")
        );
        assert_eq!(
            RemoteId::derive("alice", "prpl-jabber").as_str(),
            "prpl-jabber://alice"
        );
    }

    #[test]
    fn remote_id_is_injective_for_separator_lookalikes() {
        let pairs = [
            ("a://b", "c"),
            ("a", "b://c"),
            ("b", "c://a"),
            ("a:", "//b"),
            ("a%3A", "b"),
            ("a:", "b"),
            ("", "a"),
            ("a", ""),
        ];
        let ids: std::collections::HashSet<_> = pairs
            .iter()
            .map(|(user, proto)| RemoteId::derive(user, proto))
            .collect();
        assert_eq!(ids.len(), pairs.len());
    }

    #[test]
    fn account_ref_derives_matching_remote_id() {
        let account = AccountRef::new("bot@example.org", "xmpp-js");
        assert_eq!(
            account.remote_id(),
            RemoteId::derive("bot@example.org", "xmpp-js")
        );
    }

    #[test]
    fn remote_id_serializes_as_plain_string() {
        let id = RemoteId::derive("alice", "prpl-irc");
        let value = serde_json::to_value(&id).unwrap();
        assert_eq!(value, "prpl-irc://alice");
    }

    #[test]
    fn missing_join_property_is_reported_by_key() {
        let mut props = JoinProperties::new();
        props.insert("room".into(), "lobby".into());
        assert_eq!(join_property(&props, "room").unwrap(), "lobby");
        assert!(matches!(
            join_property(&props, "server"),
            Err(Error::MissingJoinProperty { ref key }) if key == "server"
        ));
    }
}
