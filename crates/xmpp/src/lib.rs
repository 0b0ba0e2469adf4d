//! Native XMPP backend for imbridge.
//!
//! Speaks the wire protocol directly: builds message, presence and
//! info-query stanzas, runs the room join/retry state machine, and settles
//! pending joins and vCard lookups when the matching stanzas come back
//! through the backend's [`imbridge_accounts::EventRouter`].

pub mod account;
pub mod config;
pub mod error;
pub mod events;
pub mod outbound;
pub mod sent;
pub mod stanza;
pub mod writer;

use std::sync::{Arc, LazyLock};

use imbridge_accounts::{Capability, ProtocolDescriptor};

pub use {
    account::{XmppAccount, XmppAccountFactory, XmppConnection},
    config::{CONFLICT_SUFFIX, XmppAccountConfig},
    error::{Error, Result},
    events::{XmppEvent, route_stanza},
    jid::{BareJid, FullJid, Jid},
    minidom::Element,
    writer::{ChannelWriter, MemoryWriter, StanzaWriter},
};

pub const XMPP_PROTOCOL_ID: &str = "xmpp-js";

/// Descriptor shared by every native XMPP account.
pub fn xmpp_protocol() -> Arc<ProtocolDescriptor> {
    static PROTOCOL: LazyLock<Arc<ProtocolDescriptor>> = LazyLock::new(|| {
        Arc::new(ProtocolDescriptor::new(XMPP_PROTOCOL_ID, "XMPP", [
            Capability::DirectMessages,
            Capability::RoomMessages,
            Capability::RoomJoin,
            Capability::UserInfo,
            Capability::Avatars,
        ]))
    });
    Arc::clone(&PROTOCOL)
}

/// Count one outbound protocol call.
#[cfg(feature = "metrics")]
fn remote_call(method: &'static str) {
    metrics::counter!("remote_calls_total", "method" => method).increment(1);
}

#[cfg(not(feature = "metrics"))]
fn remote_call(_method: &'static str) {}
