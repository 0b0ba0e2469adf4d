use {
    imbridge_accounts::{
        AccountRef, ChatJoined, EventRouter,
        events::{CHAT_JOINED, iq_event_name},
    },
    jid::Jid,
    minidom::Element,
    tracing::debug,
};

use crate::{
    XMPP_PROTOCOL_ID,
    stanza::{NS_MUC_USER, NS_STANZAS},
};

/// Emitted for an error presence carrying `<conflict/>` (nick already taken).
pub const PRESENCE_CONFLICT: &str = "presence.conflict";
/// Emitted for inbound stanzas nothing more specific matched.
pub const STANZA: &str = "stanza";

/// Events flowing through an XMPP backend's router.
#[derive(Debug, Clone, PartialEq)]
pub enum XmppEvent {
    ChatJoined(ChatJoined),
    Stanza(Element),
}

/// MUC status code marking the presence that reflects our own join.
const SELF_PRESENCE_STATUS: &str = "110";

/// Classify an inbound stanza and emit it under the matching event name.
///
/// - `iq` replies go to `iq.<id>`,
/// - a MUC self-presence becomes `chat-joined` for the account it was sent to,
/// - an error presence with a nick conflict goes to `presence.conflict`,
/// - anything else goes to `stanza`.
pub fn route_stanza(router: &EventRouter<XmppEvent>, stanza: Element) -> usize {
    if stanza.name() == "iq"
        && matches!(stanza.attr("type"), Some("result" | "error"))
        && let Some(id) = stanza.attr("id")
    {
        let name = iq_event_name(id);
        return router.emit(&name, &XmppEvent::Stanza(stanza));
    }

    if stanza.name() == "presence" {
        if let Some(joined) = self_join(&stanza) {
            debug!(room = %joined.conversation.name, "room join confirmed");
            return router.emit(CHAT_JOINED, &XmppEvent::ChatJoined(joined));
        }
        if stanza.attr("type") == Some("error") && is_nick_conflict(&stanza) {
            return router.emit(PRESENCE_CONFLICT, &XmppEvent::Stanza(stanza));
        }
    }

    router.emit(STANZA, &XmppEvent::Stanza(stanza))
}

fn is_nick_conflict(presence: &Element) -> bool {
    presence
        .children()
        .filter(|c| c.name() == "error")
        .any(|e| e.get_child("conflict", NS_STANZAS).is_some())
}

fn self_join(presence: &Element) -> Option<ChatJoined> {
    if presence.attr("type").is_some() {
        return None;
    }
    let is_self = presence
        .children()
        .filter(|c| c.is("x", NS_MUC_USER))
        .flat_map(Element::children)
        .any(|c| c.name() == "status" && c.attr("code") == Some(SELF_PRESENCE_STATUS));
    if !is_self {
        return None;
    }
    let room: Jid = presence.attr("from")?.parse().ok()?;
    let account: Jid = presence.attr("to")?.parse().ok()?;
    Some(ChatJoined::new(
        room.to_bare().to_string(),
        AccountRef::new(account.to_bare().to_string(), XMPP_PROTOCOL_ID),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::*,
        std::sync::{Arc, Mutex},
    };

    fn capture(router: &EventRouter<XmppEvent>, name: &str) -> Arc<Mutex<Vec<XmppEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        router.subscribe(name, move |ev: &XmppEvent| {
            sink.lock().unwrap_or_else(|e| e.into_inner()).push(ev.clone());
        });
        seen
    }

    fn parse(xml: &str) -> Element {
        xml.parse().unwrap()
    }

    #[test]
    fn iq_result_routes_by_id() {
        let router = EventRouter::new();
        let seen = capture(&router, "iq.abc");
        let iq = parse("<iq xmlns='jabber:client' type='result' id='abc'/>");
        assert_eq!(route_stanza(&router, iq), 1);
        assert_eq!(seen.lock().unwrap_or_else(|e| e.into_inner()).len(), 1);
    }

    #[test]
    fn iq_request_is_plain_stanza() {
        let router = EventRouter::new();
        let seen = capture(&router, STANZA);
        let iq = parse("<iq xmlns='jabber:client' type='get' id='abc'/>");
        assert_eq!(route_stanza(&router, iq), 1);
        assert_eq!(seen.lock().unwrap_or_else(|e| e.into_inner()).len(), 1);
    }

    #[test]
    fn self_presence_becomes_chat_joined() {
        let router = EventRouter::new();
        let seen = capture(&router, CHAT_JOINED);
        let presence = parse(concat!(
            "<presence xmlns='jabber:client' from='lobby@conference.example.org/bot' ",
            "to='bot@example.org/bridge'>",
            "<x xmlns='http://jabber.org/protocol/muc#user'><status code='110'/></x>",
            "</presence>",
        ));
        route_stanza(&router, presence);
        let seen = seen.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(seen.as_slice(), [XmppEvent::ChatJoined(ChatJoined::new(
            "lobby@conference.example.org",
            AccountRef::new("bot@example.org", XMPP_PROTOCOL_ID),
        ))]);
    }

    #[test]
    fn occupant_presence_is_plain_stanza() {
        let router = EventRouter::new();
        let joined = capture(&router, CHAT_JOINED);
        let other = capture(&router, STANZA);
        let presence = parse(concat!(
            "<presence xmlns='jabber:client' from='lobby@conference.example.org/alice' ",
            "to='bot@example.org/bridge'>",
            "<x xmlns='http://jabber.org/protocol/muc#user'/>",
            "</presence>",
        ));
        route_stanza(&router, presence);
        assert!(joined.lock().unwrap_or_else(|e| e.into_inner()).is_empty());
        assert_eq!(other.lock().unwrap_or_else(|e| e.into_inner()).len(), 1);
    }

    #[test]
    fn nick_conflict_is_routed() {
        let router = EventRouter::new();
        let seen = capture(&router, PRESENCE_CONFLICT);
        let presence = parse(concat!(
            "<presence xmlns='jabber:client' from='lobby@conference.example.org/bot' type='error'>",
            "<error type='cancel'>",
            "<conflict xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/>",
            "</error></presence>",
        ));
        route_stanza(&router, presence);
        assert_eq!(seen.lock().unwrap_or_else(|e| e.into_inner()).len(), 1);
    }
}
