//! Stanza construction for outbound messages, presences and info queries.

use {minidom::Element, tracing::trace, uuid::Uuid};

use imbridge_accounts::BasicMessage;

use crate::{
    error::Result,
    stanza::{NS_CLIENT, NS_MUC, NS_OOB, NS_VCARD, NS_XHTML, NS_XHTML_IM, to_xml},
};

/// `type` attribute of a message stanza.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Chat,
    GroupChat,
}

impl MessageKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::GroupChat => "groupchat",
        }
    }
}

/// Serialize a message stanza.
///
/// Attachments win over rich content: each becomes an out-of-band `<x>`
/// element and the plain body is replaced with the attachment URI, since
/// many clients only look at the body. Without attachments an HTML
/// alternative is embedded as XHTML-IM. The HTML is spliced in after
/// serialization through a unique placeholder so it is not escaped.
pub fn message(
    kind: MessageKind,
    to: &str,
    from: &str,
    id: &str,
    msg: &BasicMessage,
) -> Result<String> {
    let mut body = msg.body.clone();
    let mut stanza = Element::builder("message", NS_CLIENT)
        .attr("to", to)
        .attr("id", id)
        .attr("from", from)
        .attr("type", kind.as_str());

    let mut html_patch = None;
    if !msg.attachments.is_empty() {
        for attachment in &msg.attachments {
            stanza = stanza.append(
                Element::builder("x", NS_OOB)
                    .append(
                        Element::builder("url", NS_OOB)
                            .append(attachment.uri.as_str())
                            .build(),
                    )
                    .build(),
            );
            body.clone_from(&attachment.uri);
        }
    } else if let Some(html) = msg.html() {
        let anchor = placeholder(&[to, from, id, &msg.body, html]);
        stanza = stanza.append(
            Element::builder("html", NS_XHTML_IM)
                .append(
                    Element::builder("body", NS_XHTML)
                        .append(anchor.as_str())
                        .build(),
                )
                .build(),
        );
        html_patch = Some((anchor, html));
    }

    let stanza = stanza
        .append(Element::builder("body", NS_CLIENT).append(body).build())
        .build();
    let serialized = to_xml(&stanza)?;
    Ok(match html_patch {
        Some((anchor, html)) => {
            trace!(id, "splicing html body into stanza");
            serialized.replacen(&anchor, html, 1)
        },
        None => serialized,
    })
}

/// A token that appears in none of `haystacks`.
fn placeholder(haystacks: &[&str]) -> String {
    loop {
        let candidate = format!("imbridge-html-{}", Uuid::new_v4().simple());
        if !haystacks.iter().any(|h| h.contains(&candidate)) {
            return candidate;
        }
    }
}

/// MUC join presence, requesting no history.
pub fn join_presence(to: &str, from: &str) -> Element {
    Element::builder("presence", NS_CLIENT)
        .attr("to", to)
        .attr("from", from)
        .append(
            Element::builder("x", NS_MUC)
                .append(
                    Element::builder("history", NS_MUC)
                        .attr("maxchars", "0")
                        .build(),
                )
                .build(),
        )
        .build()
}

pub fn leave_presence(to: &str, from: &str) -> Element {
    Element::builder("presence", NS_CLIENT)
        .attr("to", to)
        .attr("from", from)
        .attr("type", "unavailable")
        .build()
}

pub fn vcard_query(from: &str, to: &str, id: &str) -> Element {
    Element::builder("iq", NS_CLIENT)
        .attr("from", from)
        .attr("to", to)
        .attr("type", "get")
        .attr("id", id)
        .append(Element::builder("vCard", NS_VCARD).build())
        .build()
}
