//! Namespaces and element helpers shared by the stanza builders and the
//! inbound router.

use minidom::Element;

use crate::error::Result;

pub const NS_CLIENT: &str = "jabber:client";
pub const NS_MUC: &str = "http://jabber.org/protocol/muc";
pub const NS_MUC_USER: &str = "http://jabber.org/protocol/muc#user";
pub const NS_OOB: &str = "jabber:x:oob";
pub const NS_STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
pub const NS_XHTML_IM: &str = "http://jabber.org/protocol/xhtml-im";
pub const NS_XHTML: &str = "http://www.w3.org/1999/xhtml";
pub const NS_VCARD: &str = "vcard-temp";

/// Serialize a stanza for the stream writer, without an XML declaration.
pub fn to_xml(stanza: &Element) -> Result<String> {
    let mut out = Vec::new();
    stanza.write_to(&mut out)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// First child named `name` in any namespace, ignoring ASCII case.
///
/// vCard field names are upper-case in XEP-0054 and lower-case in some
/// servers.
pub fn child_ignore_case<'a>(parent: &'a Element, name: &str) -> Option<&'a Element> {
    parent
        .children()
        .find(|child| child.name().eq_ignore_ascii_case(name))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serialized_text_is_escaped() {
        let el = Element::builder("body", NS_CLIENT)
            .append("<b>1 & 2</b>")
            .build();
        let xml = to_xml(&el).unwrap();
        assert!(!xml.contains("<b>"));
        assert!(!xml.starts_with("<?xml"));
        let parsed: Element = xml.parse().unwrap();
        assert_eq!(parsed.text(), "<b>1 & 2</b>");
    }

    #[test]
    fn child_lookup_ignores_case_and_namespace() {
        let vcard: Element = concat!(
            "<vCard xmlns='vcard-temp'>",
            "<PHOTO><TYPE>image/png</TYPE><BINVAL>aGk=</BINVAL></PHOTO>",
            "</vCard>",
        )
        .parse()
        .unwrap();
        let photo = child_ignore_case(&vcard, "photo").unwrap();
        assert_eq!(
            child_ignore_case(photo, "binval").map(Element::text).as_deref(),
            Some("aGk=")
        );
        assert!(vcard.get_child("photo", NS_VCARD).is_none());
        assert!(child_ignore_case(&vcard, "nickname").is_none());
    }
}
