use serde::{Deserialize, Serialize};

/// Format tag of the HTML alternative body.
pub const HTML_FORMAT: &str = "html";

/// A file or media item referenced by URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
}

/// An alternative rendering of the message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedBody {
    #[serde(rename = "type")]
    pub format: String,
    pub body: String,
}

/// Protocol-neutral outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicMessage {
    /// Message id to reuse on the wire; backends generate one when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub formatted: Vec<FormattedBody>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl BasicMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.formatted.push(FormattedBody {
            format: HTML_FORMAT.into(),
            body: html.into(),
        });
        self
    }

    pub fn with_attachment(mut self, uri: impl Into<String>) -> Self {
        self.attachments.push(Attachment {
            uri: uri.into(),
            mimetype: None,
        });
        self
    }

    /// The first HTML alternative, if any.
    pub fn html(&self) -> Option<&str> {
        self.formatted
            .iter()
            .find(|f| f.format == HTML_FORMAT)
            .map(|f| f.body.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn html_picks_first_html_alternative() {
        let mut msg = BasicMessage::text("hi");
        msg.formatted.push(FormattedBody {
            format: "markdown".into(),
            body: "**hi**".into(),
        });
        let msg = msg.with_html("<b>hi</b>").with_html("<i>hi</i>");
        assert_eq!(msg.html(), Some("<b>hi</b>"));
    }

    #[test]
    fn plain_message_has_no_html() {
        assert_eq!(BasicMessage::text("hi").html(), None);
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let msg: BasicMessage = serde_json::from_value(serde_json::json!({
            "body": "hello",
            "formatted": [{ "type": "html", "body": "<p>hello</p>" }],
        }))
        .unwrap();
        assert_eq!(msg.body, "hello");
        assert_eq!(msg.html(), Some("<p>hello</p>"));
        assert!(msg.attachments.is_empty());
        assert!(msg.id.is_none());
    }
}
