//! Message records (spec §3) and their kind enum.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::store::Item;
use crate::util::ksuid;

use super::keys;

/// `K` — how the inbound update was classified at ingest time (spec §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    TGText,
    TGVoice,
    TGPhoto,
    TGUnknown,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::TGText => "TGText",
            MessageKind::TGVoice => "TGVoice",
            MessageKind::TGPhoto => "TGPhoto",
            MessageKind::TGUnknown => "TGUnknown",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "TGText" => MessageKind::TGText,
            "TGVoice" => MessageKind::TGVoice,
            "TGPhoto" => MessageKind::TGPhoto,
            _ => MessageKind::TGUnknown,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub pk: String,
    pub channel_pk: String,
    pub author_pk: String,
    pub kind: MessageKind,
    pub ums: String,
    pub crtd: i64,
    /// Raw inbound update JSON (`D.orig`).
    pub orig: serde_json::Value,
    /// User-visible text (`D.text`).
    pub text: String,
    /// Transcript written by the voice enricher (`D.text_recogn`).
    pub text_recogn: Option<String>,
    pub updated_at: Option<i64>,
}

impl Message {
    /// Creates a fresh message with a new ksuid PK (spec §4.C step 4).
    pub fn new(
        channel_pk: String,
        author_pk: String,
        kind: MessageKind,
        status: i64,
        orig: serde_json::Value,
        text: String,
        crtd: i64,
    ) -> Self {
        let pk = keys::message_pk(&ksuid::generate_at(crtd));
        Self {
            pk,
            ums: keys::ums(&author_pk, status),
            channel_pk,
            author_pk,
            kind,
            crtd,
            orig,
            text,
            text_recogn: None,
            updated_at: None,
        }
    }

    /// Prefers `D.text`, falling back to `D.text_recogn` (spec §4.H
    /// `fetchmsg`'s rule for the detail view's `text` field).
    pub fn display_text(&self) -> &str {
        if !self.text.is_empty() {
            &self.text
        } else {
            self.text_recogn.as_deref().unwrap_or("")
        }
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.pk.clone(),
            sk: self.pk.clone(),
            kind: "Message".to_string(),
            crtd: self.crtd,
            ums: Some(self.ums.clone()),
            ttl: None,
            attrs: json!({
                "Ch": self.channel_pk,
                "A": self.author_pk,
                "K": self.kind.as_str(),
                "orig": self.orig,
                "text": self.text,
                "text_recogn": self.text_recogn,
                "updated_at": self.updated_at,
            }),
        }
    }

    pub fn from_item(item: &Item) -> Result<Self> {
        let attrs = &item.attrs;
        let kind_str = attrs
            .get("K")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Message {} missing K", item.pk))?;
        Ok(Self {
            pk: item.pk.clone(),
            channel_pk: attrs
                .get("Ch")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            author_pk: attrs
                .get("A")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            kind: kind_str.parse().map_err(Error::Other)?,
            ums: item
                .ums
                .clone()
                .ok_or_else(|| anyhow::anyhow!("Message {} missing UMS", item.pk))?,
            crtd: item.crtd,
            orig: attrs.get("orig").cloned().unwrap_or(serde_json::Value::Null),
            text: attrs
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            text_recogn: attrs
                .get("text_recogn")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            updated_at: attrs.get("updated_at").and_then(|v| v.as_i64()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_text_falls_back_to_transcript() {
        let mut m = Message::new(
            "bot#foobot#tg".to_string(),
            "user#u1".to_string(),
            MessageKind::TGVoice,
            0,
            json!({}),
            String::new(),
            1_700_000_000,
        );
        assert_eq!(m.display_text(), "");
        m.text_recogn = Some("hello".to_string());
        assert_eq!(m.display_text(), "hello");
    }

    #[test]
    fn round_trips_through_item() {
        let m = Message::new(
            "bot#foobot#tg".to_string(),
            "user#u1".to_string(),
            MessageKind::TGText,
            0,
            json!({"raw": true}),
            "hi".to_string(),
            1_700_000_000,
        );
        let item = m.to_item();
        let back = Message::from_item(&item).unwrap();
        assert_eq!(back.pk, m.pk);
        assert_eq!(back.text, "hi");
        assert_eq!(back.ums, "user#u1#0");
        assert!(matches!(back.kind, MessageKind::TGText));
    }
}
