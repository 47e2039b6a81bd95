use serde_json::json;

use crate::store::Item;

use super::keys;

/// Child record of a Message representing one concrete media artifact
/// (spec §3, §4.E). `pk` must equal the parent Message's `pk` (I4).
#[derive(Debug, Clone)]
pub struct MessageFile {
    pub pk: String,
    pub file_kind: String,
    pub mime: String,
    pub bucket: String,
    pub object_key: String,
    pub crtd: i64,
    pub duration: Option<i64>,
    pub size: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

impl MessageFile {
    pub fn sk(&self) -> String {
        keys::message_file_sk(&self.file_kind)
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.pk.clone(),
            sk: self.sk(),
            kind: "MessageFile".to_string(),
            crtd: self.crtd,
            ums: None,
            ttl: None,
            attrs: json!({
                "FK": self.file_kind,
                "M": self.mime,
                "B": self.bucket,
                "K": self.object_key,
                "duration": self.duration,
                "size": self.size,
                "width": self.width,
                "height": self.height,
            }),
        }
    }

    pub fn from_item(item: &Item) -> anyhow::Result<Self> {
        let attrs = &item.attrs;
        Ok(Self {
            pk: item.pk.clone(),
            file_kind: attrs
                .get("FK")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            mime: attrs
                .get("M")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            bucket: attrs
                .get("B")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            object_key: attrs
                .get("K")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            crtd: item.crtd,
            duration: attrs.get("duration").and_then(|v| v.as_i64()),
            size: attrs.get("size").and_then(|v| v.as_i64()),
            width: attrs.get("width").and_then(|v| v.as_i64()),
            height: attrs.get("height").and_then(|v| v.as_i64()),
        })
    }
}
