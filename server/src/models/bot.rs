use serde_json::json;

use crate::store::Item;

use super::keys;

/// Registered once via the CLI (spec §6.1 `tgbot register`).
#[derive(Debug, Clone)]
pub struct Bot {
    pub pk: String,
    pub name: String,
    pub kind: String,
    pub secret: String,
    pub crtd: i64,
}

impl Bot {
    pub fn new(name: &str, kind: &str, secret: String, crtd: i64) -> anyhow::Result<Self> {
        Ok(Self {
            pk: keys::bot_pk(name, kind)?,
            name: name.to_string(),
            kind: kind.to_string(),
            secret,
            crtd,
        })
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.pk.clone(),
            sk: self.pk.clone(),
            kind: "Bot".to_string(),
            crtd: self.crtd,
            ums: None,
            ttl: None,
            attrs: json!({ "N": self.name, "K": self.kind, "S": self.secret }),
        }
    }

    pub fn from_item(item: &Item) -> anyhow::Result<Self> {
        let attrs = &item.attrs;
        Ok(Self {
            pk: item.pk.clone(),
            name: attrs
                .get("N")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            kind: attrs
                .get("K")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            secret: attrs
                .get("S")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            crtd: item.crtd,
        })
    }
}
