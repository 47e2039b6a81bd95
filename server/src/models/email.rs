use serde_json::json;

use crate::store::Item;

use super::keys;

/// Created atomically with its owning `User`; never mutated (spec §3).
#[derive(Debug, Clone)]
pub struct Email {
    pub pk: String,
    pub owner_pk: String,
    pub crtd: i64,
}

impl Email {
    pub fn new(addr: &str, owner_pk: String, crtd: i64) -> Self {
        Self {
            pk: keys::email_pk(addr),
            owner_pk,
            crtd,
        }
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.pk.clone(),
            sk: self.pk.clone(),
            kind: "Email".to_string(),
            crtd: self.crtd,
            ums: None,
            ttl: None,
            attrs: json!({ "O": self.owner_pk }),
        }
    }

    pub fn from_item(item: &Item) -> anyhow::Result<Self> {
        Ok(Self {
            pk: item.pk.clone(),
            owner_pk: item
                .attrs
                .get("O")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("Email {} missing O", item.pk))?
                .to_string(),
            crtd: item.crtd,
        })
    }
}
