use serde_json::json;

use crate::store::Item;
use crate::util::ksuid;

use super::keys;

/// Minted on successful login; deleted on first use if `one_off` (spec
/// §4.F, §4.I).
#[derive(Debug, Clone)]
pub struct Token {
    pub pk: String,
    pub user_pk: String,
    pub ttl: i64,
    pub one_off: bool,
    pub crtd: i64,
}

impl Token {
    pub fn new(user_pk: String, ttl: i64, one_off: bool, crtd: i64) -> Self {
        Self {
            pk: keys::token_pk(&ksuid::generate_at(crtd)),
            user_pk,
            ttl,
            one_off,
            crtd,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.ttl <= now
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.pk.clone(),
            sk: self.pk.clone(),
            kind: "Token".to_string(),
            crtd: self.crtd,
            ums: None,
            ttl: Some(self.ttl),
            attrs: json!({ "U": self.user_pk, "OF": self.one_off }),
        }
    }

    pub fn from_item(item: &Item) -> anyhow::Result<Self> {
        let attrs = &item.attrs;
        Ok(Self {
            pk: item.pk.clone(),
            user_pk: attrs
                .get("U")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            ttl: item.ttl.unwrap_or(0),
            one_off: attrs.get("OF").and_then(|v| v.as_bool()).unwrap_or(false),
            crtd: item.crtd,
        })
    }
}
