use serde_json::json;

use crate::store::Item;

use super::keys;

/// Created by admin tooling; consumed at most once on link (spec P7),
/// retained afterward for audit, and purged by the TTL sweep once
/// `ttl` elapses.
#[derive(Debug, Clone)]
pub struct Invite {
    pub pk: String,
    pub bot_pk: String,
    pub user_pk: String,
    pub otp: String,
    pub ttl: i64,
    pub url: String,
    pub crtd: i64,
    pub accepted: Option<i64>,
}

impl Invite {
    pub fn new(bot_pk: String, user_pk: String, otp: String, ttl: i64, url: String, crtd: i64) -> Self {
        Self {
            pk: keys::invite_pk(&bot_pk, &otp),
            bot_pk,
            user_pk,
            otp,
            ttl,
            url,
            crtd,
            accepted: None,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.ttl <= now
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.pk.clone(),
            sk: self.pk.clone(),
            kind: "Invite".to_string(),
            crtd: self.crtd,
            ums: None,
            ttl: Some(self.ttl),
            attrs: json!({
                "B": self.bot_pk,
                "U": self.user_pk,
                "OTP": self.otp,
                "Url": self.url,
                "accepted": self.accepted,
            }),
        }
    }

    pub fn from_item(item: &Item) -> anyhow::Result<Self> {
        let attrs = &item.attrs;
        Ok(Self {
            pk: item.pk.clone(),
            bot_pk: attrs
                .get("B")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            user_pk: attrs
                .get("U")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            otp: attrs
                .get("OTP")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            ttl: item.ttl.unwrap_or(0),
            url: attrs
                .get("Url")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            crtd: item.crtd,
            accepted: attrs.get("accepted").and_then(|v| v.as_i64()),
        })
    }
}
