use serde_json::json;

use crate::store::Item;
use crate::util::ksuid;

use super::keys;

/// Created on OTP request; `attempts` increments per validation check
/// and is terminal at ≥5 (spec §4.I, P8).
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub pk: String,
    pub user_pk: String,
    pub otp: String,
    pub ttl: i64,
    pub attempts: i64,
    pub crtd: i64,
}

pub const MAX_ATTEMPTS: i64 = 5;

impl LoginRequest {
    pub fn new(user_pk: String, otp: String, ttl: i64, crtd: i64) -> Self {
        Self {
            pk: keys::login_request_pk(&ksuid::generate_at(crtd)),
            user_pk,
            otp,
            ttl,
            attempts: 0,
            crtd,
        }
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.pk.clone(),
            sk: self.pk.clone(),
            kind: "LoginRequest".to_string(),
            crtd: self.crtd,
            ums: None,
            ttl: Some(self.ttl),
            attrs: json!({ "UserPK": self.user_pk, "OTP": self.otp, "A": self.attempts }),
        }
    }

    pub fn from_item(item: &Item) -> anyhow::Result<Self> {
        let attrs = &item.attrs;
        Ok(Self {
            pk: item.pk.clone(),
            user_pk: attrs
                .get("UserPK")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            otp: attrs
                .get("OTP")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            ttl: item.ttl.unwrap_or(0),
            attempts: attrs.get("A").and_then(|v| v.as_i64()).unwrap_or(0),
            crtd: item.crtd,
        })
    }
}
