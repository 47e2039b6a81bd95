use serde_json::json;

use crate::store::Item;

use super::keys;

/// The subscription pair of spec §3/§4.G: `SubscriptionA` lives under
/// the owning user's PK, `SubscriptionB` under the UMS target's PK, so
/// the change-stream can discover subscribers by UMS. Both carry the
/// same `SK = subs#<conn-id>` and must be written/deleted together
/// (best-effort, per spec §5).
#[derive(Debug, Clone)]
pub struct SubscriptionA {
    pub owner_pk: String,
    pub conn_id: String,
    pub ums_target: String,
    pub domain: String,
    pub stage: String,
    pub ttl: i64,
    pub crtd: i64,
}

impl SubscriptionA {
    pub fn sk(&self) -> String {
        keys::subs_sk(&self.conn_id)
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.owner_pk.clone(),
            sk: self.sk(),
            kind: "SubscriptionA".to_string(),
            crtd: self.crtd,
            ums: None,
            ttl: Some(self.ttl),
            attrs: json!({ "U": self.ums_target, "DN": self.domain, "S": self.stage }),
        }
    }

    pub fn from_item(item: &Item) -> anyhow::Result<Self> {
        let conn_id = item
            .sk
            .strip_prefix("subs#")
            .ok_or_else(|| anyhow::anyhow!("Subscription SK {} missing prefix", item.sk))?
            .to_string();
        let attrs = &item.attrs;
        Ok(Self {
            owner_pk: item.pk.clone(),
            conn_id,
            ums_target: attrs
                .get("U")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            domain: attrs
                .get("DN")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            stage: attrs
                .get("S")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            ttl: item.ttl.unwrap_or(0),
            crtd: item.crtd,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SubscriptionB {
    pub ums: String,
    pub conn_id: String,
    pub owner_pk: String,
    pub domain: String,
    pub stage: String,
    pub ttl: i64,
    pub crtd: i64,
}

impl SubscriptionB {
    pub fn sk(&self) -> String {
        keys::subs_sk(&self.conn_id)
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.ums.clone(),
            sk: self.sk(),
            kind: "SubscriptionB".to_string(),
            crtd: self.crtd,
            ums: None,
            ttl: Some(self.ttl),
            attrs: json!({ "O": self.owner_pk, "DN": self.domain, "S": self.stage }),
        }
    }

    pub fn from_item(item: &Item) -> anyhow::Result<Self> {
        let conn_id = item
            .sk
            .strip_prefix("subs#")
            .ok_or_else(|| anyhow::anyhow!("Subscription SK {} missing prefix", item.sk))?
            .to_string();
        let attrs = &item.attrs;
        Ok(Self {
            ums: item.pk.clone(),
            conn_id,
            owner_pk: attrs
                .get("O")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            domain: attrs
                .get("DN")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            stage: attrs
                .get("S")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            ttl: item.ttl.unwrap_or(0),
            crtd: item.crtd,
        })
    }
}
