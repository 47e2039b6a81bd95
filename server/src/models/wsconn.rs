use serde_json::json;

use crate::store::Item;

use super::keys;

/// One record per live websocket (spec §4.G Connect/Disconnect).
#[derive(Debug, Clone)]
pub struct WsConn {
    pub user_pk: String,
    pub conn_id: String,
    pub domain: String,
    pub stage: String,
    pub ttl: i64,
    pub crtd: i64,
}

impl WsConn {
    pub fn sk(&self) -> String {
        keys::wsconn_sk(&self.conn_id)
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.user_pk.clone(),
            sk: self.sk(),
            kind: "WSConn".to_string(),
            crtd: self.crtd,
            ums: None,
            ttl: Some(self.ttl),
            attrs: json!({ "D": self.domain, "S": self.stage }),
        }
    }

    pub fn from_item(item: &Item) -> anyhow::Result<Self> {
        let conn_id = item
            .sk
            .strip_prefix("wsconn#")
            .ok_or_else(|| anyhow::anyhow!("WSConn SK {} missing prefix", item.sk))?
            .to_string();
        let attrs = &item.attrs;
        Ok(Self {
            user_pk: item.pk.clone(),
            conn_id,
            domain: attrs
                .get("D")
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
