use serde_json::json;

use crate::store::Item;
use crate::util::ksuid;

use super::keys;

#[derive(Debug, Clone)]
pub struct User {
    pub pk: String,
    pub title: String,
    pub email: Option<String>,
    pub tel: Option<String>,
    pub tgid: Option<String>,
    pub bots: Vec<String>,
    pub crtd: i64,
}

impl User {
    pub fn new(title: String, email: Option<String>, tel: Option<String>, crtd: i64) -> Self {
        Self {
            pk: keys::user_pk(&ksuid::generate_at(crtd)),
            title,
            email,
            tel,
            tgid: None,
            bots: Vec::new(),
            crtd,
        }
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.pk.clone(),
            sk: self.pk.clone(),
            kind: "User".to_string(),
            crtd: self.crtd,
            ums: None,
            ttl: None,
            attrs: json!({
                "T": self.title,
                "E": self.email,
                "TL": self.tel,
                "TGID": self.tgid,
                "B": self.bots,
            }),
        }
    }

    pub fn from_item(item: &Item) -> anyhow::Result<Self> {
        let attrs = &item.attrs;
        Ok(Self {
            pk: item.pk.clone(),
            title: attrs
                .get("T")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            email: attrs.get("E").and_then(|v| v.as_str()).map(String::from),
            tel: attrs.get("TL").and_then(|v| v.as_str()).map(String::from),
            tgid: attrs.get("TGID").and_then(|v| v.as_str()).map(String::from),
            bots: attrs
                .get("B")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
            crtd: item.crtd,
        })
    }
}
