use serde_json::json;

use crate::store::Item;

use super::keys;

#[derive(Debug, Clone)]
pub struct Tel {
    pub pk: String,
    pub number: String,
    pub owner_pk: String,
    pub crtd: i64,
}

impl Tel {
    pub fn new(number: &str, owner_pk: String, crtd: i64) -> Self {
        Self {
            pk: keys::tel_pk(number),
            number: number.to_string(),
            owner_pk,
            crtd,
        }
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.pk.clone(),
            sk: self.pk.clone(),
            kind: "Tel".to_string(),
            crtd: self.crtd,
            ums: None,
            ttl: None,
            attrs: json!({ "NMBR": self.number, "O": self.owner_pk }),
        }
    }

    pub fn from_item(item: &Item) -> anyhow::Result<Self> {
        let attrs = &item.attrs;
        Ok(Self {
            pk: item.pk.clone(),
            number: attrs
                .get("NMBR")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            owner_pk: attrs
                .get("O")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("Tel {} missing O", item.pk))?
                .to_string(),
            crtd: item.crtd,
        })
    }
}
