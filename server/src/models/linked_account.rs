use serde_json::json;

use crate::store::Item;

use super::keys;

/// Created when a user consumes an invite (spec §4.C step 2). Unique by
/// chat id: a chat id already linked to another user must fail the
/// uniqueness check (spec P7).
#[derive(Debug, Clone)]
pub struct LinkedAccount {
    pub pk: String,
    pub id: String,
    pub owner_pk: String,
    pub crtd: i64,
}

impl LinkedAccount {
    pub fn new(chat_id: &str, owner_pk: String, crtd: i64) -> Self {
        Self {
            pk: keys::linked_account_pk(chat_id),
            id: chat_id.to_string(),
            owner_pk,
            crtd,
        }
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.pk.clone(),
            sk: self.pk.clone(),
            kind: "LinkedAccount".to_string(),
            crtd: self.crtd,
            ums: None,
            ttl: None,
            attrs: json!({ "ID": self.id, "O": self.owner_pk }),
        }
    }

    pub fn from_item(item: &Item) -> anyhow::Result<Self> {
        let attrs = &item.attrs;
        Ok(Self {
            pk: item.pk.clone(),
            id: attrs
                .get("ID")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            owner_pk: attrs
                .get("O")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("LinkedAccount {} missing O", item.pk))?
                .to_string(),
            crtd: item.crtd,
        })
    }
}
