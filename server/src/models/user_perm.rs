use crate::store::Item;

use super::keys;

/// `value` is one of the prefixes of `"trwa"` (spec §3): `t`, `tr`,
/// `trw`, `trwa` — read/write/admin grants accumulate left to right.
#[derive(Debug, Clone)]
pub struct UserPerm {
    pub grantee_pk: String,
    pub folder_pk: String,
    pub folder_sk: String,
    pub value: String,
    pub crtd: i64,
}

const VALID_VALUES: [&str; 4] = ["t", "tr", "trw", "trwa"];

impl UserPerm {
    pub fn new(
        grantee_pk: String,
        folder_pk: String,
        folder_sk: String,
        value: String,
        crtd: i64,
    ) -> anyhow::Result<Self> {
        if !VALID_VALUES.contains(&value.as_str()) {
            return Err(anyhow::anyhow!("invalid UserPerm value {value:?}"));
        }
        Ok(Self {
            grantee_pk,
            folder_pk,
            folder_sk,
            value,
            crtd,
        })
    }

    pub fn sk(&self) -> String {
        keys::user_perm_sk(&self.folder_pk, &self.folder_sk, &self.value)
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.grantee_pk.clone(),
            sk: self.sk(),
            kind: "UserPerm".to_string(),
            crtd: self.crtd,
            ums: None,
            ttl: None,
            attrs: serde_json::json!({}),
        }
    }
}
