use serde_json::json;

use crate::store::Item;

use super::keys;

/// A logical status bucket seeded on first login (spec §3, GLOSSARY
/// "Folder"): inbox=0, archive=1, selected=2, trash=3, expressed via
/// the `status` component of a message's UMS rather than as a separate
/// container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderKind {
    Stream,
    Archive,
    Trash,
}

impl FolderKind {
    fn as_str(self) -> &'static str {
        match self {
            FolderKind::Stream => "stream",
            FolderKind::Archive => "archive",
            FolderKind::Trash => "trash",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "archive" => FolderKind::Archive,
            "trash" => FolderKind::Trash,
            _ => FolderKind::Stream,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Folder {
    pub user_pk: String,
    pub id: String,
    pub title: String,
    pub kind: FolderKind,
    pub crtd: i64,
}

impl Folder {
    pub fn sk(&self) -> String {
        keys::folder_sk(&self.id)
    }

    pub fn to_item(&self) -> Item {
        Item {
            pk: self.user_pk.clone(),
            sk: self.sk(),
            kind: "Folder".to_string(),
            crtd: self.crtd,
            ums: None,
            ttl: None,
            attrs: json!({ "T": self.title, "K": self.kind.as_str() }),
        }
    }

    pub fn from_item(item: &Item) -> anyhow::Result<Self> {
        let id = item
            .sk
            .strip_prefix("fldr#")
            .ok_or_else(|| anyhow::anyhow!("Folder SK {} missing prefix", item.sk))?
            .to_string();
        let attrs = &item.attrs;
        Ok(Self {
            user_pk: item.pk.clone(),
            id,
            title: attrs
                .get("T")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            kind: FolderKind::parse(attrs.get("K").and_then(|v| v.as_str()).unwrap_or("stream")),
            crtd: item.crtd,
        })
    }

    /// The four folders seeded on first login (spec §3 Folder lifecycle).
    pub fn seed_set(user_pk: &str, crtd: i64) -> Vec<Folder> {
        [
            ("inbox", "Inbox", FolderKind::Stream),
            ("archive", "Archive", FolderKind::Archive),
            ("selected", "Selected", FolderKind::Stream),
            ("trash", "Trash", FolderKind::Trash),
        ]
        .into_iter()
        .map(|(id, title, kind)| Folder {
            user_pk: user_pk.to_string(),
            id: id.to_string(),
            title: title.to_string(),
            kind,
            crtd,
        })
        .collect()
    }
}
