//! Tagged union of websocket commands (spec §4.H, §9 "Tagged union for
//! websocket commands"): a sum type keyed off the `name` discriminator,
//! with the dispatcher exhaustive over the variant set.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name")]
pub enum Command {
    #[serde(rename = "ping")]
    Ping { id: String },
    #[serde(rename = "msgfetchbydays")]
    MsgFetchByDays {
        id: String,
        days: i64,
        status: i64,
        #[serde(default)]
        desc: bool,
    },
    #[serde(rename = "fetchmsg")]
    FetchMsg { pk: String },
    #[serde(rename = "subscr")]
    Subscribe {
        id: String,
        umspk: Option<String>,
        status: i64,
    },
    #[serde(rename = "unsubscr")]
    Unsubscribe {
        id: String,
        umspk: Option<String>,
        status: i64,
    },
}

/// Outbound reply frames. Each is one JSON object written to the
/// connection's outbound channel, preserving send order (spec O1).
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Pong {
        id: String,
        name: &'static str,
        status: &'static str,
    },
    Started {
        id: String,
        name: &'static str,
    },
    MsgIndex {
        pk: String,
        created: i64,
        owner: String,
        status: i64,
        kind: String,
        name: &'static str,
    },
    Done {
        id: String,
        name: &'static str,
    },
    MsgDetail {
        pk: String,
        created: i64,
        updated: i64,
        author: String,
        ums: String,
        text: String,
        kind: String,
        name: &'static str,
        files: std::collections::HashMap<String, FileView>,
    },
    SubscribeAck {
        id: String,
        status: &'static str,
        name: &'static str,
    },
    UnsubscribeAck {
        id: String,
        status: &'static str,
    },
    Error {
        id: String,
        status: &'static str,
        error: String,
    },
    /// Unsolicited push from the change-stream dispatcher to a
    /// subscribed connection (spec §4.D step 1), not a reply to any
    /// command frame.
    DbEvent {
        name: &'static str,
        event: &'static str,
        pk: String,
        ums: String,
        kind: String,
    },
    /// Operator-initiated push (spec §6.1 `user send-ws`), routed
    /// through the admin HTTP surface rather than a command frame.
    AdminPush {
        name: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileView {
    pub url: String,
}

impl Reply {
    pub fn error(id: impl Into<String>, error: impl Into<String>) -> Self {
        Reply::Error {
            id: id.into(),
            status: "error",
            error: error.into(),
        }
    }
}
