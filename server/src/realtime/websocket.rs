//! Command Server (spec §4.F/§4.H): token-gated upgrade, one reader and
//! one writer task per connection, and the command dispatch loop.
//! Frame shape follows the teacher's `subscribe_convo_events` (split
//! sink/stream, `tokio::spawn` per direction, `tokio::select!` to tear
//! both down together) with DAG-CBOR framing replaced by plain JSON
//! text frames, since this protocol has no binary payloads to carry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::enrich::object_store::ObjectStore;
use crate::models::{self, Message, MessageKind};
use crate::store::Table;
use crate::util::time::now_epoch;

use super::auth::{self, Decision};
use super::commands::{Command, FileView, Reply};
use super::registry::{self, ConnectionRegistry};

/// A command frame that doesn't arrive within this long closes the
/// connection (spec §4.H).
const FRAME_DEADLINE: Duration = Duration::from_secs(28);

/// Presigned file URLs are valid for this long (spec §4.H `fetchmsg`).
const PRESIGN_EXPIRY: Duration = Duration::from_secs(24 * 3600);

/// How many times `fetchmsg` polls for child `MessageFile` rows before
/// giving up and returning whatever arrived (spec §4.H: enrichment is
/// asynchronous relative to ingest, so a `fetchmsg` racing the enricher
/// may need to wait).
const FILE_POLL_ATTEMPTS: u32 = 5;
const FILE_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct WsState {
    pub table: Arc<dyn Table>,
    pub registry: Arc<ConnectionRegistry>,
    pub object_store: Arc<ObjectStore>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default = "default_stage")]
    pub stage: String,
}

fn default_domain() -> String {
    "relay".to_string()
}

fn default_stage() -> String {
    "prod".to_string()
}

/// `GET /ws?token=..` (spec §4.F): authorizes the token, then upgrades.
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    Query(query): Query<ConnectQuery>,
) -> Result<Response, StatusCode> {
    let now = now_epoch();
    let decision = auth::authorize(state.table.as_ref(), &query.token, now)
        .await
        .map_err(|e| {
            warn!(error = %e, "token lookup failed during websocket upgrade");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let principal_id = match decision {
        Decision::Allow { principal_id } => principal_id,
        Decision::Deny => return Err(StatusCode::UNAUTHORIZED),
    };

    Ok(ws.on_upgrade(move |socket| async move {
        handle_socket(socket, state, principal_id, query.domain, query.stage).await;
    }))
}

async fn handle_socket(socket: WebSocket, state: WsState, user_pk: String, domain: String, stage: String) {
    let conn_id = Uuid::new_v4().to_string();
    let now = now_epoch();

    if let Err(e) = registry::connect(state.table.as_ref(), &user_pk, &conn_id, &domain, &stage, now).await {
        warn!(error = %e, conn = %conn_id, "failed to record new connection");
        return;
    }

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Reply>(64);
    state.registry.register(&conn_id, tx);
    crate::metrics::set_active_connections(state.registry.connection_count());

    let writer = tokio::spawn(async move {
        while let Some(reply) = rx.recv().await {
            let text = match serde_json::to_string(&reply) {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "failed to serialize outbound reply");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        let next = tokio::time::timeout(FRAME_DEADLINE, stream.next()).await;
        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                warn!(error = %e, conn = %conn_id, "websocket read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                info!(conn = %conn_id, "connection idle past the frame deadline, closing");
                break;
            }
        };

        let text = match frame {
            WsMessage::Text(t) => t.to_string(),
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Binary(_) => continue,
        };

        let command: Command = match serde_json::from_str(&text) {
            Ok(c) => c,
            Err(e) => {
                state
                    .registry
                    .send(&conn_id, Reply::error("", format!("malformed command: {e}")))
                    .await;
                continue;
            }
        };

        dispatch(&state, &user_pk, &conn_id, &domain, &stage, command).await;
    }

    writer.abort();
    state.registry.unregister(&conn_id);
    crate::metrics::set_active_connections(state.registry.connection_count());
    for e in registry::disconnect(state.table.as_ref(), &user_pk, &conn_id).await {
        warn!(error = %e, conn = %conn_id, "error during disconnect cleanup");
    }
    info!(conn = %conn_id, user = %user_pk, "websocket connection closed");
}

async fn dispatch(state: &WsState, user_pk: &str, conn_id: &str, domain: &str, stage: &str, command: Command) {
    match command {
        Command::Ping { id } => {
            state
                .registry
                .send(conn_id, Reply::Pong { id, name: "pong", status: "ok" })
                .await;
        }
        Command::MsgFetchByDays { id, days, status, desc } => {
            msg_fetch_by_days(state, conn_id, user_pk, id, days, status, desc).await;
        }
        Command::FetchMsg { pk } => {
            fetch_msg(state, conn_id, &pk).await;
        }
        Command::Subscribe { id, umspk, status } => {
            let now = now_epoch();
            match registry::subscribe(
                state.table.as_ref(),
                user_pk,
                conn_id,
                umspk.as_deref(),
                status,
                domain,
                stage,
                now,
            )
            .await
            {
                Ok(()) => {
                    state
                        .registry
                        .send(conn_id, Reply::SubscribeAck { id, status: "ok", name: "subscrack" })
                        .await;
                }
                Err(e) => state.registry.send(conn_id, Reply::error(id, e)).await,
            }
        }
        Command::Unsubscribe { id, umspk, status } => {
            match registry::unsubscribe(state.table.as_ref(), user_pk, conn_id, umspk.as_deref(), status).await {
                Ok(()) => {
                    state
                        .registry
                        .send(conn_id, Reply::UnsubscribeAck { id, status: "ok" })
                        .await;
                }
                Err(e) => state.registry.send(conn_id, Reply::error(id, e.to_string())).await,
            }
        }
    }
}

/// `msgfetchbydays` (spec §4.H): lists a user's own messages within the
/// last `days`, one `MsgIndex` frame per row, ordered per `desc`.
async fn msg_fetch_by_days(state: &WsState, conn_id: &str, user_pk: &str, id: String, days: i64, status: i64, desc: bool) {
    state
        .registry
        .send(conn_id, Reply::Started { id: id.clone(), name: "started" })
        .await;

    let now = now_epoch();
    let ums = models::keys::ums(user_pk, status);
    let mut rows = match state.table.query_index_ums(&ums, now - days * 86_400, now).await {
        Ok(rows) => rows,
        Err(e) => {
            state.registry.send(conn_id, Reply::error(id, e.to_string())).await;
            return;
        }
    };

    rows.sort_by(|a, b| a.pk.cmp(&b.pk));
    if desc {
        rows.reverse();
    }

    for row in rows {
        state
            .registry
            .send(
                conn_id,
                Reply::MsgIndex {
                    pk: row.pk,
                    created: row.crtd,
                    owner: user_pk.to_string(),
                    status,
                    kind: row.kind,
                    name: "msgidx",
                },
            )
            .await;
    }

    state.registry.send(conn_id, Reply::Done { id, name: "done" }).await;
}

/// `fetchmsg` (spec §4.H): fetches one message and its archived files,
/// polling briefly for files the enricher hasn't written yet, and
/// returns presigned URLs for whatever has landed.
async fn fetch_msg(state: &WsState, conn_id: &str, pk: &str) {
    let item = match state.table.get(pk, pk).await {
        Ok(item) => item,
        Err(e) => {
            state.registry.send(conn_id, Reply::error(pk, e.to_string())).await;
            return;
        }
    };
    let message = match Message::from_item(&item) {
        Ok(m) => m,
        Err(e) => {
            state.registry.send(conn_id, Reply::error(pk, e.to_string())).await;
            return;
        }
    };

    let expected_files = match message.kind {
        MessageKind::TGVoice => 1,
        MessageKind::TGPhoto => 3,
        _ => 0,
    };

    let mut files = state.table.query_prefix(pk, "file#").await.unwrap_or_default();
    for _ in 0..FILE_POLL_ATTEMPTS {
        if files.len() as i64 >= expected_files {
            break;
        }
        tokio::time::sleep(FILE_POLL_INTERVAL).await;
        files = state.table.query_prefix(pk, "file#").await.unwrap_or_default();
    }

    let mut views = HashMap::new();
    for file_item in &files {
        let file_kind = file_item
            .sk
            .strip_prefix("file#")
            .unwrap_or_default()
            .to_string();
        let object_key = file_item
            .attrs
            .get("K")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        match state.object_store.presign_get(object_key, PRESIGN_EXPIRY).await {
            Ok(url) => {
                views.insert(file_kind, FileView { url });
            }
            Err(e) => warn!(error = %e, pk = %pk, kind = %file_kind, "failed to presign file url"),
        }
    }

    state
        .registry
        .send(
            conn_id,
            Reply::MsgDetail {
                pk: message.pk.clone(),
                created: message.crtd,
                updated: message.updated_at.unwrap_or(message.crtd),
                author: message.author_pk.clone(),
                ums: message.ums.clone(),
                text: message.display_text().to_string(),
                kind: message.kind.as_str().to_string(),
                name: "msgdetail",
                files: views,
            },
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;
    use crate::store::memory::MemoryTable;
    use crate::store::PutOptions;

    #[tokio::test]
    async fn fetch_msg_without_files_returns_detail_with_empty_files() {
        let table = Arc::new(MemoryTable::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let object_store = Arc::new(
            ObjectStore::new(crate::enrich::object_store::ObjectStoreConfig::default())
                .await
                .unwrap(),
        );
        let state = WsState {
            table: table.clone(),
            registry: registry.clone(),
            object_store,
        };

        let message = Message::new(
            "bot#foobot#tg".to_string(),
            "user#u1".to_string(),
            MessageKind::TGText,
            0,
            serde_json::json!({}),
            "hi".to_string(),
            1_700_000_000,
        );
        table.put(message.to_item(), PutOptions::default()).await.unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        registry.register("c1", tx);
        fetch_msg(&state, "c1", &message.pk).await;

        let reply = rx.recv().await.unwrap();
        match reply {
            Reply::MsgDetail { pk, files, .. } => {
                assert_eq!(pk, message.pk);
                assert!(files.is_empty());
            }
            _ => panic!("expected MsgDetail"),
        }
    }
}
