//! HTTP handlers outside the websocket surface (spec §6.2): OTP login,
//! and the inbound bot webhook that feeds the Ingest Handler when this
//! core runs as a long-lived process rather than a queue-triggered
//! function (spec §1 "the core must run equally well as long-lived
//! processes or short-lived invocations"). Grounded on the teacher's
//! `handlers.rs` thin-wrapper-over-library-functions style.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::bot::BotClient;
use crate::login;
use crate::models::{self, Bot};
use crate::realtime::commands::Reply;
use crate::realtime::registry::ConnectionRegistry;
use crate::store::Table;
use crate::util::time::now_epoch;

#[derive(Clone)]
pub struct AppState {
    pub table: Arc<dyn Table>,
    pub registry: Arc<ConnectionRegistry>,
}

#[derive(Debug, Deserialize)]
pub struct ReqOtpBody {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub request_pk: String,
    pub otp: String,
}

/// `POST /<stage>/reqotp` (spec §6.2).
#[instrument(skip(state, body))]
pub async fn req_otp(
    State(state): State<AppState>,
    Json(body): Json<ReqOtpBody>,
) -> (StatusCode, Json<login::RequestOtpResponse>) {
    crate::metrics::record_otp_request();
    match login::request_otp(state.table.as_ref(), &body.key, now_epoch()).await {
        Ok(resp) => (StatusCode::OK, Json(resp)),
        Err(e) => {
            warn!(error = %e, "reqotp failed");
            let resp = login::RequestOtpResponse {
                ok: false,
                request_pk: None,
                error: Some(e.to_string()),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(resp))
        }
    }
}

/// `POST /<stage>/login` (spec §6.2).
#[instrument(skip(state, body))]
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> (StatusCode, Json<login::ValidateOtpResponse>) {
    crate::metrics::record_otp_validation();
    match login::validate_otp(state.table.as_ref(), &body.request_pk, &body.otp, now_epoch()).await {
        Ok(resp) => (StatusCode::OK, Json(resp)),
        Err(e) => {
            warn!(error = %e, "login validation failed");
            let resp = login::ValidateOtpResponse {
                ok: false,
                user_pk: None,
                title: None,
                token: None,
                created: None,
                error: Some(e.to_string()),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(resp))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    ok: bool,
}

/// `POST /webhook/:bot_name/:bot_kind` — the inbound bot transport this
/// long-lived process exposes in place of the out-of-scope hosted-
/// function trigger. Resolves the bot, runs it through the Ingest
/// Handler, and relays any owed reply through the bot's outbound API.
#[instrument(skip(state, raw_body), fields(bot_name = %bot_name, bot_kind = %bot_kind))]
pub async fn webhook(
    State(state): State<AppState>,
    Path((bot_name, bot_kind)): Path<(String, String)>,
    raw_body: String,
) -> StatusCode {
    let pk = match models::keys::bot_pk(&bot_name, &bot_kind) {
        Ok(pk) => pk,
        Err(e) => {
            warn!(error = %e, "invalid webhook path");
            return StatusCode::BAD_REQUEST;
        }
    };

    let bot_item = match state.table.get(&pk, &pk).await {
        Ok(item) => item,
        Err(crate::error::Error::NoSuchItem) => return StatusCode::NOT_FOUND,
        Err(e) => {
            warn!(error = %e, "bot lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };
    let bot = match Bot::from_item(&bot_item) {
        Ok(bot) => bot,
        Err(e) => {
            warn!(error = %e, "malformed bot record");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let result = crate::ingest::handle_update(state.table.as_ref(), &bot, &raw_body, now_epoch()).await;
    crate::metrics::record_ingest_update(result.is_ok());

    match result {
        Ok(Some(reply)) => {
            let client = BotClient::new(&bot);
            if let Err(e) = deliver_reply(&client, &raw_body, &reply).await {
                warn!(error = %e, "failed to relay ingest reply");
            }
            StatusCode::OK
        }
        Ok(None) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "ingest failed");
            StatusCode::OK
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AdminPushBody {
    pub identifier: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AdminPushResponse {
    pub delivered: usize,
}

/// `POST /admin/push` — the only network-reachable way into a running
/// server's in-process Connection Registry (spec §6.1 `user send-ws`).
/// Not part of spec §6's public interface; exists purely so `relayctl`
/// can reach state no client process can otherwise touch.
#[instrument(skip(state, body))]
pub async fn admin_push(
    State(state): State<AppState>,
    Json(body): Json<AdminPushBody>,
) -> (StatusCode, Json<AdminPushResponse>) {
    let lookup_pk = if body.identifier.contains('@') {
        models::keys::email_pk(&body.identifier)
    } else {
        models::keys::tel_pk(&body.identifier)
    };

    let owner_pk = match state.table.get(&lookup_pk, &lookup_pk).await {
        Ok(item) => item.attrs.get("O").and_then(|v| v.as_str()).map(String::from),
        Err(_) => None,
    };
    let Some(owner_pk) = owner_pk else {
        return (StatusCode::NOT_FOUND, Json(AdminPushResponse { delivered: 0 }));
    };

    let conns = match state.table.query_prefix(&owner_pk, "wsconn#").await {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "failed to list live connections");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(AdminPushResponse { delivered: 0 }));
        }
    };

    let mut delivered = 0;
    for conn in conns {
        if let Some(conn_id) = conn.sk.strip_prefix("wsconn#") {
            state
                .registry
                .send(
                    conn_id,
                    Reply::AdminPush {
                        name: "adminpush",
                        message: body.message.clone(),
                    },
                )
                .await;
            delivered += 1;
        }
    }

    (StatusCode::OK, Json(AdminPushResponse { delivered }))
}

/// Inbound updates carry the sender's chat id under `message.from.id`;
/// reused here rather than re-parsing the whole update in
/// `ingest::handle_update`, which already consumes it internally.
async fn deliver_reply(client: &BotClient, raw_update: &str, reply: &str) -> anyhow::Result<()> {
    #[derive(serde::Deserialize)]
    struct Update {
        message: Option<Msg>,
    }
    #[derive(serde::Deserialize)]
    struct Msg {
        from: From,
    }
    #[derive(serde::Deserialize)]
    struct From {
        id: i64,
    }

    let update: Update = serde_json::from_str(raw_update)?;
    let chat_id = update
        .message
        .map(|m| m.from.id.to_string())
        .ok_or_else(|| anyhow::anyhow!("update carried no sender to reply to"))?;
    client.send_message(&chat_id, reply).await
}
