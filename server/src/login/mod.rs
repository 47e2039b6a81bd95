//! Login Flow (spec §4.I): OTP request and validation delivered over the
//! bot channel, independent of the websocket Command Server. Grounded on
//! the same invite/OTP shape `ingest::redeem_invite` uses, reusing
//! `util::otp` and the `LoginRequest`/`Token` records.

use serde::Serialize;
use tracing::warn;

use crate::bot::BotClient;
use crate::error::{Error, Result};
use crate::models::login_request::MAX_ATTEMPTS;
use crate::models::{self, Bot, LoginRequest, Token, User};
use crate::store::{PutOptions, Table};
use crate::util::otp;

pub const TOO_MANY_ATTEMPTS: &str = "TOO_MANY_ATTEMPTS";
pub const OTP_EXPIRED: &str = "OTP_EXPIRED";
pub const OTP_WRONG: &str = "OTP_WRONG";
pub const NO_SUCH_USER: &str = "No such user";

const LOGIN_REQUEST_TTL_SECS: i64 = 20 * 60;
const TOKEN_TTL_SECS: i64 = 24 * 3600;

#[derive(Debug, Clone, Serialize)]
pub struct RequestOtpResponse {
    pub ok: bool,
    pub request_pk: Option<String>,
    pub error: Option<String>,
}

impl RequestOtpResponse {
    fn error(msg: impl Into<String>) -> Self {
        Self { ok: false, request_pk: None, error: Some(msg.into()) }
    }
}

/// `POST /reqotp` (spec §4.I step 1): resolves `identifier` (an email
/// address if it contains `@`, else a phone number) to its owning user,
/// mints a `LoginRequest`, and delivers the OTP through the user's
/// first registered bot.
pub async fn request_otp(table: &dyn Table, identifier: &str, now: i64) -> Result<RequestOtpResponse> {
    let lookup_pk = if identifier.contains('@') {
        models::keys::email_pk(identifier)
    } else {
        models::keys::tel_pk(identifier)
    };

    // Email and Tel records both store their owner under attrs["O"];
    // reading it directly here avoids branching on which entity type
    // this identifier resolved to.
    let owner_pk = match table.get(&lookup_pk, &lookup_pk).await {
        Ok(item) => match item.attrs.get("O").and_then(|v| v.as_str()) {
            Some(owner) => owner.to_string(),
            None => return Ok(RequestOtpResponse::error(NO_SUCH_USER)),
        },
        Err(Error::NoSuchItem) => return Ok(RequestOtpResponse::error(NO_SUCH_USER)),
        Err(e) => return Err(e),
    };

    let user_item = table.get(&owner_pk, &owner_pk).await?;
    let user = User::from_item(&user_item).map_err(Error::Other)?;

    let bot_pk = match user.bots.first() {
        Some(pk) => pk.clone(),
        None => return Ok(RequestOtpResponse::error("no linked bot to deliver the code")),
    };
    let chat_id = match user.tgid.clone() {
        Some(tgid) => tgid,
        None => return Ok(RequestOtpResponse::error("user has no linked chat")),
    };
    let bot_item = table.get(&bot_pk, &bot_pk).await?;
    let bot = Bot::from_item(&bot_item).map_err(Error::Other)?;

    let otp_code = otp::generate();
    let request = LoginRequest::new(user.pk.clone(), otp_code.clone(), now + LOGIN_REQUEST_TTL_SECS, now);
    table.put(request.to_item(), PutOptions::unique()).await?;

    let client = BotClient::new(&bot);
    if let Err(e) = client.send_message(&chat_id, &otp_code).await {
        warn!(error = %e, user = %user.pk, "failed to deliver login OTP");
        return Ok(RequestOtpResponse::error("failed to deliver code"));
    }

    Ok(RequestOtpResponse { ok: true, request_pk: Some(request.pk), error: None })
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateOtpResponse {
    pub ok: bool,
    pub user_pk: Option<String>,
    pub title: Option<String>,
    pub token: Option<String>,
    pub created: Option<i64>,
    pub error: Option<String>,
}

impl ValidateOtpResponse {
    fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            user_pk: None,
            title: None,
            token: None,
            created: None,
            error: Some(msg.into()),
        }
    }
}

/// `POST /login` (spec §4.I step 2, P8): the attempt counter is
/// incremented unconditionally and atomically before any check, so a
/// client can never retry past the limit by racing requests.
pub async fn validate_otp(
    table: &dyn Table,
    request_pk: &str,
    supplied_otp: &str,
    now: i64,
) -> Result<ValidateOtpResponse> {
    let updated = table.increment(request_pk, request_pk, "A", 1).await?;
    let request = LoginRequest::from_item(&updated).map_err(Error::Other)?;

    if request.attempts >= MAX_ATTEMPTS {
        return Ok(ValidateOtpResponse::error(TOO_MANY_ATTEMPTS));
    }
    if request.ttl <= now {
        return Ok(ValidateOtpResponse::error(OTP_EXPIRED));
    }
    if request.otp != supplied_otp {
        return Ok(ValidateOtpResponse::error(OTP_WRONG));
    }

    let user_item = table.get(&request.user_pk, &request.user_pk).await?;
    let user = User::from_item(&user_item).map_err(Error::Other)?;

    let token = Token::new(user.pk.clone(), now + TOKEN_TTL_SECS, false, now);
    table.put(token.to_item(), PutOptions::unique()).await?;

    Ok(ValidateOtpResponse {
        ok: true,
        user_pk: Some(user.pk),
        title: Some(user.title),
        token: Some(token.pk),
        created: Some(now),
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bot, Email, User};
    use crate::store::memory::MemoryTable;

    async fn seed_user(table: &MemoryTable) -> (User, Bot) {
        let bot = Bot::new("foobot", "tg", "secret".to_string(), 1_700_000_000).unwrap();
        table.put(bot.to_item(), PutOptions::unique()).await.unwrap();

        let mut user = User::new("Alice".to_string(), Some("alice@example.test".to_string()), None, 1_700_000_000);
        user.tgid = Some("111222333".to_string());
        user.bots.push(bot.pk.clone());
        table.put(user.to_item(), PutOptions::unique()).await.unwrap();

        let email = Email::new("alice@example.test", user.pk.clone(), 1_700_000_000);
        table.put(email.to_item(), PutOptions::unique()).await.unwrap();

        (user, bot)
    }

    #[tokio::test]
    async fn request_otp_fails_for_unknown_identifier() {
        let table = MemoryTable::new();
        let resp = request_otp(&table, "nobody@example.test", 1_700_000_000).await.unwrap();
        assert!(!resp.ok);
    }

    #[tokio::test]
    async fn validate_otp_rejects_wrong_code() {
        let table = MemoryTable::new();
        let (user, _bot) = seed_user(&table).await;
        let request = LoginRequest::new(user.pk.clone(), "123456".to_string(), 1_700_010_000, 1_700_000_000);
        table.put(request.to_item(), PutOptions::unique()).await.unwrap();

        let resp = validate_otp(&table, &request.pk, "000000", 1_700_000_100).await.unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.error.as_deref(), Some(OTP_WRONG));
    }

    #[tokio::test]
    async fn validate_otp_succeeds_and_mints_token() {
        let table = MemoryTable::new();
        let (user, _bot) = seed_user(&table).await;
        let request = LoginRequest::new(user.pk.clone(), "123456".to_string(), 1_700_010_000, 1_700_000_000);
        table.put(request.to_item(), PutOptions::unique()).await.unwrap();

        let resp = validate_otp(&table, &request.pk, "123456", 1_700_000_100).await.unwrap();
        assert!(resp.ok);
        assert_eq!(resp.user_pk.as_deref(), Some(user.pk.as_str()));
        assert!(resp.token.is_some());
    }

    #[tokio::test]
    async fn validate_otp_locks_out_after_max_attempts() {
        let table = MemoryTable::new();
        let (user, _bot) = seed_user(&table).await;
        let request = LoginRequest::new(user.pk.clone(), "123456".to_string(), 1_700_010_000, 1_700_000_000);
        table.put(request.to_item(), PutOptions::unique()).await.unwrap();

        for _ in 0..MAX_ATTEMPTS {
            let _ = validate_otp(&table, &request.pk, "000000", 1_700_000_100).await.unwrap();
        }
        let resp = validate_otp(&table, &request.pk, "123456", 1_700_000_100).await.unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.error.as_deref(), Some(TOO_MANY_ATTEMPTS));
    }
}
