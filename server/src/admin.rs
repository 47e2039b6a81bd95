//! Library functions backing the `relayctl` CLI (spec §6.1): bot
//! registration, invite creation, and token minting operate directly
//! against the Table Gateway, exactly like any other core component.
//! `send_to_live_sockets` is the exception — a running server's
//! Connection Registry is in-process state a separate CLI invocation
//! cannot reach, so it goes over the admin HTTP surface the server
//! exposes for this one purpose, mirroring spec §5's "one outbound HTTP
//! session reused for all websocket-management posts".

use anyhow::{bail, Result};

use crate::models::{Bot, Email, Invite, Tel, Token, User};
use crate::store::{PutOptions, Table};
use crate::util::otp;

const INVITE_TTL_SECS: i64 = 7 * 24 * 3600;
const TOKEN_TTL_SECS: i64 = 24 * 3600;

/// `tgbot register` (spec §6.1): fails with `AlreadyExists` if the
/// `(name, kind)` pair is already registered.
pub async fn register_bot(table: &dyn Table, name: &str, kind: &str, secret: String, now: i64) -> Result<Bot> {
    let bot = Bot::new(name, kind, secret, now)?;
    table.put(bot.to_item(), PutOptions::unique()).await?;
    Ok(bot)
}

/// `tgbot invite` (spec §6.1): creates the user (plus its email/tel
/// records) and the invite in one transactional put, so a crash between
/// them is impossible.
pub async fn create_invite(
    table: &dyn Table,
    bot_pk: &str,
    title: &str,
    email: Option<&str>,
    tel: Option<&str>,
    base_url: &str,
    now: i64,
) -> Result<Invite> {
    let user = User::new(title.to_string(), email.map(String::from), tel.map(String::from), now);
    let mut items = vec![user.to_item()];
    if let Some(addr) = email {
        items.push(Email::new(addr, user.pk.clone(), now).to_item());
    }
    if let Some(number) = tel {
        items.push(Tel::new(number, user.pk.clone(), now).to_item());
    }
    table.put_transactional(items).await?;

    let code = otp::generate();
    let ttl = now + INVITE_TTL_SECS;
    let url = format!("{base_url}?code={code}");
    let invite = Invite::new(bot_pk.to_string(), user.pk.clone(), code, ttl, url, now);
    table.put(invite.to_item(), PutOptions::unique()).await?;
    Ok(invite)
}

/// `user create-token` (spec §6.1): resolves the identifier to its
/// owning user the same way `login::request_otp` does, then mints a
/// 24h token.
pub async fn mint_token(table: &dyn Table, email: Option<&str>, tel: Option<&str>, now: i64) -> Result<Token> {
    let lookup_pk = match (email, tel) {
        (Some(addr), _) => crate::models::keys::email_pk(addr),
        (None, Some(number)) => crate::models::keys::tel_pk(number),
        (None, None) => bail!("one of --email or --tel is required"),
    };
    let item = table.get(&lookup_pk, &lookup_pk).await?;
    let owner_pk = item
        .attrs
        .get("O")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("malformed identifier record {lookup_pk:?}: missing owner"))?
        .to_string();

    let token = Token::new(owner_pk, now + TOKEN_TTL_SECS, false, now);
    table.put(token.to_item(), PutOptions::unique()).await?;
    Ok(token)
}

/// `user send-ws` (spec §6.1): posts `message` to every live websocket
/// of the user resolved from `email`/`tel`, via the admin HTTP endpoint
/// of a running server. Returns the number of connections it was
/// delivered to.
pub async fn send_to_live_sockets(
    admin_base_url: &str,
    email: Option<&str>,
    tel: Option<&str>,
    message: &str,
) -> Result<usize> {
    let identifier = match (email, tel) {
        (Some(addr), _) => addr.to_string(),
        (None, Some(number)) => number.to_string(),
        (None, None) => bail!("one of --email or --tel is required"),
    };

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{admin_base_url}/admin/push"))
        .json(&serde_json::json!({ "identifier": identifier, "message": message }))
        .send()
        .await?;

    if !response.status().is_success() {
        bail!("admin push failed: {}", response.status());
    }

    let body: serde_json::Value = response.json().await?;
    Ok(body.get("delivered").and_then(|v| v.as_u64()).unwrap_or(0) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryTable;

    #[tokio::test]
    async fn register_bot_then_create_invite_then_mint_token() {
        let table = MemoryTable::new();
        let now = 1_700_000_000;

        let bot = register_bot(&table, "relaybot", "tg", "secret".to_string(), now)
            .await
            .unwrap();

        let invite = create_invite(
            &table,
            &bot.pk,
            "Ada Lovelace",
            Some("ada@example.com"),
            None,
            "https://t.me/relaybot",
            now,
        )
        .await
        .unwrap();
        assert_eq!(invite.user_pk.len() > 0, true);

        let token = mint_token(&table, Some("ada@example.com"), None, now).await.unwrap();
        assert_eq!(token.user_pk, invite.user_pk);
    }
}
