//! Ingest Handler (spec §4.C). Accepts a raw inbound bot update,
//! authenticates the sender against a stored linked account, resolves
//! invitation codes, and creates a `Message` record.
//!
//! Update parsing follows `original_source/pkg/tgapi/msg.go`'s
//! `TGUserMsg`; the OTP/invite control flow is a direct port of
//! `original_source/pkg/awsapi/scenario.go`'s `handleTGStartMsg` /
//! `HandleTGMsg`, including the "retry as /start with a bare six-digit
//! code" branch.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{Error, Result};
use crate::models::{self, Bot, Invite, LinkedAccount, Message, MessageKind, User};
use crate::store::{PutOptions, Table};
use crate::util::otp;

pub const NEED_CODE: &str = "Please, provide invitation code.";
pub const WRONG_CODE: &str = "This code is wrong or expired";
pub const WELCOME: &str = "Welcome!";

#[derive(Debug, Deserialize, Serialize)]
struct From {
    id: i64,
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct Voice {
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    file_id: String,
    #[serde(default)]
    file_size: i64,
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct Photo {
    file_id: String,
    #[serde(default)]
    file_size: i64,
    width: i64,
    height: i64,
}

#[derive(Debug, Deserialize, Serialize)]
struct TgUpdate {
    from: From,
    #[serde(default)]
    voice: Option<Voice>,
    #[serde(default)]
    photo: Vec<Photo>,
    #[serde(default)]
    text: String,
}

impl TgUpdate {
    fn tgid(&self) -> String {
        self.from.id.to_string()
    }

    fn has_body(&self) -> bool {
        !self.text.is_empty() || self.voice.is_some() || !self.photo.is_empty()
    }

    fn kind(&self) -> MessageKind {
        if self.voice.as_ref().map(|v| v.duration > 0).unwrap_or(false) {
            MessageKind::TGVoice
        } else if !self.photo.is_empty() {
            MessageKind::TGPhoto
        } else if !self.text.is_empty() {
            MessageKind::TGText
        } else {
            MessageKind::TGUnknown
        }
    }
}

/// Ingests one raw inbound update. `Ok(Some(reply))` carries a reply
/// string the caller must relay through the bot's outbound API
/// (spec §4.C); `Ok(None)` means no reply is owed.
#[instrument(skip(table, bot, raw_update), fields(bot = %bot.pk))]
pub async fn handle_update(
    table: &dyn Table,
    bot: &Bot,
    raw_update: &str,
    now: i64,
) -> Result<Option<String>> {
    let update: TgUpdate =
        serde_json::from_str(raw_update).map_err(|e| Error::Other(e.into()))?;
    if !update.has_body() {
        return Err(Error::Other(anyhow::anyhow!("update has no message body")));
    }

    if let Some(rest) = update.text.strip_prefix("/start") {
        let reply = redeem_invite(table, bot, rest, &update.tgid(), now).await?;
        return Ok(Some(reply));
    }

    let linked = table
        .get(
            &models::keys::linked_account_pk(&update.tgid()),
            &models::keys::linked_account_pk(&update.tgid()),
        )
        .await;

    let linked = match linked {
        Ok(item) => LinkedAccount::from_item(&item).map_err(Error::Other)?,
        Err(Error::NoSuchItem) => {
            if otp::is_bare_code(&update.text) {
                let reply = redeem_invite(table, bot, &update.text, &update.tgid(), now).await?;
                return Ok(Some(reply));
            }
            return Ok(Some(NEED_CODE.to_string()));
        }
        Err(e) => return Err(e),
    };

    let user_item = table.get(&linked.owner_pk, &linked.owner_pk).await?;
    let user = User::from_item(&user_item).map_err(Error::Other)?;

    create_message(table, bot, &user, &update, now).await?;
    Ok(None)
}

/// Invite-redemption (spec §4.C step 2). `text_or_code` is either the
/// remainder of a `/start ...` command or a bare six-digit code.
async fn redeem_invite(
    table: &dyn Table,
    bot: &Bot,
    text_or_code: &str,
    tgid: &str,
    now: i64,
) -> Result<String> {
    let code = match otp::extract(text_or_code) {
        Some(c) => c,
        None => return Ok(NEED_CODE.to_string()),
    };

    let invite_pk = models::keys::invite_pk(&bot.pk, &code);
    let invite_item = match table.get(&invite_pk, &invite_pk).await {
        Ok(item) => item,
        Err(Error::NoSuchItem) => return Ok(WRONG_CODE.to_string()),
        Err(e) => return Err(e),
    };
    let mut invite = Invite::from_item(&invite_item).map_err(Error::Other)?;
    if invite.is_expired(now) {
        return Ok(WRONG_CODE.to_string());
    }

    let user_item = table.get(&invite.user_pk, &invite.user_pk).await?;
    let mut user = User::from_item(&user_item).map_err(Error::Other)?;

    user.tgid = Some(tgid.to_string());
    if !user.bots.contains(&bot.pk) {
        user.bots.push(bot.pk.clone());
    }
    table.put(user.to_item(), PutOptions::default()).await?;

    let linked = LinkedAccount::new(tgid, user.pk.clone(), now);
    table.put(linked.to_item(), PutOptions::unique()).await?;

    invite.accepted = Some(now);
    if let Err(e) = table
        .update_map_field(
            &invite.pk,
            &invite.pk,
            "accepted",
            serde_json::json!(now),
        )
        .await
    {
        tracing::warn!(error = %e, invite = %invite.pk, "could not stamp invite accepted");
    }

    Ok(WELCOME.to_string())
}

/// Creates the Message record for an authenticated sender (spec §4.C
/// step 4).
async fn create_message(
    table: &dyn Table,
    bot: &Bot,
    user: &User,
    update: &TgUpdate,
    now: i64,
) -> Result<Message> {
    let orig = serde_json::to_value(update).unwrap_or(serde_json::Value::Null);
    let message = Message::new(
        bot.pk.clone(),
        user.pk.clone(),
        update.kind(),
        0,
        orig,
        update.text.clone(),
        now,
    );
    table.put(message.to_item(), PutOptions::default()).await?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryTable;

    fn bot() -> Bot {
        Bot::new("foobot", "tg", "secret".to_string(), 1_700_000_000).unwrap()
    }

    #[tokio::test]
    async fn start_with_missing_code_asks_for_one() {
        let table = MemoryTable::new();
        let reply = handle_update(&table, &bot(), r#"{"from":{"id":1},"text":"/start"}"#, 1_700_000_100)
            .await
            .unwrap();
        assert_eq!(reply, Some(NEED_CODE.to_string()));
    }

    #[tokio::test]
    async fn start_with_unknown_code_is_wrong_code() {
        let table = MemoryTable::new();
        let reply = handle_update(
            &table,
            &bot(),
            r#"{"from":{"id":1},"text":"/start 123456"}"#,
            1_700_000_100,
        )
        .await
        .unwrap();
        assert_eq!(reply, Some(WRONG_CODE.to_string()));
    }

    #[tokio::test]
    async fn start_with_valid_code_links_account() {
        let table = MemoryTable::new();
        let b = bot();
        let user = User::new("Alice".to_string(), None, None, 1_700_000_000);
        table.put(user.to_item(), PutOptions::unique()).await.unwrap();
        let invite = Invite::new(
            b.pk.clone(),
            user.pk.clone(),
            "123456".to_string(),
            1_800_000_000,
            "https://example.test/inv".to_string(),
            1_700_000_000,
        );
        table.put(invite.to_item(), PutOptions::unique()).await.unwrap();

        let reply = handle_update(
            &table,
            &b,
            r#"{"from":{"id":111222333},"text":"/start 123456"}"#,
            1_700_000_100,
        )
        .await
        .unwrap();
        assert_eq!(reply, Some(WELCOME.to_string()));

        let linked_item = table
            .get(
                &models::keys::linked_account_pk("111222333"),
                &models::keys::linked_account_pk("111222333"),
            )
            .await
            .unwrap();
        let linked = LinkedAccount::from_item(&linked_item).unwrap();
        assert_eq!(linked.owner_pk, user.pk);
    }

    #[tokio::test]
    async fn text_ingest_creates_message_with_ums() {
        let table = MemoryTable::new();
        let b = bot();
        let user = User::new("Alice".to_string(), None, None, 1_700_000_000);
        table.put(user.to_item(), PutOptions::unique()).await.unwrap();
        let linked = LinkedAccount::new("111222333", user.pk.clone(), 1_700_000_000);
        table.put(linked.to_item(), PutOptions::unique()).await.unwrap();

        let reply = handle_update(
            &table,
            &b,
            r#"{"from":{"id":111222333},"text":"65 euro gas station"}"#,
            1_700_000_200,
        )
        .await
        .unwrap();
        assert_eq!(reply, None);

        let rows = table
            .query_index_ums(&models::keys::ums(&user.pk, 0), 0, i64::MAX)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let msg_item = table.get(&rows[0].pk, &rows[0].pk).await.unwrap();
        let msg = Message::from_item(&msg_item).unwrap();
        assert_eq!(msg.text, "65 euro gas station");
        assert!(matches!(msg.kind, MessageKind::TGText));
    }
}
