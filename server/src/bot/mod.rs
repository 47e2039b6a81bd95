//! Bot outbound client (spec §1 "the chat-bot HTTP client... only the
//! operations the pipeline invokes on it"): sending a reply and
//! fetching an inbound media binary. One client per bot secret
//! (spec §5 "Shared resources").

use std::time::Duration;

use anyhow::{Context, Result};

use crate::models::Bot;

pub struct BotClient {
    http: reqwest::Client,
    secret: String,
    api_base: String,
}

impl BotClient {
    pub fn new(bot: &Bot) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            secret: bot.secret.clone(),
            api_base: std::env::var("TGBOT_API_BASE")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
        }
    }

    /// Relays a reply string back to the sender (spec §4.C: "the caller
    /// must relay it to the sender through the bot's outbound API"; also
    /// used by the voice enricher to echo the transcript, and by the
    /// login flow to deliver the OTP, spec §4.I).
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.secret);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .context("sendMessage request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("sendMessage returned {}", response.status());
        }
        Ok(())
    }

    /// Fetches the binary content of an inbound media file by its
    /// bot-scoped file id (spec §4.E: "fetch the binary from the bot's
    /// file endpoint").
    pub async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let meta_url = format!("{}/bot{}/getFile?file_id={}", self.api_base, self.secret, file_id);
        let meta: serde_json::Value = self
            .http
            .get(&meta_url)
            .send()
            .await
            .context("getFile request failed")?
            .json()
            .await
            .context("malformed getFile response")?;

        let file_path = meta
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(|p| p.as_str())
            .context("getFile response missing file_path")?;

        let download_url = format!("{}/file/bot{}/{}", self.api_base, self.secret, file_path);
        let bytes = self
            .http
            .get(&download_url)
            .send()
            .await
            .context("file download failed")?
            .bytes()
            .await
            .context("failed reading file body")?;
        Ok(bytes.to_vec())
    }
}
