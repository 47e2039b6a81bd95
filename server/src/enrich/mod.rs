//! Enrichers (spec §4.E): per-kind side-effect workers invoked by the
//! change-stream dispatcher on message INSERT. Voice messages are
//! transcribed and archived; photo messages are archived at every
//! inbound size. Every step is independent and idempotent — object
//! keys are content-addressed by the upstream file id, and
//! `MessageFile` inserts replace on duplicate `(pk, sk)`.

pub mod object_store;
pub mod speech;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::bot::BotClient;
use crate::models::{Message, MessageFile};
use crate::store::{PutOptions, Table};

use object_store::ObjectStore;
use speech::SpeechClient;

/// Voice messages longer than this are rejected up front (spec §4.E
/// "Preconditions: duration ≤ 59s").
const MAX_VOICE_DURATION_SECS: i64 = 59;

#[derive(Debug, Deserialize, Default)]
struct VoicePayload {
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    file_id: String,
    #[serde(default)]
    file_size: i64,
}

#[derive(Debug, Deserialize, Default)]
struct PhotoPayload {
    file_id: String,
    #[serde(default)]
    file_size: i64,
    width: i64,
    height: i64,
}

/// Voice path (spec §4.E). `chat_id` is the sender's bot-scoped chat id,
/// used only to relay the "too long" rejection and the transcript.
pub async fn enrich_voice(
    table: &dyn Table,
    object_store: &ObjectStore,
    speech: &SpeechClient,
    bot_client: &BotClient,
    message: &Message,
    chat_id: &str,
) -> anyhow::Result<()> {
    let voice: VoicePayload = message
        .orig
        .get("voice")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    if voice.duration > MAX_VOICE_DURATION_SECS {
        if let Err(e) = bot_client.send_message(chat_id, "it's too long").await {
            warn!(error = %e, "failed to notify sender of oversized voice message");
        }
        return Ok(());
    }

    let transcribe = async {
        let audio = bot_client.fetch_file(&voice.file_id).await?;
        let transcript = speech.recognize(audio).await?;
        if !transcript.is_empty() {
            table
                .update_map_field(&message.pk, &message.pk, "text_recogn", serde_json::json!(transcript))
                .await?;
            if let Err(e) = bot_client.send_message(chat_id, &transcript).await {
                warn!(error = %e, "failed to relay transcript to sender");
            }
        }
        Ok::<(), anyhow::Error>(())
    };
    if let Err(e) = transcribe.await {
        error!(error = %e, message = %message.pk, "voice transcription failed");
    }

    let archive = async {
        let audio = bot_client.fetch_file(&voice.file_id).await?;
        let key = format!("{}.ogg", voice.file_id);
        object_store
            .put_object(&key, audio, "audio/ogg")
            .await?;
        let file = MessageFile {
            pk: message.pk.clone(),
            file_kind: "voice".to_string(),
            mime: if voice.mime_type.is_empty() {
                "audio/ogg".to_string()
            } else {
                voice.mime_type.clone()
            },
            bucket: object_store.bucket().to_string(),
            object_key: key,
            crtd: message.crtd,
            duration: Some(voice.duration),
            size: Some(voice.file_size),
            width: None,
            height: None,
        };
        table.put(file.to_item(), PutOptions::default()).await?;
        Ok::<(), anyhow::Error>(())
    };
    if let Err(e) = archive.await {
        error!(error = %e, message = %message.pk, "voice archival failed");
    }

    Ok(())
}

/// Photo path (spec §4.E): every inbound size is fetched and uploaded
/// independently; one size failing does not block the others.
pub async fn enrich_photo(
    table: &dyn Table,
    object_store: &ObjectStore,
    bot_client: &BotClient,
    message: &Message,
) -> anyhow::Result<()> {
    let photos: Vec<PhotoPayload> = message
        .orig
        .get("photo")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    const SIZE_KINDS: [&str; 3] = ["thumb", "mediumpic", "bigpic"];

    for (idx, photo) in photos.iter().enumerate().take(SIZE_KINDS.len()) {
        let file_kind = SIZE_KINDS[idx];
        let step = async {
            let data = bot_client.fetch_file(&photo.file_id).await?;
            let key = format!("{}.jpg", photo.file_id);
            object_store.put_object(&key, data, "image/jpeg").await?;
            let file = MessageFile {
                pk: message.pk.clone(),
                file_kind: file_kind.to_string(),
                mime: "image/jpeg".to_string(),
                bucket: object_store.bucket().to_string(),
                object_key: key,
                crtd: message.crtd,
                duration: None,
                size: Some(photo.file_size),
                width: Some(photo.width),
                height: Some(photo.height),
            };
            table.put(file.to_item(), PutOptions::default()).await?;
            Ok::<(), anyhow::Error>(())
        };
        if let Err(e) = step.await {
            error!(error = %e, message = %message.pk, size = file_kind, "photo size upload failed");
        } else {
            info!(message = %message.pk, size = file_kind, "photo size archived");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_payload_defaults_when_absent() {
        let orig = serde_json::json!({});
        let voice: VoicePayload = orig
            .get("voice")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        assert_eq!(voice.duration, 0);
    }
}
