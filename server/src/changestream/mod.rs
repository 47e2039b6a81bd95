//! Change-Stream Dispatcher (spec §4.D): consumes an ordered batch of
//! record change events; for message inserts routes to enrichers, for
//! any message change fans out to subscribers. Processes a batch
//! sequentially, in the store's total per-partition order (spec O2).

use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::bot::BotClient;
use crate::enrich::object_store::ObjectStore;
use crate::enrich::speech::SpeechClient;
use crate::enrich::{enrich_photo, enrich_voice};
use crate::models::{Bot, Message, MessageKind, User};
use crate::realtime::commands::Reply;
use crate::realtime::registry::ConnectionRegistry;
use crate::store::{ChangeEvent, EventName, Table};

/// Process-wide collaborators the dispatcher needs beyond the table
/// (spec §5 "Shared resources": "one bot HTTP client per bot secret").
pub struct DispatcherContext {
    pub table: Arc<dyn Table>,
    pub registry: Arc<ConnectionRegistry>,
    pub object_store: Arc<ObjectStore>,
    pub speech: Arc<SpeechClient>,
    bot_clients: DashMap<String, Arc<BotClient>>,
}

impl DispatcherContext {
    pub fn new(
        table: Arc<dyn Table>,
        registry: Arc<ConnectionRegistry>,
        object_store: Arc<ObjectStore>,
        speech: Arc<SpeechClient>,
    ) -> Self {
        Self {
            table,
            registry,
            object_store,
            speech,
            bot_clients: DashMap::new(),
        }
    }

    async fn bot_client(&self, bot_pk: &str) -> anyhow::Result<Arc<BotClient>> {
        if let Some(client) = self.bot_clients.get(bot_pk) {
            return Ok(client.clone());
        }
        let item = self.table.get(bot_pk, bot_pk).await?;
        let bot = Bot::from_item(&item)?;
        let client = Arc::new(BotClient::new(&bot));
        self.bot_clients.insert(bot_pk.to_string(), client.clone());
        Ok(client)
    }
}

/// Processes one ordered batch of change events (spec §4.D). Errors
/// from any single event's fan-out or enrichment are logged and do not
/// abort the batch; the whole function only errors on a failure to read
/// the event stream itself (callers don't invoke it that way here, so
/// this always returns `Ok`).
pub async fn process_batch(ctx: &DispatcherContext, events: &[ChangeEvent]) -> anyhow::Result<()> {
    for event in events {
        if !event.pk.starts_with("msg#") || !event.sk.starts_with("msg#") {
            continue;
        }

        crate::metrics::record_changestream_event();
        fan_out(ctx, event).await;

        if event.event_name == EventName::Insert {
            enrich(ctx, event).await;
        }
    }
    Ok(())
}

/// Subscription fan-out (spec §4.D step 1): always runs, for every
/// message event.
async fn fan_out(ctx: &DispatcherContext, event: &ChangeEvent) {
    let ums = match event.new_image.ums.clone() {
        Some(ums) => ums,
        None => {
            // spec Q2: behavior when UMS is absent is unspecified; skip
            // fan-out rather than guess a target.
            warn!(pk = %event.pk, "change event missing UMS, skipping fan-out");
            return;
        }
    };

    let subscribers = match ctx.table.query_prefix(&ums, "subs#").await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, ums = %ums, "could not list subscribers");
            return;
        }
    };

    // `Item.kind` is the store-level record discriminator (always
    // "Message" here); subscribers want the message's own kind, carried
    // as `attrs["K"]`.
    let kind = event
        .new_image
        .attr("K")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    for sub in subscribers {
        let conn_id = sub.sk.strip_prefix("subs#").unwrap_or("");
        let reply = Reply::DbEvent {
            name: "dbevent",
            event: event_name_str(event.event_name),
            pk: event.pk.clone(),
            ums: ums.clone(),
            kind: kind.clone(),
        };
        ctx.registry.send(conn_id, reply).await;
        crate::metrics::record_fanout_sent();
    }
}

fn event_name_str(name: EventName) -> &'static str {
    match name {
        EventName::Insert => "INSERT",
        EventName::Modify => "MODIFY",
        EventName::Remove => "REMOVE",
    }
}

/// Enrichment routing (spec §4.D step 2, INSERT only).
async fn enrich(ctx: &DispatcherContext, event: &ChangeEvent) {
    let message = match Message::from_item(&event.new_image) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, pk = %event.pk, "could not parse message for enrichment");
            return;
        }
    };

    if !matches!(message.kind, MessageKind::TGVoice | MessageKind::TGPhoto) {
        return;
    }

    let bot_client = match ctx.bot_client(&message.channel_pk).await {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, bot = %message.channel_pk, "could not build bot client");
            return;
        }
    };

    let chat_id = match ctx.table.get(&message.author_pk, &message.author_pk).await {
        Ok(item) => User::from_item(&item).ok().and_then(|u| u.tgid),
        Err(_) => None,
    };
    let chat_id = match chat_id {
        Some(id) => id,
        None => {
            warn!(author = %message.author_pk, "no linked chat id for enrichment reply");
            return;
        }
    };

    let result = match message.kind {
        MessageKind::TGVoice => {
            enrich_voice(
                ctx.table.as_ref(),
                &ctx.object_store,
                &ctx.speech,
                &bot_client,
                &message,
                &chat_id,
            )
            .await
        }
        MessageKind::TGPhoto => {
            enrich_photo(ctx.table.as_ref(), &ctx.object_store, &bot_client, &message).await
        }
        _ => unreachable!(),
    };

    crate::metrics::record_enrich_result(result.is_ok());
    if let Err(e) = result {
        warn!(error = %e, pk = %message.pk, "enrichment failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryTable;
    use crate::store::PutOptions;

    #[tokio::test]
    async fn fan_out_skips_events_without_ums() {
        let table: Arc<dyn Table> = Arc::new(MemoryTable::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let object_store_config = crate::enrich::object_store::ObjectStoreConfig::default();
        let object_store = Arc::new(ObjectStore::new(object_store_config).await.unwrap());
        let speech = Arc::new(SpeechClient::new(Default::default()));
        let ctx = DispatcherContext::new(table.clone(), registry, object_store, speech);

        let message = Message::new(
            "bot#foobot#tg".to_string(),
            "user#u1".to_string(),
            MessageKind::TGText,
            0,
            serde_json::json!({}),
            "hi".to_string(),
            1_700_000_000,
        );
        let mut item = message.to_item();
        item.ums = None;
        table.put(item.clone(), PutOptions::default()).await.unwrap();

        let event = ChangeEvent {
            seq: 1,
            pk: item.pk.clone(),
            sk: item.sk.clone(),
            event_name: EventName::Insert,
            new_image: item,
        };
        // Should not panic even with nothing subscribed.
        process_batch(&ctx, &[event]).await.unwrap();
    }

    #[tokio::test]
    async fn text_message_insert_is_not_routed_to_enrichment() {
        let table: Arc<dyn Table> = Arc::new(MemoryTable::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let object_store = Arc::new(
            ObjectStore::new(crate::enrich::object_store::ObjectStoreConfig::default())
                .await
                .unwrap(),
        );
        let speech = Arc::new(SpeechClient::new(Default::default()));
        let ctx = DispatcherContext::new(table.clone(), registry, object_store, speech);

        let message = Message::new(
            "bot#foobot#tg".to_string(),
            "user#u1".to_string(),
            MessageKind::TGText,
            0,
            serde_json::json!({}),
            "hi".to_string(),
            1_700_000_000,
        );
        let item = message.to_item();
        table.put(item.clone(), PutOptions::default()).await.unwrap();
        let event = ChangeEvent {
            seq: 1,
            pk: item.pk.clone(),
            sk: item.sk.clone(),
            event_name: EventName::Insert,
            new_image: item,
        };
        process_batch(&ctx, &[event]).await.unwrap();
        let files = table.query_prefix(&message.pk, "file#").await.unwrap();
        assert!(files.is_empty());
    }
}
