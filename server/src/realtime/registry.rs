//! Connection Registry (spec §4.G): one record per live websocket keyed
//! by owning user, subscription pairs keyed both by owner and by UMS
//! target, cleanup on disconnect. The durable half lives in the store
//! (`WSConn`/`SubscriptionA`/`SubscriptionB`); the in-process half is an
//! outbound-frame sender per connection id, the in-memory analogue of
//! the teacher's `ConnectionTracker` (`realtime/websocket.rs`).

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::Result;
use crate::models::{self, Folder, SubscriptionA, SubscriptionB, WsConn};
use crate::store::{PutOptions, Table};

use super::commands::Reply;

/// Process-wide map from connection id to its outbound reply channel.
/// One entry per live websocket, populated on Connect and removed on
/// Disconnect.
#[derive(Default)]
pub struct ConnectionRegistry {
    senders: DashMap<String, mpsc::Sender<Reply>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conn_id: &str, sender: mpsc::Sender<Reply>) {
        self.senders.insert(conn_id.to_string(), sender);
    }

    pub fn unregister(&self, conn_id: &str) {
        self.senders.remove(conn_id);
    }

    /// Number of live websocket connections (spec §9 health reporting).
    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }

    /// Posts one frame to a connection's outbound channel. Errors are
    /// logged, not surfaced, per spec §4.D step 1 ("Post errors are
    /// logged and do not abort the batch").
    pub async fn send(&self, conn_id: &str, reply: Reply) {
        let sender = self.senders.get(conn_id).map(|s| s.clone());
        match sender {
            Some(sender) => {
                if let Err(e) = sender.send(reply).await {
                    warn!(conn_id, error = %e, "dropping frame, connection gone");
                }
            }
            None => warn!(conn_id, "no live connection for fan-out target"),
        }
    }
}

/// Connect (spec §4.G): construct and store a `WSConn`, TTL 24h. Seeds
/// the default folder set on a user's first-ever connection.
pub async fn connect(
    table: &dyn Table,
    user_pk: &str,
    conn_id: &str,
    domain: &str,
    stage: &str,
    now: i64,
) -> Result<()> {
    let conn = WsConn {
        user_pk: user_pk.to_string(),
        conn_id: conn_id.to_string(),
        domain: domain.to_string(),
        stage: stage.to_string(),
        ttl: now + 24 * 3600,
        crtd: now,
    };
    table.put(conn.to_item(), PutOptions::default()).await?;

    if table
        .query_prefix(user_pk, "fldr#")
        .await
        .map(|rows| rows.is_empty())
        .unwrap_or(true)
    {
        for folder in Folder::seed_set(user_pk, now) {
            // Folders aren't unique-checked: a racing second connect
            // seeding the same set is harmless, last write wins.
            table.put(folder.to_item(), PutOptions::default()).await?;
        }
    }

    Ok(())
}

/// Disconnect (spec §4.G): delete the WSConn and, if present, the
/// Subscription-A/B pair for this connection. Errors are aggregated and
/// returned but do not block each other; a missing Subscription-A is
/// not an error.
pub async fn disconnect(table: &dyn Table, user_pk: &str, conn_id: &str) -> Vec<anyhow::Error> {
    let mut errors = Vec::new();

    if let Err(e) = table.delete(user_pk, &models::keys::wsconn_sk(conn_id)).await {
        errors.push(anyhow::anyhow!("delete WSConn: {e}"));
    }

    let sub_a_sk = models::keys::subs_sk(conn_id);
    match table.get(user_pk, &sub_a_sk).await {
        Ok(item) => match SubscriptionA::from_item(&item) {
            Ok(sub_a) => {
                if let Err(e) = table.delete(user_pk, &sub_a_sk).await {
                    errors.push(anyhow::anyhow!("delete SubscriptionA: {e}"));
                }
                if let Err(e) = table.delete(&sub_a.ums_target, &sub_a_sk).await {
                    errors.push(anyhow::anyhow!("delete SubscriptionB: {e}"));
                }
            }
            Err(e) => errors.push(e),
        },
        Err(crate::error::Error::NoSuchItem) => {}
        Err(e) => errors.push(anyhow::anyhow!("fetch SubscriptionA: {e}")),
    }

    errors
}

/// Subscribe command handler (spec §4.G). Refuses a target other than
/// the requester's own PK with `"no permissions"` (spec Q1: no
/// permission table is consulted yet).
pub async fn subscribe(
    table: &dyn Table,
    requester_pk: &str,
    conn_id: &str,
    ums_pk: Option<&str>,
    status: i64,
    domain: &str,
    stage: &str,
    now: i64,
) -> std::result::Result<(), &'static str> {
    let target_pk = ums_pk.unwrap_or(requester_pk);
    if target_pk != requester_pk {
        return Err("no permissions");
    }

    let ums = models::keys::ums(target_pk, status);
    let sub_a = SubscriptionA {
        owner_pk: requester_pk.to_string(),
        conn_id: conn_id.to_string(),
        ums_target: ums.clone(),
        domain: domain.to_string(),
        stage: stage.to_string(),
        ttl: now + 24 * 3600,
        crtd: now,
    };
    let sub_b = SubscriptionB {
        ums,
        conn_id: conn_id.to_string(),
        owner_pk: requester_pk.to_string(),
        domain: domain.to_string(),
        stage: stage.to_string(),
        ttl: now + 24 * 3600,
        crtd: now,
    };

    table
        .put(sub_a.to_item(), PutOptions::default())
        .await
        .map_err(|_| "store error")?;
    table
        .put(sub_b.to_item(), PutOptions::default())
        .await
        .map_err(|_| "store error")?;
    Ok(())
}

/// Unsubscribe command handler: delete both records by their respective
/// PKs.
pub async fn unsubscribe(
    table: &dyn Table,
    requester_pk: &str,
    conn_id: &str,
    ums_pk: Option<&str>,
    status: i64,
) -> Result<()> {
    let target_pk = ums_pk.unwrap_or(requester_pk);
    let ums = models::keys::ums(target_pk, status);
    let sk = models::keys::subs_sk(conn_id);
    table.delete(requester_pk, &sk).await.ok();
    table.delete(&ums, &sk).await.ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryTable;

    #[tokio::test]
    async fn subscribe_then_unsubscribe_leaves_no_records() {
        let table = MemoryTable::new();
        subscribe(
            &table,
            "user#u1",
            "c1",
            None,
            0,
            "d",
            "s",
            1_700_000_000,
        )
        .await
        .unwrap();

        let ums = models::keys::ums("user#u1", 0);
        assert!(table.get("user#u1", &models::keys::subs_sk("c1")).await.is_ok());
        assert!(table.get(&ums, &models::keys::subs_sk("c1")).await.is_ok());

        unsubscribe(&table, "user#u1", "c1", None, 0).await.unwrap();

        assert!(table.get("user#u1", &models::keys::subs_sk("c1")).await.is_err());
        assert!(table.get(&ums, &models::keys::subs_sk("c1")).await.is_err());
    }

    #[tokio::test]
    async fn subscribe_to_other_user_is_refused() {
        let table = MemoryTable::new();
        let result = subscribe(
            &table,
            "user#u1",
            "c1",
            Some("user#u2"),
            0,
            "d",
            "s",
            1_700_000_000,
        )
        .await;
        assert_eq!(result, Err("no permissions"));
    }
}
