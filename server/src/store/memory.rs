//! In-memory fake `Table` (SPEC_FULL §9 "Test tooling"): lets ingest,
//! enrichment, and command-server logic be unit-tested without a
//! database, the way the teacher keeps DB-dependent tests `#[ignore]`d
//! and reaches for plain in-process state everywhere else.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{ChangeEvent, EventName, IndexProjection, Item, PutOptions, Table};

#[derive(Default)]
struct Inner {
    items: Vec<Item>,
    events: Vec<ChangeEvent>,
    cursor: i64,
}

pub struct MemoryTable {
    inner: Mutex<Inner>,
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn push_event(inner: &mut Inner, pk: &str, sk: &str, event_name: EventName, image: Item) {
        let seq = inner.events.last().map(|e| e.seq).unwrap_or(0) + 1;
        inner.events.push(ChangeEvent {
            seq,
            pk: pk.to_string(),
            sk: sk.to_string(),
            event_name,
            new_image: image,
        });
    }
}

#[async_trait]
impl Table for MemoryTable {
    async fn put(&self, item: Item, opts: PutOptions) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let existing = inner
            .items
            .iter()
            .position(|i| i.pk == item.pk && i.sk == item.sk);

        if opts.unique && existing.is_some() {
            return Err(Error::AlreadyExists);
        }

        let event_name = if existing.is_some() {
            EventName::Modify
        } else {
            EventName::Insert
        };

        match existing {
            Some(idx) => inner.items[idx] = item.clone(),
            None => inner.items.push(item.clone()),
        }
        Self::push_event(&mut inner, &item.pk, &item.sk, event_name, item);
        Ok(())
    }

    async fn put_transactional(&self, items: Vec<Item>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for item in &items {
            if inner
                .items
                .iter()
                .any(|i| i.pk == item.pk && i.sk == item.sk)
            {
                return Err(Error::AlreadyExists);
            }
        }
        for item in items {
            inner.items.push(item.clone());
            Self::push_event(&mut inner, &item.pk, &item.sk, EventName::Insert, item);
        }
        Ok(())
    }

    async fn get(&self, pk: &str, sk: &str) -> Result<Item> {
        let inner = self.inner.lock().unwrap();
        inner
            .items
            .iter()
            .find(|i| i.pk == pk && i.sk == sk)
            .cloned()
            .ok_or(Error::NoSuchItem)
    }

    async fn query_prefix(&self, pk: &str, sk_prefix: &str) -> Result<Vec<Item>> {
        let inner = self.inner.lock().unwrap();
        let mut found: Vec<Item> = inner
            .items
            .iter()
            .filter(|i| i.pk == pk && i.sk.starts_with(sk_prefix))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.sk.cmp(&b.sk));
        Ok(found)
    }

    async fn query_index_ums(
        &self,
        ums: &str,
        crtd_low: i64,
        crtd_high: i64,
    ) -> Result<Vec<IndexProjection>> {
        let inner = self.inner.lock().unwrap();
        let mut found: Vec<IndexProjection> = inner
            .items
            .iter()
            .filter(|i| {
                i.ums.as_deref() == Some(ums) && i.crtd >= crtd_low && i.crtd <= crtd_high
            })
            .map(|i| IndexProjection {
                pk: i.pk.clone(),
                kind: i
                    .attrs
                    .get("K")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                ums: i.ums.clone().unwrap_or_default(),
                crtd: i.crtd,
            })
            .collect();
        found.sort_by_key(|p| p.crtd);
        Ok(found)
    }

    async fn update_map_field(
        &self,
        pk: &str,
        sk: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<Item> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner
            .items
            .iter()
            .position(|i| i.pk == pk && i.sk == sk)
            .ok_or(Error::NoSuchItem)?;

        let now = chrono::Utc::now().timestamp();
        {
            let item = &mut inner.items[idx];
            if let Some(obj) = item.attrs.as_object_mut() {
                obj.insert(key.to_string(), value);
                obj.insert("updated_at".to_string(), serde_json::json!(now));
            }
        }
        let updated = inner.items[idx].clone();
        Self::push_event(&mut inner, pk, sk, EventName::Modify, updated.clone());
        Ok(updated)
    }

    async fn increment(&self, pk: &str, sk: &str, field: &str, delta: i64) -> Result<Item> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner
            .items
            .iter()
            .position(|i| i.pk == pk && i.sk == sk)
            .ok_or(Error::NoSuchItem)?;

        {
            let item = &mut inner.items[idx];
            if let Some(obj) = item.attrs.as_object_mut() {
                let current = obj.get(field).and_then(|v| v.as_i64()).unwrap_or(0);
                obj.insert(field.to_string(), serde_json::json!(current + delta));
            }
        }
        let updated = inner.items[idx].clone();
        Self::push_event(&mut inner, pk, sk, EventName::Modify, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, pk: &str, sk: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner
            .items
            .iter()
            .position(|i| i.pk == pk && i.sk == sk)
            .ok_or(Error::NoSuchItem)?;
        let removed = inner.items.remove(idx);
        Self::push_event(&mut inner, pk, sk, EventName::Remove, removed);
        Ok(())
    }

    async fn sweep_expired(&self, now: i64) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<Item> = inner
            .items
            .iter()
            .filter(|i| i.ttl.map(|t| t <= now).unwrap_or(false))
            .cloned()
            .collect();
        inner
            .items
            .retain(|i| !i.ttl.map(|t| t <= now).unwrap_or(false));
        let count = expired.len() as u64;
        for item in expired {
            Self::push_event(&mut inner, &item.pk.clone(), &item.sk.clone(), EventName::Remove, item);
        }
        Ok(count)
    }

    async fn poll_events(&self, after_seq: i64, limit: i64) -> Result<Vec<ChangeEvent>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .events
            .iter()
            .filter(|e| e.seq > after_seq)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn dispatcher_cursor(&self) -> Result<i64> {
        Ok(self.inner.lock().unwrap().cursor)
    }

    async fn advance_dispatcher_cursor(&self, seq: i64) -> Result<()> {
        self.inner.lock().unwrap().cursor = seq;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(pk: &str, sk: &str, crtd: i64, ums: Option<&str>) -> Item {
        Item {
            pk: pk.to_string(),
            sk: sk.to_string(),
            kind: "test".to_string(),
            crtd,
            ums: ums.map(|s| s.to_string()),
            ttl: None,
            attrs: json!({}),
        }
    }

    #[tokio::test]
    async fn put_unique_rejects_duplicate_pk() {
        let table = MemoryTable::new();
        table
            .put(item("user#u1", "user#u1", 1, None), PutOptions::unique())
            .await
            .unwrap();
        let err = table
            .put(item("user#u1", "user#u1", 2, None), PutOptions::unique())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));
    }

    #[tokio::test]
    async fn query_prefix_orders_by_sk() {
        let table = MemoryTable::new();
        table
            .put(item("msg#m1", "file#b", 1, None), PutOptions::default())
            .await
            .unwrap();
        table
            .put(item("msg#m1", "file#a", 1, None), PutOptions::default())
            .await
            .unwrap();
        let rows = table.query_prefix("msg#m1", "file#").await.unwrap();
        assert_eq!(rows[0].sk, "file#a");
        assert_eq!(rows[1].sk, "file#b");
    }

    #[tokio::test]
    async fn query_index_ums_filters_by_crtd_range() {
        let table = MemoryTable::new();
        table
            .put(item("msg#m1", "msg#m1", 100, Some("user#u1#0")), PutOptions::default())
            .await
            .unwrap();
        table
            .put(item("msg#m2", "msg#m2", 200, Some("user#u1#0")), PutOptions::default())
            .await
            .unwrap();
        let rows = table.query_index_ums("user#u1#0", 150, 300).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pk, "msg#m2");
    }

    #[tokio::test]
    async fn increment_starts_from_zero() {
        let table = MemoryTable::new();
        table
            .put(item("inreq#r1", "inreq#r1", 1, None), PutOptions::default())
            .await
            .unwrap();
        let updated = table.increment("inreq#r1", "inreq#r1", "A", 1).await.unwrap();
        assert_eq!(updated.attr("A").unwrap(), &json!(1));
        let updated = table.increment("inreq#r1", "inreq#r1", "A", 1).await.unwrap();
        assert_eq!(updated.attr("A").unwrap(), &json!(2));
    }

    #[tokio::test]
    async fn poll_events_is_ordered_and_advances_past_cursor() {
        let table = MemoryTable::new();
        table
            .put(item("msg#m1", "msg#m1", 1, None), PutOptions::default())
            .await
            .unwrap();
        table
            .put(item("msg#m2", "msg#m2", 2, None), PutOptions::default())
            .await
            .unwrap();
        let all = table.poll_events(0, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        table.advance_dispatcher_cursor(all[0].seq).await.unwrap();
        let rest = table
            .poll_events(table.dispatcher_cursor().await.unwrap(), 10)
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].pk, "msg#m2");
    }
}
