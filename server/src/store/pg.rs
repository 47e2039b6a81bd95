//! Postgres realization of the partitioned key/value store (spec §6.4,
//! SPEC_FULL §3 "Storage substrate"): one polymorphic `items` table plus
//! an append-only `item_events` log standing in for the store's
//! change-stream, and a single-row `dispatcher_cursor` table tracking
//! how far the dispatcher has read it.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Row, Transaction};

use crate::error::{Error, Result};

use super::{ChangeEvent, EventName, IndexProjection, Item, PutOptions, Table};

pub type DbPool = PgPool;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/relay".to_string()),
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

pub async fn init_db(config: DbConfig) -> anyhow::Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

pub struct PgTable {
    pool: DbPool,
}

impl PgTable {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_item(row: &sqlx::postgres::PgRow) -> Result<Item> {
        Ok(Item {
            pk: row.try_get("pk")?,
            sk: row.try_get("sk")?,
            kind: row.try_get("kind")?,
            crtd: row.try_get("crtd")?,
            ums: row.try_get("ums")?,
            ttl: row.try_get("ttl")?,
            attrs: row.try_get("attrs")?,
        })
    }

    /// Inserts `item` and appends a matching `item_events` row within
    /// `tx`. Shared by `put` and `put_transactional` so every writer
    /// goes through the same change-stream emission path. Whether the
    /// row was freshly inserted or an existing one was overwritten
    /// comes from `xmax = 0` on the returned row, not from `unique` —
    /// a non-unique put still needs to tell an INSERT from a MODIFY.
    async fn insert_with_event(
        tx: &mut Transaction<'_, Postgres>,
        item: &Item,
        unique: bool,
    ) -> Result<bool> {
        let query = if unique {
            sqlx::query(
                r#"
                INSERT INTO items (pk, sk, kind, crtd, ums, ttl, attrs)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (pk, sk) DO NOTHING
                RETURNING (xmax = 0) AS inserted
                "#,
            )
        } else {
            sqlx::query(
                r#"
                INSERT INTO items (pk, sk, kind, crtd, ums, ttl, attrs)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (pk, sk) DO UPDATE SET
                    kind = EXCLUDED.kind,
                    crtd = EXCLUDED.crtd,
                    ums = EXCLUDED.ums,
                    ttl = EXCLUDED.ttl,
                    attrs = EXCLUDED.attrs
                RETURNING (xmax = 0) AS inserted
                "#,
            )
        };

        let row = query
            .bind(&item.pk)
            .bind(&item.sk)
            .bind(&item.kind)
            .bind(item.crtd)
            .bind(&item.ums)
            .bind(item.ttl)
            .bind(&item.attrs)
            .fetch_optional(&mut **tx)
            .await?;

        let row = match row {
            Some(row) => row,
            // unique conflict: ON CONFLICT DO NOTHING produced no row
            None => return Ok(false),
        };
        let inserted: bool = row.try_get("inserted")?;
        let event_name = if inserted { EventName::Insert } else { EventName::Modify };

        sqlx::query(
            r#"
            INSERT INTO item_events (pk, sk, event_name, new_image)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&item.pk)
        .bind(&item.sk)
        .bind(event_name.as_db_str())
        .bind(serde_json::to_value(item).map_err(anyhow::Error::from)?)
        .execute(&mut **tx)
        .await?;

        Ok(true)
    }
}

impl EventName {
    fn as_db_str(self) -> &'static str {
        match self {
            EventName::Insert => "INSERT",
            EventName::Modify => "MODIFY",
            EventName::Remove => "REMOVE",
        }
    }

    fn from_db_str(s: &str) -> EventName {
        match s {
            "INSERT" => EventName::Insert,
            "REMOVE" => EventName::Remove,
            _ => EventName::Modify,
        }
    }
}

#[async_trait]
impl Table for PgTable {
    async fn put(&self, item: Item, opts: PutOptions) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let inserted = Self::insert_with_event(&mut tx, &item, opts.unique).await?;
        if opts.unique && !inserted {
            return Err(Error::AlreadyExists);
        }
        tx.commit().await?;
        Ok(())
    }

    async fn put_transactional(&self, items: Vec<Item>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for item in &items {
            let inserted = Self::insert_with_event(&mut tx, item, true).await?;
            if !inserted {
                // Transaction drop rolls back.
                return Err(Error::AlreadyExists);
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, pk: &str, sk: &str) -> Result<Item> {
        let row = sqlx::query(
            "SELECT pk, sk, kind, crtd, ums, ttl, attrs FROM items WHERE pk = $1 AND sk = $2",
        )
        .bind(pk)
        .bind(sk)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_item(&row),
            None => Err(Error::NoSuchItem),
        }
    }

    async fn query_prefix(&self, pk: &str, sk_prefix: &str) -> Result<Vec<Item>> {
        let rows = sqlx::query(
            r#"
            SELECT pk, sk, kind, crtd, ums, ttl, attrs FROM items
            WHERE pk = $1 AND sk LIKE $2
            ORDER BY sk ASC
            "#,
        )
        .bind(pk)
        .bind(format!("{}%", sk_prefix.replace('%', "\\%")))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }

    async fn query_index_ums(
        &self,
        ums: &str,
        crtd_low: i64,
        crtd_high: i64,
    ) -> Result<Vec<IndexProjection>> {
        // `kind` on `items` is the store-level record discriminator
        // (always "Message" for these rows); the GSI's `K` column is the
        // message kind carried in `attrs`.
        let rows = sqlx::query(
            r#"
            SELECT pk, COALESCE(attrs->>'K', '') AS kind, ums, crtd FROM items
            WHERE ums = $1 AND crtd BETWEEN $2 AND $3
            ORDER BY crtd ASC
            "#,
        )
        .bind(ums)
        .bind(crtd_low)
        .bind(crtd_high)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(IndexProjection {
                    pk: row.try_get("pk")?,
                    kind: row.try_get("kind")?,
                    ums: row.try_get("ums")?,
                    crtd: row.try_get("crtd")?,
                })
            })
            .collect()
    }

    async fn update_map_field(
        &self,
        pk: &str,
        sk: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<Item> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            UPDATE items
            SET attrs = jsonb_set(jsonb_set(attrs, $3, $4, true), '{updated_at}', to_jsonb($5::bigint), true)
            WHERE pk = $1 AND sk = $2
            RETURNING pk, sk, kind, crtd, ums, ttl, attrs
            "#,
        )
        .bind(pk)
        .bind(sk)
        .bind(format!("{{{key}}}"))
        .bind(&value)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let row = row.ok_or(Error::NoSuchItem)?;
        let item = Self::row_to_item(&row)?;

        sqlx::query(
            "INSERT INTO item_events (pk, sk, event_name, new_image) VALUES ($1, $2, 'MODIFY', $3)",
        )
        .bind(pk)
        .bind(sk)
        .bind(serde_json::to_value(&item).map_err(anyhow::Error::from)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(item)
    }

    async fn increment(&self, pk: &str, sk: &str, field: &str, delta: i64) -> Result<Item> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            UPDATE items
            SET attrs = jsonb_set(
                attrs,
                $3,
                to_jsonb(COALESCE((attrs #>> $4)::bigint, 0) + $5),
                true
            )
            WHERE pk = $1 AND sk = $2
            RETURNING pk, sk, kind, crtd, ums, ttl, attrs
            "#,
        )
        .bind(pk)
        .bind(sk)
        .bind(format!("{{{field}}}"))
        .bind(vec![field.to_string()])
        .bind(delta)
        .fetch_optional(&mut *tx)
        .await?;

        let row = row.ok_or(Error::NoSuchItem)?;
        let item = Self::row_to_item(&row)?;

        sqlx::query(
            "INSERT INTO item_events (pk, sk, event_name, new_image) VALUES ($1, $2, 'MODIFY', $3)",
        )
        .bind(pk)
        .bind(sk)
        .bind(serde_json::to_value(&item).map_err(anyhow::Error::from)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(item)
    }

    async fn delete(&self, pk: &str, sk: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM items WHERE pk = $1 AND sk = $2")
            .bind(pk)
            .bind(sk)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NoSuchItem);
        }

        sqlx::query(
            "INSERT INTO item_events (pk, sk, event_name, new_image) VALUES ($1, $2, 'REMOVE', '{}'::jsonb)",
        )
        .bind(pk)
        .bind(sk)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn sweep_expired(&self, now: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let expired = sqlx::query("SELECT pk, sk FROM items WHERE ttl IS NOT NULL AND ttl <= $1")
            .bind(now)
            .fetch_all(&mut *tx)
            .await?;

        for row in &expired {
            let pk: String = row.try_get("pk")?;
            let sk: String = row.try_get("sk")?;
            sqlx::query("DELETE FROM items WHERE pk = $1 AND sk = $2")
                .bind(&pk)
                .bind(&sk)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO item_events (pk, sk, event_name, new_image) VALUES ($1, $2, 'REMOVE', '{}'::jsonb)",
            )
            .bind(&pk)
            .bind(&sk)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(expired.len() as u64)
    }

    async fn poll_events(&self, after_seq: i64, limit: i64) -> Result<Vec<ChangeEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT seq, pk, sk, event_name, new_image FROM item_events
            WHERE seq > $1
            ORDER BY seq ASC
            LIMIT $2
            "#,
        )
        .bind(after_seq)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let event_name: String = row.try_get("event_name")?;
                let new_image: serde_json::Value = row.try_get("new_image")?;
                let new_image = if new_image.is_null() || new_image == serde_json::json!({}) {
                    Item {
                        pk: row.try_get("pk")?,
                        sk: row.try_get("sk")?,
                        kind: String::new(),
                        crtd: 0,
                        ums: None,
                        ttl: None,
                        attrs: serde_json::json!({}),
                    }
                } else {
                    serde_json::from_value(new_image).map_err(anyhow::Error::from)?
                };
                Ok(ChangeEvent {
                    seq: row.try_get("seq")?,
                    pk: row.try_get("pk")?,
                    sk: row.try_get("sk")?,
                    event_name: EventName::from_db_str(&event_name),
                    new_image,
                })
            })
            .collect()
    }

    async fn dispatcher_cursor(&self) -> Result<i64> {
        let row = sqlx::query("SELECT last_seq FROM dispatcher_cursor WHERE id = true")
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => row.try_get("last_seq")?,
            None => 0,
        })
    }

    async fn advance_dispatcher_cursor(&self, seq: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dispatcher_cursor (id, last_seq) VALUES (true, $1)
            ON CONFLICT (id) DO UPDATE SET last_seq = EXCLUDED.last_seq
            "#,
        )
        .bind(seq)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
