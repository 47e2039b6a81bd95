//! Table Gateway (spec §4.A): a typed facade over the partitioned
//! key/value store. `Item` is the generic attribute-map record every
//! operation moves; concrete entity types (`crate::models`) convert to
//! and from it. One object-safe `Table` trait, one Postgres-backed
//! implementation (`pg::PgTable`), and a fake in-memory one for tests
//! (`memory::MemoryTable`) — mirroring the teacher's habit of depending
//! on an abstraction at the call sites and keeping exactly one real
//! implementation behind it.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The wire-level record every `Table` operation accepts or returns:
/// the "abstract record value serializable to a string→attribute
/// mapping" of spec §4.A, made concrete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub pk: String,
    pub sk: String,
    pub kind: String,
    pub crtd: i64,
    pub ums: Option<String>,
    pub ttl: Option<i64>,
    pub attrs: serde_json::Value,
}

impl Item {
    pub fn attr(&self, key: &str) -> Option<&serde_json::Value> {
        self.attrs.get(key)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PutOptions {
    /// Fail with `Error::AlreadyExists` if `pk` is already present.
    pub unique: bool,
}

impl PutOptions {
    pub fn unique() -> Self {
        Self { unique: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventName {
    Insert,
    Modify,
    Remove,
}

/// One row of the change-stream (spec §4.D, §6.4): a total-ordered,
/// at-least-once record of a mutation to `items`.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub seq: i64,
    pub pk: String,
    pub sk: String,
    pub event_name: EventName,
    pub new_image: Item,
}

/// Projection returned by the UMS index (spec §4.A: "the GSI projects
/// only `{PK, K, UMS, CRTD}`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexProjection {
    pub pk: String,
    pub kind: String,
    pub ums: String,
    pub crtd: i64,
}

#[async_trait]
pub trait Table: Send + Sync {
    /// Unconditional insert-or-replace, or unique insert when
    /// `opts.unique` is set.
    async fn put(&self, item: Item, opts: PutOptions) -> Result<()>;

    /// Atomic batch insert; every record unique-checked by `pk`;
    /// all-or-nothing.
    async fn put_transactional(&self, items: Vec<Item>) -> Result<()>;

    async fn get(&self, pk: &str, sk: &str) -> Result<Item>;

    /// Records in `sk` ascending order.
    async fn query_prefix(&self, pk: &str, sk_prefix: &str) -> Result<Vec<Item>>;

    async fn query_index_ums(
        &self,
        ums: &str,
        crtd_low: i64,
        crtd_high: i64,
    ) -> Result<Vec<IndexProjection>>;

    /// Atomically sets `attrs.<key> := value` and `attrs.updated_at :=
    /// now`, returning the updated record.
    async fn update_map_field(
        &self,
        pk: &str,
        sk: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<Item>;

    /// Atomic counter; returns the updated record.
    async fn increment(&self, pk: &str, sk: &str, field: &str, delta: i64) -> Result<Item>;

    async fn delete(&self, pk: &str, sk: &str) -> Result<()>;

    /// Deletes rows whose `ttl` has elapsed; returns the count removed.
    /// Backs the TTL sweep background job.
    async fn sweep_expired(&self, now: i64) -> Result<u64>;

    /// Reads up to `limit` change-stream rows strictly after `after_seq`,
    /// in ascending `seq` order — the "ordered batch of change events"
    /// the dispatcher (spec §4.D) consumes.
    async fn poll_events(&self, after_seq: i64, limit: i64) -> Result<Vec<ChangeEvent>>;

    /// Last `seq` the change-stream dispatcher has committed.
    async fn dispatcher_cursor(&self) -> Result<i64>;

    async fn advance_dispatcher_cursor(&self, seq: i64) -> Result<()>;
}
