//! Durable storage for raids.
//!
//! Two halves: the active store, keyed by channel id, holds every live raid;
//! the archive, keyed by venue id, holds the ordered list of finished raids.
//! Records are JSON. Loading never fails on a bad record: it is logged and
//! skipped so a schema change cannot block startup.

mod memory;
mod pg_store;
mod redis_store;

pub use memory::MemoryStore;
pub use pg_store::PgStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::StoreBackend;
use crate::error::StoreError;
use crate::raid::Raid;

#[async_trait]
pub trait RaidStore: Send + Sync {
    /// Every readable active raid.
    async fn load_active(&self) -> Result<Vec<Raid>, StoreError>;

    async fn get_active(&self, channel_id: u64) -> Result<Option<Raid>, StoreError>;

    /// Full overwrite of the record for `raid.channel_id`.
    async fn put_active(&self, raid: &Raid) -> Result<(), StoreError>;

    async fn delete_active(&self, channel_id: u64) -> Result<(), StoreError>;

    /// Archived raids for a venue, oldest first; empty if none.
    async fn archived(&self, venue_id: u64) -> Result<Vec<Raid>, StoreError>;

    /// Appends `raid` to the venue's archive.
    async fn archive(&self, venue_id: u64, raid: &Raid) -> Result<(), StoreError>;
}

/// Opens the configured backend.
pub async fn connect(backend: &StoreBackend) -> Result<Arc<dyn RaidStore>, StoreError> {
    Ok(match backend {
        StoreBackend::Redis(url) => Arc::new(RedisStore::open(url)?),
        StoreBackend::Postgres(url) => Arc::new(PgStore::connect(url).await?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    })
}

/// Parses one stored record, logging and dropping it when malformed.
pub(crate) fn decode_raid(key: &str, raw: &str) -> Option<Raid> {
    match serde_json::from_str(raw) {
        Ok(raid) => Some(raid),
        Err(e) => {
            tracing::warn!(key, error = %e, "skipping unreadable raid record");
            None
        }
    }
}

pub(crate) fn decode_raid_value(key: &str, value: serde_json::Value) -> Option<Raid> {
    match serde_json::from_value(value) {
        Ok(raid) => Some(raid),
        Err(e) => {
            tracing::warn!(key, error = %e, "skipping unreadable raid record");
            None
        }
    }
}

/// Elements of a stored archive list, kept as raw JSON so an append does not
/// drop entries this version cannot read. `None` when the list itself does
/// not parse; callers must not write over such a value.
pub(crate) fn decode_archive_list(key: &str, raw: &str) -> Option<Vec<serde_json::Value>> {
    match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        Ok(list) => Some(list),
        Err(e) => {
            tracing::warn!(key, error = %e, "archive list unreadable");
            None
        }
    }
}

/// Where an unreadable archive list is moved before a fresh one replaces it.
pub(crate) fn unreadable_key(key: &str, at: chrono::DateTime<chrono::Utc>) -> String {
    format!("{}:unreadable:{}", key, at.timestamp_millis())
}
