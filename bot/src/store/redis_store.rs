use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::{decode_archive_list, decode_raid, decode_raid_value, unreadable_key, RaidStore};
use crate::error::StoreError;
use crate::raid::Raid;

const ACTIVE_PREFIX: &str = "raid_active:";
const ARCHIVE_PREFIX: &str = "raid_archive:";

fn active_key(channel_id: u64) -> String { format!("{}{}", ACTIVE_PREFIX, channel_id) }

fn archive_key(venue_id: u64) -> String { format!("{}{}", ARCHIVE_PREFIX, venue_id) }

/// Raids as JSON strings in Redis, no expiry.
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn open(url: &str) -> Result<Self, StoreError> {
        Ok(Self { client: redis::Client::open(url)? })
    }

    async fn conn(&self) -> Result<MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl RaidStore for RedisStore {
    async fn load_active(&self) -> Result<Vec<Raid>, StoreError> {
        let mut conn = self.conn().await?;

        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn.scan_match::<_, String>(format!("{}*", ACTIVE_PREFIX)).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;
        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, raw)| raw.and_then(|raw| decode_raid(key, &raw)))
            .collect())
    }

    async fn get_active(&self, channel_id: u64) -> Result<Option<Raid>, StoreError> {
        let mut conn = self.conn().await?;
        let key = active_key(channel_id);
        let v: Option<String> = conn.get(&key).await?;
        Ok(v.and_then(|raw| decode_raid(&key, &raw)))
    }

    async fn put_active(&self, raid: &Raid) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(raid)?;
        let _: () = conn.set(active_key(raid.channel_id), payload).await?;
        Ok(())
    }

    async fn delete_active(&self, channel_id: u64) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(active_key(channel_id)).await?;
        Ok(())
    }

    async fn archived(&self, venue_id: u64) -> Result<Vec<Raid>, StoreError> {
        let mut conn = self.conn().await?;
        let key = archive_key(venue_id);
        let v: Option<String> = conn.get(&key).await?;
        Ok(match v {
            Some(raw) => decode_archive_list(&key, &raw)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|value| decode_raid_value(&key, value))
                .collect(),
            None => Vec::new(),
        })
    }

    async fn archive(&self, venue_id: u64, raid: &Raid) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let key = archive_key(venue_id);
        let existing: Option<String> = conn.get(&key).await?;
        let mut list = match existing {
            None => Vec::new(),
            Some(raw) => match decode_archive_list(&key, &raw) {
                Some(list) => list,
                None => {
                    let aside = unreadable_key(&key, Utc::now());
                    let _: () = conn.set(&aside, raw).await?;
                    tracing::warn!(key = %key, aside = %aside, "moved unreadable archive list aside");
                    Vec::new()
                }
            },
        };
        list.push(serde_json::to_value(raid)?);
        let payload = serde_json::to_string(&list)?;
        let _: () = conn.set(&key, payload).await?;
        Ok(())
    }
}
