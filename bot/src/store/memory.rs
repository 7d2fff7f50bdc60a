use async_trait::async_trait;
use dashmap::DashMap;

use super::{decode_archive_list, decode_raid, decode_raid_value, unreadable_key, RaidStore};
use chrono::Utc;
use crate::error::StoreError;
use crate::raid::Raid;

/// Process-local store for tests and `RAID_STORE=memory`.
///
/// Values are kept as serialized JSON, like the real backends, so the same
/// decoding paths run.
#[derive(Debug, Default)]
pub struct MemoryStore {
    active: DashMap<String, String>,
    archive: DashMap<String, String>,
    set_aside: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a raw active record, bypassing serialization.
    pub fn insert_raw(&self, channel_id: &str, raw: &str) {
        self.active.insert(channel_id.to_string(), raw.to_string());
    }

    pub fn insert_raw_archive(&self, venue_id: &str, raw: &str) {
        self.archive.insert(venue_id.to_string(), raw.to_string());
    }

    /// Archive lists that were moved out of the way because they did not parse.
    pub fn set_aside(&self) -> Vec<String> {
        self.set_aside.iter().map(|e| e.value().clone()).collect()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn contains_active(&self, channel_id: u64) -> bool {
        self.active.contains_key(&channel_id.to_string())
    }
}

#[async_trait]
impl RaidStore for MemoryStore {
    async fn load_active(&self) -> Result<Vec<Raid>, StoreError> {
        Ok(self
            .active
            .iter()
            .filter_map(|entry| decode_raid(entry.key(), entry.value()))
            .collect())
    }

    async fn get_active(&self, channel_id: u64) -> Result<Option<Raid>, StoreError> {
        let key = channel_id.to_string();
        Ok(self
            .active
            .get(&key)
            .and_then(|raw| decode_raid(&key, raw.value())))
    }

    async fn put_active(&self, raid: &Raid) -> Result<(), StoreError> {
        let payload = serde_json::to_string(raid)?;
        self.active.insert(raid.channel_id.to_string(), payload);
        Ok(())
    }

    async fn delete_active(&self, channel_id: u64) -> Result<(), StoreError> {
        self.active.remove(&channel_id.to_string());
        Ok(())
    }

    async fn archived(&self, venue_id: u64) -> Result<Vec<Raid>, StoreError> {
        let key = venue_id.to_string();
        let Some(raw) = self.archive.get(&key) else {
            return Ok(Vec::new());
        };
        Ok(decode_archive_list(&key, raw.value())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|value| decode_raid_value(&key, value))
            .collect())
    }

    async fn archive(&self, venue_id: u64, raid: &Raid) -> Result<(), StoreError> {
        let key = venue_id.to_string();
        let mut entry = self.archive.entry(key.clone()).or_insert_with(|| "[]".to_string());
        let mut list = match decode_archive_list(&key, entry.value()) {
            Some(list) => list,
            None => {
                let aside = unreadable_key(&key, Utc::now());
                self.set_aside.insert(aside, entry.value().clone());
                Vec::new()
            }
        };
        list.push(serde_json::to_value(raid)?);
        *entry = serde_json::to_string(&list)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raid::Subject;
    use chrono::{Duration, Utc};

    fn raid(channel_id: u64) -> Raid {
        let now = Utc::now();
        let mut raid = Raid::new(1, 2, Subject::Egg { tier: 5 }, 7, now, now + Duration::hours(2));
        raid.channel_id = channel_id;
        raid
    }

    #[tokio::test]
    async fn test_active_roundtrip_and_overwrite() {
        let store = MemoryStore::new();
        let mut r = raid(11);
        store.put_active(&r).await.unwrap();

        r.hatched = true;
        store.put_active(&r).await.unwrap();

        let loaded = store.get_active(11).await.unwrap().unwrap();
        assert!(loaded.hatched);
        assert_eq!(store.active_len(), 1);

        store.delete_active(11).await.unwrap();
        assert!(store.get_active(11).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_skips_malformed_records() {
        let store = MemoryStore::new();
        store.put_active(&raid(11)).await.unwrap();
        store.insert_raw("12", "{not json");
        store.insert_raw("13", r#"{"channel_id": 13}"#);

        let loaded = store.load_active().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].channel_id, 11);
    }

    #[tokio::test]
    async fn test_archive_appends() {
        let store = MemoryStore::new();
        assert!(store.archived(7).await.unwrap().is_empty());

        store.archive(7, &raid(11)).await.unwrap();
        store.archive(7, &raid(12)).await.unwrap();

        let list = store.archived(7).await.unwrap();
        let ids: Vec<u64> = list.iter().map(|r| r.channel_id).collect();
        assert_eq!(ids, vec![11, 12]);
    }

    #[tokio::test]
    async fn test_archive_keeps_unreadable_entries() {
        let store = MemoryStore::new();
        store.insert_raw_archive("7", r#"[{"legacy": true}]"#);

        store.archive(7, &raid(11)).await.unwrap();

        // the legacy element is skipped on read but still stored
        assert_eq!(store.archived(7).await.unwrap().len(), 1);
        let raw = store.archive.get("7").unwrap().value().clone();
        assert!(raw.contains("legacy"));
    }

    #[tokio::test]
    async fn test_archive_into_corrupt_list_sets_old_bytes_aside() {
        let store = MemoryStore::new();
        let corrupt = r#"[{"old": true}, {"#;
        store.insert_raw_archive("7", corrupt);

        assert!(store.archived(7).await.unwrap().is_empty());
        store.archive(7, &raid(11)).await.unwrap();

        assert_eq!(store.set_aside(), vec![corrupt.to_string()]);
        let list = store.archived(7).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].channel_id, 11);
    }
}
