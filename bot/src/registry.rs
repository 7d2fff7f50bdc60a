//! In-memory index of live raids, keyed by channel id.
//!
//! Reads go straight to the map. Writes are serialized by `write`: the raid is
//! copied, mutated, persisted, and only then committed to the map, so the
//! store is never behind memory and a failed persist leaves memory untouched.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{RaidError, StoreError};
use crate::raid::{MessageRef, Raid};
use crate::store::RaidStore;

pub struct Registry {
    raids: DashMap<u64, Raid>,
    store: Arc<dyn RaidStore>,
    write: Mutex<()>,
}

impl Registry {
    /// Builds the registry from whatever the store holds.
    pub async fn load(store: Arc<dyn RaidStore>) -> Result<Self, StoreError> {
        let raids = DashMap::new();
        for raid in store.load_active().await? {
            raids.insert(raid.channel_id, raid);
        }
        tracing::info!(raids = raids.len(), "raid registry loaded");
        Ok(Self {
            raids,
            store,
            write: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &Arc<dyn RaidStore> {
        &self.store
    }

    pub fn exists(&self, channel_id: u64) -> bool {
        self.raids.contains_key(&channel_id)
    }

    pub fn get(&self, channel_id: u64) -> Option<Raid> {
        self.raids.get(&channel_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.raids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raids.is_empty()
    }

    /// Snapshot of every raid, oldest first.
    pub fn all(&self) -> Vec<Raid> {
        let mut raids: Vec<Raid> = self.raids.iter().map(|r| r.value().clone()).collect();
        raids.sort_by_key(|r| r.creation_time);
        raids
    }

    pub fn channel_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.raids.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn all_for_source(&self, source_channel_id: u64) -> Vec<Raid> {
        let mut raids: Vec<Raid> = self
            .raids
            .iter()
            .filter(|r| r.source_channel_id == source_channel_id)
            .map(|r| r.value().clone())
            .collect();
        raids.sort_by_key(|r| r.creation_time);
        raids
    }

    pub fn exists_for_venue(&self, venue_id: u64) -> bool {
        self.raids.iter().any(|r| r.venue_id == venue_id)
    }

    /// Channels of raids that reference `message` as announcement or mirror.
    pub fn holders_of(&self, message: MessageRef) -> Vec<u64> {
        self.raids
            .iter()
            .filter(|r| r.message_refs().any(|m| m == message))
            .map(|r| *r.key())
            .collect()
    }

    /// Channels of raids with any message living in `channel_id`.
    pub fn with_messages_in(&self, channel_id: u64) -> Vec<u64> {
        self.raids
            .iter()
            .filter(|r| r.message_refs().any(|m| m.channel_id == channel_id))
            .map(|r| *r.key())
            .collect()
    }

    /// Inserts or replaces a raid, persisting it first.
    pub async fn put(&self, raid: Raid) -> Result<(), StoreError> {
        let _guard = self.write.lock().await;
        self.store.put_active(&raid).await?;
        self.raids.insert(raid.channel_id, raid);
        Ok(())
    }

    /// Drops a raid from memory and the active store.
    pub async fn remove(&self, channel_id: u64) -> Result<Option<Raid>, StoreError> {
        let _guard = self.write.lock().await;
        self.store.delete_active(channel_id).await?;
        Ok(self.raids.remove(&channel_id).map(|(_, raid)| raid))
    }

    /// Applies `f` to the raid and persists the result.
    ///
    /// Returns the closure's value together with the committed raid.
    pub async fn update<T, F>(&self, channel_id: u64, f: F) -> Result<(T, Raid), RaidError>
    where
        F: FnOnce(&mut Raid) -> Result<T, RaidError> + Send,
        T: Send,
    {
        let _guard = self.write.lock().await;
        let mut raid = self
            .get(channel_id)
            .ok_or(RaidError::RaidNotFound(channel_id))?;

        let value = f(&mut raid)?;
        let raid = self.commit(raid).await?;
        Ok((value, raid))
    }

    /// Like `update`, but the closure may decline by returning `Ok(None)`, in
    /// which case nothing is written.
    pub async fn try_update<T, F>(
        &self,
        channel_id: u64,
        f: F,
    ) -> Result<Option<(T, Raid)>, RaidError>
    where
        F: FnOnce(&mut Raid) -> Result<Option<T>, RaidError> + Send,
        T: Send,
    {
        let _guard = self.write.lock().await;
        let mut raid = self
            .get(channel_id)
            .ok_or(RaidError::RaidNotFound(channel_id))?;

        let Some(value) = f(&mut raid)? else {
            return Ok(None);
        };

        let raid = self.commit(raid).await?;
        Ok(Some((value, raid)))
    }

    // Caller holds the write lock.
    async fn commit(&self, raid: Raid) -> Result<Raid, StoreError> {
        self.store.put_active(&raid).await?;
        self.raids.insert(raid.channel_id, raid.clone());
        Ok(raid)
    }

    /// Moves a raid to the archive when `due` holds.
    ///
    /// The archived copy has no message references; the returned raid still
    /// has them so the caller can clean up. A raid that is no longer registered
    /// yields `Ok(None)`.
    pub async fn retire_if<F>(&self, channel_id: u64, due: F) -> Result<Option<Raid>, StoreError>
    where
        F: FnOnce(&Raid) -> bool + Send,
    {
        let _guard = self.write.lock().await;
        let Some(raid) = self.get(channel_id) else {
            return Ok(None);
        };
        if !due(&raid) {
            return Ok(None);
        }

        // a retry after a failed delete finds its own entry already archived
        let archived = self.store.archived(raid.venue_id).await?;
        let already = archived.last().is_some_and(|last| {
            last.channel_id == channel_id && last.creation_time == raid.creation_time
        });
        if !already {
            self.store.archive(raid.venue_id, &raid.stripped()).await?;
        }
        self.store.delete_active(channel_id).await?;
        self.raids.remove(&channel_id);
        Ok(Some(raid))
    }
}
