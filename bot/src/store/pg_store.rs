use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use super::{decode_raid_value, RaidStore};
use crate::error::StoreError;
use crate::raid::Raid;

const CREATE_ACTIVE: &str = r#"
    CREATE TABLE IF NOT EXISTS raid_active (
        channel_id  TEXT PRIMARY KEY,
        record      JSONB NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
"#;

const CREATE_ARCHIVE: &str = r#"
    CREATE TABLE IF NOT EXISTS raid_archive (
        id           BIGSERIAL PRIMARY KEY,
        venue_id     TEXT NOT NULL,
        record       JSONB NOT NULL,
        archived_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
"#;

const CREATE_ARCHIVE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS raid_archive_venue_idx ON raid_archive (venue_id, id)";

/// Raids as JSONB rows. Archive order is insertion order.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in [CREATE_ACTIVE, CREATE_ARCHIVE, CREATE_ARCHIVE_INDEX] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RaidStore for PgStore {
    async fn load_active(&self) -> Result<Vec<Raid>, StoreError> {
        let rows: Vec<(String, serde_json::Value)> =
            sqlx::query_as("SELECT channel_id, record FROM raid_active")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(key, record)| decode_raid_value(&key, record))
            .collect())
    }

    async fn get_active(&self, channel_id: u64) -> Result<Option<Raid>, StoreError> {
        let key = channel_id.to_string();
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT record FROM raid_active WHERE channel_id = $1")
                .bind(&key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(record,)| decode_raid_value(&key, record)))
    }

    async fn put_active(&self, raid: &Raid) -> Result<(), StoreError> {
        let record = serde_json::to_value(raid)?;
        sqlx::query(
            r#"
            INSERT INTO raid_active (channel_id, record, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (channel_id) DO UPDATE SET record = EXCLUDED.record, updated_at = now()
            "#,
        )
        .bind(raid.channel_id.to_string())
        .bind(record)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_active(&self, channel_id: u64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM raid_active WHERE channel_id = $1")
            .bind(channel_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn archived(&self, venue_id: u64) -> Result<Vec<Raid>, StoreError> {
        let key = venue_id.to_string();
        let rows: Vec<(serde_json::Value,)> =
            sqlx::query_as("SELECT record FROM raid_archive WHERE venue_id = $1 ORDER BY id")
                .bind(&key)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(record,)| decode_raid_value(&key, record))
            .collect())
    }

    async fn archive(&self, venue_id: u64, raid: &Raid) -> Result<(), StoreError> {
        let record = serde_json::to_value(raid)?;
        sqlx::query("INSERT INTO raid_archive (venue_id, record) VALUES ($1, $2)")
            .bind(venue_id.to_string())
            .bind(record)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
