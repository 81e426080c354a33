use cbt_core::model::SessionKey;
use chrono::Utc;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, ser};
use crate::repository::{CheckpointRepository, CheckpointSlot, StorageError};

#[async_trait::async_trait]
impl CheckpointRepository for SqliteRepository {
    async fn read_raw(
        &self,
        slot: CheckpointSlot,
        session: &SessionKey,
    ) -> Result<Option<String>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT payload
                FROM checkpoints
                WHERE slot = ?1 AND session_key = ?2
            ",
        )
        .bind(slot.as_str())
        .bind(session.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.map(|r| r.try_get::<String, _>("payload").map_err(ser))
            .transpose()
    }

    async fn write_raw(
        &self,
        slot: CheckpointSlot,
        session: &SessionKey,
        payload: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO checkpoints (slot, session_key, payload, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(slot, session_key) DO UPDATE SET
                    payload = excluded.payload,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(slot.as_str())
        .bind(session.as_str())
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn delete(
        &self,
        slot: CheckpointSlot,
        session: &SessionKey,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM checkpoints WHERE slot = ?1 AND session_key = ?2")
            .bind(slot.as_str())
            .bind(session.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
