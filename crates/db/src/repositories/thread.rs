use chrono::Utc;
use sqlx::Row;

use parley_core::{ApplicationError, NegotiationThread, ThreadId, ThreadStore};

use crate::DbPool;

pub struct SqlThreadStore {
    pool: DbPool,
}

impl SqlThreadStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ThreadStore for SqlThreadStore {
    async fn save_thread(&self, thread: &NegotiationThread) -> Result<(), ApplicationError> {
        let payload = serde_json::to_string(thread)
            .map_err(|error| ApplicationError::Persistence(format!("encode thread: {error}")))?;
        let state = serde_json::to_string(&thread.state)
            .map_err(|error| ApplicationError::Persistence(format!("encode state: {error}")))?;

        sqlx::query(
            "INSERT INTO negotiation_threads (id, state, campaign_id, payload, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (id) DO UPDATE SET \
               state = excluded.state, \
               campaign_id = excluded.campaign_id, \
               payload = excluded.payload, \
               updated_at = excluded.updated_at",
        )
        .bind(&thread.id.0)
        .bind(state.trim_matches('"'))
        .bind(thread.campaign_id.as_ref().map(|id| id.0.as_str()))
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| ApplicationError::Persistence(format!("save thread: {error}")))?;

        Ok(())
    }

    async fn load_thread(
        &self,
        id: &ThreadId,
    ) -> Result<Option<NegotiationThread>, ApplicationError> {
        let row = sqlx::query("SELECT payload FROM negotiation_threads WHERE id = ?1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| ApplicationError::Persistence(format!("load thread: {error}")))?;

        row.map(|row| {
            let payload: String = row.get("payload");
            serde_json::from_str(&payload)
                .map_err(|error| ApplicationError::Persistence(format!("decode thread: {error}")))
        })
        .transpose()
    }
}
