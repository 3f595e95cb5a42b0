use chrono::Utc;
use sqlx::Row;

use parley_core::{ApplicationError, CampaignFlexibilityState, CampaignId, CampaignStore};

use crate::DbPool;

pub struct SqlCampaignStore {
    pool: DbPool,
}

impl SqlCampaignStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CampaignStore for SqlCampaignStore {
    async fn save_campaign(
        &self,
        state: &CampaignFlexibilityState,
    ) -> Result<(), ApplicationError> {
        let payload = serde_json::to_string(state)
            .map_err(|error| ApplicationError::Persistence(format!("encode campaign: {error}")))?;

        sqlx::query(
            "INSERT INTO campaign_states (id, payload, updated_at) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT (id) DO UPDATE SET \
               payload = excluded.payload, \
               updated_at = excluded.updated_at",
        )
        .bind(&state.id.0)
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| ApplicationError::Persistence(format!("save campaign: {error}")))?;

        Ok(())
    }

    async fn load_campaign(
        &self,
        id: &CampaignId,
    ) -> Result<Option<CampaignFlexibilityState>, ApplicationError> {
        let row = sqlx::query("SELECT payload FROM campaign_states WHERE id = ?1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| ApplicationError::Persistence(format!("load campaign: {error}")))?;

        row.map(|row| {
            let payload: String = row.get("payload");
            serde_json::from_str(&payload).map_err(|error| {
                ApplicationError::Persistence(format!("decode campaign: {error}"))
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use parley_core::{CampaignFlexibilityState, CampaignId, CampaignStore, ClosedDeal};

    use crate::{connect_with_settings, migrations};

    use super::SqlCampaignStore;

    #[tokio::test]
    async fn campaign_state_round_trips_with_closed_deals() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        let store = SqlCampaignStore::new(pool);

        let mut campaign = CampaignFlexibilityState::open(
            CampaignId("cmp-sql-1".to_string()),
            Decimal::from(20),
            Decimal::from(30),
            8,
        )
        .expect("valid campaign");
        campaign.record_closed_deal(ClosedDeal {
            cpm_price: Decimal::new(2_450, 2),
            engagement_rate: Decimal::new(6, 2),
        });

        store.save_campaign(&campaign).await.expect("save");
        let loaded = store
            .load_campaign(&campaign.id)
            .await
            .expect("load")
            .expect("campaign exists");

        assert_eq!(loaded, campaign);
        assert_eq!(loaded.closed.len(), 1);
    }

    #[tokio::test]
    async fn missing_campaign_loads_as_none() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        let store = SqlCampaignStore::new(pool);

        let loaded = store
            .load_campaign(&CampaignId("cmp-unknown".to_string()))
            .await
            .expect("load");
        assert!(loaded.is_none());
    }
}
