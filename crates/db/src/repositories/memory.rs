use std::collections::HashMap;

use tokio::sync::RwLock;

use parley_core::{
    ApplicationError, CampaignFlexibilityState, CampaignId, CampaignStore, NegotiationThread,
    ThreadId, ThreadStore,
};

#[derive(Default)]
pub struct InMemoryThreadStore {
    threads: RwLock<HashMap<String, NegotiationThread>>,
}

#[async_trait::async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn save_thread(&self, thread: &NegotiationThread) -> Result<(), ApplicationError> {
        let mut threads = self.threads.write().await;
        threads.insert(thread.id.0.clone(), thread.clone());
        Ok(())
    }

    async fn load_thread(
        &self,
        id: &ThreadId,
    ) -> Result<Option<NegotiationThread>, ApplicationError> {
        let threads = self.threads.read().await;
        Ok(threads.get(&id.0).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryCampaignStore {
    campaigns: RwLock<HashMap<String, CampaignFlexibilityState>>,
}

#[async_trait::async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn save_campaign(
        &self,
        state: &CampaignFlexibilityState,
    ) -> Result<(), ApplicationError> {
        let mut campaigns = self.campaigns.write().await;
        campaigns.insert(state.id.0.clone(), state.clone());
        Ok(())
    }

    async fn load_campaign(
        &self,
        id: &CampaignId,
    ) -> Result<Option<CampaignFlexibilityState>, ApplicationError> {
        let campaigns = self.campaigns.read().await;
        Ok(campaigns.get(&id.0).cloned())
    }
}
