//! Contracts for the external collaborators the engine drives.
//!
//! The engine treats every implementation as untrusted plumbing: classifier
//! output is coerced into typed values at the boundary, composer text goes
//! through the validation gate, and any returned error is a collaborator
//! failure the engine escalates rather than retries.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::campaign::CampaignFlexibilityState;
use crate::domain::escalation::EscalationRecord;
use crate::domain::reply::ClassifiedReply;
use crate::domain::thread::{CampaignId, NegotiationThread, ThreadId};
use crate::errors::ApplicationError;

#[async_trait]
pub trait ReplyClassifier: Send + Sync {
    async fn classify(
        &self,
        message: &str,
        thread: &NegotiationThread,
    ) -> Result<ClassifiedReply, ApplicationError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComposeStage {
    Counter,
    QuestionReply,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComposeRequest {
    pub counterpart: String,
    pub authoritative_price: Decimal,
    pub deliverables: Vec<String>,
    pub stage: ComposeStage,
    pub style_context: String,
}

#[async_trait]
pub trait MessageComposer: Send + Sync {
    /// Returns raw draft text. Nothing the composer says about its own
    /// output is trusted; the validation gate re-derives everything.
    async fn compose(&self, request: &ComposeRequest) -> Result<String, ApplicationError>;
}

#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn save_thread(&self, thread: &NegotiationThread) -> Result<(), ApplicationError>;
    async fn load_thread(
        &self,
        id: &ThreadId,
    ) -> Result<Option<NegotiationThread>, ApplicationError>;
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn save_campaign(
        &self,
        state: &CampaignFlexibilityState,
    ) -> Result<(), ApplicationError>;
    async fn load_campaign(
        &self,
        id: &CampaignId,
    ) -> Result<Option<CampaignFlexibilityState>, ApplicationError>;
}

/// Fire-and-forget from the engine's perspective; delivery guarantees belong
/// to the implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_escalation(&self, record: &EscalationRecord) -> Result<(), ApplicationError>;
    async fn notify_agreement(
        &self,
        thread: &NegotiationThread,
        final_price: Decimal,
    ) -> Result<(), ApplicationError>;
}
