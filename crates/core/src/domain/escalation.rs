use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cpm::band::PriceBand;
use crate::domain::thread::{CampaignId, ThreadId};
use crate::validation::ValidationFailure;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    RoundCapReached,
    UnclearReply,
    OutOfBandProposal,
    ValidationBlocked,
    CollaboratorFailure,
    QuestionNeedsHuman,
}

impl EscalationReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoundCapReached => "max_rounds_reached",
            Self::UnclearReply => "unclear_reply",
            Self::OutOfBandProposal => "out_of_band_proposal",
            Self::ValidationBlocked => "validation_blocked",
            Self::CollaboratorFailure => "collaborator_failure",
            Self::QuestionNeedsHuman => "question_needs_human",
        }
    }
}

/// Everything a human operator needs to act on a routed-out negotiation
/// without consulting source code. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub record_id: String,
    pub thread_id: ThreadId,
    pub campaign_id: Option<CampaignId>,
    pub counterpart: String,
    pub reason: EscalationReason,
    pub note: String,
    pub draft: Option<String>,
    pub failures: Vec<ValidationFailure>,
    pub band: Option<PriceBand>,
    pub proposed_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl EscalationRecord {
    pub fn new(
        thread_id: ThreadId,
        campaign_id: Option<CampaignId>,
        counterpart: impl Into<String>,
        reason: EscalationReason,
        note: impl Into<String>,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4().to_string(),
            thread_id,
            campaign_id,
            counterpart: counterpart.into(),
            reason,
            note: note.into(),
            draft: None,
            failures: Vec::new(),
            band: None,
            proposed_price: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_draft(mut self, draft: impl Into<String>) -> Self {
        self.draft = Some(draft.into());
        self
    }

    pub fn with_failures(mut self, failures: Vec<ValidationFailure>) -> Self {
        self.failures = failures;
        self
    }

    pub fn with_figures(mut self, band: PriceBand, proposed_price: Option<Decimal>) -> Self {
        self.band = Some(band);
        self.proposed_price = proposed_price;
        self
    }
}
