use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::flows::states::{ThreadState, TransitionOutcome, TransitionRecord};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    ShortFormVideo,
    PhotoFeed,
    LongFormVideo,
}

impl Platform {
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::ShortFormVideo => "short_form_video",
            Self::PhotoFeed => "photo_feed",
            Self::LongFormVideo => "long_form_video",
        }
    }
}

/// Audience metrics captured at intake for one counterpart. `reach_samples`
/// holds recent per-post view counts, newest first; `engagement_rate` is a
/// fraction (0.04 = 4%).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CounterpartProfile {
    pub reach_samples: Vec<u64>,
    pub engagement_rate: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NegotiationThread {
    pub id: ThreadId,
    pub counterpart: String,
    pub platform: Platform,
    pub deliverable: String,
    pub campaign_id: Option<CampaignId>,
    pub profile: CounterpartProfile,
    pub round: u32,
    pub state: ThreadState,
    /// Price of the most recent outbound counter, if any.
    pub last_offer: Option<Decimal>,
    pub history: Vec<TransitionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NegotiationThread {
    pub fn open(
        id: ThreadId,
        counterpart: impl Into<String>,
        platform: Platform,
        deliverable: impl Into<String>,
        campaign_id: Option<CampaignId>,
        profile: CounterpartProfile,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            counterpart: counterpart.into(),
            platform,
            deliverable: deliverable.into(),
            campaign_id,
            profile,
            round: 0,
            state: ThreadState::AwaitingReply,
            last_offer: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Applies an already-validated transition outcome: moves the state and
    /// appends to the history. History is append-only; entries are never
    /// rewritten.
    pub fn record_transition(&mut self, outcome: &TransitionOutcome) {
        self.state = outcome.to.clone();
        self.history.push(TransitionRecord::from_outcome(outcome));
        self.updated_at = Utc::now();
    }
}
