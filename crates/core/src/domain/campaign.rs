use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::thread::CampaignId;
use crate::errors::DomainError;

/// One closed negotiation inside a campaign, recorded in CPM terms so deals
/// of different audience sizes stay comparable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClosedDeal {
    pub cpm_price: Decimal,
    pub engagement_rate: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CampaignFlexibilityState {
    pub id: CampaignId,
    pub floor_cpm: Decimal,
    pub ceiling_cpm: Decimal,
    pub expected_counterparts: u32,
    pub closed: Vec<ClosedDeal>,
}

impl CampaignFlexibilityState {
    pub fn open(
        id: CampaignId,
        floor_cpm: Decimal,
        ceiling_cpm: Decimal,
        expected_counterparts: u32,
    ) -> Result<Self, DomainError> {
        if floor_cpm <= Decimal::ZERO || ceiling_cpm < floor_cpm {
            return Err(DomainError::InvariantViolation(format!(
                "campaign CPM range must satisfy 0 < floor <= ceiling, got {floor_cpm}..{ceiling_cpm}"
            )));
        }
        Ok(Self { id, floor_cpm, ceiling_cpm, expected_counterparts, closed: Vec::new() })
    }

    /// The only mutation: append a closed deal. The list is never rewritten.
    pub fn record_closed_deal(&mut self, deal: ClosedDeal) {
        self.closed.push(deal);
    }

    pub fn average_closed_cpm(&self) -> Option<Decimal> {
        if self.closed.is_empty() {
            return None;
        }
        let total: Decimal = self.closed.iter().map(|deal| deal.cpm_price).sum();
        Some(total / Decimal::from(self.closed.len() as u64))
    }
}
