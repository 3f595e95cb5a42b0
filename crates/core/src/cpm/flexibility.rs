use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::campaign::CampaignFlexibilityState;

/// Engagement-quality breakpoints and the premium applied above each.
/// `moderate_premium`/`high_premium` are fractions (0.08 = +8%).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngagementTiers {
    pub moderate_threshold: Decimal,
    pub high_threshold: Decimal,
    pub moderate_premium: Decimal,
    pub high_premium: Decimal,
}

impl Default for EngagementTiers {
    fn default() -> Self {
        Self {
            moderate_threshold: Decimal::new(2, 2),
            high_threshold: Decimal::new(5, 2),
            moderate_premium: Decimal::new(8, 2),
            high_premium: Decimal::new(15, 2),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlexibilityConfig {
    pub tiers: EngagementTiers,
    /// Absolute cap on the adjusted ceiling, as a ratio of the campaign's
    /// configured ceiling. Non-negotiable: bounds total campaign exposure.
    pub hard_cap_ratio: Decimal,
}

impl Default for FlexibilityConfig {
    fn default() -> Self {
        Self { tiers: EngagementTiers::default(), hard_cap_ratio: Decimal::new(120, 2) }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AdjustedCeiling {
    pub ceiling_cpm: Decimal,
    pub capped: bool,
    pub rationale: String,
}

/// Computes, for the next counterpart in a campaign, how far above or below
/// the configured ceiling the engine may actually go. Not a pure function of
/// the running average alone: price pressure and engagement quality both
/// move the number, but the hard cap always wins.
#[derive(Clone, Debug, Default)]
pub struct FlexibilityTracker {
    config: FlexibilityConfig,
}

impl FlexibilityTracker {
    pub fn new(config: FlexibilityConfig) -> Self {
        Self { config }
    }

    pub fn adjusted_ceiling(
        &self,
        campaign: &CampaignFlexibilityState,
        engagement_rate: Decimal,
    ) -> AdjustedCeiling {
        let closed = campaign.closed.len();
        let baseline = campaign.average_closed_cpm().unwrap_or(campaign.ceiling_cpm);

        // Dampened correction: move half the distance between where the
        // campaign is averaging and where it is allowed to end up.
        let headroom = campaign.ceiling_cpm - baseline;
        let adjusted = baseline + headroom / Decimal::from(2);

        let tiers = &self.config.tiers;
        let (premium, tier_label) = if engagement_rate >= tiers.high_threshold {
            (tiers.high_premium, "high")
        } else if engagement_rate >= tiers.moderate_threshold {
            (tiers.moderate_premium, "moderate")
        } else {
            (Decimal::ZERO, "low")
        };
        let with_premium = adjusted * (Decimal::ONE + premium);

        let hard_cap = campaign.ceiling_cpm * self.config.hard_cap_ratio;
        let capped = with_premium > hard_cap;
        let ceiling_cpm = with_premium.min(hard_cap).round_dp(2);

        let rationale = format!(
            "{closed} closed deal(s), avg ${baseline:.2} CPM against ${:.2} configured ceiling; \
             dampened adjustment to ${adjusted:.2}; {tier_label} engagement ({engagement_rate}) \
             premium +{premium}; {}",
            campaign.ceiling_cpm,
            if capped {
                format!("clamped at hard cap ${hard_cap:.2}")
            } else {
                format!("final ${ceiling_cpm:.2}")
            },
        );

        AdjustedCeiling { ceiling_cpm, capped, rationale }
    }
}
