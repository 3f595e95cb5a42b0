use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

const PER_MILLE: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

/// Per-thousand-reach rates for one channel. Validated at configuration load;
/// `floor <= target <= ceiling` always holds afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CpmRates {
    pub floor: Decimal,
    pub target: Decimal,
    pub ceiling: Decimal,
}

impl CpmRates {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.floor <= Decimal::ZERO || self.floor > self.target || self.target > self.ceiling {
            return Err(DomainError::InvariantViolation(format!(
                "CPM rates must satisfy 0 < floor <= target <= ceiling, got {}/{}/{}",
                self.floor, self.target, self.ceiling
            )));
        }
        Ok(())
    }
}

/// Absolute authorized prices for one counterpart at one reach value.
/// Recomputed per evaluation; never mutated in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceBand {
    floor: Decimal,
    target: Decimal,
    ceiling: Decimal,
}

impl PriceBand {
    pub fn new(floor: Decimal, target: Decimal, ceiling: Decimal) -> Result<Self, DomainError> {
        if floor > target || target > ceiling {
            return Err(DomainError::InvariantViolation(format!(
                "price band must satisfy floor <= target <= ceiling, got {floor}/{target}/{ceiling}"
            )));
        }
        Ok(Self { floor, target, ceiling })
    }

    /// Builds a band that keeps the ordering invariant by pulling target and
    /// floor down to a lowered ceiling. Used when campaign flexibility
    /// tightens the ceiling below the configured target.
    pub fn clamped(floor: Decimal, target: Decimal, ceiling: Decimal) -> Self {
        let target = target.min(ceiling);
        let floor = floor.min(target);
        Self { floor, target, ceiling }
    }

    pub fn floor(&self) -> Decimal {
        self.floor
    }

    pub fn target(&self) -> Decimal {
        self.target
    }

    pub fn ceiling(&self) -> Decimal {
        self.ceiling
    }

    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.floor && price <= self.ceiling
    }
}

impl std::fmt::Display for PriceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${} / ${} / ${}", self.floor, self.target, self.ceiling)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandVerdict {
    Within,
    AboveCeiling,
    BelowFloor,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProposalAssessment {
    pub verdict: BandVerdict,
    pub implied_cpm: Decimal,
}

/// Converts per-thousand rates into absolute prices for a reach value.
/// Stateless: the same reach and rates always produce the same band.
pub fn band_for_reach(reach: Decimal, rates: &CpmRates) -> PriceBand {
    let scale = reach / PER_MILLE;
    PriceBand {
        floor: (rates.floor * scale).round_dp(2),
        target: (rates.target * scale).round_dp(2),
        ceiling: (rates.ceiling * scale).round_dp(2),
    }
}

/// Absolute price of `reach` units at a per-thousand rate.
pub fn price_at_cpm(cpm: Decimal, reach: Decimal) -> Decimal {
    (cpm * reach / PER_MILLE).round_dp(2)
}

/// Per-thousand rate implied by an absolute price. Zero reach implies a zero
/// rate rather than a division error.
pub fn cpm_at_price(price: Decimal, reach: Decimal) -> Decimal {
    if reach > Decimal::ZERO {
        (price * PER_MILLE / reach).round_dp(2)
    } else {
        Decimal::ZERO
    }
}

pub fn assess_proposal(band: &PriceBand, reach: Decimal, proposal: Decimal) -> ProposalAssessment {
    let implied_cpm = cpm_at_price(proposal, reach);
    let verdict = if proposal > band.ceiling {
        BandVerdict::AboveCeiling
    } else if proposal < band.floor {
        BandVerdict::BelowFloor
    } else {
        BandVerdict::Within
    };
    ProposalAssessment { verdict, implied_cpm }
}
