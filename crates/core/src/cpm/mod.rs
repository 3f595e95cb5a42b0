pub mod band;
pub mod flexibility;
pub mod reach;

pub use band::{
    assess_proposal, band_for_reach, cpm_at_price, price_at_cpm, BandVerdict, CpmRates, PriceBand,
    ProposalAssessment,
};
pub use flexibility::{AdjustedCeiling, EngagementTiers, FlexibilityConfig, FlexibilityTracker};
pub use reach::{ReachReducer, ReachReducerConfig, ReachReduction};
