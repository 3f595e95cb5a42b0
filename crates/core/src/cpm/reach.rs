use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tuning for outlier exclusion. A sample is excluded when its ratio to the
/// sample median exceeds `deviation_multiplier` in either direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReachReducerConfig {
    pub deviation_multiplier: Decimal,
    /// Below this many survivors the filter is abandoned and the unfiltered
    /// median is used instead.
    pub min_surviving_samples: usize,
}

impl Default for ReachReducerConfig {
    fn default() -> Self {
        Self { deviation_multiplier: Decimal::new(25, 1), min_surviving_samples: 2 }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReachReduction {
    pub representative: Decimal,
    pub retained: Vec<u64>,
    pub excluded: Vec<u64>,
}

/// Collapses a handful of recent per-post view counts into one representative
/// reach value. Pure and deterministic for a given config.
#[derive(Clone, Debug, Default)]
pub struct ReachReducer {
    config: ReachReducerConfig,
}

impl ReachReducer {
    pub fn new(config: ReachReducerConfig) -> Self {
        Self { config }
    }

    pub fn reduce(&self, samples: &[u64]) -> ReachReduction {
        if samples.is_empty() {
            return ReachReduction {
                representative: Decimal::ZERO,
                retained: Vec::new(),
                excluded: Vec::new(),
            };
        }

        let unfiltered_median = median(samples);
        if unfiltered_median == Decimal::ZERO {
            return ReachReduction {
                representative: Decimal::ZERO,
                retained: samples.to_vec(),
                excluded: Vec::new(),
            };
        }

        let multiplier = self.config.deviation_multiplier;
        let mut retained = Vec::with_capacity(samples.len());
        let mut excluded = Vec::new();
        for &sample in samples {
            let value = Decimal::from(sample);
            let too_high = value > unfiltered_median * multiplier;
            let too_low = value * multiplier < unfiltered_median;
            if too_high || too_low {
                excluded.push(sample);
            } else {
                retained.push(sample);
            }
        }

        if retained.len() < self.config.min_surviving_samples {
            return ReachReduction {
                representative: unfiltered_median,
                retained: samples.to_vec(),
                excluded: Vec::new(),
            };
        }

        ReachReduction { representative: median(&retained), retained, excluded }
    }
}

fn median(samples: &[u64]) -> Decimal {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Decimal::from(sorted[mid])
    } else {
        (Decimal::from(sorted[mid - 1]) + Decimal::from(sorted[mid])) / Decimal::from(2)
    }
}
