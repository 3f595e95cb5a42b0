use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Intent of an inbound counterpart message, as reported by the classifier
/// collaborator. Anything the classifier cannot name maps to `Unclear` at the
/// boundary; the engine never sees a free-form intent string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyIntent {
    Acceptance,
    Rejection,
    CounterOffer,
    Question,
    Unclear,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedReply {
    pub intent: ReplyIntent,
    pub confidence: f64,
    pub proposed_price: Option<Decimal>,
    pub proposed_terms: Vec<String>,
    pub summary: String,
}

impl ClassifiedReply {
    /// Coerce out-of-range collaborator output rather than trusting it.
    pub fn clamped(mut self) -> Self {
        if !self.confidence.is_finite() {
            self.confidence = 0.0;
        }
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}
