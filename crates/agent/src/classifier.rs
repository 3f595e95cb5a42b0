//! LLM-backed reply classification with a strict typed boundary.
//!
//! The model is asked for a single JSON object; whatever comes back is
//! parsed, coerced, and clamped before it becomes a `ClassifiedReply`.
//! Unknown intents degrade to `Unclear` rather than failing the round, but
//! output that is not JSON at all is a collaborator failure.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use parley_core::{
    ApplicationError, ClassifiedReply, NegotiationThread, ReplyClassifier, ReplyIntent,
};

use crate::llm::LlmClient;

pub struct LlmReplyClassifier {
    client: Arc<dyn LlmClient>,
}

impl LlmReplyClassifier {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    fn prompt(message: &str, thread: &NegotiationThread) -> String {
        format!(
            "You are reading one reply in a sponsorship price negotiation with {counterpart} \
             about: {deliverable}. Round {round} of the thread.\n\
             Classify the reply below and answer with ONLY a JSON object with keys:\n\
             intent (one of acceptance|rejection|counter_offer|question|unclear),\n\
             confidence (number 0..1), proposed_price (number or null, USD, no symbols),\n\
             proposed_terms (array of strings), summary (one sentence).\n\n\
             Reply:\n{message}",
            counterpart = thread.counterpart,
            deliverable = thread.deliverable,
            round = thread.round,
        )
    }
}

#[async_trait]
impl ReplyClassifier for LlmReplyClassifier {
    async fn classify(
        &self,
        message: &str,
        thread: &NegotiationThread,
    ) -> Result<ClassifiedReply, ApplicationError> {
        let prompt = Self::prompt(message, thread);
        let raw = self
            .client
            .complete(&prompt)
            .await
            .map_err(|error| ApplicationError::Collaborator(format!("classifier: {error}")))?;

        parse_classification(&raw)
    }
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    intent: String,
    confidence: f64,
    #[serde(default)]
    proposed_price: Option<serde_json::Value>,
    #[serde(default)]
    proposed_terms: Vec<String>,
    #[serde(default)]
    summary: String,
}

fn parse_classification(raw: &str) -> Result<ClassifiedReply, ApplicationError> {
    let body = extract_json_object(raw).ok_or_else(|| {
        ApplicationError::Collaborator("classifier returned no JSON object".to_string())
    })?;
    let parsed: RawClassification = serde_json::from_str(body).map_err(|error| {
        ApplicationError::Collaborator(format!("classifier returned malformed JSON: {error}"))
    })?;

    let intent = match parsed.intent.trim().to_ascii_lowercase().as_str() {
        "acceptance" | "accept" => ReplyIntent::Acceptance,
        "rejection" | "reject" | "decline" => ReplyIntent::Rejection,
        "counter_offer" | "counter" => ReplyIntent::CounterOffer,
        "question" => ReplyIntent::Question,
        _ => ReplyIntent::Unclear,
    };

    let proposed_price = match parsed.proposed_price {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => Some(coerce_price(&value)?),
    };

    Ok(ClassifiedReply {
        intent,
        confidence: parsed.confidence,
        proposed_price,
        proposed_terms: parsed.proposed_terms,
        summary: parsed.summary,
    }
    .clamped())
}

fn coerce_price(value: &serde_json::Value) -> Result<Decimal, ApplicationError> {
    let text = match value {
        serde_json::Value::Number(number) => number.to_string(),
        serde_json::Value::String(text) => {
            text.trim().trim_start_matches('$').replace(',', "")
        }
        other => {
            return Err(ApplicationError::Collaborator(format!(
                "classifier returned a non-numeric proposed_price: {other}"
            )))
        }
    };
    text.parse::<Decimal>().map_err(|_| {
        ApplicationError::Collaborator(format!(
            "classifier returned an unparseable proposed_price: `{text}`"
        ))
    })
}

/// Models often wrap JSON in prose or code fences; take the outermost object.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}
