//! Deterministic pre-send gate.
//!
//! Every outbound draft passes through here against the authoritative
//! figures, regardless of which component produced the text. The gate does
//! no I/O and calls no generator; given the same draft and figures it
//! always returns the same outcome.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSeverity {
    Blocking,
    Advisory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub check: String,
    pub reason: String,
    pub severity: FailureSeverity,
}

impl ValidationFailure {
    fn blocking(check: &str, reason: impl Into<String>) -> Self {
        Self { check: check.to_string(), reason: reason.into(), severity: FailureSeverity::Blocking }
    }

    fn advisory(check: &str, reason: impl Into<String>) -> Self {
        Self { check: check.to_string(), reason: reason.into(), severity: FailureSeverity::Advisory }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ValidationOutcome {
    pub failures: Vec<ValidationFailure>,
}

impl ValidationOutcome {
    /// Pass iff zero blocking failures. Advisory failures never block.
    pub fn passed(&self) -> bool {
        !self.failures.iter().any(|failure| failure.severity == FailureSeverity::Blocking)
    }

    pub fn blocking(&self) -> impl Iterator<Item = &ValidationFailure> {
        self.failures.iter().filter(|failure| failure.severity == FailureSeverity::Blocking)
    }
}

/// The figures the draft is checked against. These always come from the
/// engine's own computation, never from anything the composer claims.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthoritativeTerms {
    pub price: Decimal,
    pub deliverables: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Commitment language the composer is never authorized to make.
    pub denied_commitments: Vec<String>,
    /// Off-brand or internal language that must not leave the building.
    pub forbidden_content: Vec<String>,
    pub min_draft_chars: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            denied_commitments: [
                "exclusive",
                "exclusivity",
                "in perpetuity",
                "perpetual license",
                "full usage rights",
                "we guarantee",
                "guaranteed results",
                "future campaigns",
                "ongoing partnership",
                "right of first refusal",
            ]
            .map(str::to_string)
            .to_vec(),
            forbidden_content: [
                "total campaign budget",
                "internal target",
                "our ceiling",
                "maximum we can pay",
                "as an ai",
            ]
            .map(str::to_string)
            .to_vec(),
            min_draft_chars: 80,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ValidationGate {
    config: GateConfig,
}

impl ValidationGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn review(&self, draft: &str, terms: &AuthoritativeTerms) -> ValidationOutcome {
        let mut failures = Vec::new();
        let lowered = draft.to_lowercase();

        let figures = extract_currency_figures(draft);
        for figure in &figures {
            if *figure != terms.price {
                failures.push(ValidationFailure::blocking(
                    "monetary_accuracy",
                    format!(
                        "draft mentions ${figure} but the authorized price is ${}",
                        terms.price
                    ),
                ));
            }
        }
        if figures.is_empty() {
            failures.push(ValidationFailure::advisory(
                "monetary_presence",
                "draft contains no currency figure",
            ));
        }

        for deliverable in &terms.deliverables {
            if !lowered.contains(&deliverable.to_lowercase()) {
                failures.push(ValidationFailure::advisory(
                    "deliverable_coverage",
                    format!("deliverable `{deliverable}` is not spelled out in the draft"),
                ));
            }
        }

        for phrase in &self.config.denied_commitments {
            if lowered.contains(&phrase.to_lowercase()) {
                failures.push(ValidationFailure::blocking(
                    "unauthorized_commitment",
                    format!("draft contains the unauthorized commitment phrase `{phrase}`"),
                ));
            }
        }

        for phrase in &self.config.forbidden_content {
            if lowered.contains(&phrase.to_lowercase()) {
                failures.push(ValidationFailure::blocking(
                    "disallowed_content",
                    format!("draft contains the forbidden phrase `{phrase}`"),
                ));
            }
        }

        if draft.trim().chars().count() < self.config.min_draft_chars {
            failures.push(ValidationFailure::blocking(
                "draft_length",
                format!(
                    "draft has fewer than {} characters; generation likely truncated",
                    self.config.min_draft_chars
                ),
            ));
        }

        ValidationOutcome { failures }
    }
}

/// Pulls every `$`-prefixed amount out of the text. Handles thousands
/// separators and an optional decimal part; anything unparseable after a
/// `$` is skipped rather than guessed at.
fn extract_currency_figures(text: &str) -> Vec<Decimal> {
    let mut figures = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if ch != '$' {
            continue;
        }
        let mut raw = String::new();
        let mut seen_point = false;
        while let Some(&(_, next)) = chars.peek() {
            match next {
                '0'..='9' => raw.push(next),
                ',' if !raw.is_empty() => {}
                '.' if !seen_point && !raw.is_empty() => {
                    seen_point = true;
                    raw.push('.');
                }
                _ => break,
            }
            chars.next();
        }
        let raw = raw.trim_end_matches('.');
        if raw.is_empty() {
            continue;
        }
        if let Ok(figure) = raw.parse::<Decimal>() {
            figures.push(figure);
        }
    }

    figures
}
