use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    AwaitingReply,
    CounterReceived,
    CounterSent,
    Escalated,
    Agreed,
    Rejected,
    Stalled,
}

impl ThreadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Agreed | Self::Rejected)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadEvent {
    /// Inbound reply classified as a counter-offer or a question.
    CounterRegistered,
    AcceptanceReceived,
    RejectionReceived,
    ReplyTimedOut,
    /// All send guards cleared: round cap not reached, proposal in band,
    /// draft validated.
    CounterApproved,
    EscalationTriggered,
    MessageDispatched,
    HumanApproved,
    HumanDeclined,
}

/// Guard inputs for transitions that require them. `blockers` names the
/// unmet send conditions; a `CounterApproved` event with outstanding
/// blockers is rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TransitionContext {
    pub blockers: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ThreadState,
    pub to: ThreadState,
    pub event: ThreadEvent,
}

/// One line of the append-only per-thread audit history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: ThreadState,
    pub event: ThreadEvent,
    pub to: ThreadState,
    pub occurred_at: DateTime<Utc>,
}

impl TransitionRecord {
    pub fn from_outcome(outcome: &TransitionOutcome) -> Self {
        Self {
            from: outcome.from.clone(),
            event: outcome.event.clone(),
            to: outcome.to.clone(),
            occurred_at: Utc::now(),
        }
    }
}
