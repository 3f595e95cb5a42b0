pub mod audit;
pub mod collaborators;
pub mod config;
pub mod cpm;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod flows;
pub mod validation;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use collaborators::{
    CampaignStore, ComposeRequest, ComposeStage, MessageComposer, Notifier, ReplyClassifier,
    ThreadStore,
};
pub use domain::campaign::{CampaignFlexibilityState, ClosedDeal};
pub use domain::escalation::{EscalationReason, EscalationRecord};
pub use domain::reply::{ClassifiedReply, ReplyIntent};
pub use domain::thread::{CampaignId, CounterpartProfile, NegotiationThread, Platform, ThreadId};
pub use engine::{Collaborators, NegotiationEngine, RoundOutcome};
pub use errors::{ApplicationError, DomainError};
pub use validation::{
    AuthoritativeTerms, FailureSeverity, GateConfig, ValidationFailure, ValidationGate,
    ValidationOutcome,
};
