//! Scripted dry run: the real engine, deterministic collaborator fakes.
//!
//! Useful for operators to see a full negotiation lifecycle (counter,
//! dispatch, acceptance) without an LLM or mailbox anywhere near the
//! process.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use parley_core::audit::InMemoryAuditSink;
use parley_core::config::AppConfig;
use parley_core::domain::thread::CounterpartProfile;
use parley_core::{
    ApplicationError, ClassifiedReply, Collaborators, ComposeRequest, EscalationRecord,
    MessageComposer, NegotiationEngine, NegotiationThread, Notifier, Platform, ReplyClassifier,
    ReplyIntent, RoundOutcome, ThreadId, ThreadStore,
};
use parley_db::{InMemoryCampaignStore, InMemoryThreadStore};

use crate::commands::CommandResult;

struct ScriptedClassifier {
    replies: Mutex<VecDeque<ClassifiedReply>>,
}

#[async_trait]
impl ReplyClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        _message: &str,
        _thread: &NegotiationThread,
    ) -> Result<ClassifiedReply, ApplicationError> {
        self.replies
            .lock()
            .map_err(|_| ApplicationError::Collaborator("classifier script poisoned".to_string()))?
            .pop_front()
            .ok_or_else(|| ApplicationError::Collaborator("classifier script exhausted".to_string()))
    }
}

struct ScriptedComposer;

#[async_trait]
impl MessageComposer for ScriptedComposer {
    async fn compose(&self, request: &ComposeRequest) -> Result<String, ApplicationError> {
        Ok(format!(
            "Hi {name}, thanks for the quick reply! We can do ${price} for {deliverables}, \
             posted within two weeks of receiving the brief. If that works we'll send the \
             agreement over today.",
            name = request.counterpart,
            price = format_price(request.authoritative_price),
            deliverables = request.deliverables.join(", "),
        ))
    }
}

struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify_escalation(&self, record: &EscalationRecord) -> Result<(), ApplicationError> {
        info!(
            thread_id = %record.thread_id.0,
            reason = record.reason.code(),
            "escalation routed to a human"
        );
        Ok(())
    }

    async fn notify_agreement(
        &self,
        thread: &NegotiationThread,
        final_price: Decimal,
    ) -> Result<(), ApplicationError> {
        info!(thread_id = %thread.id.0, %final_price, "agreement reached");
        Ok(())
    }
}

fn format_price(price: Decimal) -> String {
    // Thousands separator so drafts read like a human wrote them; the gate
    // extracts the same value either way.
    let text = price.to_string();
    let (whole, frac) = match text.split_once('.') {
        Some((whole, frac)) => (whole.to_string(), Some(frac.to_string())),
        None => (text, None),
    };
    let mut grouped = String::new();
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    match frac {
        Some(frac) => format!("{grouped}.{frac}"),
        None => grouped,
    }
}

#[derive(Debug, Serialize)]
struct SimulatedStep {
    step: &'static str,
    detail: String,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    command: &'static str,
    status: &'static str,
    steps: Vec<SimulatedStep>,
    final_state: String,
    audit_events: usize,
}

pub fn run() -> CommandResult {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    match runtime.block_on(simulate()) {
        Ok(report) => {
            let output = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|error| format!("report serialization failed: {error}"));
            CommandResult { exit_code: 0, output }
        }
        Err(error) => CommandResult::failure("simulate", "simulation", error.to_string(), 4),
    }
}

async fn simulate() -> Result<SimulationReport, ApplicationError> {
    let script = VecDeque::from([
        ClassifiedReply {
            intent: ReplyIntent::CounterOffer,
            confidence: 0.92,
            proposed_price: Some(Decimal::from(1400)),
            proposed_terms: Vec::new(),
            summary: "asked for $1,400".to_string(),
        },
        ClassifiedReply {
            intent: ReplyIntent::Acceptance,
            confidence: 0.96,
            proposed_price: None,
            proposed_terms: Vec::new(),
            summary: "accepted the counter".to_string(),
        },
    ]);

    let threads = Arc::new(InMemoryThreadStore::default());
    let audit = InMemoryAuditSink::default();
    let engine = NegotiationEngine::new(
        Collaborators {
            classifier: Arc::new(ScriptedClassifier { replies: Mutex::new(script) }),
            composer: Arc::new(ScriptedComposer),
            threads: threads.clone(),
            campaigns: Arc::new(InMemoryCampaignStore::default()),
            notifier: Arc::new(TracingNotifier),
            audit: Arc::new(audit.clone()),
        },
        &AppConfig::default(),
    );

    let thread_id = ThreadId("th-simulated".to_string());
    let thread = NegotiationThread::open(
        thread_id.clone(),
        "Ada Vale",
        Platform::ShortFormVideo,
        "60s integrated video",
        None,
        CounterpartProfile {
            reach_samples: vec![48_000, 52_000, 50_000],
            engagement_rate: Decimal::new(4, 2),
        },
    );
    threads.save_thread(&thread).await?;

    let mut steps = Vec::new();

    let outcome = engine.handle_reply(&thread_id, "Could you do $1,400?", "sim-1").await?;
    match &outcome {
        RoundOutcome::Send { price, .. } => steps.push(SimulatedStep {
            step: "counter_sent",
            detail: format!("countered the $1,400 ask at ${price}"),
        }),
        other => steps.push(SimulatedStep {
            step: "unexpected_outcome",
            detail: format!("{other:?}"),
        }),
    }

    engine.mark_dispatched(&thread_id, "sim-1").await?;
    steps.push(SimulatedStep { step: "dispatched", detail: "counter left the building".to_string() });

    let outcome = engine.handle_reply(&thread_id, "Deal!", "sim-2").await?;
    match &outcome {
        RoundOutcome::Accept { final_price } => steps.push(SimulatedStep {
            step: "agreed",
            detail: format!("closed at ${final_price}"),
        }),
        other => steps.push(SimulatedStep {
            step: "unexpected_outcome",
            detail: format!("{other:?}"),
        }),
    }

    let final_state = threads
        .load_thread(&thread_id)
        .await?
        .map(|thread| format!("{:?}", thread.state))
        .unwrap_or_else(|| "<missing>".to_string());

    Ok(SimulationReport {
        command: "simulate",
        status: "ok",
        steps,
        final_state,
        audit_events: audit.events().len(),
    })
}
