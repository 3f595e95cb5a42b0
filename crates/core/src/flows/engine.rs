use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{ThreadEvent, ThreadState, TransitionContext, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> ThreadState;
    fn transition(
        &self,
        current: &ThreadState,
        event: &ThreadEvent,
        context: &TransitionContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// The negotiation lifecycle. Terminal states accept no events at all.
#[derive(Clone, Debug, Default)]
pub struct NegotiationFlow;

impl FlowDefinition for NegotiationFlow {
    fn initial_state(&self) -> ThreadState {
        ThreadState::AwaitingReply
    }

    fn transition(
        &self,
        current: &ThreadState,
        event: &ThreadEvent,
        context: &TransitionContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_negotiation(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> ThreadState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &ThreadState,
        event: &ThreadEvent,
        context: &TransitionContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &ThreadState,
        event: &ThreadEvent,
        context: &TransitionContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.thread_id.clone(),
                        audit.campaign_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.thread_id.clone(),
                        audit.campaign_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<NegotiationFlow> {
    fn default() -> Self {
        Self::new(NegotiationFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("send blocked from {state:?}: {blockers:?}")]
    BlockedTransition { state: ThreadState, blockers: Vec<String> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: ThreadState, event: ThreadEvent },
}

fn transition_negotiation(
    current: &ThreadState,
    event: &ThreadEvent,
    context: &TransitionContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use ThreadEvent::{
        AcceptanceReceived, CounterApproved, CounterRegistered, EscalationTriggered,
        HumanApproved, HumanDeclined, MessageDispatched, RejectionReceived, ReplyTimedOut,
    };
    use ThreadState::{
        Agreed, AwaitingReply, CounterReceived, CounterSent, Escalated, Rejected, Stalled,
    };

    let to = match (current, event) {
        (AwaitingReply, CounterRegistered) => CounterReceived,
        (AwaitingReply, AcceptanceReceived) => Agreed,
        (AwaitingReply, RejectionReceived) => Rejected,
        (AwaitingReply, ReplyTimedOut) => Stalled,
        (AwaitingReply, EscalationTriggered) | (CounterReceived, EscalationTriggered) => Escalated,
        (CounterReceived, CounterApproved) => {
            if !context.blockers.is_empty() {
                return Err(FlowTransitionError::BlockedTransition {
                    state: current.clone(),
                    blockers: context.blockers.clone(),
                });
            }
            CounterSent
        }
        (CounterSent, MessageDispatched) => AwaitingReply,
        (Escalated, HumanApproved) => AwaitingReply,
        (Escalated, HumanDeclined) => Rejected,
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone() })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::thread::ThreadId;
    use crate::flows::engine::{FlowEngine, FlowTransitionError};
    use crate::flows::states::{ThreadEvent, ThreadState, TransitionContext};

    fn all_states() -> Vec<ThreadState> {
        vec![
            ThreadState::AwaitingReply,
            ThreadState::CounterReceived,
            ThreadState::CounterSent,
            ThreadState::Escalated,
            ThreadState::Agreed,
            ThreadState::Rejected,
            ThreadState::Stalled,
        ]
    }

    fn all_events() -> Vec<ThreadEvent> {
        vec![
            ThreadEvent::CounterRegistered,
            ThreadEvent::AcceptanceReceived,
            ThreadEvent::RejectionReceived,
            ThreadEvent::ReplyTimedOut,
            ThreadEvent::CounterApproved,
            ThreadEvent::EscalationTriggered,
            ThreadEvent::MessageDispatched,
            ThreadEvent::HumanApproved,
            ThreadEvent::HumanDeclined,
        ]
    }

    #[test]
    fn full_round_walks_the_happy_path() {
        let engine = FlowEngine::default();
        let context = TransitionContext::default();
        let mut state = engine.initial_state();

        for event in [
            ThreadEvent::CounterRegistered,
            ThreadEvent::CounterApproved,
            ThreadEvent::MessageDispatched,
            ThreadEvent::AcceptanceReceived,
        ] {
            state = engine.apply(&state, &event, &context).expect("legal transition").to;
        }

        assert_eq!(state, ThreadState::Agreed);
        assert!(state.is_terminal());
    }

    #[test]
    fn escalation_routes_resolve_through_a_human() {
        let engine = FlowEngine::default();
        let context = TransitionContext::default();

        let escalated = engine
            .apply(&ThreadState::CounterReceived, &ThreadEvent::EscalationTriggered, &context)
            .expect("counter_received -> escalated");
        assert_eq!(escalated.to, ThreadState::Escalated);

        let approved = engine
            .apply(&escalated.to, &ThreadEvent::HumanApproved, &context)
            .expect("escalated -> awaiting_reply")
            .to;
        assert_eq!(approved, ThreadState::AwaitingReply);

        let declined = engine
            .apply(&ThreadState::Escalated, &ThreadEvent::HumanDeclined, &context)
            .expect("escalated -> rejected")
            .to;
        assert_eq!(declined, ThreadState::Rejected);
    }

    #[test]
    fn terminal_states_accept_no_events() {
        let engine = FlowEngine::default();
        let context = TransitionContext::default();

        for state in [ThreadState::Agreed, ThreadState::Rejected] {
            for event in all_events() {
                let error = engine
                    .apply(&state, &event, &context)
                    .expect_err("terminal states are closed");
                assert!(matches!(error, FlowTransitionError::InvalidTransition { .. }));
            }
        }
    }

    #[test]
    fn every_pair_outside_the_table_is_rejected() {
        let engine = FlowEngine::default();
        let context = TransitionContext::default();
        let mut legal = 0usize;

        for state in all_states() {
            for event in all_events() {
                match engine.apply(&state, &event, &context) {
                    Ok(outcome) => {
                        legal += 1;
                        assert_eq!(outcome.from, state);
                    }
                    Err(FlowTransitionError::InvalidTransition { state: s, event: e }) => {
                        assert_eq!(s, state);
                        assert_eq!(e, event);
                    }
                    Err(other) => {
                        unreachable!("unexpected error with empty context: {other}")
                    }
                }
            }
        }

        // 4 reply routes + 2 escalation routes + counter approval + dispatch
        // + 2 human resolutions.
        assert_eq!(legal, 10);
    }

    #[test]
    fn outstanding_blockers_block_the_send_transition() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(
                &ThreadState::CounterReceived,
                &ThreadEvent::CounterApproved,
                &TransitionContext {
                    blockers: vec!["monetary_accuracy".to_string()],
                },
            )
            .expect_err("blockers must stop the send");

        assert!(matches!(error, FlowTransitionError::BlockedTransition { ref blockers, .. }
            if blockers == &["monetary_accuracy".to_string()]));
    }

    #[test]
    fn replay_is_deterministic_for_the_same_event_sequence() {
        let engine = FlowEngine::default();
        let events = [
            ThreadEvent::CounterRegistered,
            ThreadEvent::CounterApproved,
            ThreadEvent::MessageDispatched,
        ];

        let run = || {
            let mut state = engine.initial_state();
            let mut path = Vec::new();
            for event in &events {
                let outcome = engine
                    .apply(&state, event, &TransitionContext::default())
                    .expect("deterministic run");
                path.push(outcome.to.clone());
                state = outcome.to;
            }
            path
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn transitions_emit_audit_events() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();

        engine
            .apply_with_audit(
                &ThreadState::AwaitingReply,
                &ThreadEvent::CounterRegistered,
                &TransitionContext::default(),
                &sink,
                &AuditContext::new(
                    Some(ThreadId("th-9".to_string())),
                    None,
                    "req-42",
                    "flow-engine",
                ),
            )
            .expect("transition should succeed");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "flow.transition_applied");
        assert_eq!(events[0].correlation_id, "req-42");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("CounterReceived"));
    }
}
