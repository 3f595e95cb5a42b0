//! Negotiation round driver.
//!
//! The only component that talks to external collaborators, and the only one
//! that suspends: once at the classifier and once at the composer per round.
//! Everything between those two calls is deterministic computation, and every
//! path out of a round either transitions the thread state machine or
//! surfaces a typed error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::collaborators::{
    CampaignStore, ComposeRequest, ComposeStage, MessageComposer, Notifier, ReplyClassifier,
    ThreadStore,
};
use crate::config::{AppConfig, EngineConfig, PricingConfig, QuestionPolicy};
use crate::cpm::band::{
    assess_proposal, band_for_reach, cpm_at_price, price_at_cpm, BandVerdict, PriceBand,
};
use crate::cpm::flexibility::FlexibilityTracker;
use crate::cpm::reach::ReachReducer;
use crate::domain::campaign::ClosedDeal;
use crate::domain::escalation::{EscalationReason, EscalationRecord};
use crate::domain::reply::{ClassifiedReply, ReplyIntent};
use crate::domain::thread::{NegotiationThread, ThreadId};
use crate::errors::{ApplicationError, DomainError};
use crate::flows::{FlowEngine, NegotiationFlow, ThreadEvent, TransitionContext};
use crate::validation::{AuthoritativeTerms, ValidationGate};

/// Routing decision for one processed inbound reply.
#[derive(Clone, Debug, PartialEq)]
pub enum RoundOutcome {
    /// Dispatch `body` to the counterpart; `price` is the authoritative
    /// figure the draft was validated against.
    Send { body: String, price: Decimal },
    Escalate(EscalationRecord),
    Accept { final_price: Decimal },
    Reject,
}

/// External services the engine drives. All are behind trait objects so
/// tests can substitute scripted fakes.
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn ReplyClassifier>,
    pub composer: Arc<dyn MessageComposer>,
    pub threads: Arc<dyn ThreadStore>,
    pub campaigns: Arc<dyn CampaignStore>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditSink>,
}

pub struct NegotiationEngine {
    collaborators: Collaborators,
    flow: FlowEngine<NegotiationFlow>,
    gate: ValidationGate,
    tracker: FlexibilityTracker,
    reducer: ReachReducer,
    settings: EngineConfig,
    pricing: PricingConfig,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl NegotiationEngine {
    pub fn new(collaborators: Collaborators, config: &AppConfig) -> Self {
        Self {
            collaborators,
            flow: FlowEngine::default(),
            gate: ValidationGate::new(config.validation.clone()),
            tracker: FlexibilityTracker::new(config.flexibility.clone()),
            reducer: ReachReducer::new(config.reach.clone()),
            settings: config.engine.clone(),
            pricing: config.pricing.clone(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Process one inbound counterpart reply. Replies for the same thread are
    /// serialized; distinct threads proceed concurrently.
    pub async fn handle_reply(
        &self,
        thread_id: &ThreadId,
        message: &str,
        correlation_id: &str,
    ) -> Result<RoundOutcome, ApplicationError> {
        let lock = self.thread_lock(thread_id);
        let _serialized = lock.lock().await;

        let mut thread = self.load_thread(thread_id).await?;
        if thread.is_terminal() {
            return Err(DomainError::InvariantViolation(format!(
                "thread {} has reached a terminal state and accepts no replies",
                thread_id.0
            ))
            .into());
        }

        let audit = self.audit_context(&thread, correlation_id);
        self.emit(
            AuditEvent::new(
                audit.thread_id.clone(),
                audit.campaign_id.clone(),
                correlation_id,
                "round.reply_received",
                AuditCategory::Ingress,
                audit.actor.as_str(),
                AuditOutcome::Success,
            )
            .with_metadata("round", thread.round.to_string())
            .with_metadata("platform", thread.platform.as_key()),
        );

        if thread.round >= self.settings.round_cap {
            let record = self.record_for(
                &thread,
                EscalationReason::RoundCapReached,
                format!(
                    "round counter {} reached the configured cap of {}",
                    thread.round, self.settings.round_cap
                ),
            );
            return self.escalate(&mut thread, &audit, record).await;
        }

        // Suspension point one: the classifier.
        let reply = match self.collaborators.classifier.classify(message, &thread).await {
            Ok(reply) => reply.clamped(),
            Err(error) => {
                let record = self.record_for(
                    &thread,
                    EscalationReason::CollaboratorFailure,
                    format!("classifier call failed: {error}"),
                );
                return self.escalate(&mut thread, &audit, record).await;
            }
        };

        if reply.confidence < self.settings.confidence_threshold {
            let record = self.record_for(
                &thread,
                EscalationReason::UnclearReply,
                format!(
                    "classification confidence {:.2} is below the {:.2} threshold: {}",
                    reply.confidence, self.settings.confidence_threshold, reply.summary
                ),
            );
            return self.escalate(&mut thread, &audit, record).await;
        }

        match reply.intent {
            ReplyIntent::Acceptance => return self.settle_agreement(&mut thread, &reply, &audit).await,
            ReplyIntent::Rejection => {
                self.apply_transition(&mut thread, ThreadEvent::RejectionReceived, &audit)?;
                self.save_thread(&thread).await?;
                self.emit(
                    AuditEvent::new(
                        audit.thread_id.clone(),
                        audit.campaign_id.clone(),
                        correlation_id,
                        "round.rejected",
                        AuditCategory::Flow,
                        audit.actor.as_str(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("summary", reply.summary.clone()),
                );
                return Ok(RoundOutcome::Reject);
            }
            ReplyIntent::Unclear => {
                let record = self.record_for(
                    &thread,
                    EscalationReason::UnclearReply,
                    format!("classifier could not name an intent: {}", reply.summary),
                );
                return self.escalate(&mut thread, &audit, record).await;
            }
            ReplyIntent::Question
                if self.settings.question_policy == QuestionPolicy::AlwaysEscalate =>
            {
                self.apply_transition(&mut thread, ThreadEvent::CounterRegistered, &audit)?;
                let record = self.record_for(
                    &thread,
                    EscalationReason::QuestionNeedsHuman,
                    format!("counterpart asked a question: {}", reply.summary),
                );
                return self.escalate(&mut thread, &audit, record).await;
            }
            ReplyIntent::Question | ReplyIntent::CounterOffer => {}
        }

        self.apply_transition(&mut thread, ThreadEvent::CounterRegistered, &audit)?;

        let reach = self.reducer.reduce(&thread.profile.reach_samples).representative;
        let band = self.authorized_band(&thread, reach, &audit).await?;

        if let Some(proposal) = reply.proposed_price {
            let assessment = assess_proposal(&band, reach, proposal);
            if assessment.verdict != BandVerdict::Within {
                let record = self
                    .record_for(
                        &thread,
                        EscalationReason::OutOfBandProposal,
                        format!(
                            "counterpart proposed ${proposal} (${} CPM) against the authorized band {band}",
                            assessment.implied_cpm
                        ),
                    )
                    .with_figures(band.clone(), Some(proposal));
                return self.escalate(&mut thread, &audit, record).await;
            }
        }

        let price = counter_price(&band, reply.proposed_price);
        let request = ComposeRequest {
            counterpart: thread.counterpart.clone(),
            authoritative_price: price,
            deliverables: vec![thread.deliverable.clone()],
            stage: if reply.intent == ReplyIntent::Question {
                ComposeStage::QuestionReply
            } else {
                ComposeStage::Counter
            },
            style_context: reply.summary.clone(),
        };

        // Suspension point two: the composer.
        let draft = match self.collaborators.composer.compose(&request).await {
            Ok(draft) => draft,
            Err(error) => {
                let record = self
                    .record_for(
                        &thread,
                        EscalationReason::CollaboratorFailure,
                        format!("composer call failed: {error}"),
                    )
                    .with_figures(band.clone(), reply.proposed_price);
                return self.escalate(&mut thread, &audit, record).await;
            }
        };

        let terms = AuthoritativeTerms { price, deliverables: request.deliverables.clone() };
        let outcome = self.gate.review(&draft, &terms);
        if !outcome.passed() {
            self.emit(
                AuditEvent::new(
                    audit.thread_id.clone(),
                    audit.campaign_id.clone(),
                    correlation_id,
                    "validation.draft_blocked",
                    AuditCategory::Validation,
                    audit.actor.as_str(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("blocking_failures", outcome.blocking().count().to_string()),
            );
            let record = self
                .record_for(
                    &thread,
                    EscalationReason::ValidationBlocked,
                    "drafted message failed pre-send validation".to_string(),
                )
                .with_draft(draft)
                .with_failures(outcome.failures)
                .with_figures(band.clone(), reply.proposed_price);
            return self.escalate(&mut thread, &audit, record).await;
        }

        self.apply_transition(&mut thread, ThreadEvent::CounterApproved, &audit)?;
        thread.round += 1;
        thread.last_offer = Some(price);
        self.save_thread(&thread).await?;
        self.emit(
            AuditEvent::new(
                audit.thread_id.clone(),
                audit.campaign_id.clone(),
                correlation_id,
                "round.counter_approved",
                AuditCategory::Pricing,
                audit.actor.as_str(),
                AuditOutcome::Success,
            )
            .with_metadata("price", price.to_string())
            .with_metadata("round", thread.round.to_string()),
        );

        Ok(RoundOutcome::Send { body: draft, price })
    }

    /// The transport collaborator confirms the counter left the building.
    pub async fn mark_dispatched(
        &self,
        thread_id: &ThreadId,
        correlation_id: &str,
    ) -> Result<(), ApplicationError> {
        let lock = self.thread_lock(thread_id);
        let _serialized = lock.lock().await;

        let mut thread = self.load_thread(thread_id).await?;
        let audit = self.audit_context(&thread, correlation_id);
        self.apply_transition(&mut thread, ThreadEvent::MessageDispatched, &audit)?;
        self.save_thread(&thread).await
    }

    /// No reply within the transport's configured timeout.
    pub async fn mark_stalled(
        &self,
        thread_id: &ThreadId,
        correlation_id: &str,
    ) -> Result<(), ApplicationError> {
        let lock = self.thread_lock(thread_id);
        let _serialized = lock.lock().await;

        let mut thread = self.load_thread(thread_id).await?;
        let audit = self.audit_context(&thread, correlation_id);
        self.apply_transition(&mut thread, ThreadEvent::ReplyTimedOut, &audit)?;
        self.save_thread(&thread).await
    }

    /// A human decided an escalated thread: approve puts it back into play
    /// (the human's message counts as an outbound round), decline closes it.
    pub async fn resolve_escalation(
        &self,
        thread_id: &ThreadId,
        approved: bool,
        correlation_id: &str,
    ) -> Result<(), ApplicationError> {
        let lock = self.thread_lock(thread_id);
        let _serialized = lock.lock().await;

        let mut thread = self.load_thread(thread_id).await?;
        let audit = self.audit_context(&thread, correlation_id);
        if approved {
            self.apply_transition(&mut thread, ThreadEvent::HumanApproved, &audit)?;
            thread.round += 1;
        } else {
            self.apply_transition(&mut thread, ThreadEvent::HumanDeclined, &audit)?;
        }
        self.save_thread(&thread).await
    }

    async fn settle_agreement(
        &self,
        thread: &mut NegotiationThread,
        reply: &ClassifiedReply,
        audit: &AuditContext,
    ) -> Result<RoundOutcome, ApplicationError> {
        let reach = self.reducer.reduce(&thread.profile.reach_samples).representative;
        let final_price = match reply.proposed_price.or(thread.last_offer) {
            Some(price) => price,
            None => band_for_reach(reach, self.pricing.rates_for(thread.platform)).target(),
        };

        self.apply_transition(thread, ThreadEvent::AcceptanceReceived, audit)?;
        self.save_thread(thread).await?;

        if let Some(campaign_id) = &thread.campaign_id {
            if let Some(mut campaign) =
                self.collaborators.campaigns.load_campaign(campaign_id).await?
            {
                campaign.record_closed_deal(ClosedDeal {
                    cpm_price: cpm_at_price(final_price, reach),
                    engagement_rate: thread.profile.engagement_rate,
                });
                self.collaborators.campaigns.save_campaign(&campaign).await?;
            }
        }

        if let Err(error) = self.collaborators.notifier.notify_agreement(thread, final_price).await
        {
            self.emit_notify_failure(audit, "notify.agreement_failed", &error);
        }
        self.emit(
            AuditEvent::new(
                audit.thread_id.clone(),
                audit.campaign_id.clone(),
                audit.correlation_id.clone(),
                "round.agreed",
                AuditCategory::Flow,
                audit.actor.as_str(),
                AuditOutcome::Success,
            )
            .with_metadata("final_price", final_price.to_string()),
        );

        Ok(RoundOutcome::Accept { final_price })
    }

    async fn escalate(
        &self,
        thread: &mut NegotiationThread,
        audit: &AuditContext,
        record: EscalationRecord,
    ) -> Result<RoundOutcome, ApplicationError> {
        self.apply_transition(thread, ThreadEvent::EscalationTriggered, audit)?;
        self.save_thread(thread).await?;

        if let Err(error) = self.collaborators.notifier.notify_escalation(&record).await {
            self.emit_notify_failure(audit, "notify.escalation_failed", &error);
        }
        self.emit(
            AuditEvent::new(
                audit.thread_id.clone(),
                audit.campaign_id.clone(),
                audit.correlation_id.clone(),
                "round.escalated",
                AuditCategory::Flow,
                audit.actor.as_str(),
                AuditOutcome::Success,
            )
            .with_metadata("reason", record.reason.code()),
        );

        Ok(RoundOutcome::Escalate(record))
    }

    /// Campaign flexibility tightens or widens the configured ceiling; the
    /// band ordering invariant is restored by clamping. Threads without a
    /// campaign (or with a campaign the store no longer knows) fall back to
    /// the configured rates alone.
    async fn authorized_band(
        &self,
        thread: &NegotiationThread,
        reach: Decimal,
        audit: &AuditContext,
    ) -> Result<PriceBand, ApplicationError> {
        let base = band_for_reach(reach, self.pricing.rates_for(thread.platform));
        let Some(campaign_id) = &thread.campaign_id else {
            return Ok(base);
        };
        let Some(campaign) = self.collaborators.campaigns.load_campaign(campaign_id).await? else {
            return Ok(base);
        };

        let adjusted = self.tracker.adjusted_ceiling(&campaign, thread.profile.engagement_rate);
        self.emit(
            AuditEvent::new(
                audit.thread_id.clone(),
                audit.campaign_id.clone(),
                audit.correlation_id.clone(),
                "pricing.flexibility_applied",
                AuditCategory::Pricing,
                audit.actor.as_str(),
                AuditOutcome::Success,
            )
            .with_metadata("adjusted_ceiling_cpm", adjusted.ceiling_cpm.to_string())
            .with_metadata("rationale", adjusted.rationale.clone()),
        );

        let ceiling = price_at_cpm(adjusted.ceiling_cpm, reach);
        Ok(PriceBand::clamped(base.floor(), base.target(), ceiling))
    }

    fn apply_transition(
        &self,
        thread: &mut NegotiationThread,
        event: ThreadEvent,
        audit: &AuditContext,
    ) -> Result<(), ApplicationError> {
        let outcome = self
            .flow
            .apply_with_audit(
                &thread.state,
                &event,
                &TransitionContext::default(),
                self.collaborators.audit.as_ref(),
                audit,
            )
            .map_err(DomainError::from)?;
        thread.record_transition(&outcome);
        Ok(())
    }

    async fn load_thread(&self, id: &ThreadId) -> Result<NegotiationThread, ApplicationError> {
        self.collaborators
            .threads
            .load_thread(id)
            .await?
            .ok_or_else(|| ApplicationError::UnknownThread(id.0.clone()))
    }

    async fn save_thread(&self, thread: &NegotiationThread) -> Result<(), ApplicationError> {
        self.collaborators.threads.save_thread(thread).await
    }

    fn record_for(
        &self,
        thread: &NegotiationThread,
        reason: EscalationReason,
        note: String,
    ) -> EscalationRecord {
        EscalationRecord::new(
            thread.id.clone(),
            thread.campaign_id.clone(),
            thread.counterpart.clone(),
            reason,
            note,
        )
    }

    fn audit_context(&self, thread: &NegotiationThread, correlation_id: &str) -> AuditContext {
        AuditContext::new(
            Some(thread.id.clone()),
            thread.campaign_id.clone(),
            correlation_id,
            "negotiation-engine",
        )
    }

    fn emit(&self, event: AuditEvent) {
        self.collaborators.audit.emit(event);
    }

    fn emit_notify_failure(&self, audit: &AuditContext, event_type: &str, error: &ApplicationError) {
        self.emit(
            AuditEvent::new(
                audit.thread_id.clone(),
                audit.campaign_id.clone(),
                audit.correlation_id.clone(),
                event_type,
                AuditCategory::System,
                audit.actor.as_str(),
                AuditOutcome::Failed,
            )
            .with_metadata("error", error.to_string()),
        );
    }

    fn thread_lock(&self, id: &ThreadId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(id.0.clone()).or_default().clone()
    }
}

/// This round's authoritative counter. A favorable ask is met where it
/// stands; an ask between target and ceiling is split down the middle.
fn counter_price(band: &PriceBand, proposal: Option<Decimal>) -> Decimal {
    match proposal {
        None => band.target(),
        Some(ask) if ask <= band.target() => ask,
        Some(ask) => ((band.target() + ask) / Decimal::from(2)).round_dp(2).min(band.ceiling()),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::cpm::band::PriceBand;

    use super::counter_price;

    fn band() -> PriceBand {
        PriceBand::clamped(Decimal::from(1000), Decimal::from(1250), Decimal::from(1500))
    }

    #[test]
    fn no_proposal_counters_at_target() {
        assert_eq!(counter_price(&band(), None), Decimal::from(1250));
    }

    #[test]
    fn favorable_ask_is_met_where_it_stands() {
        assert_eq!(counter_price(&band(), Some(Decimal::from(1100))), Decimal::from(1100));
    }

    #[test]
    fn high_ask_is_split_between_target_and_ask() {
        assert_eq!(counter_price(&band(), Some(Decimal::from(1450))), Decimal::from(1350));
    }

    #[test]
    fn split_never_exceeds_the_ceiling() {
        // Only reachable if the ask itself is in band, but the clamp holds
        // for any input.
        let price = counter_price(&band(), Some(Decimal::from(2100)));
        assert!(price <= band().ceiling());
    }
}
