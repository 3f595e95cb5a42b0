//! End-to-end round scenarios for the negotiation engine, driven through
//! scripted collaborator fakes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use parley_core::audit::InMemoryAuditSink;
use parley_core::config::AppConfig;
use parley_core::domain::thread::CounterpartProfile;
use parley_core::flows::states::ThreadState;
use parley_core::{
    ApplicationError, CampaignFlexibilityState, CampaignId, CampaignStore, ClassifiedReply,
    Collaborators, ComposeRequest, EscalationReason, EscalationRecord, MessageComposer,
    NegotiationEngine, NegotiationThread, Notifier, Platform, ReplyClassifier, ReplyIntent,
    RoundOutcome, ThreadId, ThreadStore,
};

#[derive(Default)]
struct ScriptedClassifier {
    replies: Mutex<VecDeque<Result<ClassifiedReply, ApplicationError>>>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    fn with(reply: Result<ClassifiedReply, ApplicationError>) -> Self {
        let scripted = Self::default();
        scripted.replies.lock().expect("script lock").push_back(reply);
        scripted
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplyClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        _message: &str,
        _thread: &NegotiationThread,
    ) -> Result<ClassifiedReply, ApplicationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Err(ApplicationError::Collaborator("script exhausted".to_string())))
    }
}

#[derive(Default)]
struct ScriptedComposer {
    drafts: Mutex<VecDeque<Result<String, ApplicationError>>>,
    calls: AtomicUsize,
}

impl ScriptedComposer {
    fn with(draft: Result<String, ApplicationError>) -> Self {
        let scripted = Self::default();
        scripted.drafts.lock().expect("script lock").push_back(draft);
        scripted
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageComposer for ScriptedComposer {
    async fn compose(&self, _request: &ComposeRequest) -> Result<String, ApplicationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.drafts
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Err(ApplicationError::Collaborator("script exhausted".to_string())))
    }
}

#[derive(Default)]
struct MemoryThreadStore {
    threads: RwLock<HashMap<String, NegotiationThread>>,
}

#[async_trait]
impl ThreadStore for MemoryThreadStore {
    async fn save_thread(&self, thread: &NegotiationThread) -> Result<(), ApplicationError> {
        self.threads.write().await.insert(thread.id.0.clone(), thread.clone());
        Ok(())
    }

    async fn load_thread(
        &self,
        id: &ThreadId,
    ) -> Result<Option<NegotiationThread>, ApplicationError> {
        Ok(self.threads.read().await.get(&id.0).cloned())
    }
}

#[derive(Default)]
struct MemoryCampaignStore {
    campaigns: RwLock<HashMap<String, CampaignFlexibilityState>>,
}

#[async_trait]
impl CampaignStore for MemoryCampaignStore {
    async fn save_campaign(
        &self,
        state: &CampaignFlexibilityState,
    ) -> Result<(), ApplicationError> {
        self.campaigns.write().await.insert(state.id.0.clone(), state.clone());
        Ok(())
    }

    async fn load_campaign(
        &self,
        id: &CampaignId,
    ) -> Result<Option<CampaignFlexibilityState>, ApplicationError> {
        Ok(self.campaigns.read().await.get(&id.0).cloned())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    escalations: Mutex<Vec<EscalationRecord>>,
    agreements: Mutex<Vec<(ThreadId, Decimal)>>,
}

impl RecordingNotifier {
    fn escalations(&self) -> Vec<EscalationRecord> {
        self.escalations.lock().expect("notifier lock").clone()
    }

    fn agreements(&self) -> Vec<(ThreadId, Decimal)> {
        self.agreements.lock().expect("notifier lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_escalation(&self, record: &EscalationRecord) -> Result<(), ApplicationError> {
        self.escalations.lock().expect("notifier lock").push(record.clone());
        Ok(())
    }

    async fn notify_agreement(
        &self,
        thread: &NegotiationThread,
        final_price: Decimal,
    ) -> Result<(), ApplicationError> {
        self.agreements.lock().expect("notifier lock").push((thread.id.clone(), final_price));
        Ok(())
    }
}

struct Harness {
    engine: NegotiationEngine,
    classifier: Arc<ScriptedClassifier>,
    composer: Arc<ScriptedComposer>,
    threads: Arc<MemoryThreadStore>,
    campaigns: Arc<MemoryCampaignStore>,
    notifier: Arc<RecordingNotifier>,
    audit: InMemoryAuditSink,
}

impl Harness {
    fn new(classifier: ScriptedClassifier, composer: ScriptedComposer) -> Self {
        let classifier = Arc::new(classifier);
        let composer = Arc::new(composer);
        let threads = Arc::new(MemoryThreadStore::default());
        let campaigns = Arc::new(MemoryCampaignStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let audit = InMemoryAuditSink::default();

        let engine = NegotiationEngine::new(
            Collaborators {
                classifier: classifier.clone(),
                composer: composer.clone(),
                threads: threads.clone(),
                campaigns: campaigns.clone(),
                notifier: notifier.clone(),
                audit: Arc::new(audit.clone()),
            },
            &AppConfig::default(),
        );

        Self { engine, classifier, composer, threads, campaigns, notifier, audit }
    }

    async fn seed_thread(&self, thread: &NegotiationThread) {
        self.threads.save_thread(thread).await.expect("seed thread");
    }

    async fn stored_thread(&self, id: &ThreadId) -> NegotiationThread {
        self.threads.load_thread(id).await.expect("load thread").expect("thread exists")
    }
}

fn thread(campaign: Option<&str>) -> NegotiationThread {
    NegotiationThread::open(
        ThreadId("th-100".to_string()),
        "Ada Vale",
        Platform::ShortFormVideo,
        "60s integrated video",
        campaign.map(|id| CampaignId(id.to_string())),
        CounterpartProfile {
            reach_samples: vec![48_000, 52_000, 50_000],
            engagement_rate: Decimal::new(1, 2),
        },
    )
}

fn counter(price: Option<i64>, confidence: f64) -> ClassifiedReply {
    ClassifiedReply {
        intent: ReplyIntent::CounterOffer,
        confidence,
        proposed_price: price.map(Decimal::from),
        proposed_terms: Vec::new(),
        summary: "asked for a different rate".to_string(),
    }
}

fn compliant_draft(price: &str) -> String {
    format!(
        "Hi Ada, thanks for coming back so quickly! Based on your recent reach we can do \
         {price} for the 60s integrated video, posted within two weeks of the brief. \
         Let me know if that works and we'll get the agreement over today."
    )
}

#[tokio::test]
async fn out_of_band_proposal_escalates_without_burning_a_round() {
    // $2,000 against 50k reach is a $40 CPM ask; the authorized band tops
    // out at $30 CPM ($1,500).
    let harness = Harness::new(
        ScriptedClassifier::with(Ok(counter(Some(2000), 0.92))),
        ScriptedComposer::default(),
    );
    harness.seed_thread(&thread(None)).await;

    let outcome = harness
        .engine
        .handle_reply(&ThreadId("th-100".to_string()), "I'd need $2000 for this", "req-1")
        .await
        .expect("round completes");

    let record = match outcome {
        RoundOutcome::Escalate(record) => record,
        other => panic!("expected escalation, got {other:?}"),
    };
    assert_eq!(record.reason, EscalationReason::OutOfBandProposal);
    assert_eq!(record.proposed_price, Some(Decimal::from(2000)));
    assert!(record.band.is_some());

    let stored = harness.stored_thread(&ThreadId("th-100".to_string())).await;
    assert_eq!(stored.state, ThreadState::Escalated);
    assert_eq!(stored.round, 0);
    assert_eq!(harness.composer.calls(), 0);
    assert_eq!(harness.notifier.escalations().len(), 1);
}

#[tokio::test]
async fn acceptance_agrees_notifies_once_and_records_the_closed_deal() {
    let harness = Harness::new(
        ScriptedClassifier::with(Ok(ClassifiedReply {
            intent: ReplyIntent::Acceptance,
            confidence: 0.95,
            proposed_price: None,
            proposed_terms: Vec::new(),
            summary: "accepted the current offer".to_string(),
        })),
        ScriptedComposer::default(),
    );
    let campaign = CampaignFlexibilityState::open(
        CampaignId("cmp-1".to_string()),
        Decimal::from(20),
        Decimal::from(30),
        10,
    )
    .expect("valid campaign");
    harness.campaigns.save_campaign(&campaign).await.expect("seed campaign");
    harness.seed_thread(&thread(Some("cmp-1"))).await;

    let outcome = harness
        .engine
        .handle_reply(&ThreadId("th-100".to_string()), "Sounds good, let's do it!", "req-2")
        .await
        .expect("round completes");

    // No prior counter on the thread, so the agreed figure falls back to the
    // band target: $25 CPM at 50k reach.
    assert_eq!(outcome, RoundOutcome::Accept { final_price: Decimal::from(1250) });
    assert_eq!(harness.notifier.agreements(), vec![(
        ThreadId("th-100".to_string()),
        Decimal::from(1250)
    )]);
    assert_eq!(harness.composer.calls(), 0);

    let stored = harness.stored_thread(&ThreadId("th-100".to_string())).await;
    assert_eq!(stored.state, ThreadState::Agreed);

    let campaign = harness
        .campaigns
        .load_campaign(&CampaignId("cmp-1".to_string()))
        .await
        .expect("load campaign")
        .expect("campaign exists");
    assert_eq!(campaign.closed.len(), 1);
    assert_eq!(campaign.closed[0].cpm_price, Decimal::from(25));
}

#[tokio::test]
async fn round_cap_escalates_before_the_classifier_is_called() {
    let harness =
        Harness::new(ScriptedClassifier::default(), ScriptedComposer::default());
    let mut thread = thread(None);
    thread.round = 5;
    harness.seed_thread(&thread).await;

    let outcome = harness
        .engine
        .handle_reply(&ThreadId("th-100".to_string()), "checking in again", "req-3")
        .await
        .expect("round completes");

    let record = match outcome {
        RoundOutcome::Escalate(record) => record,
        other => panic!("expected escalation, got {other:?}"),
    };
    assert_eq!(record.reason, EscalationReason::RoundCapReached);
    assert_eq!(record.reason.code(), "max_rounds_reached");
    assert_eq!(harness.classifier.calls(), 0);
}

#[tokio::test]
async fn mismatched_draft_figure_blocks_the_send_and_escalates_with_the_draft() {
    // Authoritative counter is the band target ($1,250); the composer slips
    // in $1,300.
    let harness = Harness::new(
        ScriptedClassifier::with(Ok(counter(None, 0.9))),
        ScriptedComposer::with(Ok(compliant_draft("$1,300"))),
    );
    harness.seed_thread(&thread(None)).await;

    let outcome = harness
        .engine
        .handle_reply(&ThreadId("th-100".to_string()), "could you sharpen the rate?", "req-4")
        .await
        .expect("round completes");

    let record = match outcome {
        RoundOutcome::Escalate(record) => record,
        other => panic!("expected escalation, got {other:?}"),
    };
    assert_eq!(record.reason, EscalationReason::ValidationBlocked);
    assert_eq!(record.draft.as_deref(), Some(compliant_draft("$1,300").as_str()));
    assert!(record
        .failures
        .iter()
        .any(|failure| failure.check == "monetary_accuracy"));

    let stored = harness.stored_thread(&ThreadId("th-100".to_string())).await;
    assert_eq!(stored.state, ThreadState::Escalated);
    assert_eq!(stored.round, 0);
}

#[tokio::test]
async fn in_band_counter_composes_validates_and_sends() {
    // Ask of $1,300 sits inside the $1,000..$1,500 band; the engine splits
    // the difference with its $1,250 target.
    let harness = Harness::new(
        ScriptedClassifier::with(Ok(counter(Some(1300), 0.9))),
        ScriptedComposer::with(Ok(compliant_draft("$1,275"))),
    );
    harness.seed_thread(&thread(None)).await;

    let outcome = harness
        .engine
        .handle_reply(&ThreadId("th-100".to_string()), "could you do $1300?", "req-5")
        .await
        .expect("round completes");

    match outcome {
        RoundOutcome::Send { body, price } => {
            assert_eq!(price, Decimal::from(1275));
            assert!(body.contains("$1,275"));
        }
        other => panic!("expected send, got {other:?}"),
    }

    let stored = harness.stored_thread(&ThreadId("th-100".to_string())).await;
    assert_eq!(stored.state, ThreadState::CounterSent);
    assert_eq!(stored.round, 1);
    assert_eq!(stored.last_offer, Some(Decimal::from(1275)));

    harness
        .engine
        .mark_dispatched(&ThreadId("th-100".to_string()), "req-5")
        .await
        .expect("dispatch confirm");
    let stored = harness.stored_thread(&ThreadId("th-100".to_string())).await;
    assert_eq!(stored.state, ThreadState::AwaitingReply);
}

#[tokio::test]
async fn campaign_pressure_tightens_the_ceiling_for_the_next_counterpart() {
    // Two cheap closes pull the adjusted ceiling down to a $25 CPM, so a
    // $1,400 ask (in the static band) is now out of band at 50k reach.
    let harness = Harness::new(
        ScriptedClassifier::with(Ok(counter(Some(1400), 0.9))),
        ScriptedComposer::default(),
    );
    let mut campaign = CampaignFlexibilityState::open(
        CampaignId("cmp-1".to_string()),
        Decimal::from(20),
        Decimal::from(30),
        10,
    )
    .expect("valid campaign");
    for _ in 0..2 {
        campaign.record_closed_deal(parley_core::ClosedDeal {
            cpm_price: Decimal::from(20),
            engagement_rate: Decimal::new(3, 2),
        });
    }
    harness.campaigns.save_campaign(&campaign).await.expect("seed campaign");
    harness.seed_thread(&thread(Some("cmp-1"))).await;

    let outcome = harness
        .engine
        .handle_reply(&ThreadId("th-100".to_string()), "I can do $1400", "req-6")
        .await
        .expect("round completes");

    let record = match outcome {
        RoundOutcome::Escalate(record) => record,
        other => panic!("expected escalation, got {other:?}"),
    };
    assert_eq!(record.reason, EscalationReason::OutOfBandProposal);
    let band = record.band.expect("band attached");
    assert_eq!(band.ceiling(), Decimal::from(1250));
}

#[tokio::test]
async fn classifier_failure_escalates_instead_of_retrying() {
    let harness = Harness::new(
        ScriptedClassifier::with(Err(ApplicationError::Collaborator(
            "timeout after 30s".to_string(),
        ))),
        ScriptedComposer::default(),
    );
    harness.seed_thread(&thread(None)).await;

    let outcome = harness
        .engine
        .handle_reply(&ThreadId("th-100".to_string()), "hello again", "req-7")
        .await
        .expect("round completes");

    let record = match outcome {
        RoundOutcome::Escalate(record) => record,
        other => panic!("expected escalation, got {other:?}"),
    };
    assert_eq!(record.reason, EscalationReason::CollaboratorFailure);
    assert!(record.note.contains("timeout after 30s"));
    assert_eq!(harness.classifier.calls(), 1);
}

#[tokio::test]
async fn low_confidence_classification_is_treated_as_unclear() {
    let harness = Harness::new(
        ScriptedClassifier::with(Ok(counter(Some(1200), 0.4))),
        ScriptedComposer::default(),
    );
    harness.seed_thread(&thread(None)).await;

    let outcome = harness
        .engine
        .handle_reply(&ThreadId("th-100".to_string()), "maybe? hard to say", "req-8")
        .await
        .expect("round completes");

    let record = match outcome {
        RoundOutcome::Escalate(record) => record,
        other => panic!("expected escalation, got {other:?}"),
    };
    assert_eq!(record.reason, EscalationReason::UnclearReply);
    assert_eq!(harness.composer.calls(), 0);
}

#[tokio::test]
async fn questions_escalate_under_the_default_policy() {
    let harness = Harness::new(
        ScriptedClassifier::with(Ok(ClassifiedReply {
            intent: ReplyIntent::Question,
            confidence: 0.9,
            proposed_price: None,
            proposed_terms: Vec::new(),
            summary: "asked about usage windows".to_string(),
        })),
        ScriptedComposer::default(),
    );
    harness.seed_thread(&thread(None)).await;

    let outcome = harness
        .engine
        .handle_reply(&ThreadId("th-100".to_string()), "how long would you use the video?", "req-9")
        .await
        .expect("round completes");

    let record = match outcome {
        RoundOutcome::Escalate(record) => record,
        other => panic!("expected escalation, got {other:?}"),
    };
    assert_eq!(record.reason, EscalationReason::QuestionNeedsHuman);
    assert_eq!(harness.composer.calls(), 0);
}

#[tokio::test]
async fn rejection_closes_the_thread() {
    let harness = Harness::new(
        ScriptedClassifier::with(Ok(ClassifiedReply {
            intent: ReplyIntent::Rejection,
            confidence: 0.93,
            proposed_price: None,
            proposed_terms: Vec::new(),
            summary: "not interested this quarter".to_string(),
        })),
        ScriptedComposer::default(),
    );
    harness.seed_thread(&thread(None)).await;

    let outcome = harness
        .engine
        .handle_reply(&ThreadId("th-100".to_string()), "we'll pass for now", "req-10")
        .await
        .expect("round completes");

    assert_eq!(outcome, RoundOutcome::Reject);
    let stored = harness.stored_thread(&ThreadId("th-100".to_string())).await;
    assert_eq!(stored.state, ThreadState::Rejected);
    assert!(stored.is_terminal());

    let error = harness
        .engine
        .handle_reply(&ThreadId("th-100".to_string()), "actually, wait", "req-11")
        .await
        .expect_err("terminal threads accept no replies");
    assert!(matches!(error, ApplicationError::Domain(_)));
}

#[tokio::test]
async fn human_resolution_reopens_or_closes_an_escalated_thread() {
    let harness = Harness::new(
        ScriptedClassifier::with(Ok(counter(Some(2000), 0.92))),
        ScriptedComposer::default(),
    );
    harness.seed_thread(&thread(None)).await;
    harness
        .engine
        .handle_reply(&ThreadId("th-100".to_string()), "I'd need $2000", "req-12")
        .await
        .expect("escalation round");

    harness
        .engine
        .resolve_escalation(&ThreadId("th-100".to_string()), true, "req-13")
        .await
        .expect("human approval");
    let stored = harness.stored_thread(&ThreadId("th-100".to_string())).await;
    assert_eq!(stored.state, ThreadState::AwaitingReply);
    assert_eq!(stored.round, 1);
}

#[tokio::test]
async fn every_round_leaves_an_audit_trail() {
    let harness = Harness::new(
        ScriptedClassifier::with(Ok(counter(Some(1300), 0.9))),
        ScriptedComposer::with(Ok(compliant_draft("$1,275"))),
    );
    harness.seed_thread(&thread(None)).await;

    harness
        .engine
        .handle_reply(&ThreadId("th-100".to_string()), "could you do $1300?", "req-14")
        .await
        .expect("round completes");

    let events = harness.audit.events();
    let types: Vec<&str> = events.iter().map(|event| event.event_type.as_str()).collect();
    assert!(types.contains(&"round.reply_received"));
    assert!(types.contains(&"flow.transition_applied"));
    assert!(types.contains(&"round.counter_approved"));
    assert!(events.iter().all(|event| event.correlation_id == "req-14"));
}
