//! End-to-end scenarios over in-memory stores and stub models.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fraud_decision_pipeline::dispatcher::{
    ActionDispatcher, AlertNotifier, CaseQueue, Delivery, DispatchReport,
};
use fraud_decision_pipeline::error::PipelineError;
use fraud_decision_pipeline::graph::{GraphEdge, GraphLinkageChecker, GraphStore, InMemoryGraphStore};
use fraud_decision_pipeline::metrics::PipelineMetrics;
use fraud_decision_pipeline::models::{FixedSelector, FraudModel, ScoringRouter};
use fraud_decision_pipeline::pipeline::{FraudPipeline, RecordStage, RecordStatus};
use fraud_decision_pipeline::profile_store::{InMemoryProfileStore, ProfileStore};
use fraud_decision_pipeline::types::{
    FraudAlert, FraudCase, ModelVersion, RiskLevelThresholds, Transaction, UserProfile,
};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct StubModel(f64);

impl FraudModel for StubModel {
    fn predict_probability(&self, _features: &[f32; 5]) -> Result<f64> {
        Ok(self.0)
    }

    fn name(&self) -> &str {
        "stub"
    }
}

struct BrokenModel;

impl FraudModel for BrokenModel {
    fn predict_probability(&self, _features: &[f32; 5]) -> Result<f64> {
        Err(anyhow!("session unavailable"))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

/// Panics for one specific amount, scores everything else as clean.
struct PanicsOnAmount(f32);

impl FraudModel for PanicsOnAmount {
    fn predict_probability(&self, features: &[f32; 5]) -> Result<f64> {
        if features[0] == self.0 {
            panic!("model exploded");
        }
        Ok(0.1)
    }

    fn name(&self) -> &str {
        "panicky"
    }
}

struct DownGraph;

#[async_trait]
impl GraphStore for DownGraph {
    async fn edges(&self, _node_id: &str) -> Result<Vec<GraphEdge>> {
        Err(anyhow!("graph endpoint unreachable"))
    }
}

#[derive(Default)]
struct RecordingQueue {
    cases: Mutex<Vec<FraudCase>>,
    fail: bool,
}

#[async_trait]
impl CaseQueue for RecordingQueue {
    async fn enqueue(&self, case: &FraudCase) -> Result<()> {
        self.cases.lock().unwrap().push(case.clone());
        if self.fail {
            return Err(anyhow!("stream unavailable"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    alerts: Mutex<Vec<FraudAlert>>,
}

#[async_trait]
impl AlertNotifier for RecordingNotifier {
    async fn notify(&self, alert: &FraudAlert) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// In-memory profiles with a log of every call.
#[derive(Default)]
struct RecordingProfiles {
    inner: InMemoryProfileStore,
    calls: Mutex<Vec<String>>,
}

impl RecordingProfiles {
    fn calls_for(&self, user_id: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.contains(user_id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ProfileStore for RecordingProfiles {
    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.calls.lock().unwrap().push(format!("get {user_id}"));
        tokio::task::yield_now().await;
        self.inner.get(user_id).await
    }

    async fn update(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("update {user_id} {latitude}"));
        tokio::task::yield_now().await;
        self.inner.update(user_id, latitude, longitude, timestamp).await
    }
}

struct Harness {
    pipeline: FraudPipeline,
    profiles: Arc<RecordingProfiles>,
    cases: Arc<RecordingQueue>,
    alerts: Arc<RecordingNotifier>,
    metrics: Arc<PipelineMetrics>,
}

fn harness_with(
    model: Arc<dyn FraudModel>,
    graph: Arc<dyn GraphStore>,
    cases: RecordingQueue,
) -> Harness {
    let profiles = Arc::new(RecordingProfiles::default());
    let cases = Arc::new(cases);
    let alerts = Arc::new(RecordingNotifier::default());
    let metrics = Arc::new(PipelineMetrics::new());

    let router = ScoringRouter::new(
        model.clone(),
        model,
        Box::new(FixedSelector(ModelVersion::Champion)),
        0.8,
    );
    let dispatcher = ActionDispatcher::new(
        cases.clone(),
        alerts.clone(),
        profiles.clone(),
        RiskLevelThresholds::default(),
    );
    let pipeline = FraudPipeline::new(
        profiles.clone(),
        GraphLinkageChecker::new(graph, Duration::from_millis(250)),
        router,
        dispatcher,
        metrics.clone(),
    )
    .with_workers(4);

    Harness {
        pipeline,
        profiles,
        cases,
        alerts,
        metrics,
    }
}

fn harness(probability: f64, graph: Arc<dyn GraphStore>) -> Harness {
    harness_with(Arc::new(StubModel(probability)), graph, RecordingQueue::default())
}

fn transaction(id: &str, user: &str, amount: f64, latitude: f64) -> Transaction {
    let mut tx = Transaction::new(
        id,
        user,
        amount,
        latitude,
        -117.2,
        Utc.with_ymd_and_hms(2024, 5, 4, 21, 15, 0).unwrap(),
    );
    tx.card_hash = format!("card_{user}");
    tx.ip_address = "198.51.100.7".to_string();
    tx
}

fn payload(tx: &Transaction) -> Vec<u8> {
    serde_json::to_vec(tx).unwrap()
}

#[tokio::test]
async fn test_card_linked_to_fraud_overrides_clean_score() {
    let graph = Arc::new(InMemoryGraphStore::new());
    graph.add_edge("card_stolen", "acct_fraud_ring_9", true);
    let h = harness(0.05, graph);

    let mut tx = transaction("tx_1200", "user_1", 1200.0, 34.5);
    tx.card_hash = "card_stolen".to_string();

    let outcome = h.pipeline.process_payload(&payload(&tx)).await;
    let decision = outcome.decision().expect("record should be decided");

    assert!(decision.is_fraud);
    assert!(decision.graph_flag);
    assert_eq!(decision.fraud_probability, 0.05);
    assert_eq!(decision.linked_node_id.as_deref(), Some("acct_fraud_ring_9"));

    let cases = h.cases.cases.lock().unwrap();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].case_id, "case_tx_1200");
    assert_eq!(h.alerts.alerts.lock().unwrap().len(), 1);

    // Fraud never refreshes the profile.
    assert!(h.profiles.inner.snapshot("user_1").is_none());
}

#[tokio::test]
async fn test_small_purchase_without_history_is_legitimate() {
    let h = harness(0.10, Arc::new(InMemoryGraphStore::new()));
    let tx = transaction("tx_45", "user_new", 45.0, 34.5);

    let outcome = h.pipeline.process_payload(&payload(&tx)).await;

    match &outcome.status {
        RecordStatus::Dispatched { decision, report } => {
            assert!(!decision.is_fraud);
            assert!(!decision.graph_flag);
            assert_eq!(decision.model_version, ModelVersion::Champion);
            assert_eq!(*report, DispatchReport::ProfileUpdated(Delivery::Delivered));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let profile = h.profiles.inner.snapshot("user_new").unwrap();
    assert_eq!(profile.last_latitude, 34.5);
    assert_eq!(profile.last_longitude, -117.2);
    assert_eq!(profile.last_transaction_time, tx.timestamp);
    assert!(h.cases.cases.lock().unwrap().is_empty());
    assert!(h.alerts.alerts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_timestamp_fails_only_that_record() {
    let h = harness(0.10, Arc::new(InMemoryGraphStore::new()));

    let broken = br#"{"transactionId":"tx_bad","userId":"user_2","merchantId":"m","amount":10.0,
        "latitude":1.0,"longitude":2.0,"ipAddress":"1.1.1.1","cardHash":"c"}"#
        .to_vec();
    let payloads = vec![
        payload(&transaction("tx_a", "user_1", 20.0, 10.0)),
        broken,
        payload(&transaction("tx_b", "user_3", 30.0, 11.0)),
    ];

    let outcomes = h.pipeline.process_batch(&payloads).await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].transaction_id.as_deref(), Some("tx_a"));
    assert!(!outcomes[0].is_failed());
    assert_eq!(outcomes[2].transaction_id.as_deref(), Some("tx_b"));
    assert!(!outcomes[2].is_failed());

    assert_eq!(outcomes[1].transaction_id.as_deref(), Some("tx_bad"));
    match &outcomes[1].status {
        RecordStatus::Failed { stage, error } => {
            assert_eq!(*stage, RecordStage::Received);
            assert!(matches!(error, PipelineError::Record(_)));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(h.metrics.records_failed.load(Ordering::Relaxed), 1);
    assert_eq!(h.metrics.decisions.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn test_unreadable_payload_has_no_transaction_id() {
    let h = harness(0.10, Arc::new(InMemoryGraphStore::new()));

    let outcome = h.pipeline.process_payload(b"\x00\x01 not json").await;

    assert!(outcome.is_failed());
    assert_eq!(outcome.transaction_id, None);
}

#[tokio::test]
async fn test_graph_outage_falls_back_to_model() {
    let clean = harness(0.10, Arc::new(DownGraph));
    let outcome = clean
        .pipeline
        .process_payload(&payload(&transaction("tx_c", "user_c", 80.0, 5.0)))
        .await;
    let decision = outcome.decision().unwrap();
    assert!(!decision.is_fraud);
    assert!(!decision.graph_flag);
    assert!(clean.metrics.graph_unavailable.load(Ordering::Relaxed) >= 1);

    let risky = harness(0.95, Arc::new(DownGraph));
    let outcome = risky
        .pipeline
        .process_payload(&payload(&transaction("tx_d", "user_d", 80.0, 5.0)))
        .await;
    let decision = outcome.decision().unwrap();
    assert!(decision.is_fraud);
    assert!(!decision.graph_flag);
}

#[tokio::test]
async fn test_same_user_records_run_in_arrival_order() {
    let h = harness(0.10, Arc::new(InMemoryGraphStore::new()));

    let payloads = vec![
        payload(&transaction("tx_1", "user_a", 10.0, 10.0)),
        payload(&transaction("tx_2", "user_b", 10.0, 40.0)),
        payload(&transaction("tx_3", "user_a", 10.0, 20.0)),
        payload(&transaction("tx_4", "user_a", 10.0, 30.0)),
    ];

    let outcomes = h.pipeline.process_batch(&payloads).await;
    assert!(outcomes.iter().all(|o| !o.is_failed()));

    assert_eq!(
        h.profiles.calls_for("user_a"),
        vec![
            "get user_a",
            "update user_a 10",
            "get user_a",
            "update user_a 20",
            "get user_a",
            "update user_a 30",
        ]
    );
    assert_eq!(h.profiles.inner.snapshot("user_a").unwrap().last_latitude, 30.0);
    assert_eq!(h.profiles.inner.snapshot("user_b").unwrap().last_latitude, 40.0);
}

#[tokio::test]
async fn test_case_failure_still_sends_alert() {
    let h = harness_with(
        Arc::new(StubModel(0.97)),
        Arc::new(InMemoryGraphStore::new()),
        RecordingQueue {
            fail: true,
            ..Default::default()
        },
    );

    let outcome = h
        .pipeline
        .process_payload(&payload(&transaction("tx_x", "user_x", 900.0, 1.0)))
        .await;

    match &outcome.status {
        RecordStatus::Dispatched { decision, report } => {
            assert!(decision.is_fraud);
            assert_eq!(
                *report,
                DispatchReport::Escalated {
                    case: Delivery::Failed,
                    alert: Delivery::Delivered,
                }
            );
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(h.cases.cases.lock().unwrap().len(), 1);
    let alerts = h.alerts.alerts.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].subject, "Fraud Alert for User user_x");
    assert_eq!(h.metrics.delivery_failures.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_model_error_fails_record_after_graph_check() {
    let h = harness_with(
        Arc::new(BrokenModel),
        Arc::new(InMemoryGraphStore::new()),
        RecordingQueue::default(),
    );

    let outcome = h
        .pipeline
        .process_payload(&payload(&transaction("tx_m", "user_m", 10.0, 1.0)))
        .await;

    match &outcome.status {
        RecordStatus::Failed { stage, error } => {
            assert_eq!(*stage, RecordStage::GraphChecked);
            assert!(matches!(error, PipelineError::Model(_)));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(h.profiles.inner.snapshot("user_m").is_none());
}

#[tokio::test]
async fn test_panicking_stage_is_isolated() {
    let h = harness_with(
        Arc::new(PanicsOnAmount(666.0)),
        Arc::new(InMemoryGraphStore::new()),
        RecordingQueue::default(),
    );

    let payloads = vec![
        payload(&transaction("tx_ok_1", "user_1", 10.0, 1.0)),
        payload(&transaction("tx_boom", "user_2", 666.0, 1.0)),
        payload(&transaction("tx_ok_2", "user_3", 12.0, 1.0)),
    ];

    let outcomes = h.pipeline.process_batch(&payloads).await;

    assert!(!outcomes[0].is_failed());
    assert!(!outcomes[2].is_failed());
    match &outcomes[1].status {
        RecordStatus::Failed { stage, error } => {
            assert_eq!(*stage, RecordStage::GraphChecked);
            assert!(error.to_string().contains("model exploded"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_challenger_decisions_are_tagged() {
    let profiles = Arc::new(InMemoryProfileStore::new());
    let champion: Arc<dyn FraudModel> = Arc::new(StubModel(0.1));
    let challenger: Arc<dyn FraudModel> = Arc::new(StubModel(0.9));
    let router = ScoringRouter::new(
        champion,
        challenger,
        Box::new(FixedSelector(ModelVersion::Challenger)),
        0.8,
    );
    let dispatcher = ActionDispatcher::new(
        Arc::new(RecordingQueue::default()),
        Arc::new(RecordingNotifier::default()),
        profiles.clone(),
        RiskLevelThresholds::default(),
    );
    let metrics = Arc::new(PipelineMetrics::new());
    let pipeline = FraudPipeline::new(
        profiles,
        GraphLinkageChecker::new(Arc::new(InMemoryGraphStore::new()), Duration::from_millis(250)),
        router,
        dispatcher,
        metrics.clone(),
    );

    let outcome = pipeline
        .process_payload(&payload(&transaction("tx_ch", "user_ch", 50.0, 1.0)))
        .await;
    let decision = outcome.decision().unwrap();

    assert_eq!(decision.model_version, ModelVersion::Challenger);
    assert_eq!(decision.fraud_probability, 0.9);
    assert!(decision.is_fraud);
    assert_eq!(metrics.challenger_share(), 1.0);
}

/// Reads always fail; writes are recorded.
#[derive(Default)]
struct UnreadableProfiles {
    written: InMemoryProfileStore,
}

#[async_trait]
impl ProfileStore for UnreadableProfiles {
    async fn get(&self, _user_id: &str) -> Result<Option<UserProfile>> {
        Err(anyhow!("profile table throttled"))
    }

    async fn update(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.written.update(user_id, latitude, longitude, timestamp).await
    }
}

#[tokio::test]
async fn test_profile_read_failure_scores_without_history() {
    let profiles = Arc::new(UnreadableProfiles::default());
    let cases = Arc::new(RecordingQueue::default());
    let model: Arc<dyn FraudModel> = Arc::new(StubModel(0.95));
    let router = ScoringRouter::new(
        model.clone(),
        model,
        Box::new(FixedSelector(ModelVersion::Champion)),
        0.8,
    );
    let dispatcher = ActionDispatcher::new(
        cases.clone(),
        Arc::new(RecordingNotifier::default()),
        profiles.clone(),
        RiskLevelThresholds::default(),
    );
    let pipeline = FraudPipeline::new(
        profiles,
        GraphLinkageChecker::new(Arc::new(InMemoryGraphStore::new()), Duration::from_millis(250)),
        router,
        dispatcher,
        Arc::new(PipelineMetrics::new()),
    );

    let outcome = pipeline
        .process_payload(&payload(&transaction("tx_r", "user_r", 700.0, 34.5)))
        .await;

    match &outcome.status {
        RecordStatus::Dispatched { decision, .. } => assert!(decision.is_fraud),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let cases = cases.cases.lock().unwrap();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].features.geo_distance_anomaly, 0.0);
    assert_eq!(cases[0].features.rolling_txn_count, 0);
}

#[tokio::test]
async fn test_stored_profile_feeds_distance_and_count() {
    let h = harness(0.95, Arc::new(InMemoryGraphStore::new()));
    h.profiles.inner.insert(
        "user_s",
        UserProfile {
            last_latitude: 30.5,
            last_longitude: -117.2,
            last_transaction_time: Utc.with_ymd_and_hms(2024, 5, 4, 20, 0, 0).unwrap(),
            transaction_count_30min: 4,
        },
    );

    let outcome = h
        .pipeline
        .process_payload(&payload(&transaction("tx_s", "user_s", 300.0, 34.5)))
        .await;
    assert!(outcome.decision().unwrap().is_fraud);

    let cases = h.cases.cases.lock().unwrap();
    assert_eq!(cases.len(), 1);
    assert!((cases[0].features.geo_distance_anomaly - 4.0).abs() < 1e-9);
    assert_eq!(cases[0].features.rolling_txn_count, 4);
}
