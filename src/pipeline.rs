//! Per-record orchestration of the decision pipeline.
//!
//! Each record moves through
//! `Received → FeaturesBuilt → GraphChecked → Scored → Decided → Dispatched`
//! or ends in `Failed` at the last stage it reached. Failures stay with
//! their record: the rest of the batch is always processed.
//!
//! Within a batch, records of the same user run one after another in arrival
//! order, so a profile write is visible to that user's next record. Distinct
//! users run concurrently.

use crate::dispatcher::{ActionDispatcher, DispatchReport};
use crate::error::PipelineError;
use crate::feature_engineer::FeatureEngineer;
use crate::fusion;
use crate::graph::{GraphEntity, GraphLinkageChecker};
use crate::metrics::PipelineMetrics;
use crate::models::ScoringRouter;
use crate::profile_store::ProfileStore;
use crate::types::decision::Decision;
use crate::types::transaction::Transaction;
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Progress of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RecordStage {
    Received = 0,
    FeaturesBuilt = 1,
    GraphChecked = 2,
    Scored = 3,
    Decided = 4,
    Dispatched = 5,
}

impl RecordStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStage::Received => "received",
            RecordStage::FeaturesBuilt => "features_built",
            RecordStage::GraphChecked => "graph_checked",
            RecordStage::Scored => "scored",
            RecordStage::Decided => "decided",
            RecordStage::Dispatched => "dispatched",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => RecordStage::Received,
            1 => RecordStage::FeaturesBuilt,
            2 => RecordStage::GraphChecked,
            3 => RecordStage::Scored,
            4 => RecordStage::Decided,
            _ => RecordStage::Dispatched,
        }
    }
}

impl fmt::Display for RecordStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last stage reached; readable after a panic.
struct StageTracker(AtomicU8);

impl StageTracker {
    fn new() -> Self {
        Self(AtomicU8::new(RecordStage::Received as u8))
    }

    fn advance(&self, stage: RecordStage) {
        self.0.store(stage as u8, Ordering::Release);
    }

    fn current(&self) -> RecordStage {
        RecordStage::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Terminal state of a record.
#[derive(Debug)]
pub enum RecordStatus {
    Dispatched {
        decision: Decision,
        report: DispatchReport,
    },
    Failed {
        /// Last stage the record completed
        stage: RecordStage,
        error: PipelineError,
    },
}

#[derive(Debug)]
pub struct RecordOutcome {
    /// Absent only when the payload carried no readable id
    pub transaction_id: Option<String>,
    pub status: RecordStatus,
}

impl RecordOutcome {
    pub fn decision(&self) -> Option<&Decision> {
        match &self.status {
            RecordStatus::Dispatched { decision, .. } => Some(decision),
            RecordStatus::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, RecordStatus::Failed { .. })
    }
}

/// The decision pipeline.
pub struct FraudPipeline {
    engineer: FeatureEngineer,
    profiles: Arc<dyn ProfileStore>,
    graph: GraphLinkageChecker,
    graph_entities: Vec<GraphEntity>,
    router: ScoringRouter,
    dispatcher: ActionDispatcher,
    metrics: Arc<PipelineMetrics>,
    workers: usize,
}

impl FraudPipeline {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        graph: GraphLinkageChecker,
        router: ScoringRouter,
        dispatcher: ActionDispatcher,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            engineer: FeatureEngineer::new(),
            profiles,
            graph,
            graph_entities: vec![GraphEntity::User, GraphEntity::Card, GraphEntity::Ip],
            router,
            dispatcher,
            metrics,
            workers: 8,
        }
    }

    /// Transaction attributes to look up in the graph
    pub fn with_graph_entities(mut self, entities: Vec<GraphEntity>) -> Self {
        self.graph_entities = entities;
        self
    }

    /// Maximum number of users processed concurrently in a batch
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Process one raw message.
    pub async fn process_payload(&self, payload: &[u8]) -> RecordOutcome {
        match Transaction::from_slice(payload) {
            Ok(tx) => self.run_record(tx).await,
            Err(e) => self.reject(payload, e.into()),
        }
    }

    /// Process a batch of raw messages; one outcome per message, in input order.
    pub async fn process_batch<P: AsRef<[u8]>>(&self, payloads: &[P]) -> Vec<RecordOutcome> {
        let mut outcomes: Vec<Option<RecordOutcome>> = payloads.iter().map(|_| None).collect();

        // One lane per user, in order of first appearance.
        let mut lane_of: HashMap<String, usize> = HashMap::new();
        let mut lanes: Vec<Vec<(usize, Transaction)>> = Vec::new();

        for (index, payload) in payloads.iter().enumerate() {
            let payload = payload.as_ref();
            match Transaction::from_slice(payload) {
                Ok(tx) => {
                    let lane = *lane_of.entry(tx.user_id.clone()).or_insert_with(|| {
                        lanes.push(Vec::new());
                        lanes.len() - 1
                    });
                    lanes[lane].push((index, tx));
                }
                Err(e) => outcomes[index] = Some(self.reject(payload, e.into())),
            }
        }

        let finished: Vec<Vec<(usize, RecordOutcome)>> = futures::stream::iter(lanes)
            .map(|lane| async move {
                let mut done = Vec::with_capacity(lane.len());
                for (index, tx) in lane {
                    done.push((index, self.run_record(tx).await));
                }
                done
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        for (index, outcome) in finished.into_iter().flatten() {
            outcomes[index] = Some(outcome);
        }

        outcomes.into_iter().flatten().collect()
    }

    fn reject(&self, payload: &[u8], error: PipelineError) -> RecordOutcome {
        let transaction_id = extract_transaction_id(payload);
        warn!(
            transaction_id = transaction_id.as_deref().unwrap_or("<unknown>"),
            stage = %RecordStage::Received,
            error = %error,
            "Rejected malformed transaction"
        );
        self.metrics.record_failure(RecordStage::Received.as_str());

        RecordOutcome {
            transaction_id,
            status: RecordStatus::Failed {
                stage: RecordStage::Received,
                error,
            },
        }
    }

    /// Drive one parsed transaction; never panics, never returns early.
    async fn run_record(&self, tx: Transaction) -> RecordOutcome {
        let start = Instant::now();
        let tracker = StageTracker::new();

        let result = AssertUnwindSafe(self.decide_and_dispatch(&tx, &tracker))
            .catch_unwind()
            .await;

        let status = match result {
            Ok(Ok((decision, report))) => {
                self.metrics.record_decision(start.elapsed(), &decision);
                RecordStatus::Dispatched { decision, report }
            }
            Ok(Err(error)) => self.fail(&tx, tracker.current(), error),
            Err(panic) => self.fail(
                &tx,
                tracker.current(),
                PipelineError::Internal(panic_message(panic)),
            ),
        };

        RecordOutcome {
            transaction_id: Some(tx.transaction_id),
            status,
        }
    }

    fn fail(&self, tx: &Transaction, stage: RecordStage, error: PipelineError) -> RecordStatus {
        error!(
            transaction_id = %tx.transaction_id,
            user_id = %tx.user_id,
            stage = %stage,
            error = %error,
            "Record failed"
        );
        self.metrics.record_failure(stage.as_str());
        RecordStatus::Failed { stage, error }
    }

    async fn decide_and_dispatch(
        &self,
        tx: &Transaction,
        tracker: &StageTracker,
    ) -> Result<(Decision, DispatchReport), PipelineError> {
        debug!(transaction_id = %tx.transaction_id, "Processing transaction");

        let profile = match self.profiles.get(&tx.user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(
                    transaction_id = %tx.transaction_id,
                    user_id = %tx.user_id,
                    error = %e,
                    "Profile read failed, scoring without history"
                );
                None
            }
        };
        let features = self.engineer.build(tx, profile.as_ref());
        tracker.advance(RecordStage::FeaturesBuilt);

        let entity_ids: Vec<&str> = self.graph_entities.iter().map(|e| e.id_of(tx)).collect();
        let link = self.graph.check_all(&entity_ids).await;
        self.metrics.record_graph_check(&link);
        tracker.advance(RecordStage::GraphChecked);

        let scoring = self.router.score(&features)?;
        tracker.advance(RecordStage::Scored);

        let decision = fusion::fuse_link(&tx.transaction_id, &link, &scoring);
        tracker.advance(RecordStage::Decided);

        info!(
            transaction_id = %tx.transaction_id,
            decision = if decision.is_fraud { "FRAUD" } else { "LEGITIMATE" },
            fraud_probability = decision.fraud_probability,
            model_version = %decision.model_version,
            graph_flag = decision.graph_flag,
            "Decision"
        );

        let report = self.dispatcher.dispatch(tx, &decision, &features).await;
        self.metrics.record_dispatch(&report);
        tracker.advance(RecordStage::Dispatched);

        Ok((decision, report))
    }
}

/// Best-effort id lookup for payloads that failed to parse.
fn extract_transaction_id(payload: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    value.get("transactionId")?.as_str().map(ToString::to_string)
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "stage panicked".to_string()
    }
}
