//! Fraud Decision Pipeline Library
//!
//! Real-time fraud decisions for card transactions: behavioral features from
//! the user's profile, a relationship-graph check against known fraud, a
//! champion/challenger model score, OR fusion of the two signals, and
//! dispatch of the resulting action.

pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod feature_engineer;
pub mod fusion;
pub mod graph;
pub mod kv;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod producer;
pub mod profile_store;
pub mod types;

pub use config::AppConfig;
pub use consumer::TransactionConsumer;
pub use dispatcher::{ActionDispatcher, AlertNotifier, CaseQueue, DispatchReport};
pub use error::{ModelError, PipelineError, RecordError};
pub use feature_engineer::FeatureEngineer;
pub use graph::{GraphLinkageChecker, GraphStore};
pub use models::{FraudModel, ScoringRouter};
pub use pipeline::{FraudPipeline, RecordOutcome, RecordStage, RecordStatus};
pub use producer::{AlertProducer, CaseProducer};
pub use profile_store::ProfileStore;
pub use types::{alert::FraudAlert, decision::Decision, transaction::Transaction};
