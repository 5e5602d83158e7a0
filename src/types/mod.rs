//! Type definitions for the decision pipeline

pub mod alert;
pub mod decision;
pub mod features;
pub mod profile;
pub mod transaction;

pub use alert::{FraudAlert, FraudCase, RiskLevel, RiskLevelThresholds};
pub use decision::{Decision, GraphLinkResult, ModelVersion, ScoringResult};
pub use features::FeatureVector;
pub use profile::UserProfile;
pub use transaction::Transaction;
