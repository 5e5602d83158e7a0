//! Scoring models and champion/challenger routing

pub mod loader;
pub mod router;

use crate::types::features::MODEL_FEATURE_COUNT;
use anyhow::Result;

pub use loader::{ModelLoader, OnnxModel};
pub use router::{FixedSelector, ScoringRouter, VariantSelector, WeightedSelector};

/// A loaded fraud classifier.
///
/// Implementations are shared read-only across all records for the process
/// lifetime and must be safe to call concurrently.
pub trait FraudModel: Send + Sync {
    /// Probability of the fraud class for features in model input order.
    fn predict_probability(&self, features: &[f32; MODEL_FEATURE_COUNT]) -> Result<f64>;

    fn name(&self) -> &str;
}
