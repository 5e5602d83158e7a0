//! Champion/challenger routing and scoring

use crate::error::ModelError;
use crate::models::FraudModel;
use crate::types::decision::{ModelVersion, ScoringResult};
use crate::types::features::FeatureVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Chooses which A/B variant scores the next transaction.
pub trait VariantSelector: Send + Sync {
    fn select(&self) -> ModelVersion;
}

/// Weighted random choice: champion with probability `champion_weight`.
pub struct WeightedSelector {
    champion_weight: f64,
    rng: Mutex<StdRng>,
}

impl WeightedSelector {
    /// Selector seeded from OS entropy
    pub fn new(champion_weight: f64) -> Self {
        Self::with_rng(champion_weight, StdRng::from_entropy())
    }

    /// Reproducible selector
    pub fn seeded(champion_weight: f64, seed: u64) -> Self {
        Self::with_rng(champion_weight, StdRng::seed_from_u64(seed))
    }

    fn with_rng(champion_weight: f64, rng: StdRng) -> Self {
        Self {
            champion_weight: champion_weight.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }
}

impl VariantSelector for WeightedSelector {
    fn select(&self) -> ModelVersion {
        // A poisoned RNG is still a usable RNG.
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        if rng.gen::<f64>() < self.champion_weight {
            ModelVersion::Champion
        } else {
            ModelVersion::Challenger
        }
    }
}

/// Always picks the same variant.
pub struct FixedSelector(pub ModelVersion);

impl VariantSelector for FixedSelector {
    fn select(&self) -> ModelVersion {
        self.0
    }
}

/// Routes each feature vector to one variant and applies the threshold.
pub struct ScoringRouter {
    champion: Arc<dyn FraudModel>,
    challenger: Arc<dyn FraudModel>,
    selector: Box<dyn VariantSelector>,
    threshold: f64,
}

impl ScoringRouter {
    pub fn new(
        champion: Arc<dyn FraudModel>,
        challenger: Arc<dyn FraudModel>,
        selector: Box<dyn VariantSelector>,
        threshold: f64,
    ) -> Self {
        Self {
            champion,
            challenger,
            selector,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score with whichever variant the selector picks.
    pub fn score(&self, features: &FeatureVector) -> Result<ScoringResult, ModelError> {
        let version = self.selector.select();
        self.score_with(version, features)
    }

    /// Score with a specific variant.
    pub fn score_with(
        &self,
        version: ModelVersion,
        features: &FeatureVector,
    ) -> Result<ScoringResult, ModelError> {
        let model = match version {
            ModelVersion::Champion => &self.champion,
            ModelVersion::Challenger => &self.challenger,
        };

        let probability = model
            .predict_probability(&features.model_input())
            .map_err(|e| ModelError::Inference {
                version,
                reason: format!("{e:#}"),
            })?;

        if !(0.0..=1.0).contains(&probability) {
            return Err(ModelError::OutOfRange {
                version,
                value: probability,
            });
        }

        debug!(
            model_version = %version,
            model = %model.name(),
            fraud_probability = probability,
            "Scored transaction"
        );

        Ok(ScoringResult {
            model_version: version,
            fraud_probability: probability,
            is_fraud: probability > self.threshold,
        })
    }
}
