//! ONNX model loader

use crate::config::ModelsConfig;
use crate::error::ModelError;
use crate::models::FraudModel;
use crate::types::decision::ModelVersion;
use crate::types::features::MODEL_FEATURE_COUNT;
use anyhow::{Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// A classifier exported to ONNX.
pub struct OnnxModel {
    name: String,
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl FraudModel for OnnxModel {
    fn predict_probability(&self, features: &[f32; MODEL_FEATURE_COUNT]) -> Result<f64> {
        let shape = vec![1_i64, MODEL_FEATURE_COUNT as i64];
        let input = Tensor::from_array((shape, features.to_vec()))
            .context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;
        let outputs = session.run(ort::inputs![&self.input_name => input])?;

        let probability = fraud_probability(&outputs, &self.output_name)
            .with_context(|| format!("Model {} produced no fraud probability", self.name))?;

        debug!(model = %self.name, probability = probability, "Model scored");
        Ok(probability)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Find the fraud-class probability among the session outputs.
///
/// Tree ensembles export either a `[batch, classes]` tensor or a
/// `seq(map(int64, float))`; both are understood.
fn fraud_probability(outputs: &SessionOutputs, preferred: &str) -> Result<f64> {
    if let Some(output) = outputs.get(preferred) {
        if let Some(probability) = probability_from_value(output) {
            return Ok(probability);
        }
    }

    for (name, output) in outputs.iter() {
        if name.contains("label") {
            continue;
        }
        if let Some(probability) = probability_from_value(&output) {
            return Ok(probability);
        }
    }

    anyhow::bail!("no probability output")
}

fn probability_from_value(value: &DynValue) -> Option<f64> {
    if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        let classes = dims.last().copied().unwrap_or(0);
        return match classes {
            c if c >= 2 => data.get(1).map(|&p| p as f64),
            _ => data.first().map(|&p| p as f64),
        };
    }

    if DynSequenceValueType::can_downcast(&value.dtype()) {
        return probability_from_sequence_map(value).ok();
    }

    None
}

/// First element of a `seq(map(int64, float))`, class 1.
fn probability_from_sequence_map(value: &DynValue) -> Result<f64> {
    let allocator = Allocator::default();
    let sequence = value
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;
    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
    let first = maps
        .first()
        .ok_or_else(|| anyhow::anyhow!("Empty probability sequence"))?;

    let pairs = first.try_extract_key_values::<i64, f32>()?;
    if let Some((_, p)) = pairs.iter().find(|(class, _)| *class == 1) {
        return Ok(*p as f64);
    }
    if let Some((_, p)) = pairs.iter().find(|(class, _)| *class == 0) {
        return Ok(1.0 - *p as f64);
    }
    anyhow::bail!("No class probabilities in map")
}

/// Loader for ONNX models
pub struct ModelLoader {
    onnx_threads: usize,
}

impl ModelLoader {
    /// Initialize ONNX Runtime
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load a single ONNX model from file
    pub fn load_model<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<OnnxModel> {
        let path = path.as_ref();

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(OnnxModel {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    /// Load both A/B variants. Either one missing is fatal.
    pub fn load_variants(
        &self,
        config: &ModelsConfig,
    ) -> Result<(Arc<dyn FraudModel>, Arc<dyn FraudModel>), ModelError> {
        let champion = self.load_variant(ModelVersion::Champion, &config.champion_path)?;
        let challenger = self.load_variant(ModelVersion::Challenger, &config.challenger_path)?;
        Ok((champion, challenger))
    }

    fn load_variant(
        &self,
        version: ModelVersion,
        path: &str,
    ) -> Result<Arc<dyn FraudModel>, ModelError> {
        let unavailable = |reason: String| ModelError::Unavailable {
            version,
            path: path.to_string(),
            reason,
        };

        if !Path::new(path).exists() {
            return Err(unavailable("file not found".to_string()));
        }

        let model = self
            .load_model(path, version.as_str())
            .map_err(|e| unavailable(format!("{e:#}")))?;
        Ok(Arc::new(model))
    }
}
