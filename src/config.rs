//! Configuration management for the decision pipeline

use crate::graph::GraphEntity;
use crate::types::alert::RiskLevelThresholds;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Where the profile and graph stores live.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JetStream key-value buckets
    #[default]
    Nats,
    /// Process-local maps, for local runs
    Memory,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub profiles: ProfilesConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming transactions
    pub transaction_subject: String,
    /// Queue group shared by all pipeline instances
    #[serde(default = "default_queue_group")]
    pub queue_group: String,
    /// Subject the case work queue listens on
    pub case_subject: String,
    /// JetStream stream holding cases
    #[serde(default = "default_case_stream")]
    pub case_stream: String,
    /// Subject for outgoing fraud alerts
    pub alert_subject: String,
}

fn default_queue_group() -> String {
    "fraud-decision".to_string()
}

fn default_case_stream() -> String {
    "FRAUD_CASES".to_string()
}

/// Champion/challenger model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub champion_path: String,
    pub challenger_path: String,
    /// Share of traffic routed to the champion
    #[serde(default = "default_champion_weight")]
    pub champion_weight: f64,
    /// Probability above which the model flags fraud
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Number of threads for ONNX inference per model (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
    /// Fixed seed for A/B routing; random when absent
    #[serde(default)]
    pub routing_seed: Option<u64>,
}

fn default_champion_weight() -> f64 {
    0.90
}

fn default_threshold() -> f64 {
    0.80
}

fn default_onnx_threads() -> usize {
    1
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            champion_path: "models/champion.onnx".to_string(),
            challenger_path: "models/challenger.onnx".to_string(),
            champion_weight: default_champion_weight(),
            threshold: default_threshold(),
            onnx_threads: default_onnx_threads(),
            routing_seed: None,
        }
    }
}

/// Relationship graph configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_graph_bucket")]
    pub bucket: String,
    /// Per-query timeout; a slow store counts as unavailable
    #[serde(default = "default_graph_timeout_ms")]
    pub timeout_ms: u64,
    /// Transaction attributes looked up as graph nodes
    #[serde(default = "default_graph_entities")]
    pub entities: Vec<GraphEntity>,
}

fn default_graph_bucket() -> String {
    "graph".to_string()
}

fn default_graph_timeout_ms() -> u64 {
    250
}

fn default_graph_entities() -> Vec<GraphEntity> {
    vec![GraphEntity::User, GraphEntity::Card, GraphEntity::Ip]
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            bucket: default_graph_bucket(),
            timeout_ms: default_graph_timeout_ms(),
            entities: default_graph_entities(),
        }
    }
}

/// Profile store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProfilesConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_profiles_bucket")]
    pub bucket: String,
}

fn default_profiles_bucket() -> String {
    "profiles".to_string()
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            bucket: default_profiles_bucket(),
        }
    }
}

/// Alert severity configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub risk_levels: RiskLevelThresholds,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum users processed concurrently within a batch
    pub workers: usize,
    /// Maximum records pulled into one batch
    pub batch_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, with `FRAUD__SECTION__KEY`
    /// environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("FRAUD").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.models.champion_weight) {
            anyhow::bail!(
                "models.champion_weight must be within [0, 1], got {}",
                self.models.champion_weight
            );
        }
        if !(0.0..=1.0).contains(&self.models.threshold) {
            anyhow::bail!(
                "models.threshold must be within [0, 1], got {}",
                self.models.threshold
            );
        }
        if self.pipeline.workers == 0 {
            anyhow::bail!("pipeline.workers must be at least 1");
        }
        if self.pipeline.batch_size == 0 {
            anyhow::bail!("pipeline.batch_size must be at least 1");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                transaction_subject: "transactions".to_string(),
                queue_group: default_queue_group(),
                case_subject: "fraud.cases".to_string(),
                case_stream: default_case_stream(),
                alert_subject: "fraud.alerts".to_string(),
            },
            models: ModelsConfig::default(),
            graph: GraphConfig::default(),
            profiles: ProfilesConfig::default(),
            alerts: AlertsConfig::default(),
            pipeline: PipelineConfig {
                workers: 8,
                batch_size: 64,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}
