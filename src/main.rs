//! Fraud Decision Pipeline - Main Entry Point
//!
//! Consumes transactions from NATS, decides fraud/legitimate for each one and
//! dispatches the resulting action: case + alert for fraud, a profile refresh
//! otherwise.

use anyhow::Result;
use async_nats::jetstream;
use fraud_decision_pipeline::{
    config::{AppConfig, LoggingConfig, StoreBackend},
    consumer::TransactionConsumer,
    dispatcher::ActionDispatcher,
    graph::{GraphLinkageChecker, GraphStore, InMemoryGraphStore, KvGraphStore},
    kv,
    metrics::{MetricsReporter, PipelineMetrics},
    models::{ModelLoader, ScoringRouter, VariantSelector, WeightedSelector},
    pipeline::FraudPipeline,
    producer::{AlertProducer, CaseProducer},
    profile_store::{InMemoryProfileStore, KvProfileStore, ProfileStore},
    types::features::MODEL_FEATURE_NAMES,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingConfig) {
    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    match logging.format.as_str() {
        "pretty" => tracing_subscriber::fmt().with_env_filter(filter).pretty().init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging);

    info!("Starting Fraud Decision Pipeline");
    info!(
        champion_weight = config.models.champion_weight,
        threshold = config.models.threshold,
        graph_timeout_ms = config.graph.timeout_ms,
        "Configuration loaded"
    );

    // Both variants must load; there is no fallback model.
    let loader = ModelLoader::with_threads(config.models.onnx_threads)?;
    let (champion, challenger) = match loader.load_variants(&config.models) {
        Ok(models) => models,
        Err(e) => {
            error!(error = %e, "Model unavailable, refusing to start");
            return Err(e.into());
        }
    };
    info!(
        champion = champion.name(),
        challenger = challenger.name(),
        "Champion and challenger loaded"
    );

    let selector: Box<dyn VariantSelector> = match config.models.routing_seed {
        Some(seed) => Box::new(WeightedSelector::seeded(config.models.champion_weight, seed)),
        None => Box::new(WeightedSelector::new(config.models.champion_weight)),
    };
    let router = ScoringRouter::new(champion, challenger, selector, config.models.threshold);
    info!(
        threshold = router.threshold(),
        features = ?MODEL_FEATURE_NAMES,
        "Scoring router ready"
    );

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    let js = jetstream::new(client.clone());
    info!(url = %config.nats.url, "Connected to NATS");

    let profiles: Arc<dyn ProfileStore> = match config.profiles.backend {
        StoreBackend::Nats => Arc::new(KvProfileStore::new(
            kv::open_bucket(&js, &config.profiles.bucket).await?,
        )),
        StoreBackend::Memory => {
            warn!("Using in-memory profile store; profiles are lost on restart");
            Arc::new(InMemoryProfileStore::new())
        }
    };

    let graph_store: Arc<dyn GraphStore> = match config.graph.backend {
        StoreBackend::Nats => Arc::new(KvGraphStore::new(
            kv::open_bucket(&js, &config.graph.bucket).await?,
        )),
        StoreBackend::Memory => {
            warn!("Using empty in-memory graph store; no entity will be linked");
            Arc::new(InMemoryGraphStore::new())
        }
    };
    let graph = GraphLinkageChecker::new(graph_store, Duration::from_millis(config.graph.timeout_ms));

    let cases = CaseProducer::new(js.clone(), &config.nats.case_subject);
    cases.ensure_stream(&config.nats.case_stream).await?;
    let alerts = AlertProducer::new(client.clone(), &config.nats.alert_subject);
    info!(
        cases = cases.subject(),
        alerts = alerts.subject(),
        "Publishing fraud cases and alerts"
    );

    let dispatcher = ActionDispatcher::new(
        Arc::new(cases),
        Arc::new(alerts),
        profiles.clone(),
        config.alerts.risk_levels.clone(),
    );

    let metrics = Arc::new(PipelineMetrics::new());
    let pipeline = FraudPipeline::new(profiles, graph, router, dispatcher, metrics.clone())
        .with_graph_entities(config.graph.entities.clone())
        .with_workers(config.pipeline.workers);

    // Start metrics reporter (prints summary every 30 seconds)
    tokio::spawn(MetricsReporter::new(metrics.clone(), 30).start());

    let consumer = TransactionConsumer::new(
        client.clone(),
        &config.nats.transaction_subject,
        &config.nats.queue_group,
    );
    let subscription = consumer.subscribe().await?;
    let mut batches = subscription.ready_chunks(config.pipeline.batch_size);

    info!(
        subject = consumer.subject(),
        workers = config.pipeline.workers,
        batch_size = config.pipeline.batch_size,
        "Starting transaction processing loop"
    );

    let mut processed: u64 = 0;
    loop {
        tokio::select! {
            batch = batches.next() => {
                let Some(batch) = batch else {
                    warn!("Transaction subscription closed");
                    break;
                };

                let payloads: Vec<&[u8]> = batch.iter().map(|m| m.payload.as_ref()).collect();
                let outcomes = pipeline.process_batch(&payloads).await;
                let failed = outcomes.iter().filter(|o| o.is_failed()).count();

                let before = processed;
                processed += outcomes.len() as u64;

                // Log progress every 1000 records
                if before / 1000 != processed / 1000 {
                    let stats = metrics.get_processing_stats();
                    info!(
                        processed,
                        throughput = format!("{:.1} tx/s", metrics.get_throughput()),
                        avg_latency_us = stats.mean_us,
                        p99_latency_us = stats.p99_us,
                        "Processing milestone"
                    );
                }
                if failed > 0 {
                    warn!(batch_size = outcomes.len(), failed, "Batch finished with failed records");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Pipeline shutting down...");
    metrics.print_summary();

    Ok(())
}
