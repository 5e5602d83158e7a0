//! Pipeline counters, latency samples and periodic summaries.

use crate::dispatcher::DispatchReport;
use crate::types::decision::{Decision, GraphLinkResult, ModelVersion};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline performance
pub struct PipelineMetrics {
    /// Records that reached a decision
    pub decisions: AtomicU64,
    /// Decisions flagged as fraud
    pub fraud_decisions: AtomicU64,
    /// Decisions where the graph found a fraudulent link
    pub graph_flags: AtomicU64,
    /// Graph checks that failed open
    pub graph_unavailable: AtomicU64,
    pub champion_routed: AtomicU64,
    pub challenger_routed: AtomicU64,
    /// Case, alert or profile writes that failed
    pub delivery_failures: AtomicU64,
    /// Records that ended in `Failed`
    pub records_failed: AtomicU64,
    failures_by_stage: RwLock<HashMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Fraud probability distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            decisions: AtomicU64::new(0),
            fraud_decisions: AtomicU64::new(0),
            graph_flags: AtomicU64::new(0),
            graph_unavailable: AtomicU64::new(0),
            champion_routed: AtomicU64::new(0),
            challenger_routed: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            records_failed: AtomicU64::new(0),
            failures_by_stage: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    pub fn record_graph_check(&self, result: &GraphLinkResult) {
        if *result == GraphLinkResult::CheckUnavailable {
            self.graph_unavailable.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a decided transaction
    pub fn record_decision(&self, processing_time: Duration, decision: &Decision) {
        self.decisions.fetch_add(1, Ordering::Relaxed);
        if decision.is_fraud {
            self.fraud_decisions.fetch_add(1, Ordering::Relaxed);
        }
        if decision.graph_flag {
            self.graph_flags.fetch_add(1, Ordering::Relaxed);
        }
        match decision.model_version {
            ModelVersion::Champion => self.champion_routed.fetch_add(1, Ordering::Relaxed),
            ModelVersion::Challenger => self.challenger_routed.fetch_add(1, Ordering::Relaxed),
        };

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let bucket = (decision.fraud_probability * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    pub fn record_dispatch(&self, report: &DispatchReport) {
        let failures = report.failures() as u64;
        if failures > 0 {
            self.delivery_failures.fetch_add(failures, Ordering::Relaxed);
        }
    }

    /// Record a record that failed at `stage`
    pub fn record_failure(&self, stage: &str) {
        self.records_failed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_stage) = self.failures_by_stage.write() {
            *by_stage.entry(stage.to_string()).or_insert(0) += 1;
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Share of decisions scored by the challenger
    pub fn challenger_share(&self) -> f64 {
        let champion = self.champion_routed.load(Ordering::Relaxed);
        let challenger = self.challenger_routed.load(Ordering::Relaxed);
        let total = champion + challenger;
        if total == 0 {
            0.0
        } else {
            challenger as f64 / total as f64
        }
    }

    /// Get current throughput (decisions per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.decisions.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    pub fn get_failures_by_stage(&self) -> HashMap<String, u64> {
        self.failures_by_stage
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let decisions = self.decisions.load(Ordering::Relaxed);
        let fraud = self.fraud_decisions.load(Ordering::Relaxed);
        let fraud_rate = if decisions > 0 {
            (fraud as f64 / decisions as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let score_dist = self.get_score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            FRAUD DECISION PIPELINE - METRICS SUMMARY         ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Decisions:        {:>8}  │  Throughput: {:>6.1} tx/s       ║",
            decisions,
            self.get_throughput()
        );
        info!(
            "║ Fraud Decisions:  {:>8}  │  Fraud Rate: {:>6.1}%          ║",
            fraud, fraud_rate
        );
        info!(
            "║ Graph Flags:      {:>8}  │  Graph Unavailable: {:>8}  ║",
            self.graph_flags.load(Ordering::Relaxed),
            self.graph_unavailable.load(Ordering::Relaxed)
        );
        info!(
            "║ Challenger Share: {:>7.1}%  │  Delivery Failures: {:>8}  ║",
            self.challenger_share() * 100.0,
            self.delivery_failures.load(Ordering::Relaxed)
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Failed Records: {:>8}                                     ║",
            self.records_failed.load(Ordering::Relaxed)
        );
        for (stage, count) in &self.get_failures_by_stage() {
            info!("║   after {:14}: {:>6}                                ║", stage, count);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Fraud Probability Distribution:                              ║");
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
