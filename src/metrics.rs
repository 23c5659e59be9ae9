//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub mints_attempted: IntCounter,
    pub sends_accepted: IntCounter,
    pub sends_rejected: IntCounter,
    pub mints_finalized: IntCounter,
    pub metadata_failures: IntCounter,
    pub allow_list_failures: IntCounter,
    pub mint_errors: IntCounterVec,

    // Gauges
    pub mints_in_progress: IntGauge,
    pub solana_time: IntGauge,

    // Histograms
    pub simulation_latency: Histogram,
    pub finality_latency: Histogram,
    pub batch_size: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let mints_attempted = IntCounter::with_opts(Opts::new(
            "candy_mints_attempted_total",
            "Number of transactions built for mint batches",
        ))?;

        let sends_accepted = IntCounter::with_opts(Opts::new(
            "candy_sends_accepted_total",
            "Mint transactions accepted by the RPC node",
        ))?;

        let sends_rejected = IntCounter::with_opts(Opts::new(
            "candy_sends_rejected_total",
            "Mint transactions rejected on send",
        ))?;

        let mints_finalized = IntCounter::with_opts(Opts::new(
            "candy_mints_finalized_total",
            "Mint transactions that reached the finality commitment",
        ))?;

        let metadata_failures = IntCounter::with_opts(Opts::new(
            "candy_metadata_failures_total",
            "Finalized mints whose metadata could not be fetched",
        ))?;

        let allow_list_failures = IntCounter::with_opts(Opts::new(
            "candy_allow_list_failures_total",
            "Allow-list route transactions that did not finalize",
        ))?;

        let mint_errors = IntCounterVec::new(
            Opts::new("candy_mint_errors_total", "Mint flows aborted, by category"),
            &["category"],
        )?;

        let mints_in_progress = IntGauge::with_opts(Opts::new(
            "candy_mints_in_progress",
            "Mint flows currently running",
        ))?;

        let solana_time = IntGauge::with_opts(Opts::new(
            "candy_solana_time_seconds",
            "Last on-chain unix time observed",
        ))?;

        let simulation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "candy_simulation_latency_seconds",
                "Compute budget simulation latency",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
        )?;

        let finality_latency = Histogram::with_opts(
            HistogramOpts::new(
                "candy_finality_latency_seconds",
                "Time from send until the batch settled",
            )
            .buckets(vec![1.0, 5.0, 10.0, 20.0, 30.0, 60.0, 90.0]),
        )?;

        let batch_size = Histogram::with_opts(
            HistogramOpts::new("candy_batch_size", "Transactions per mint batch")
                .buckets(vec![1.0, 2.0, 3.0, 5.0, 10.0, 20.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(mints_attempted.clone()))?;
        registry.register(Box::new(sends_accepted.clone()))?;
        registry.register(Box::new(sends_rejected.clone()))?;
        registry.register(Box::new(mints_finalized.clone()))?;
        registry.register(Box::new(metadata_failures.clone()))?;
        registry.register(Box::new(allow_list_failures.clone()))?;
        registry.register(Box::new(mint_errors.clone()))?;
        registry.register(Box::new(mints_in_progress.clone()))?;
        registry.register(Box::new(solana_time.clone()))?;
        registry.register(Box::new(simulation_latency.clone()))?;
        registry.register(Box::new(finality_latency.clone()))?;
        registry.register(Box::new(batch_size.clone()))?;

        Ok(Self {
            registry,
            mints_attempted,
            sends_accepted,
            sends_rejected,
            mints_finalized,
            metadata_failures,
            allow_list_failures,
            mint_errors,
            mints_in_progress,
            solana_time,
            simulation_latency,
            finality_latency,
            batch_size,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
