use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::info;

/// Metrics collector for exchange operations
#[derive(Debug)]
pub struct ExchangeMetrics {
    // Latency tracking
    submit_latency: LatencyTracker,
    cancel_latency: LatencyTracker,
    expire_latency: LatencyTracker,
    match_latency: LatencyTracker,

    // Throughput counters
    orders_submitted: AtomicU64,
    orders_cancelled: AtomicU64,
    orders_expired: AtomicU64,
    trades_executed: AtomicU64,

    // Volume tracking
    total_volume: AtomicU64,
    total_notional: AtomicU64,
}

impl ExchangeMetrics {
    pub fn new() -> Self {
        // Register metric descriptions
        describe_counter!("exchange_orders_total", "Total number of orders processed");
        describe_counter!("exchange_trades_total", "Total number of trades executed");
        describe_counter!("exchange_volume_total", "Total certificate units traded");
        describe_histogram!(
            "exchange_operation_duration_seconds",
            "Duration of exchange operations"
        );
        describe_gauge!(
            "exchange_resting_orders",
            "Number of resting orders per side"
        );
        describe_gauge!("exchange_spread_ticks", "Current ask-bid spread in ticks");

        Self {
            submit_latency: LatencyTracker::new("submit"),
            cancel_latency: LatencyTracker::new("cancel"),
            expire_latency: LatencyTracker::new("expire"),
            match_latency: LatencyTracker::new("match"),
            orders_submitted: AtomicU64::new(0),
            orders_cancelled: AtomicU64::new(0),
            orders_expired: AtomicU64::new(0),
            trades_executed: AtomicU64::new(0),
            total_volume: AtomicU64::new(0),
            total_notional: AtomicU64::new(0),
        }
    }

    // Latency measurement methods
    pub fn time_submit<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.submit_latency.time(f)
    }

    pub fn time_cancel<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.cancel_latency.time(f)
    }

    pub fn time_expire<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.expire_latency.time(f)
    }

    pub fn time_match<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.match_latency.time(f)
    }

    // Counter methods
    pub fn increment_orders_submitted(&self) {
        self.orders_submitted.fetch_add(1, Ordering::Relaxed);
        counter!("exchange_orders_total", "operation" => "submit").increment(1);
    }

    pub fn increment_orders_cancelled(&self) {
        self.orders_cancelled.fetch_add(1, Ordering::Relaxed);
        counter!("exchange_orders_total", "operation" => "cancel").increment(1);
    }

    pub fn increment_orders_expired(&self, count: u64) {
        self.orders_expired.fetch_add(count, Ordering::Relaxed);
        counter!("exchange_orders_total", "operation" => "expire").increment(count);
    }

    pub fn increment_trades_executed(&self, volume: u64, notional: u64) {
        self.trades_executed.fetch_add(1, Ordering::Relaxed);
        self.total_volume.fetch_add(volume, Ordering::Relaxed);
        self.total_notional.fetch_add(notional, Ordering::Relaxed);

        counter!("exchange_trades_total").increment(1);
        counter!("exchange_volume_total").increment(volume);
        counter!("exchange_notional_total").increment(notional);
    }

    // Gauge methods
    pub fn set_resting_asks(&self, count: u64) {
        gauge!("exchange_resting_orders", "side" => "ask").set(count as f64);
    }

    pub fn set_resting_bids(&self, count: u64) {
        gauge!("exchange_resting_orders", "side" => "bid").set(count as f64);
    }

    pub fn set_spread(&self, spread_ticks: u64) {
        gauge!("exchange_spread_ticks").set(spread_ticks as f64);
    }

    pub fn set_best_ask(&self, price: u64) {
        gauge!("exchange_best_ask").set(price as f64);
    }

    pub fn set_best_bid(&self, price: u64) {
        gauge!("exchange_best_bid").set(price as f64);
    }

    // Getters for current values
    pub fn get_orders_submitted(&self) -> u64 {
        self.orders_submitted.load(Ordering::Relaxed)
    }

    pub fn get_orders_cancelled(&self) -> u64 {
        self.orders_cancelled.load(Ordering::Relaxed)
    }

    pub fn get_orders_expired(&self) -> u64 {
        self.orders_expired.load(Ordering::Relaxed)
    }

    pub fn get_trades_executed(&self) -> u64 {
        self.trades_executed.load(Ordering::Relaxed)
    }

    pub fn get_total_volume(&self) -> u64 {
        self.total_volume.load(Ordering::Relaxed)
    }

    pub fn get_total_notional(&self) -> u64 {
        self.total_notional.load(Ordering::Relaxed)
    }

    pub fn get_latency_stats(&self) -> LatencyStats {
        LatencyStats {
            submit: self.submit_latency.get_stats(),
            cancel: self.cancel_latency.get_stats(),
            expire: self.expire_latency.get_stats(),
            match_op: self.match_latency.get_stats(),
        }
    }
}

impl Default for ExchangeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency tracker for individual operations
#[derive(Debug)]
struct LatencyTracker {
    operation: String,
    samples: AtomicU64,
    total_nanos: AtomicU64,
    min_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl LatencyTracker {
    fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            samples: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
            min_nanos: AtomicU64::new(u64::MAX),
            max_nanos: AtomicU64::new(0),
        }
    }

    fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let duration = start.elapsed();

        self.record_latency(duration);
        result
    }

    fn record_latency(&self, duration: Duration) {
        let nanos = duration.as_nanos() as u64;

        self.samples.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);

        // Update min (with CAS loop)
        let mut current_min = self.min_nanos.load(Ordering::Relaxed);
        while nanos < current_min {
            match self.min_nanos.compare_exchange_weak(
                current_min,
                nanos,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(new_min) => current_min = new_min,
            }
        }

        // Update max (with CAS loop)
        let mut current_max = self.max_nanos.load(Ordering::Relaxed);
        while nanos > current_max {
            match self.max_nanos.compare_exchange_weak(
                current_max,
                nanos,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(new_max) => current_max = new_max,
            }
        }

        // Record in metrics system
        histogram!("exchange_operation_duration_seconds", "operation" => self.operation.clone())
            .record(duration.as_secs_f64());
    }

    fn get_stats(&self) -> OperationLatencyStats {
        let samples = self.samples.load(Ordering::Relaxed);
        let total = self.total_nanos.load(Ordering::Relaxed);
        let min = self.min_nanos.load(Ordering::Relaxed);
        let max = self.max_nanos.load(Ordering::Relaxed);

        let avg = if samples > 0 { total / samples } else { 0 };

        OperationLatencyStats {
            operation: self.operation.clone(),
            samples,
            avg_nanos: avg,
            min_nanos: if min == u64::MAX { 0 } else { min },
            max_nanos: max,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LatencyStats {
    pub submit: OperationLatencyStats,
    pub cancel: OperationLatencyStats,
    pub expire: OperationLatencyStats,
    pub match_op: OperationLatencyStats,
}

#[derive(Debug, Clone)]
pub struct OperationLatencyStats {
    pub operation: String,
    pub samples: u64,
    pub avg_nanos: u64,
    pub min_nanos: u64,
    pub max_nanos: u64,
}

impl OperationLatencyStats {
    pub fn avg_micros(&self) -> f64 {
        self.avg_nanos as f64 / 1_000.0
    }

    pub fn min_micros(&self) -> f64 {
        self.min_nanos as f64 / 1_000.0
    }

    pub fn max_micros(&self) -> f64 {
        self.max_nanos as f64 / 1_000.0
    }
}

/// Background metrics reporter
pub struct MetricsReporter {
    metrics: Arc<ExchangeMetrics>,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ExchangeMetrics>, interval: Duration) -> Self {
        Self { metrics, interval }
    }

    pub async fn run(&self) {
        let mut interval = interval(self.interval);

        loop {
            interval.tick().await;

            let stats = self.metrics.get_latency_stats();

            info!(
                "Exchange Metrics - Orders: +{} -{} x{} | Trades: {} ({} units) | Latency (μs): submit={:.2} cancel={:.2} expire={:.2} match={:.2}",
                self.metrics.get_orders_submitted(),
                self.metrics.get_orders_cancelled(),
                self.metrics.get_orders_expired(),
                self.metrics.get_trades_executed(),
                self.metrics.get_total_volume(),
                stats.submit.avg_micros(),
                stats.cancel.avg_micros(),
                stats.expire.avg_micros(),
                stats.match_op.avg_micros()
            );
        }
    }
}
