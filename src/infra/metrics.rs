//! Lock-free poll metrics and periodic reporting
//!
//! The poller records into atomics; the reporter and the Prometheus endpoint
//! read them. `report()` swaps the since-last-report counters to zero.
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Cycle duration bucket boundaries (milliseconds)
/// Buckets: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, >25600
const BUCKET_BOUNDS: [u64; 10] = [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];
const NUM_BUCKETS: usize = 11;

pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Compute bucket index for a duration using binary search
#[inline]
fn bucket_index(duration_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < duration_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Why a cycle ended without writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleFailure {
    Build,
    Query,
    Schema,
}

/// Lock-free poll metrics collector
pub struct Metrics {
    /// Cycles started (monotonic)
    cycles_total: AtomicU64,
    /// Cycles that reached the write phase (monotonic)
    cycles_completed: AtomicU64,
    /// Cycles abandoned before writing, by cause (monotonic)
    cycles_failed_build: AtomicU64,
    cycles_failed_query: AtomicU64,
    cycles_failed_schema: AtomicU64,
    /// Rows written (monotonic)
    rows_written_total: AtomicU64,
    /// Row writes that failed (monotonic)
    row_write_failures_total: AtomicU64,
    /// Ticks dropped because a cycle overran the poll period (monotonic)
    ticks_skipped_total: AtomicU64,
    /// Cycle duration histogram (cumulative)
    cycle_duration_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of cycle durations in ms (cumulative)
    cycle_duration_sum_ms: AtomicU64,
    /// Last cycle duration
    last_cycle_ms: AtomicU64,
    /// Max cycle duration (reset on report)
    max_cycle_ms: AtomicU64,
    /// Cycles since last report (reset on report)
    cycles_since_report: AtomicU64,
    /// Unix seconds of the last cycle that wrote all rows
    last_success_unix_secs: AtomicU64,
    /// Number of tracked keys (set once)
    tracked_keys: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            cycles_completed: AtomicU64::new(0),
            cycles_failed_build: AtomicU64::new(0),
            cycles_failed_query: AtomicU64::new(0),
            cycles_failed_schema: AtomicU64::new(0),
            rows_written_total: AtomicU64::new(0),
            row_write_failures_total: AtomicU64::new(0),
            ticks_skipped_total: AtomicU64::new(0),
            cycle_duration_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            cycle_duration_sum_ms: AtomicU64::new(0),
            last_cycle_ms: AtomicU64::new(0),
            max_cycle_ms: AtomicU64::new(0),
            cycles_since_report: AtomicU64::new(0),
            last_success_unix_secs: AtomicU64::new(0),
            tracked_keys: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    pub fn set_tracked_keys(&self, count: usize) {
        self.tracked_keys.store(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cycle_started(&self) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.cycles_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cycle_failed(&self, failure: CycleFailure) {
        let counter = match failure {
            CycleFailure::Build => &self.cycles_failed_build,
            CycleFailure::Query => &self.cycles_failed_query,
            CycleFailure::Schema => &self.cycles_failed_schema,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the write phase of a cycle
    #[inline]
    pub fn record_cycle_completed(&self, rows_written: usize, write_failures: usize, unix_secs: u64) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.rows_written_total.fetch_add(rows_written as u64, Ordering::Relaxed);
        self.row_write_failures_total.fetch_add(write_failures as u64, Ordering::Relaxed);
        if write_failures == 0 {
            self.last_success_unix_secs.store(unix_secs, Ordering::Relaxed);
        }
    }

    /// Record wall time of a whole cycle, whatever its outcome
    #[inline]
    pub fn record_cycle_duration(&self, duration_ms: u64) {
        self.cycle_duration_buckets[bucket_index(duration_ms)].fetch_add(1, Ordering::Relaxed);
        self.cycle_duration_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.last_cycle_ms.store(duration_ms, Ordering::Relaxed);
        update_atomic_max(&self.max_cycle_ms, duration_ms);
    }

    #[inline]
    pub fn record_ticks_skipped(&self, count: u64) {
        self.ticks_skipped_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn cycles_total(&self) -> u64 {
        self.cycles_total.load(Ordering::Relaxed)
    }

    pub fn rows_written_total(&self) -> u64 {
        self.rows_written_total.load(Ordering::Relaxed)
    }

    /// Snapshot all counters for the periodic log; resets the since-report values
    pub fn report(&self) -> MetricsSummary {
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed().as_secs_f64();
            *last = Instant::now();
            elapsed
        };

        let cycles_since_report = self.cycles_since_report.swap(0, Ordering::Relaxed);
        let cycles_per_min =
            if elapsed_secs > 0.0 { cycles_since_report as f64 * 60.0 / elapsed_secs } else { 0.0 };

        self.summarize(self.max_cycle_ms.swap(0, Ordering::Relaxed), cycles_per_min)
    }

    /// Read-only view for scrapers; leaves the since-report values untouched
    pub fn snapshot(&self) -> MetricsSummary {
        let elapsed_secs = self.last_report_time.lock().elapsed().as_secs_f64();
        let cycles_since_report = self.cycles_since_report.load(Ordering::Relaxed);
        let cycles_per_min =
            if elapsed_secs > 0.0 { cycles_since_report as f64 * 60.0 / elapsed_secs } else { 0.0 };

        self.summarize(self.max_cycle_ms.load(Ordering::Relaxed), cycles_per_min)
    }

    fn summarize(&self, max_cycle_ms: u64, cycles_per_min: f64) -> MetricsSummary {
        let buckets = load_buckets(&self.cycle_duration_buckets);
        let completed: u64 = buckets.iter().sum();
        let duration_sum = self.cycle_duration_sum_ms.load(Ordering::Relaxed);

        MetricsSummary {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_failed_build: self.cycles_failed_build.load(Ordering::Relaxed),
            cycles_failed_query: self.cycles_failed_query.load(Ordering::Relaxed),
            cycles_failed_schema: self.cycles_failed_schema.load(Ordering::Relaxed),
            rows_written_total: self.rows_written_total.load(Ordering::Relaxed),
            row_write_failures_total: self.row_write_failures_total.load(Ordering::Relaxed),
            ticks_skipped_total: self.ticks_skipped_total.load(Ordering::Relaxed),
            cycles_per_min,
            last_cycle_ms: self.last_cycle_ms.load(Ordering::Relaxed),
            max_cycle_ms,
            avg_cycle_ms: if completed > 0 { duration_sum / completed } else { 0 },
            cycle_p50_ms: percentile_from_buckets(&buckets, 0.50),
            cycle_p99_ms: percentile_from_buckets(&buckets, 0.99),
            cycle_buckets: buckets,
            cycle_duration_sum_ms: duration_sum,
            last_success_unix_secs: self.last_success_unix_secs.load(Ordering::Relaxed),
            tracked_keys: self.tracked_keys.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the poll metrics
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub cycles_total: u64,
    pub cycles_completed: u64,
    pub cycles_failed_build: u64,
    pub cycles_failed_query: u64,
    pub cycles_failed_schema: u64,
    pub rows_written_total: u64,
    pub row_write_failures_total: u64,
    pub ticks_skipped_total: u64,
    pub cycles_per_min: f64,
    pub last_cycle_ms: u64,
    pub max_cycle_ms: u64,
    pub avg_cycle_ms: u64,
    pub cycle_p50_ms: u64,
    pub cycle_p99_ms: u64,
    pub cycle_buckets: [u64; NUM_BUCKETS],
    pub cycle_duration_sum_ms: u64,
    pub last_success_unix_secs: u64,
    pub tracked_keys: u64,
}

impl MetricsSummary {
    pub fn cycles_failed(&self) -> u64 {
        self.cycles_failed_build + self.cycles_failed_query + self.cycles_failed_schema
    }

    pub fn log(&self) {
        info!(
            cycles_total = %self.cycles_total,
            cycles_completed = %self.cycles_completed,
            cycles_failed = %self.cycles_failed(),
            schema_failures = %self.cycles_failed_schema,
            cycles_per_min = format!("{:.1}", self.cycles_per_min),
            rows_written = %self.rows_written_total,
            write_failures = %self.row_write_failures_total,
            ticks_skipped = %self.ticks_skipped_total,
            last_cycle_ms = %self.last_cycle_ms,
            max_cycle_ms = %self.max_cycle_ms,
            p99_ms = %self.cycle_p99_ms,
            tracked_keys = %self.tracked_keys,
            "metrics"
        );
    }
}
