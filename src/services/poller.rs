//! Poller - interval polling and reconciliation loop
//!
//! One cycle: compute the current interval, build both queries, run them
//! concurrently, reconcile the two responses into one row per tracked key,
//! then write the rows one key at a time.
//!
//! Cycles never overlap. The loop awaits each cycle inside the tick branch,
//! and ticks missed while a cycle runs are skipped, not queued.

use crate::domain::interval::Interval;
use crate::domain::metric_schema::{Schema, SchemaError};
use crate::domain::types::{Granularity, MediaType, TrackedKey};
use crate::infra::config::Config;
use crate::infra::metrics::{CycleFailure, Metrics};
use crate::io::analytics::{AnalyticsApi, AnalyticsError};
use crate::io::store::{StatStore, StoreError};
use crate::services::query_builder::{QueryBuildError, QueryBuilder};
use crate::services::reconciler::reconcile;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Errors that end a cycle before anything is written
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("query build failed: {0}")]
    Build(#[from] QueryBuildError),
    #[error("analytics query failed: {0}")]
    Query(#[from] AnalyticsError),
    #[error("schema violation: {0}")]
    Schema(#[from] SchemaError),
}

impl CycleError {
    fn failure(&self) -> CycleFailure {
        match self {
            CycleError::Build(_) => CycleFailure::Build,
            CycleError::Query(_) => CycleFailure::Query,
            CycleError::Schema(_) => CycleFailure::Schema,
        }
    }
}

/// A row write that failed; the rest of the cycle's writes still ran
#[derive(Debug)]
pub struct WriteFailure {
    pub key: TrackedKey,
    pub error: StoreError,
}

/// Outcome of a cycle that reached the write phase
#[derive(Debug)]
pub struct CycleReport {
    pub interval: Interval,
    pub rows_written: usize,
    pub write_failures: Vec<WriteFailure>,
}

impl CycleReport {
    pub fn is_complete(&self) -> bool {
        self.write_failures.is_empty()
    }
}

/// Log cycle failure (cold path)
#[cold]
fn log_cycle_failed(e: &CycleError) {
    match e {
        CycleError::Schema(e) => error!(error = %e, "poll_cycle_schema_violation"),
        _ => error!(error = %e, "poll_cycle_failed"),
    }
}

/// Log row write failure (cold path)
#[cold]
fn log_write_failed(key: &TrackedKey, e: &StoreError) {
    error!(queue_id = %key.queue_id, media_type = %key.media_type, error = %e, "stat_row_write_failed");
}

/// Long-lived poller context, built once at startup
pub struct Poller<A, S> {
    api: A,
    store: S,
    schema: Schema,
    builder: QueryBuilder,
    granularity: Granularity,
    queue_ids: Vec<String>,
    keys: Vec<TrackedKey>,
    period: Duration,
    metrics: Arc<Metrics>,
}

impl<A: AnalyticsApi, S: StatStore> Poller<A, S> {
    /// Build the poller. Fails if the schema tables are inconsistent or the
    /// queue list cannot be expressed in one query.
    pub fn new(config: &Config, api: A, store: S, metrics: Arc<Metrics>) -> Result<Self, CycleError> {
        let schema = Schema::new()?;
        let builder =
            QueryBuilder::new(config.max_queue_predicates(), &schema.observation.owned_metrics());
        builder.check_queue_count(config.queue_ids().len())?;

        let queue_ids = config.queue_ids().to_vec();
        let keys = TrackedKey::cross_product(&queue_ids);
        metrics.set_tracked_keys(keys.len());

        Ok(Self {
            api,
            store,
            schema,
            builder,
            granularity: config.granularity(),
            queue_ids,
            keys,
            period: config.poll_period(),
            metrics,
        })
    }

    pub fn tracked_keys(&self) -> &[TrackedKey] {
        &self.keys
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one poll-reconcile-write cycle for the interval containing `now`
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        self.metrics.record_cycle_started();
        let start = Instant::now();

        let result = self.execute_cycle(now).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        self.metrics.record_cycle_duration(duration_ms);

        match &result {
            Ok(report) => {
                self.metrics.record_cycle_completed(
                    report.rows_written,
                    report.write_failures.len(),
                    now.timestamp().max(0) as u64,
                );
                info!(
                    interval = %report.interval,
                    rows_written = %report.rows_written,
                    write_failures = %report.write_failures.len(),
                    duration_ms = %duration_ms,
                    "poll_cycle_completed"
                );
            }
            Err(e) => {
                self.metrics.record_cycle_failed(e.failure());
                log_cycle_failed(e);
            }
        }

        result
    }

    async fn execute_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let interval = Interval::current(now, self.granularity);
        debug!(interval = %interval, "poll_cycle_started");

        let (aggregate_query, observation_query) =
            self.builder.build(&interval, &self.queue_ids, &MediaType::ALL)?;

        // Independent queries; both must succeed before reconciling
        let (aggregate, observation) = tokio::try_join!(
            self.api.query_aggregates(&aggregate_query),
            self.api.query_observations(&observation_query),
        )?;

        // Rows are complete in memory before any write
        let rows = reconcile(&self.schema, &self.keys, &aggregate, &observation)?;

        let mut rows_written = 0;
        let mut write_failures = Vec::new();
        for row in &rows {
            match self.store.upsert_row(row) {
                Ok(()) => rows_written += 1,
                Err(error) => {
                    log_write_failed(&row.key, &error);
                    write_failures.push(WriteFailure { key: row.key.clone(), error });
                }
            }
        }

        Ok(CycleReport { interval, rows_written, write_failures })
    }

    /// Poll on a fixed period until shutdown is signalled.
    ///
    /// The first cycle runs immediately. An in-flight cycle always runs to
    /// completion before shutdown is observed, and shutdown wins over a
    /// tick that is ready at the same time.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let origin = Instant::now();
        let mut ticker = tokio::time::interval_at(origin, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            period_secs = %self.period.as_secs(),
            granularity = %self.granularity,
            tracked_keys = %self.keys.len(),
            "poller_started"
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let started = Instant::now();
                    // Errors are logged and counted inside; the next tick retries
                    let _ = self.run_cycle(Utc::now()).await;
                    let finished = Instant::now();

                    let skipped = ticks_dropped(
                        started.duration_since(origin),
                        finished.duration_since(origin),
                        self.period,
                    );
                    if skipped > 0 {
                        self.metrics.record_ticks_skipped(skipped);
                        warn!(
                            elapsed_ms = %(finished - started).as_millis(),
                            skipped_ticks = %skipped,
                            "poll_cycle_overran_period"
                        );
                    }
                }
            }
        }

        info!("poller_stopped");
    }
}

/// Ticks that fell due while a cycle ran, minus the one that still fires
/// late once it finishes. Offsets are measured from the ticker's origin.
fn ticks_dropped(started: Duration, finished: Duration, period: Duration) -> u64 {
    if period.is_zero() {
        return 0;
    }
    let due = finished.as_nanos() / period.as_nanos() - started.as_nanos() / period.as_nanos();
    due.saturating_sub(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_dropped() {
        let secs = Duration::from_secs;
        let ms = Duration::from_millis;
        let period = secs(1);
        // Finished before the next tick was due
        assert_eq!(ticks_dropped(secs(0), ms(300), period), 0);
        // One tick fell due and fires late; nothing dropped
        assert_eq!(ticks_dropped(secs(0), ms(1500), period), 0);
        // Ticks at 1, 2, 3: the first fires late, two are dropped
        assert_eq!(ticks_dropped(secs(0), ms(3500), period), 2);
        // Ticks at 4, 5, 6, 7 for a cycle started off-grid
        assert_eq!(ticks_dropped(ms(3500), secs(7), period), 3);
        assert_eq!(ticks_dropped(secs(0), secs(25), Duration::ZERO), 0);
    }

    #[test]
    fn test_cycle_error_classification() {
        let build: CycleError = QueryBuildError::NoQueues.into();
        assert_eq!(build.failure(), CycleFailure::Build);

        let schema: CycleError = SchemaError::UncoveredColumn {
            column: crate::domain::stat_row::Column::NError,
        }
        .into();
        assert_eq!(schema.failure(), CycleFailure::Schema);
        assert!(schema.to_string().starts_with("schema violation"));
    }
}
