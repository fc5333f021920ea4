//! Result reconciler - builds one complete stat row per tracked key
//!
//! Both responses are schema-checked in full before any row is built, so an
//! unrecognized metric anywhere fails the whole cycle and no row is produced.
//!
//! Tie-break: if a response holds more than one grouping for the same key,
//! the first grouping wins and later ones are ignored (logged at warn).
//! For aggregates only the first data bucket of that grouping is applied;
//! the query interval equals the granularity, so there is normally one.

use crate::domain::metric_schema::{Schema, SchemaError};
use crate::domain::stat_row::{Column, StatRow};
use crate::domain::types::TrackedKey;
use crate::io::analytics::{AggregateGrouping, AggregateResponse, ObservationGrouping, ObservationResponse};
use tracing::{debug, warn};

/// Reconcile both responses against `keys`. Returns rows in `keys` order.
pub fn reconcile(
    schema: &Schema,
    keys: &[TrackedKey],
    aggregate: &AggregateResponse,
    observation: &ObservationResponse,
) -> Result<Vec<StatRow>, SchemaError> {
    check_responses(schema, aggregate, observation)?;

    let mut rows = Vec::with_capacity(keys.len());
    for key in keys {
        let mut row = StatRow::new(key.clone());

        if let Some(grouping) = first_aggregate(key, aggregate) {
            if grouping.data.len() > 1 {
                debug!(key = %key, buckets = %grouping.data.len(), "reconcile_extra_buckets_ignored");
            }
            if let Some(bucket) = grouping.data.first() {
                for value in &bucket.metrics {
                    schema.aggregate.apply(&mut row, value)?;
                }
            }
        }

        if let Some(grouping) = first_observation(key, observation) {
            for value in &grouping.data {
                schema.observation.apply(&mut row, value)?;
            }
        }

        debug!(
            key = %key,
            interacting = %row.int(Column::OInteracting),
            waiting = %row.int(Column::OWaiting),
            offered = %row.int(Column::NOffered),
            answered = %row.int(Column::NAnswered),
            abandoned = %row.int(Column::NAbandon),
            service_level = %format!("{:.2}", row.real(Column::OServiceLevel)),
            "stat_row_reconciled"
        );
        rows.push(row);
    }

    Ok(rows)
}

/// Verify every metric name in both responses is known to its feed
fn check_responses(
    schema: &Schema,
    aggregate: &AggregateResponse,
    observation: &ObservationResponse,
) -> Result<(), SchemaError> {
    for grouping in &aggregate.results {
        for bucket in &grouping.data {
            schema.aggregate.check(&bucket.metrics)?;
        }
    }
    for grouping in &observation.results {
        schema.observation.check(&grouping.data)?;
    }
    Ok(())
}

fn first_aggregate<'a>(key: &TrackedKey, response: &'a AggregateResponse) -> Option<&'a AggregateGrouping> {
    let mut matches =
        response.results.iter().filter(|g| key.matches(&g.group.queue_id, &g.group.media_type));
    let first = matches.next();
    let duplicates = matches.count();
    if duplicates > 0 {
        warn!(key = %key, feed = "aggregate", duplicates = %duplicates, "reconcile_duplicate_groupings_ignored");
    }
    first
}

fn first_observation<'a>(
    key: &TrackedKey,
    response: &'a ObservationResponse,
) -> Option<&'a ObservationGrouping> {
    let mut matches =
        response.results.iter().filter(|g| key.matches(&g.group.queue_id, &g.group.media_type));
    let first = matches.next();
    let duplicates = matches.count();
    if duplicates > 0 {
        warn!(key = %key, feed = "observation", duplicates = %duplicates, "reconcile_duplicate_groupings_ignored");
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric_schema::Feed;
    use crate::domain::types::{MediaType, MetricStats, MetricValue};
    use crate::io::analytics::{AggregateBucket, ResultGroup};

    fn group(queue_id: &str, media_type: &str) -> ResultGroup {
        ResultGroup { queue_id: queue_id.to_string(), media_type: media_type.to_string() }
    }

    fn count(metric: &str, n: i64) -> MetricValue {
        MetricValue::new(metric, MetricStats { count: Some(n), ..Default::default() })
    }

    fn timed(metric: &str, sum: f64, max: f64, n: i64) -> MetricValue {
        MetricValue::new(
            metric,
            MetricStats { sum: Some(sum), max: Some(max), count: Some(n), ..Default::default() },
        )
    }

    fn aggregate(groupings: Vec<(ResultGroup, Vec<MetricValue>)>) -> AggregateResponse {
        AggregateResponse {
            results: groupings
                .into_iter()
                .map(|(group, metrics)| AggregateGrouping {
                    group,
                    data: vec![AggregateBucket { interval: None, metrics }],
                })
                .collect(),
        }
    }

    fn observation(groupings: Vec<(ResultGroup, Vec<MetricValue>)>) -> ObservationResponse {
        ObservationResponse {
            results: groupings.into_iter().map(|(group, data)| ObservationGrouping { group, data }).collect(),
        }
    }

    fn keys() -> Vec<TrackedKey> {
        TrackedKey::cross_product(&["Q1".to_string(), "Q2".to_string()])
    }

    #[test]
    fn test_single_key_end_to_end() {
        let schema = Schema::new().unwrap();
        let keys = vec![TrackedKey::new("Q1", MediaType::Voice)];
        let agg = aggregate(vec![(group("Q1", "voice"), vec![timed("tAnswered", 300.0, 120.0, 5)])]);

        let rows = reconcile(&schema, &keys, &agg, &ObservationResponse::default()).unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.real(Column::TAnswered), 300.0);
        assert_eq!(row.real(Column::MtAnswered), 120.0);
        assert_eq!(row.int(Column::NAnswered), 5);
        assert_eq!(row.populated(), vec![Column::TAnswered, Column::MtAnswered, Column::NAnswered]);
    }

    #[test]
    fn test_one_row_per_key_even_without_data() {
        let schema = Schema::new().unwrap();
        let agg = aggregate(vec![(group("Q2", "chat"), vec![count("nOffered", 4)])]);

        let rows = reconcile(&schema, &keys(), &agg, &ObservationResponse::default()).unwrap();

        assert_eq!(rows.len(), 6);
        for (row, key) in rows.iter().zip(keys()) {
            assert_eq!(row.key, key);
        }
        assert_eq!(rows[4].int(Column::NOffered), 4);
        assert_eq!(rows.iter().filter(|r| !r.populated().is_empty()).count(), 1);
    }

    #[test]
    fn test_both_feeds_merge_into_one_row() {
        let schema = Schema::new().unwrap();
        let agg = aggregate(vec![(
            group("Q1", "voice"),
            vec![
                count("nOffered", 10),
                count("oWaiting", 99),
                MetricValue::new("oServiceLevel", MetricStats { ratio: Some(0.75), ..Default::default() }),
            ],
        )]);
        let obs = observation(vec![(group("Q1", "voice"), vec![count("oInteracting", 2), count("oWaiting", 3)])]);

        let rows = reconcile(&schema, &keys(), &agg, &obs).unwrap();
        let row = &rows[0];
        assert_eq!(row.int(Column::NOffered), 10);
        assert_eq!(row.real(Column::OServiceLevel), 0.75);
        assert_eq!(row.int(Column::OInteracting), 2);
        // Aggregate oWaiting is ignored; observation owns it
        assert_eq!(row.int(Column::OWaiting), 3);
    }

    #[test]
    fn test_observation_only_key() {
        let schema = Schema::new().unwrap();
        let obs = observation(vec![(group("Q2", "email"), vec![count("oWaiting", 1)])]);

        let rows = reconcile(&schema, &keys(), &AggregateResponse::default(), &obs).unwrap();
        assert_eq!(rows[5].populated(), vec![Column::OWaiting]);
    }

    #[test]
    fn test_unknown_metric_fails_whole_cycle() {
        let schema = Schema::new().unwrap();
        // Unknown name sits on a key that is not even tracked
        let agg = aggregate(vec![
            (group("Q1", "voice"), vec![count("nOffered", 1)]),
            (group("Q7", "voice"), vec![count("nBrandNew", 1)]),
        ]);

        let err = reconcile(&schema, &keys(), &agg, &ObservationResponse::default()).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownMetric { feed: Feed::Aggregate, metric: "nBrandNew".to_string() }
        );
    }

    #[test]
    fn test_unknown_observation_metric_fails() {
        let schema = Schema::new().unwrap();
        let obs = observation(vec![(group("Q1", "chat"), vec![count("oAlerting", 1)])]);
        let err = reconcile(&schema, &keys(), &AggregateResponse::default(), &obs).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownMetric { feed: Feed::Observation, .. }));
    }

    #[test]
    fn test_first_duplicate_grouping_wins() {
        let schema = Schema::new().unwrap();
        let agg = aggregate(vec![
            (group("Q1", "voice"), vec![count("nOffered", 1)]),
            (group("Q1", "voice"), vec![count("nOffered", 2), count("nError", 5)]),
        ]);

        let rows = reconcile(&schema, &keys(), &agg, &ObservationResponse::default()).unwrap();
        assert_eq!(rows[0].int(Column::NOffered), 1);
        assert_eq!(rows[0].int(Column::NError), 0);
    }

    #[test]
    fn test_only_first_bucket_applied() {
        let schema = Schema::new().unwrap();
        let agg = AggregateResponse {
            results: vec![AggregateGrouping {
                group: group("Q1", "voice"),
                data: vec![
                    AggregateBucket { interval: None, metrics: vec![count("nOffered", 3)] },
                    AggregateBucket { interval: None, metrics: vec![count("nOffered", 8)] },
                ],
            }],
        };

        let rows = reconcile(&schema, &keys(), &agg, &ObservationResponse::default()).unwrap();
        assert_eq!(rows[0].int(Column::NOffered), 3);
    }

    #[test]
    fn test_reconcile_is_deterministic() {
        let schema = Schema::new().unwrap();
        let agg = aggregate(vec![
            (group("Q1", "chat"), vec![timed("tHandle", 10.25, 7.5, 2), count("nTransferred", 1)]),
            (group("Q2", "voice"), vec![timed("tWait", 1.5, 1.5, 1)]),
        ]);
        let obs = observation(vec![(group("Q2", "voice"), vec![count("oInteracting", 4)])]);

        let first = reconcile(&schema, &keys(), &agg, &obs).unwrap();
        let second = reconcile(&schema, &keys(), &agg, &obs).unwrap();
        assert_eq!(first, second);
    }
}
