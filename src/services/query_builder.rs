//! Query builder - aggregate and observation queries for one interval
//!
//! Both queries share one filter:
//! `(mediaType = m1 OR ...) AND (queueId = q1 OR ... OR qN)`, grouped by queue.
//! There is no pagination, so every tracked queue must fit in one clause.

use crate::domain::interval::Interval;
use crate::domain::types::MediaType;
use crate::io::analytics::{AggregationQuery, ObservationQuery, QueryClause, QueryFilter, QueryPredicate};
use thiserror::Error;

/// Provider limit on predicates in one filter clause
pub const DEFAULT_MAX_QUEUE_PREDICATES: usize = 100;

const DIMENSION_MEDIA_TYPE: &str = "mediaType";
const DIMENSION_QUEUE_ID: &str = "queueId";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryBuildError {
    #[error("no queues to query")]
    NoQueues,
    #[error("{count} tracked queues exceed the provider limit of {limit} predicates per clause")]
    TooManyQueues { count: usize, limit: usize },
}

/// Builds the per-cycle query pair
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    max_queue_predicates: usize,
    /// Metrics requested from the observation feed
    observation_metrics: Vec<String>,
}

impl QueryBuilder {
    pub fn new(max_queue_predicates: usize, observation_metrics: &[&str]) -> Self {
        Self {
            max_queue_predicates,
            observation_metrics: observation_metrics.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn max_queue_predicates(&self) -> usize {
        self.max_queue_predicates
    }

    /// Reject queue lists that cannot be expressed in one filter
    pub fn check_queue_count(&self, count: usize) -> Result<(), QueryBuildError> {
        if count == 0 {
            return Err(QueryBuildError::NoQueues);
        }
        if count > self.max_queue_predicates {
            return Err(QueryBuildError::TooManyQueues { count, limit: self.max_queue_predicates });
        }
        Ok(())
    }

    /// Shared filter for both queries
    pub fn filter(&self, queue_ids: &[String], media_types: &[MediaType]) -> Result<QueryFilter, QueryBuildError> {
        self.check_queue_count(queue_ids.len())?;

        let media_clause = QueryClause {
            clause_type: "or".to_string(),
            predicates: media_types
                .iter()
                .map(|m| QueryPredicate::new(DIMENSION_MEDIA_TYPE, m.as_str()))
                .collect(),
        };
        let queue_clause = QueryClause {
            clause_type: "or".to_string(),
            predicates: queue_ids.iter().map(|q| QueryPredicate::new(DIMENSION_QUEUE_ID, q)).collect(),
        };

        Ok(QueryFilter { filter_type: "and".to_string(), clauses: vec![media_clause, queue_clause] })
    }

    /// Aggregate and observation queries for `interval`
    pub fn build(
        &self,
        interval: &Interval,
        queue_ids: &[String],
        media_types: &[MediaType],
    ) -> Result<(AggregationQuery, ObservationQuery), QueryBuildError> {
        let filter = self.filter(queue_ids, media_types)?;

        let aggregate = AggregationQuery {
            interval: interval.to_query_string(),
            granularity: interval.granularity.as_iso().to_string(),
            group_by: vec![DIMENSION_QUEUE_ID.to_string()],
            filter: filter.clone(),
        };
        let observation = ObservationQuery { filter, metrics: self.observation_metrics.clone() };

        Ok((aggregate, observation))
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUEUE_PREDICATES, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Granularity;
    use chrono::{TimeZone, Utc};

    fn interval() -> Interval {
        let now = Utc.with_ymd_and_hms(2016, 6, 8, 9, 45, 0).unwrap();
        Interval::current(now, Granularity::ThirtyMinutes)
    }

    fn queue_ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("queue-{i}")).collect()
    }

    #[test]
    fn test_build_shares_filter() {
        let builder = QueryBuilder::new(10, &["oInteracting", "oWaiting"]);
        let (aggregate, observation) =
            builder.build(&interval(), &queue_ids(2), &MediaType::ALL).unwrap();

        assert_eq!(aggregate.filter, observation.filter);
        assert_eq!(aggregate.interval, "2016-06-08T09:30:00+0000/2016-06-08T10:00:00+0000");
        assert_eq!(aggregate.granularity, "PT30M");
        assert_eq!(aggregate.group_by, vec!["queueId".to_string()]);
        assert_eq!(observation.metrics, vec!["oInteracting".to_string(), "oWaiting".to_string()]);
    }

    #[test]
    fn test_filter_is_and_of_two_ors() {
        let builder = QueryBuilder::default();
        let filter = builder.filter(&queue_ids(3), &MediaType::ALL).unwrap();

        assert_eq!(filter.filter_type, "and");
        assert_eq!(filter.clauses.len(), 2);

        let media = &filter.clauses[0];
        assert_eq!(media.clause_type, "or");
        let values: Vec<&str> = media.predicates.iter().map(|p| p.value.as_str()).collect();
        assert_eq!(values, vec!["voice", "chat", "email"]);
        assert!(media.predicates.iter().all(|p| p.dimension == "mediaType"));

        let queues = &filter.clauses[1];
        assert_eq!(queues.clause_type, "or");
        assert_eq!(queues.predicates.len(), 3);
        assert_eq!(queues.predicates[2], QueryPredicate::new("queueId", "queue-2"));
    }

    #[test]
    fn test_queue_limit_is_inclusive() {
        let builder = QueryBuilder::new(5, &[]);
        assert!(builder.filter(&queue_ids(5), &MediaType::ALL).is_ok());
    }

    #[test]
    fn test_too_many_queues_fails_fast() {
        let builder = QueryBuilder::new(5, &[]);
        let err = builder.build(&interval(), &queue_ids(6), &MediaType::ALL).unwrap_err();
        assert_eq!(err, QueryBuildError::TooManyQueues { count: 6, limit: 5 });
    }

    #[test]
    fn test_empty_queue_list_rejected() {
        let builder = QueryBuilder::default();
        assert_eq!(builder.filter(&[], &MediaType::ALL).unwrap_err(), QueryBuildError::NoQueues);
    }
}
