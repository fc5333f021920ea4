//! PureCloud analytics API client
//!
//! Endpoints used:
//! - `POST https://login.{region}/oauth/token` - client credentials login
//! - `POST /api/v2/analytics/conversations/aggregates/query` - interval aggregates
//! - `POST /api/v2/analytics/queues/observations/query` - point-in-time observations
//! - `GET /api/v2/routing/queues` - queue display names (startup only)
//!
//! The session token is acquired once and never refreshed.

use crate::domain::types::MetricValue;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

const AGGREGATES_PATH: &str = "/api/v2/analytics/conversations/aggregates/query";
const OBSERVATIONS_PATH: &str = "/api/v2/analytics/queues/observations/query";
const QUEUES_PATH: &str = "/api/v2/routing/queues?pageSize=1000&pageNumber=1";

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("login rejected with status {status}: {body}")]
    Auth { status: u16, body: String },
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned status {status}: {body}")]
    Status { endpoint: &'static str, status: u16, body: String },
    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Query wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPredicate {
    pub dimension: String,
    pub value: String,
}

impl QueryPredicate {
    pub fn new(dimension: &str, value: &str) -> Self {
        Self { dimension: dimension.to_string(), value: value.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryClause {
    #[serde(rename = "type")]
    pub clause_type: String,
    pub predicates: Vec<QueryPredicate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    #[serde(rename = "type")]
    pub filter_type: String,
    pub clauses: Vec<QueryClause>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationQuery {
    /// `start/end` in provider timestamp format
    pub interval: String,
    pub granularity: String,
    pub group_by: Vec<String>,
    pub filter: QueryFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationQuery {
    pub filter: QueryFilter,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<String>,
}

// ---------------------------------------------------------------------------
// Response wire types
// ---------------------------------------------------------------------------

/// Group dimensions of a result set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultGroup {
    #[serde(default)]
    pub queue_id: String,
    #[serde(default)]
    pub media_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateBucket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default)]
    pub metrics: Vec<MetricValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateGrouping {
    #[serde(default)]
    pub group: ResultGroup,
    #[serde(default)]
    pub data: Vec<AggregateBucket>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResponse {
    #[serde(default)]
    pub results: Vec<AggregateGrouping>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationGrouping {
    #[serde(default)]
    pub group: ResultGroup,
    #[serde(default)]
    pub data: Vec<MetricValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationResponse {
    #[serde(default)]
    pub results: Vec<ObservationGrouping>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Deserialize)]
struct QueueEntity {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct QueueListing {
    #[serde(default)]
    entities: Vec<QueueEntity>,
}

/// Analytics operations the poller depends on
#[async_trait]
pub trait AnalyticsApi: Send + Sync {
    async fn query_aggregates(&self, query: &AggregationQuery) -> Result<AggregateResponse, AnalyticsError>;

    async fn query_observations(
        &self,
        query: &ObservationQuery,
    ) -> Result<ObservationResponse, AnalyticsError>;

    /// Queue ID to display name, active and inactive queues
    async fn list_queues(&self) -> Result<HashMap<String, String>, AnalyticsError>;
}

/// Access token held for the process lifetime
#[derive(Clone)]
pub struct Session {
    access_token: String,
    token_type: String,
}

impl Session {
    fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("token_type", &self.token_type).finish_non_exhaustive()
    }
}

/// HTTP client bound to one region and one session
pub struct PureCloudClient {
    http: reqwest::Client,
    api_base: String,
    session: Session,
}

impl PureCloudClient {
    /// Log in with client credentials against `login.{region}` and bind to `api.{region}`
    pub async fn login(
        region: &str,
        client_id: &str,
        client_secret: &str,
        timeout: Duration,
    ) -> Result<Self, AnalyticsError> {
        Self::login_at(
            &format!("https://login.{region}"),
            &format!("https://api.{region}"),
            client_id,
            client_secret,
            timeout,
        )
        .await
    }

    /// Log in against explicit base URLs
    pub async fn login_at(
        login_base: &str,
        api_base: &str,
        client_id: &str,
        client_secret: &str,
        timeout: Duration,
    ) -> Result<Self, AnalyticsError> {
        let endpoint = "oauth/token";
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| AnalyticsError::Http { endpoint, source })?;

        let credentials = format!("{}:{}", client_id, client_secret);
        let encoded = STANDARD.encode(credentials.as_bytes());

        let start = Instant::now();
        let response = http
            .post(format!("{}/oauth/token", login_base.trim_end_matches('/')))
            .header("Authorization", format!("Basic {}", encoded))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|source| AnalyticsError::Http { endpoint, source })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| AnalyticsError::Http { endpoint, source })?;
        if !status.is_success() {
            return Err(AnalyticsError::Auth { status: status.as_u16(), body });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|source| AnalyticsError::Decode { endpoint, source })?;

        info!(
            login_base = %login_base,
            latency_ms = %start.elapsed().as_millis(),
            "purecloud_login_succeeded"
        );

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            session: Session { access_token: token.access_token, token_type: token.token_type },
        })
    }

    async fn post_json<Q, R>(&self, endpoint: &'static str, body: &Q) -> Result<R, AnalyticsError>
    where
        Q: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = self.http.post(format!("{}{}", self.api_base, endpoint)).json(body);
        self.send(endpoint, request).await
    }

    async fn send<R: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<R, AnalyticsError> {
        let start = Instant::now();
        let response = request
            .header("Authorization", self.session.authorization())
            .send()
            .await
            .map_err(|source| AnalyticsError::Http { endpoint, source })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| AnalyticsError::Http { endpoint, source })?;

        debug!(
            endpoint = %endpoint,
            status = %status.as_u16(),
            bytes = %body.len(),
            latency_ms = %start.elapsed().as_millis(),
            "purecloud_response"
        );

        if !status.is_success() {
            return Err(AnalyticsError::Status { endpoint, status: status.as_u16(), body });
        }

        serde_json::from_str(&body).map_err(|source| AnalyticsError::Decode { endpoint, source })
    }
}

#[async_trait]
impl AnalyticsApi for PureCloudClient {
    async fn query_aggregates(&self, query: &AggregationQuery) -> Result<AggregateResponse, AnalyticsError> {
        self.post_json(AGGREGATES_PATH, query).await
    }

    async fn query_observations(
        &self,
        query: &ObservationQuery,
    ) -> Result<ObservationResponse, AnalyticsError> {
        self.post_json(OBSERVATIONS_PATH, query).await
    }

    async fn list_queues(&self) -> Result<HashMap<String, String>, AnalyticsError> {
        let request = self.http.get(format!("{}{}", self.api_base, QUEUES_PATH));
        let listing: QueueListing = self.send(QUEUES_PATH, request).await?;

        let queues: HashMap<String, String> =
            listing.entities.into_iter().map(|q| (q.id, q.name)).collect();
        info!(count = %queues.len(), "purecloud_queues_mapped");
        Ok(queues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_response_decodes() {
        let json = r#"{
            "results": [{
                "group": {"queueId": "Q1", "mediaType": "voice"},
                "data": [{
                    "interval": "2016-06-08T00:00:00.000Z/2016-06-08T00:30:00.000Z",
                    "metrics": [
                        {"metric": "tAnswered", "stats": {"max": 120, "min": 3, "count": 5, "sum": 300}},
                        {"metric": "oServiceLevel", "stats": {"ratio": 0.9, "numerator": 9, "denominator": 10, "target": 0.8}}
                    ]
                }]
            }]
        }"#;

        let response: AggregateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.results.len(), 1);
        let grouping = &response.results[0];
        assert_eq!(grouping.group.queue_id, "Q1");
        assert_eq!(grouping.group.media_type, "voice");
        let metrics = &grouping.data[0].metrics;
        assert_eq!(metrics[0].metric, "tAnswered");
        assert_eq!(metrics[0].stats.count, Some(5));
        assert_eq!(metrics[0].stats.sum, Some(300.0));
        assert_eq!(metrics[1].stats.ratio, Some(0.9));
    }

    #[test]
    fn test_empty_responses_decode() {
        let aggregate: AggregateResponse = serde_json::from_str("{}").unwrap();
        assert!(aggregate.results.is_empty());
        let observation: ObservationResponse = serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert!(observation.results.is_empty());
    }

    #[test]
    fn test_observation_response_decodes() {
        let json = r#"{"results": [{
            "group": {"queueId": "Q1", "mediaType": "chat"},
            "data": [{"metric": "oInteracting", "stats": {"count": 2}},
                     {"metric": "oWaiting", "stats": {"count": 7}}]
        }]}"#;
        let response: ObservationResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.results[0].data[1].stats.count, Some(7));
    }

    #[test]
    fn test_aggregation_query_wire_shape() {
        let query = AggregationQuery {
            interval: "a/b".to_string(),
            granularity: "PT30M".to_string(),
            group_by: vec!["queueId".to_string()],
            filter: QueryFilter {
                filter_type: "and".to_string(),
                clauses: vec![QueryClause {
                    clause_type: "or".to_string(),
                    predicates: vec![QueryPredicate::new("mediaType", "voice")],
                }],
            },
        };
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["groupBy"][0], "queueId");
        assert_eq!(value["filter"]["type"], "and");
        assert_eq!(value["filter"]["clauses"][0]["type"], "or");
        assert_eq!(value["filter"]["clauses"][0]["predicates"][0]["dimension"], "mediaType");
    }

    #[test]
    fn test_session_debug_hides_token() {
        let session = Session { access_token: "secret".to_string(), token_type: "bearer".to_string() };
        assert_eq!(session.authorization(), "bearer secret");
        assert!(!format!("{:?}", session).contains("secret"));
    }
}
