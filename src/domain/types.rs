//! Shared types for the queue wallboard

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Media types the wallboard keeps a row for, per tracked queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Voice,
    Chat,
    Email,
}

impl MediaType {
    /// All supported media types, in table order
    pub const ALL: [MediaType; 3] = [MediaType::Voice, MediaType::Chat, MediaType::Email];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Voice => "voice",
            MediaType::Chat => "chat",
            MediaType::Email => "email",
        }
    }

    /// Parse the provider's dimension value. Unknown media types return None.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "voice" => Some(MediaType::Voice),
            "chat" => Some(MediaType::Chat),
            "email" => Some(MediaType::Email),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (queue, media type) pair whose statistics are maintained
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackedKey {
    pub queue_id: String,
    pub media_type: MediaType,
}

impl TrackedKey {
    pub fn new(queue_id: impl Into<String>, media_type: MediaType) -> Self {
        Self { queue_id: queue_id.into(), media_type }
    }

    /// Full cross-product of queue IDs and supported media types.
    ///
    /// Order is queue-major, matching the order rows are seeded in.
    pub fn cross_product(queue_ids: &[String]) -> Vec<TrackedKey> {
        queue_ids
            .iter()
            .flat_map(|q| MediaType::ALL.iter().map(move |m| TrackedKey::new(q.clone(), *m)))
            .collect()
    }

    /// True if a provider group dimension pair refers to this key
    pub fn matches(&self, queue_id: &str, media_type: &str) -> bool {
        self.queue_id == queue_id && self.media_type.as_str() == media_type
    }
}

impl std::fmt::Display for TrackedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.queue_id, self.media_type)
    }
}

/// Statistics bucket width.
///
/// The provider does not return service levels below 30 minutes, so only
/// 30 and 60 minute buckets exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    ThirtyMinutes,
    SixtyMinutes,
}

impl Granularity {
    /// Parse an ISO-8601 duration as accepted in configuration
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PT30M" => Some(Granularity::ThirtyMinutes),
            "PT60M" | "PT1H" => Some(Granularity::SixtyMinutes),
            _ => None,
        }
    }

    /// ISO-8601 duration sent to the provider
    pub fn as_iso(&self) -> &'static str {
        match self {
            Granularity::ThirtyMinutes => "PT30M",
            Granularity::SixtyMinutes => "PT60M",
        }
    }

    pub fn as_secs(&self) -> i64 {
        match self {
            Granularity::ThirtyMinutes => 30 * 60,
            Granularity::SixtyMinutes => 60 * 60,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.as_secs() as u64)
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_iso())
    }
}

/// Statistical fields of one metric observation from the provider.
///
/// Which fields are present depends on the metric kind; absent fields read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numerator: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denominator: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
}

/// A named metric observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub metric: String,
    #[serde(default)]
    pub stats: MetricStats,
}

impl MetricValue {
    pub fn new(metric: impl Into<String>, stats: MetricStats) -> Self {
        Self { metric: metric.into(), stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_parse() {
        assert_eq!(Granularity::parse("PT30M"), Some(Granularity::ThirtyMinutes));
        assert_eq!(Granularity::parse("PT60M"), Some(Granularity::SixtyMinutes));
        assert_eq!(Granularity::parse("PT1H"), Some(Granularity::SixtyMinutes));
        assert_eq!(Granularity::parse("PT15M"), None);
        assert_eq!(Granularity::parse("pt30m"), None);
    }

    #[test]
    fn test_cross_product_is_queue_major() {
        let keys = TrackedKey::cross_product(&["Q1".to_string(), "Q2".to_string()]);
        assert_eq!(keys.len(), 6);
        assert_eq!(keys[0], TrackedKey::new("Q1", MediaType::Voice));
        assert_eq!(keys[2], TrackedKey::new("Q1", MediaType::Email));
        assert_eq!(keys[3], TrackedKey::new("Q2", MediaType::Voice));
    }

    #[test]
    fn test_key_matches_dimensions() {
        let key = TrackedKey::new("Q1", MediaType::Chat);
        assert!(key.matches("Q1", "chat"));
        assert!(!key.matches("Q1", "voice"));
        assert!(!key.matches("Q2", "chat"));
    }

    #[test]
    fn test_media_type_serde_lowercase() {
        let json = serde_json::to_string(&MediaType::Email).unwrap();
        assert_eq!(json, "\"email\"");
        assert_eq!(MediaType::parse("voice"), Some(MediaType::Voice));
        assert_eq!(MediaType::parse("callback"), None);
    }
}
