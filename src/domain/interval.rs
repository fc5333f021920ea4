//! Interval clock - maps a wall-clock instant to its statistics bucket

use crate::domain::types::Granularity;
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Timestamp layout used in provider interval strings
pub const INTERVAL_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Half-open statistics interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity: Granularity,
}

impl Interval {
    /// Interval containing `now`, truncated to a multiple of `granularity`
    /// measured from the Unix epoch. Sub-second precision is discarded.
    pub fn current(now: DateTime<Utc>, granularity: Granularity) -> Self {
        let width = granularity.as_secs();
        let secs = now.timestamp();
        let start_secs = secs - secs.rem_euclid(width);

        // start_secs lies within chrono's range whenever `now` does
        let start = Utc.timestamp_opt(start_secs, 0).single().unwrap_or(now);
        let end = start + Duration::seconds(width);

        Self { start, end, granularity }
    }

    /// `start/end` as sent in analytics queries
    pub fn to_query_string(&self) -> String {
        format!(
            "{}/{}",
            self.start.format(INTERVAL_TIME_FORMAT),
            self.end.format(INTERVAL_TIME_FORMAT)
        )
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_query_string())
    }
}
