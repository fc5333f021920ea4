//! Domain models - core types of the queue wallboard
//!
//! - `types` - tracked keys, media types, granularity, provider metric values
//! - `interval` - interval clock (current statistics bucket)
//! - `stat_row` - stat column catalogue and the reconciled row
//! - `metric_schema` - metric name to column dispatch tables

pub mod interval;
pub mod metric_schema;
pub mod stat_row;
pub mod types;

// Re-export commonly used types at module level
pub use interval::Interval;
pub use metric_schema::{Feed, MetricRegistry, MetricRule, Schema, SchemaError};
pub use stat_row::{Column, FieldValue, StatRow};
pub use types::{Granularity, MediaType, MetricStats, MetricValue, TrackedKey};
