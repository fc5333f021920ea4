//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `analytics` - PureCloud login, analytics queries and queue listing
//! - `store` - SQLite stat table (prepare, seed, per-key update)
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod analytics;
pub mod prometheus;
pub mod store;

// Re-export commonly used types
pub use analytics::{AnalyticsApi, AnalyticsError, PureCloudClient};
pub use store::{SqliteStore, StatStore, StoreError};
