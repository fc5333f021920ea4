//! Services - polling and reconciliation logic
//!
//! This module contains the core business logic services:
//! - `query_builder` - Aggregate and observation queries for an interval
//! - `reconciler` - Builds one complete stat row per tracked key
//! - `poller` - Poller context, single cycle and tick loop

pub mod poller;
pub mod query_builder;
pub mod reconciler;

// Re-export commonly used types
pub use poller::{CycleError, CycleReport, Poller};
pub use query_builder::{QueryBuildError, QueryBuilder};
pub use reconciler::reconcile;
