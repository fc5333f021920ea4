//! Metric schema registry - maps provider metric names to stat columns
//!
//! Each feed (aggregate, observation) has its own lookup table built once at
//! startup. A metric name missing from the table is a schema violation: the
//! provider's contract has moved and the row would be silently wrong.

use crate::domain::stat_row::{Column, StatRow};
use crate::domain::types::MetricValue;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Which analytics feed a metric arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    Aggregate,
    Observation,
}

impl Feed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feed::Aggregate => "aggregate",
            Feed::Observation => "observation",
        }
    }
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unrecognized {feed} metric '{metric}'")]
    UnknownMetric { feed: Feed, metric: String },
    #[error("column {column} is not written by any metric")]
    UncoveredColumn { column: Column },
    #[error("column {column} is written by more than one metric")]
    OverlappingColumn { column: Column },
}

/// How one metric's stats land in a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricRule {
    /// `count` into one column
    Count(Column),
    /// `sum`, `max` and `count` into total, max and count columns
    Duration { total: Column, max: Column, count: Column },
    /// `ratio` into one column
    Ratio(Column),
    /// `current` into one column
    Current(Column),
    /// Recognized, owned by the other feed
    Ignored,
}

impl MetricRule {
    /// Columns this rule writes
    pub fn targets(&self) -> Vec<Column> {
        match *self {
            MetricRule::Count(c) | MetricRule::Ratio(c) | MetricRule::Current(c) => vec![c],
            MetricRule::Duration { total, max, count } => vec![total, max, count],
            MetricRule::Ignored => vec![],
        }
    }

    /// Write `value`'s stats into `row`. Absent stats write zero.
    pub fn apply(&self, row: &mut StatRow, value: &MetricValue) {
        let stats = &value.stats;
        match *self {
            MetricRule::Count(column) => row.set_count(column, stats.count.unwrap_or(0)),
            MetricRule::Duration { total, max, count } => {
                row.set_real(total, stats.sum.unwrap_or(0.0));
                row.set_real(max, stats.max.unwrap_or(0.0));
                row.set_count(count, stats.count.unwrap_or(0));
            }
            MetricRule::Ratio(column) => row.set_real(column, stats.ratio.unwrap_or(0.0)),
            MetricRule::Current(column) => row.set_real(column, stats.current.unwrap_or(0.0)),
            MetricRule::Ignored => {}
        }
    }
}

const fn duration(total: Column, max: Column, count: Column) -> MetricRule {
    MetricRule::Duration { total, max, count }
}

const AGGREGATE_RULES: &[(&str, MetricRule)] = &[
    ("nError", MetricRule::Count(Column::NError)),
    ("nOffered", MetricRule::Count(Column::NOffered)),
    ("nOutboundAbandoned", MetricRule::Count(Column::NOutboundAbandoned)),
    ("nOutboundAttempted", MetricRule::Count(Column::NOutboundAttempted)),
    ("nOutboundConnected", MetricRule::Count(Column::NOutboundConnected)),
    ("nTransferred", MetricRule::Count(Column::NTransferred)),
    ("nOverSla", MetricRule::Count(Column::NOverSla)),
    ("oInteracting", MetricRule::Ignored),
    ("oServiceLevel", MetricRule::Ratio(Column::OServiceLevel)),
    ("oServiceTarget", MetricRule::Current(Column::OServiceTarget)),
    ("oWaiting", MetricRule::Ignored),
    ("tAbandon", duration(Column::TAbandon, Column::MtAbandon, Column::NAbandon)),
    ("tAcd", duration(Column::TAcd, Column::MtAcd, Column::NAcd)),
    ("tAcw", duration(Column::TAcw, Column::MtAcw, Column::NAcw)),
    (
        "tAgentResponseTime",
        duration(Column::TAgentResponseTime, Column::MtAgentResponseTime, Column::NAgentResponseTime),
    ),
    ("tAnswered", duration(Column::TAnswered, Column::MtAnswered, Column::NAnswered)),
    ("tHandle", duration(Column::THandle, Column::MtHandle, Column::NHandle)),
    ("tHeld", duration(Column::THeld, Column::MtHeld, Column::NHeld)),
    ("tHeldComplete", duration(Column::THeldComplete, Column::MtHeldComplete, Column::NHeldComplete)),
    ("tIvr", duration(Column::TIvr, Column::MtIvr, Column::NIvr)),
    ("tTalk", duration(Column::TTalk, Column::MtTalk, Column::NTalk)),
    ("tTalkComplete", duration(Column::TTalkComplete, Column::MtTalkComplete, Column::NTalkComplete)),
    (
        "tUserResponseTime",
        duration(Column::TUserResponseTime, Column::MtUserResponseTime, Column::NUserResponseTime),
    ),
    ("tWait", duration(Column::TWait, Column::MtWait, Column::NWait)),
];

const OBSERVATION_RULES: &[(&str, MetricRule)] = &[
    ("oInteracting", MetricRule::Count(Column::OInteracting)),
    ("oWaiting", MetricRule::Count(Column::OWaiting)),
];

/// Lookup table for one feed
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    feed: Feed,
    rules: FxHashMap<&'static str, MetricRule>,
    /// Names in declaration order, for building queries
    names: Vec<&'static str>,
}

impl MetricRegistry {
    fn from_table(feed: Feed, table: &[(&'static str, MetricRule)]) -> Self {
        let mut rules = FxHashMap::default();
        let mut names = Vec::with_capacity(table.len());
        for &(name, rule) in table {
            rules.insert(name, rule);
            names.push(name);
        }
        Self { feed, rules, names }
    }

    pub fn aggregate() -> Self {
        Self::from_table(Feed::Aggregate, AGGREGATE_RULES)
    }

    pub fn observation() -> Self {
        Self::from_table(Feed::Observation, OBSERVATION_RULES)
    }

    pub fn feed(&self) -> Feed {
        self.feed
    }

    pub fn rule(&self, metric: &str) -> Result<MetricRule, SchemaError> {
        self.rules
            .get(metric)
            .copied()
            .ok_or_else(|| SchemaError::UnknownMetric { feed: self.feed, metric: metric.to_string() })
    }

    /// Check every metric name is known, without touching a row
    pub fn check(&self, metrics: &[MetricValue]) -> Result<(), SchemaError> {
        for value in metrics {
            self.rule(&value.metric)?;
        }
        Ok(())
    }

    /// Dispatch one metric into `row`
    pub fn apply(&self, row: &mut StatRow, value: &MetricValue) -> Result<(), SchemaError> {
        let rule = self.rule(&value.metric)?;
        rule.apply(row, value);
        Ok(())
    }

    /// Metric names this feed owns (ignored metrics excluded)
    pub fn owned_metrics(&self) -> Vec<&'static str> {
        self.names
            .iter()
            .copied()
            .filter(|name| self.rules.get(name).is_some_and(|r| *r != MetricRule::Ignored))
            .collect()
    }

    fn targets(&self) -> impl Iterator<Item = Column> + '_ {
        self.names.iter().filter_map(|n| self.rules.get(n)).flat_map(|r| r.targets())
    }
}

/// Both feed registries, validated together
#[derive(Debug, Clone)]
pub struct Schema {
    pub aggregate: MetricRegistry,
    pub observation: MetricRegistry,
}

impl Schema {
    /// Build both registries and verify each stat column is written by
    /// exactly one metric across the two feeds.
    pub fn new() -> Result<Self, SchemaError> {
        let schema = Self { aggregate: MetricRegistry::aggregate(), observation: MetricRegistry::observation() };
        schema.validate()?;
        Ok(schema)
    }

    pub fn registry(&self, feed: Feed) -> &MetricRegistry {
        match feed {
            Feed::Aggregate => &self.aggregate,
            Feed::Observation => &self.observation,
        }
    }

    fn validate(&self) -> Result<(), SchemaError> {
        let mut writers: FxHashMap<Column, usize> = FxHashMap::default();
        for column in self.aggregate.targets().chain(self.observation.targets()) {
            *writers.entry(column).or_default() += 1;
        }
        for &column in Column::ALL {
            match writers.get(&column).copied().unwrap_or(0) {
                0 => return Err(SchemaError::UncoveredColumn { column }),
                1 => {}
                _ => return Err(SchemaError::OverlappingColumn { column }),
            }
        }
        Ok(())
    }
}
