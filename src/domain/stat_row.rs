//! Stat row - one reconciled wallboard row per tracked key
//!
//! `Column` is the catalogue of stat columns in the `QueueStats` table.
//! Naming follows the provider's metric convention:
//! - `o*` observation / gauge values
//! - `n*` counts
//! - `t*` total seconds, `mt*` max seconds

use crate::domain::types::TrackedKey;

/// SQL storage class of a stat column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
}

impl ColumnKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
        }
    }
}

macro_rules! stat_columns {
    ($($variant:ident => $name:literal, $kind:ident;)+) => {
        /// Every stat column in table order
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Column {
            $($variant,)+
        }

        impl Column {
            pub const ALL: &'static [Column] = &[$(Column::$variant,)+];

            /// Column name as stored in the table
            pub fn name(&self) -> &'static str {
                match self {
                    $(Column::$variant => $name,)+
                }
            }

            pub fn kind(&self) -> ColumnKind {
                match self {
                    $(Column::$variant => ColumnKind::$kind,)+
                }
            }
        }
    };
}

stat_columns! {
    OServiceTarget => "oServiceTarget", Real;
    OServiceLevel => "oServiceLevel", Real;
    OInteracting => "oInteracting", Integer;
    OWaiting => "oWaiting", Integer;
    NError => "nError", Integer;
    NOffered => "nOffered", Integer;
    NOutboundAbandoned => "nOutboundAbandoned", Integer;
    NOutboundAttempted => "nOutboundAttempted", Integer;
    NOutboundConnected => "nOutboundConnected", Integer;
    NTransferred => "nTransferred", Integer;
    NOverSla => "nOverSla", Integer;
    TAbandon => "tAbandon", Real;
    MtAbandon => "mtAbandon", Real;
    NAbandon => "nAbandon", Integer;
    TAcd => "tAcd", Real;
    MtAcd => "mtAcd", Real;
    NAcd => "nAcd", Integer;
    TAcw => "tAcw", Real;
    MtAcw => "mtAcw", Real;
    NAcw => "nAcw", Integer;
    TAgentResponseTime => "tAgentResponseTime", Real;
    MtAgentResponseTime => "mtAgentResponseTime", Real;
    NAgentResponseTime => "nAgentResponseTime", Integer;
    TAnswered => "tAnswered", Real;
    MtAnswered => "mtAnswered", Real;
    NAnswered => "nAnswered", Integer;
    THandle => "tHandle", Real;
    MtHandle => "mtHandle", Real;
    NHandle => "nHandle", Integer;
    THeld => "tHeld", Real;
    MtHeld => "mtHeld", Real;
    NHeld => "nHeld", Integer;
    THeldComplete => "tHeldComplete", Real;
    MtHeldComplete => "mtHeldComplete", Real;
    NHeldComplete => "nHeldComplete", Integer;
    TIvr => "tIvr", Real;
    MtIvr => "mtIvr", Real;
    NIvr => "nIvr", Integer;
    TTalk => "tTalk", Real;
    MtTalk => "mtTalk", Real;
    NTalk => "nTalk", Integer;
    TTalkComplete => "tTalkComplete", Real;
    MtTalkComplete => "mtTalkComplete", Real;
    NTalkComplete => "nTalkComplete", Integer;
    TWait => "tWait", Real;
    MtWait => "mtWait", Real;
    NWait => "nWait", Integer;
    TUserResponseTime => "tUserResponseTime", Real;
    MtUserResponseTime => "mtUserResponseTime", Real;
    NUserResponseTime => "nUserResponseTime", Integer;
}

pub const COLUMN_COUNT: usize = Column::ALL.len();

impl Column {
    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single stat value, typed by its column
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Real(f64),
}

impl FieldValue {
    pub fn zero(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Integer => FieldValue::Int(0),
            ColumnKind::Real => FieldValue::Real(0.0),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            FieldValue::Int(v) => *v == 0,
            FieldValue::Real(v) => *v == 0.0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            FieldValue::Int(v) => *v as f64,
            FieldValue::Real(v) => *v,
        }
    }
}

/// Reconciled statistics for one tracked key.
///
/// Always complete: every column holds a value, zero unless a metric set it.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRow {
    pub key: TrackedKey,
    values: [FieldValue; COLUMN_COUNT],
}

impl StatRow {
    /// All-zero row for `key`
    pub fn new(key: TrackedKey) -> Self {
        let mut values = [FieldValue::Int(0); COLUMN_COUNT];
        for column in Column::ALL {
            values[column.index()] = FieldValue::zero(column.kind());
        }
        Self { key, values }
    }

    pub fn get(&self, column: Column) -> FieldValue {
        self.values[column.index()]
    }

    /// Integer view of a column (real columns are truncated)
    pub fn int(&self, column: Column) -> i64 {
        match self.get(column) {
            FieldValue::Int(v) => v,
            FieldValue::Real(v) => v as i64,
        }
    }

    pub fn real(&self, column: Column) -> f64 {
        self.get(column).as_f64()
    }

    /// Store a count, coerced to the column's kind
    pub fn set_count(&mut self, column: Column, count: i64) {
        self.values[column.index()] = match column.kind() {
            ColumnKind::Integer => FieldValue::Int(count),
            ColumnKind::Real => FieldValue::Real(count as f64),
        };
    }

    /// Store a seconds/ratio/gauge value, coerced to the column's kind
    pub fn set_real(&mut self, column: Column, value: f64) {
        self.values[column.index()] = match column.kind() {
            ColumnKind::Integer => FieldValue::Int(value as i64),
            ColumnKind::Real => FieldValue::Real(value),
        };
    }

    /// Columns with their values, in table order
    pub fn iter(&self) -> impl Iterator<Item = (Column, FieldValue)> + '_ {
        Column::ALL.iter().map(move |c| (*c, self.values[c.index()]))
    }

    /// Columns holding a non-zero value
    pub fn populated(&self) -> Vec<Column> {
        self.iter().filter(|(_, v)| !v.is_zero()).map(|(c, _)| c).collect()
    }
}
