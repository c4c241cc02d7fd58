use std::fmt;

use jiff::Timestamp;
use jiff::civil::Date;
use jiff::tz::TimeZone;
use serde::{Deserialize, Serialize};

/// Calendar window a budget is evaluated over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Daily,
    Monthly,
}

impl PeriodKind {
    pub const ALL: [Self; 2] = [Self::Daily, Self::Monthly];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PeriodKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown period kind: {other}")),
        }
    }
}

/// One concrete UTC day or month
///
/// Periods of the same kind order chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub kind: PeriodKind,
    /// First calendar day of the period
    pub start: Date,
}

impl Period {
    /// The period of `kind` that contains `timestamp`
    pub fn containing(kind: PeriodKind, timestamp: Timestamp) -> Self {
        let date = timestamp.to_zoned(TimeZone::UTC).date();
        let start = match kind {
            PeriodKind::Daily => date,
            PeriodKind::Monthly => date.first_of_month(),
        };
        Self { kind, start }
    }

    /// Whether `timestamp` falls inside this period
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        Self::containing(self.kind, timestamp) == *self
    }

    /// Stable key, `YYYY-MM-DD` for days and `YYYY-MM` for months
    pub fn key(&self) -> String {
        match self.kind {
            PeriodKind::Daily => format!("{:04}-{:02}-{:02}", self.start.year(), self.start.month(), self.start.day()),
            PeriodKind::Monthly => format!("{:04}-{:02}", self.start.year(), self.start.month()),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.key())
    }
}

/// Closed time range; both bounds are inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    /// Build a range, rejecting an end before the start
    pub fn new(start: Timestamp, end: Timestamp) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Range covering a single instant
    pub const fn instant(at: Timestamp) -> Self {
        Self { start: at, end: at }
    }

    pub fn contains(&self, timestamp: Timestamp) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}
