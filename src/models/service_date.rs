use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};

/// Date of service at whatever granularity the document gave us.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceDate {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
    /// Text that no known format matched, kept verbatim.
    Unparsed(String),
    Unknown,
}

impl ServiceDate {
    pub fn is_known(&self) -> bool {
        matches!(self, ServiceDate::Day(_) | ServiceDate::Month { .. })
    }

    /// `(year, month)` for day- and month-level dates.
    pub fn year_month(&self) -> Option<(i32, u32)> {
        match self {
            ServiceDate::Day(d) => Some((d.year(), d.month())),
            ServiceDate::Month { year, month } => Some((*year, *month)),
            _ => None,
        }
    }

    /// Rank used to pick the most specific date of a group.
    pub fn precision(&self) -> u8 {
        match self {
            ServiceDate::Day(_) => 3,
            ServiceDate::Month { .. } => 2,
            ServiceDate::Unparsed(_) => 1,
            ServiceDate::Unknown => 0,
        }
    }

    /// Whether two dates can describe the same charge.
    ///
    /// A month-level date covers every day of that month. Two day-level dates
    /// match when they are at most `window_days` apart. Unparsed text only
    /// matches identical text, ignoring padding; unknown dates never match.
    pub fn compatible_with(&self, other: &ServiceDate, window_days: u32) -> bool {
        match (self, other) {
            (ServiceDate::Day(a), ServiceDate::Day(b)) => {
                (*a - *b).num_days().unsigned_abs() <= u64::from(window_days)
            }
            (ServiceDate::Day(_), ServiceDate::Month { .. })
            | (ServiceDate::Month { .. }, ServiceDate::Day(_))
            | (ServiceDate::Month { .. }, ServiceDate::Month { .. }) => {
                self.year_month() == other.year_month()
            }
            (ServiceDate::Unparsed(a), ServiceDate::Unparsed(b)) => a.trim() == b.trim(),
            _ => false,
        }
    }
}

impl fmt::Display for ServiceDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceDate::Day(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            ServiceDate::Month { year, month } => write!(f, "{year:04}-{month:02}"),
            ServiceDate::Unparsed(raw) => f.write_str(raw),
            ServiceDate::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for ServiceDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ServiceDate::Unknown => serializer.serialize_none(),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}
