//! Reporting Period Registry
//!
//! Every aggregate in this crate is scoped to one of six fixed reporting windows.
//! A [`Period`] knows three things about itself:
//!
//! - its wire code (`7d`, `30d`, `1m`, `3m`, `6m`, `1y`), case-sensitive
//! - the spreadsheet tab that holds its export
//! - how far back its window starts relative to "now"
//!
//! Free-form codes only exist at the boundary. [`Period::from_code_or_default`]
//! is the lenient entry point used by the CLI and the orchestrator; anything
//! unrecognized resolves to [`Period::Last30Days`].

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Period {
    #[serde(rename = "7d")]
    Last7Days,
    #[default]
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "1m")]
    LastMonth,
    #[serde(rename = "3m")]
    Last3Months,
    #[serde(rename = "6m")]
    Last6Months,
    #[serde(rename = "1y")]
    LastYear,
}

impl Period {
    pub const ALL: [Period; 6] = [
        Period::Last7Days,
        Period::Last30Days,
        Period::LastMonth,
        Period::Last3Months,
        Period::Last6Months,
        Period::LastYear,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Period::Last7Days => "7d",
            Period::Last30Days => "30d",
            Period::LastMonth => "1m",
            Period::Last3Months => "3m",
            Period::Last6Months => "6m",
            Period::LastYear => "1y",
        }
    }

    /// Tab name of this period's export in the source spreadsheet.
    pub fn sheet_name(self) -> &'static str {
        match self {
            Period::Last7Days => "7d",
            Period::Last30Days => "DASHBOARD",
            Period::LastMonth => "1m",
            Period::Last3Months => "3m",
            Period::Last6Months => "6m",
            Period::LastYear => "1y",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Period::Last7Days => "Last 7 days",
            Period::Last30Days => "Last 30 days",
            Period::LastMonth => "Last month",
            Period::Last3Months => "Last 3 months",
            Period::Last6Months => "Last 6 months",
            Period::LastYear => "Last year",
        }
    }

    /// Start of the reporting window ending at `now`.
    ///
    /// Day-based windows subtract a fixed number of days. Month-based windows
    /// step back whole calendar months, clamping to the last day of a shorter
    /// month (31 March minus one month is 28/29 February).
    pub fn start_date(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let months_back = match self {
            Period::Last7Days => return now - Duration::days(7),
            Period::Last30Days => return now - Duration::days(30),
            Period::LastMonth => 1,
            Period::Last3Months => 3,
            Period::Last6Months => 6,
            Period::LastYear => 12,
        };
        now.checked_sub_months(Months::new(months_back))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Lenient boundary parse: unknown codes fall back to `30d`.
    pub fn from_code_or_default(code: &str) -> Self {
        code.parse().unwrap_or_default()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown period code: {0:?}")]
pub struct UnknownPeriod(pub String);

impl FromStr for Period {
    type Err = UnknownPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|p| p.code() == s)
            .ok_or_else(|| UnknownPeriod(s.to_string()))
    }
}
