//! Cache TTL policy
//!
//! Fixed per-operation TTL classes, plus date-derived selection for report
//! queries: today's data is still accumulating (shortest TTL), yesterday's
//! may still be revised by spam filtering (medium), anything older is
//! settled (longest).
//!
//! Report date bounds accept the relative keywords `today` and `yesterday`
//! alongside literal `YYYY-MM-DD` dates. TTL selection looks at the bound
//! as the caller supplied it: a literal date that happens to fall on
//! yesterday is treated as historical, because by the time the entry is
//! re-read the literal has aged while the keyword has not.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::Error;

/// TTL for reports touching today (data still accumulating)
pub const TODAY: Duration = Duration::from_secs(5 * 60);

/// TTL for reports ending yesterday (subject to ~24h revision)
pub const YESTERDAY: Duration = Duration::from_secs(60 * 60);

/// TTL for reports over settled historical dates
pub const HISTORICAL: Duration = Duration::from_secs(24 * 60 * 60);

/// TTL for the account listing
pub const ACCOUNTS: Duration = Duration::from_secs(24 * 60 * 60);

/// TTL for the site listing
pub const SITES: Duration = Duration::from_secs(60 * 60);

/// TTL for alerts
pub const ALERTS: Duration = Duration::from_secs(15 * 60);

/// TTL for policy issues
pub const POLICY_ISSUES: Duration = Duration::from_secs(30 * 60);

/// TTL for payments
pub const PAYMENTS: Duration = Duration::from_secs(6 * 60 * 60);

/// TTL for ad client, ad unit, and ad code listings
pub const AD_UNITS: Duration = Duration::from_secs(60 * 60);

/// A report date bound as supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReportDate {
    /// The relative keyword `today`
    Today,
    /// The relative keyword `yesterday`
    Yesterday,
    /// A literal calendar date
    Date(NaiveDate),
}

impl ReportDate {
    /// Resolve to a concrete calendar date against the process-local day.
    #[must_use]
    pub fn resolve(self) -> NaiveDate {
        self.resolve_at(Local::now().date_naive())
    }

    /// Resolve against an explicit "today".
    #[must_use]
    pub fn resolve_at(self, today: NaiveDate) -> NaiveDate {
        match self {
            Self::Today => today,
            Self::Yesterday => today - Days::new(1),
            Self::Date(d) => d,
        }
    }
}

impl FromStr for ReportDate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Self::Today),
            "yesterday" => Ok(Self::Yesterday),
            _ => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Self::Date)
                .map_err(|_| {
                    Error::InvalidParams(format!(
                        "Invalid date '{s}' (expected YYYY-MM-DD, 'today', or 'yesterday')"
                    ))
                }),
        }
    }
}

impl TryFrom<String> for ReportDate {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        s.parse()
    }
}

impl From<ReportDate> for String {
    fn from(d: ReportDate) -> Self {
        d.to_string()
    }
}

impl fmt::Display for ReportDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Today => write!(f, "today"),
            Self::Yesterday => write!(f, "yesterday"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// Select the cache TTL for a report covering `[start, end]`.
///
/// Pure in the bounds as given: only the relative keywords influence the
/// class, never the wall clock.
#[must_use]
pub fn select_report_ttl(start: ReportDate, end: ReportDate) -> Duration {
    if start == ReportDate::Today || end == ReportDate::Today {
        TODAY
    } else if end == ReportDate::Yesterday {
        YESTERDAY
    } else {
        HISTORICAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> ReportDate {
        s.parse().unwrap()
    }

    #[test]
    fn today_range_gets_shortest_ttl() {
        assert_eq!(select_report_ttl(ReportDate::Today, ReportDate::Today), TODAY);
    }

    #[test]
    fn either_bound_today_gets_today_ttl() {
        assert_eq!(
            select_report_ttl(ReportDate::Today, ReportDate::Yesterday),
            TODAY
        );
        assert_eq!(
            select_report_ttl(day("2026-08-24"), ReportDate::Today),
            TODAY
        );
    }

    #[test]
    fn range_ending_in_yesterday_keyword_gets_yesterday_ttl() {
        assert_eq!(
            select_report_ttl(day("2026-08-01"), ReportDate::Yesterday),
            YESTERDAY
        );
        assert_eq!(
            select_report_ttl(ReportDate::Yesterday, ReportDate::Yesterday),
            YESTERDAY
        );
    }

    #[test]
    fn literal_date_range_is_historical_even_when_recent() {
        // A literal end date that happens to fall on yesterday still ages
        // out as historical data.
        let today = Local::now().date_naive();
        let yesterday = today - Days::new(1);
        let week_ago = today - Days::new(7);
        assert_eq!(
            select_report_ttl(
                ReportDate::Date(week_ago),
                ReportDate::Date(yesterday)
            ),
            HISTORICAL
        );
        assert_eq!(
            select_report_ttl(day("2025-01-01"), day("2025-12-31")),
            HISTORICAL
        );
    }

    #[test]
    fn keywords_resolve_against_the_given_day() {
        let today = NaiveDate::parse_from_str("2026-08-30", "%Y-%m-%d").unwrap();
        assert_eq!(ReportDate::Today.resolve_at(today), today);
        assert_eq!(
            ReportDate::Yesterday.resolve_at(today),
            NaiveDate::parse_from_str("2026-08-29", "%Y-%m-%d").unwrap()
        );
        assert_eq!(day("2026-01-15").resolve_at(today).to_string(), "2026-01-15");
    }

    #[test]
    fn date_parsing_rejects_garbage() {
        assert!("not-a-date".parse::<ReportDate>().is_err());
        assert!("2026-13-45".parse::<ReportDate>().is_err());
        assert!("2026-08-30".parse::<ReportDate>().is_ok());
    }

    #[test]
    fn report_date_serde_uses_the_given_form() {
        let d: ReportDate = serde_json::from_str("\"yesterday\"").unwrap();
        assert_eq!(d, ReportDate::Yesterday);
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"yesterday\"");

        let d: ReportDate = serde_json::from_str("\"2026-08-30\"").unwrap();
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"2026-08-30\"");
    }
}
