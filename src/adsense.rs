//! AdSense API facade
//!
//! Composes the cache, throttle, and retry layers around the upstream
//! client. Every read operation follows the same path: resolve the target
//! account, check the cache, and on a miss run a throttled, retry-wrapped
//! upstream call whose result is written back under the operation's TTL.
//! Cache hits bypass both the throttle and the retry executor.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Datelike, Days, Local, NaiveDate};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::cache::CacheStore;
use crate::failsafe::{RequestThrottle, RetryPolicy, with_retry};
use crate::ttl::{self, ReportDate};
use crate::upstream::{AdSenseApi, ReportParams};
use crate::{Error, Result};

/// The facade over every AdSense read operation.
pub struct AdSense {
    api: Arc<dyn AdSenseApi>,
    cache: Arc<CacheStore>,
    throttle: Arc<RequestThrottle>,
    retry: RetryPolicy,
    default_account: Option<String>,
}

/// Earnings extracted from one report period. Metrics missing from the
/// report default to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodEarnings {
    /// Estimated earnings in the account currency
    pub earnings: f64,
    /// Page views
    pub page_views: f64,
    /// Ad impressions
    pub impressions: f64,
    /// Clicks
    pub clicks: f64,
    /// Click-through rate
    pub ctr: f64,
    /// Revenue per thousand impressions
    pub rpm: f64,
}

/// Earnings across the five standard summary periods.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsSummary {
    /// Today so far
    pub today: PeriodEarnings,
    /// All of yesterday
    pub yesterday: PeriodEarnings,
    /// Trailing seven days including today
    pub last_seven_days: PeriodEarnings,
    /// First of the current month through today
    pub month_to_date: PeriodEarnings,
    /// The prior full calendar month
    pub last_month: PeriodEarnings,
}

const SUMMARY_METRICS: [&str; 6] = [
    "ESTIMATED_EARNINGS",
    "PAGE_VIEWS",
    "IMPRESSIONS",
    "CLICKS",
    "IMPRESSIONS_CTR",
    "IMPRESSIONS_RPM",
];

impl AdSense {
    /// Build the facade from its injected collaborators.
    pub fn new(
        api: Arc<dyn AdSenseApi>,
        cache: Arc<CacheStore>,
        throttle: Arc<RequestThrottle>,
        retry: RetryPolicy,
        default_account: Option<String>,
    ) -> Self {
        Self {
            api,
            cache,
            throttle,
            retry,
            default_account,
        }
    }

    /// Resolve the target account: explicit parameter, then configured
    /// default, then the first account the upstream lists. Identifiers are
    /// normalized to the `accounts/<id>` resource form.
    pub async fn resolve_account(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(account) = explicit {
            return Ok(normalize_account(account));
        }
        if let Some(ref account) = self.default_account {
            return Ok(normalize_account(account));
        }

        let listing = self.list_accounts().await?;
        listing
            .get("accounts")
            .and_then(Value::as_array)
            .and_then(|accounts| accounts.first())
            .and_then(|account| account.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(Error::NoAccounts)
    }

    /// List the accounts available to the configured credentials.
    pub async fn list_accounts(&self) -> Result<Value> {
        let params = json!({});
        self.with_cache("accounts", &params, ttl::ACCOUNTS, "global", || {
            self.upstream("accounts", || self.api.list_accounts())
        })
        .await
    }

    /// List sites under an account.
    pub async fn list_sites(&self, account: Option<&str>) -> Result<Value> {
        let account = self.resolve_account(account).await?;
        let params = json!({ "accountId": account });
        self.with_cache("sites", &params, ttl::SITES, &account, || {
            self.upstream("sites", || self.api.list_sites(&account))
        })
        .await
    }

    /// List alerts for an account.
    pub async fn list_alerts(&self, account: Option<&str>) -> Result<Value> {
        let account = self.resolve_account(account).await?;
        let params = json!({ "accountId": account });
        self.with_cache("alerts", &params, ttl::ALERTS, &account, || {
            self.upstream("alerts", || self.api.list_alerts(&account))
        })
        .await
    }

    /// List policy issues for an account.
    pub async fn list_policy_issues(&self, account: Option<&str>) -> Result<Value> {
        let account = self.resolve_account(account).await?;
        let params = json!({ "accountId": account });
        self.with_cache("policy_issues", &params, ttl::POLICY_ISSUES, &account, || {
            self.upstream("policy_issues", || self.api.list_policy_issues(&account))
        })
        .await
    }

    /// List payments for an account.
    pub async fn list_payments(&self, account: Option<&str>) -> Result<Value> {
        let account = self.resolve_account(account).await?;
        let params = json!({ "accountId": account });
        self.with_cache("payments", &params, ttl::PAYMENTS, &account, || {
            self.upstream("payments", || self.api.list_payments(&account))
        })
        .await
    }

    /// List ad clients under an account.
    pub async fn list_ad_clients(&self, account: Option<&str>) -> Result<Value> {
        let account = self.resolve_account(account).await?;
        let params = json!({ "accountId": account });
        self.with_cache("adclients", &params, ttl::AD_UNITS, &account, || {
            self.upstream("adclients", || self.api.list_ad_clients(&account))
        })
        .await
    }

    /// List every ad unit under an account: fan out over its ad clients
    /// and concatenate their ad units. The ad-client sub-call is not
    /// cached separately; only the combined listing is.
    pub async fn list_ad_units(&self, account: Option<&str>) -> Result<Value> {
        let account = self.resolve_account(account).await?;
        let params = json!({ "accountId": account });
        self.with_cache("adunits", &params, ttl::AD_UNITS, &account, || async {
            let clients = self
                .upstream("adclients", || self.api.list_ad_clients(&account))
                .await?;

            let mut all_units = Vec::new();
            if let Some(clients) = clients.get("adClients").and_then(Value::as_array) {
                for client in clients {
                    let Some(name) = client.get("name").and_then(Value::as_str) else {
                        continue;
                    };
                    let units = self
                        .upstream("adunits", || self.api.list_ad_units(name))
                        .await?;
                    if let Some(units) = units.get("adUnits").and_then(Value::as_array) {
                        all_units.extend(units.iter().cloned());
                    }
                }
            }
            Ok(json!({ "adUnits": all_units }))
        })
        .await
    }

    /// Fetch the ad code snippet for an ad client. A bare client id is
    /// qualified against the resolved account.
    pub async fn get_ad_code(&self, account: Option<&str>, ad_client: &str) -> Result<Value> {
        let account = self.resolve_account(account).await?;
        let ad_client = if ad_client.starts_with("accounts/") {
            ad_client.to_string()
        } else {
            format!("{account}/adclients/{ad_client}")
        };
        let params = json!({ "adClient": ad_client });
        self.with_cache("adcode", &params, ttl::AD_UNITS, &account, || {
            self.upstream("adcode", || self.api.get_ad_code(&ad_client))
        })
        .await
    }

    /// Generate a report; the TTL follows the date range (today /
    /// yesterday / historical).
    pub async fn generate_report(
        &self,
        account: Option<&str>,
        report: ReportParams,
    ) -> Result<Value> {
        let account = self.resolve_account(account).await?;
        self.generate_report_resolved(&account, report).await
    }

    async fn generate_report_resolved(
        &self,
        account: &str,
        report: ReportParams,
    ) -> Result<Value> {
        let params = json!({ "accountId": account, "query": report });
        let ttl = ttl::select_report_ttl(report.start_date, report.end_date);
        self.with_cache("report", &params, ttl, account, || {
            self.upstream("report", || self.api.generate_report(account, &report))
        })
        .await
    }

    /// Generate a CSV report; cached like the structured variant, with the
    /// text payload stored as a JSON string.
    pub async fn generate_csv_report(
        &self,
        account: Option<&str>,
        report: ReportParams,
    ) -> Result<String> {
        let account = self.resolve_account(account).await?;
        let params = json!({ "accountId": account, "query": report });
        let ttl = ttl::select_report_ttl(report.start_date, report.end_date);
        let payload = self
            .with_cache("report_csv", &params, ttl, &account, || async {
                let csv = self
                    .upstream("report_csv", || self.api.generate_csv_report(&account, &report))
                    .await?;
                Ok(Value::String(csv))
            })
            .await?;

        payload
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol("Cached CSV payload is not a string".to_string()))
    }

    /// Earnings across the five standard periods, fetched concurrently.
    /// Each sub-report is independently cached, throttled, and retried.
    pub async fn earnings_summary(&self, account: Option<&str>) -> Result<EarningsSummary> {
        let account = self.resolve_account(account).await?;
        let today = Local::now().date_naive();

        let (today_r, yesterday_r, week_r, mtd_r, last_month_r) = futures::try_join!(
            self.generate_report_resolved(
                &account,
                summary_params(ReportDate::Today, ReportDate::Today)
            ),
            self.generate_report_resolved(
                &account,
                summary_params(ReportDate::Yesterday, ReportDate::Yesterday)
            ),
            self.generate_report_resolved(
                &account,
                summary_params(
                    ReportDate::Date(today - Days::new(6)),
                    ReportDate::Today
                )
            ),
            self.generate_report_resolved(
                &account,
                summary_params(ReportDate::Date(month_start(today)), ReportDate::Today)
            ),
            self.generate_report_resolved(&account, {
                let (start, end) = prior_month(today);
                summary_params(ReportDate::Date(start), ReportDate::Date(end))
            }),
        )?;

        Ok(EarningsSummary {
            today: extract_metrics(&today_r),
            yesterday: extract_metrics(&yesterday_r),
            last_seven_days: extract_metrics(&week_r),
            month_to_date: extract_metrics(&mtd_r),
            last_month: extract_metrics(&last_month_r),
        })
    }

    /// Cache-or-fetch skeleton shared by every operation. On a miss the
    /// fetch result is written through under `ttl` and an analytics row is
    /// appended; failures propagate without caching.
    async fn with_cache<F, Fut>(
        &self,
        operation: &str,
        params: &Value,
        ttl: Duration,
        account: &str,
        fetch: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(hit) = self.cache.get(operation, params)? {
            return Ok(hit);
        }

        let started = Instant::now();
        let result = fetch().await?;
        self.cache
            .record_query(account, operation, params, started.elapsed())?;
        self.cache.set(operation, params, &result, ttl, account)?;
        debug!(operation, account, "stored upstream result");
        Ok(result)
    }

    /// Throttle-then-call under the retry policy. The throttle runs inside
    /// the retried closure so every attempt that reaches the network is
    /// paced against the quota window.
    async fn upstream<F, Fut, T>(&self, name: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let throttle = Arc::clone(&self.throttle);
        with_retry(&self.retry, name, move || {
            throttle_then(Arc::clone(&throttle), call())
        })
        .await
    }
}

async fn throttle_then<T>(
    throttle: Arc<RequestThrottle>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    throttle.throttle().await;
    fut.await
}

fn summary_params(start: ReportDate, end: ReportDate) -> ReportParams {
    ReportParams {
        start_date: start,
        end_date: end,
        metrics: SUMMARY_METRICS.map(String::from).to_vec(),
        dimensions: Vec::new(),
        limit: None,
    }
}

/// Normalize an account identifier to the `accounts/<id>` resource form.
#[must_use]
pub fn normalize_account(account: &str) -> String {
    if account.starts_with("accounts/") {
        account.to_string()
    } else {
        format!("accounts/{account}")
    }
}

fn month_start(today: NaiveDate) -> NaiveDate {
    today.with_day(1).unwrap_or(today)
}

fn prior_month(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let end = month_start(today) - Days::new(1);
    (month_start(end), end)
}

/// Pull the summary metrics out of a report's aggregate totals row,
/// falling back to the first data row, defaulting absent metrics to zero.
fn extract_metrics(report: &Value) -> PeriodEarnings {
    let headers = report.get("headers").and_then(Value::as_array);
    let cells = report
        .pointer("/totals/cells")
        .and_then(Value::as_array)
        .or_else(|| report.pointer("/rows/0/cells").and_then(Value::as_array));

    let metric = |name: &str| -> f64 {
        let (Some(headers), Some(cells)) = (headers, cells) else {
            return 0.0;
        };
        headers
            .iter()
            .position(|h| h.get("name").and_then(Value::as_str) == Some(name))
            .and_then(|idx| cells.get(idx))
            .and_then(|cell| cell.get("value"))
            .and_then(Value::as_str)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0)
    };

    PeriodEarnings {
        earnings: metric("ESTIMATED_EARNINGS"),
        page_views: metric("PAGE_VIEWS"),
        impressions: metric("IMPRESSIONS"),
        clicks: metric("CLICKS"),
        ctr: metric("IMPRESSIONS_CTR"),
        rpm: metric("IMPRESSIONS_RPM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalizes_bare_publisher_ids() {
        assert_eq!(normalize_account("pub-123"), "accounts/pub-123");
        assert_eq!(normalize_account("accounts/pub-123"), "accounts/pub-123");
    }

    #[test]
    fn month_arithmetic() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 30).unwrap();
        assert_eq!(month_start(today), NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
        assert_eq!(
            prior_month(today),
            (
                NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 7, 31).unwrap()
            )
        );

        // Prior month straddling a year boundary
        let january = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert_eq!(
            prior_month(january),
            (
                NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
            )
        );
    }

    #[test]
    fn metrics_extracted_from_totals_row() {
        let report = json!({
            "headers": [
                {"name": "ESTIMATED_EARNINGS"},
                {"name": "CLICKS"},
                {"name": "IMPRESSIONS"}
            ],
            "rows": [{"cells": [{"value": "1.00"}, {"value": "2"}, {"value": "3"}]}],
            "totals": {"cells": [{"value": "12.34"}, {"value": "56"}, {"value": "7890"}]}
        });
        let metrics = extract_metrics(&report);
        assert_eq!(metrics.earnings, 12.34);
        assert_eq!(metrics.clicks, 56.0);
        assert_eq!(metrics.impressions, 7890.0);
    }

    #[test]
    fn metrics_fall_back_to_first_row_without_totals() {
        let report = json!({
            "headers": [{"name": "ESTIMATED_EARNINGS"}],
            "rows": [{"cells": [{"value": "4.20"}]}]
        });
        assert_eq!(extract_metrics(&report).earnings, 4.2);
    }

    #[test]
    fn missing_metrics_default_to_zero() {
        let report = json!({
            "headers": [{"name": "CLICKS"}],
            "totals": {"cells": [{"value": "9"}]}
        });
        let metrics = extract_metrics(&report);
        assert_eq!(metrics.clicks, 9.0);
        assert_eq!(metrics.earnings, 0.0);
        assert_eq!(metrics.page_views, 0.0);
        assert_eq!(metrics.ctr, 0.0);
        assert_eq!(metrics.rpm, 0.0);
    }

    #[test]
    fn empty_report_yields_all_zeroes() {
        let metrics = extract_metrics(&json!({}));
        assert_eq!(
            metrics,
            PeriodEarnings {
                earnings: 0.0,
                page_views: 0.0,
                impressions: 0.0,
                clicks: 0.0,
                ctr: 0.0,
                rpm: 0.0
            }
        );
    }
}
