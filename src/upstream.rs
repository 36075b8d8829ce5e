//! Upstream AdSense Management API binding
//!
//! [`AdSenseApi`] is the authenticated-call seam the facade depends on:
//! each method invokes one upstream operation and returns its structured
//! result, or an error carrying an HTTP-status-like code and message for
//! retry classification. [`HttpAdSenseApi`] is the reqwest implementation
//! against the v2 REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::ttl::ReportDate;
use crate::{Error, Result};

/// Parameters for a report generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportParams {
    /// Start of the reporting period
    pub start_date: ReportDate,
    /// End of the reporting period
    pub end_date: ReportDate,
    /// Metrics to report on (AdSense metric names)
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,
    /// Dimensions to split by
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Maximum number of report rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

fn default_metrics() -> Vec<String> {
    ["ESTIMATED_EARNINGS", "PAGE_VIEWS", "IMPRESSIONS", "CLICKS"]
        .map(String::from)
        .to_vec()
}

impl ReportParams {
    /// A report over `[start, end]` with the default metric set.
    #[must_use]
    pub fn for_range(start: ReportDate, end: ReportDate) -> Self {
        Self {
            start_date: start,
            end_date: end,
            metrics: default_metrics(),
            dimensions: Vec::new(),
            limit: None,
        }
    }

    /// Flatten into `reports:generate` query parameters.
    #[must_use]
    pub fn to_query(&self) -> Vec<(String, String)> {
        let start = self.start_date.resolve();
        let end = self.end_date.resolve();

        let mut query = vec![
            ("dateRange".to_string(), "CUSTOM".to_string()),
            ("startDate.year".to_string(), start.format("%Y").to_string()),
            ("startDate.month".to_string(), start.format("%-m").to_string()),
            ("startDate.day".to_string(), start.format("%-d").to_string()),
            ("endDate.year".to_string(), end.format("%Y").to_string()),
            ("endDate.month".to_string(), end.format("%-m").to_string()),
            ("endDate.day".to_string(), end.format("%-d").to_string()),
        ];
        for metric in &self.metrics {
            query.push(("metrics".to_string(), metric.clone()));
        }
        for dimension in &self.dimensions {
            query.push(("dimensions".to_string(), dimension.clone()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        query
    }
}

/// The upstream call capability. One method per AdSense operation; all
/// resource arguments are full resource names (`accounts/pub-...`,
/// `accounts/pub-.../adclients/ca-...`).
#[async_trait]
pub trait AdSenseApi: Send + Sync {
    /// List the accounts available to the caller.
    async fn list_accounts(&self) -> Result<Value>;

    /// List sites under an account.
    async fn list_sites(&self, account: &str) -> Result<Value>;

    /// List alerts for an account.
    async fn list_alerts(&self, account: &str) -> Result<Value>;

    /// List policy issues for an account.
    async fn list_policy_issues(&self, account: &str) -> Result<Value>;

    /// List payments for an account.
    async fn list_payments(&self, account: &str) -> Result<Value>;

    /// List ad clients under an account.
    async fn list_ad_clients(&self, account: &str) -> Result<Value>;

    /// List ad units under an ad client.
    async fn list_ad_units(&self, ad_client: &str) -> Result<Value>;

    /// Fetch the ad code snippet for an ad client.
    async fn get_ad_code(&self, ad_client: &str) -> Result<Value>;

    /// Generate a structured report for an account.
    async fn generate_report(&self, account: &str, params: &ReportParams) -> Result<Value>;

    /// Generate a CSV report for an account.
    async fn generate_csv_report(&self, account: &str, params: &ReportParams) -> Result<String>;
}

/// reqwest binding to the AdSense Management API v2.
pub struct HttpAdSenseApi {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpAdSenseApi {
    /// Build a client from upstream configuration.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let token = config.resolve_token()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(Error::from)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<reqwest::Response> {
        let url = format!("{}/{path}", self.base_url);
        debug!(%url, "upstream request");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        Ok(self.get(path, query).await?.json().await?)
    }

    async fn get_text(&self, path: &str, query: &[(String, String)]) -> Result<String> {
        Ok(self.get(path, query).await?.text().await?)
    }

    /// Map non-2xx responses to classifiable upstream errors, preserving
    /// the API's own error message where one is present.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or(body);
        Err(Error::upstream(status.as_u16(), message))
    }
}

#[async_trait]
impl AdSenseApi for HttpAdSenseApi {
    async fn list_accounts(&self) -> Result<Value> {
        self.get_json("accounts", &[]).await
    }

    async fn list_sites(&self, account: &str) -> Result<Value> {
        self.get_json(&format!("{account}/sites"), &[]).await
    }

    async fn list_alerts(&self, account: &str) -> Result<Value> {
        self.get_json(&format!("{account}/alerts"), &[]).await
    }

    async fn list_policy_issues(&self, account: &str) -> Result<Value> {
        self.get_json(&format!("{account}/policyIssues"), &[]).await
    }

    async fn list_payments(&self, account: &str) -> Result<Value> {
        self.get_json(&format!("{account}/payments"), &[]).await
    }

    async fn list_ad_clients(&self, account: &str) -> Result<Value> {
        self.get_json(&format!("{account}/adclients"), &[]).await
    }

    async fn list_ad_units(&self, ad_client: &str) -> Result<Value> {
        self.get_json(&format!("{ad_client}/adunits"), &[]).await
    }

    async fn get_ad_code(&self, ad_client: &str) -> Result<Value> {
        self.get_json(&format!("{ad_client}/adcode"), &[]).await
    }

    async fn generate_report(&self, account: &str, params: &ReportParams) -> Result<Value> {
        self.get_json(&format!("{account}/reports:generate"), &params.to_query())
            .await
    }

    async fn generate_csv_report(&self, account: &str, params: &ReportParams) -> Result<String> {
        self.get_text(&format!("{account}/reports:generateCsv"), &params.to_query())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn report_params_deserialize_with_defaults() {
        let params: ReportParams =
            serde_json::from_value(json!({"startDate": "today", "endDate": "today"})).unwrap();
        assert_eq!(params.start_date, ReportDate::Today);
        assert_eq!(params.metrics, default_metrics());
        assert!(params.dimensions.is_empty());
        assert!(params.limit.is_none());
    }

    #[test]
    fn query_carries_custom_range_and_repeated_metrics() {
        let params = ReportParams {
            start_date: "2026-08-01".parse().unwrap(),
            end_date: "2026-08-28".parse().unwrap(),
            metrics: vec!["CLICKS".to_string(), "IMPRESSIONS".to_string()],
            dimensions: vec!["DATE".to_string()],
            limit: Some(100),
        };
        let query = params.to_query();

        assert!(query.contains(&("dateRange".to_string(), "CUSTOM".to_string())));
        assert!(query.contains(&("startDate.year".to_string(), "2026".to_string())));
        assert!(query.contains(&("startDate.month".to_string(), "8".to_string())));
        assert!(query.contains(&("endDate.day".to_string(), "28".to_string())));
        assert_eq!(
            query.iter().filter(|(k, _)| k == "metrics").count(),
            2
        );
        assert!(query.contains(&("limit".to_string(), "100".to_string())));
    }

    #[test]
    fn params_serialize_camel_case_for_fingerprinting() {
        let params = ReportParams::for_range(ReportDate::Today, ReportDate::Today);
        let v = serde_json::to_value(&params).unwrap();
        assert_eq!(v["startDate"], "today");
        assert_eq!(v["endDate"], "today");
        assert!(v.get("limit").is_none());
    }
}
