//! Statistics HTTP API client.
//!
//! Usage series live at `{statistics_path}/{metric}/{tenant}` and summaries at
//! `{statistics_path}/{metric}/{tenant}/summary`. Multi-tenant views fetch
//! every tenant concurrently; one tenant failing never affects the others.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeDelta, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use super::{Metric, StatisticsSummary, TimeUnit, UsageResponse};
use crate::config::BackendConfig;

/// Error type for statistics client operations.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Statistics API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid statistics URL: {0}")]
    InvalidUrl(String),
}

/// Result type for statistics client operations.
pub type StatsResult<T> = Result<T, StatsError>;

/// Time range and bucket size of a usage series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub unit: TimeUnit,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(unit: TimeUnit, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { unit, start, end }
    }

    /// Whole days from `from` through `to`, both inclusive.
    pub fn days(unit: TimeUnit, from: NaiveDate, to: NaiveDate) -> Self {
        let start = from.and_time(NaiveTime::MIN).and_utc();
        let end = to.and_time(NaiveTime::MIN).and_utc() + TimeDelta::days(1)
            - TimeDelta::milliseconds(1);
        Self { unit, start, end }
    }

    /// The `days` days ending with `today`.
    pub fn trailing_days(unit: TimeUnit, today: NaiveDate, days: u32) -> Self {
        let from = today - TimeDelta::days(i64::from(days.saturating_sub(1)));
        Self::days(unit, from, today)
    }

    fn query(&self) -> [(&'static str, String); 3] {
        [
            ("timeunit", self.unit.as_str().to_string()),
            (
                "startTime",
                self.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            ("endTime", self.end.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ]
    }
}

/// Which tenant a request is sent on behalf of.
///
/// Platform tenants cannot be addressed directly: requests for them carry the
/// operator's own tenant in the header and the target in the path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantRouting {
    pub header_name: String,
    pub session_tenant: Option<String>,
    pub platform_tenants: Vec<String>,
}

impl TenantRouting {
    pub fn from_config(backend: &BackendConfig) -> Self {
        Self {
            header_name: backend.tenant_header.clone(),
            session_tenant: backend.session_tenant.clone(),
            platform_tenants: backend.platform_tenants.clone(),
        }
    }

    /// Tenant header value for a request targeting `target`.
    pub fn header_tenant<'a>(&'a self, target: &'a str) -> &'a str {
        match &self.session_tenant {
            Some(session) if self.platform_tenants.iter().any(|t| t == target) => session.as_str(),
            _ => target,
        }
    }
}

/// Per-tenant outcomes of a fan-out fetch, in the order requested.
#[derive(Debug, Default)]
pub struct TenantResults {
    pub usage: Vec<(String, StatsResult<UsageResponse>)>,
    pub summaries: Vec<(String, StatsResult<StatisticsSummary>)>,
}

impl TenantResults {
    /// Successful results keyed by tenant. Failed tenants are absent.
    pub fn into_maps(
        self,
    ) -> (
        HashMap<String, UsageResponse>,
        HashMap<String, StatisticsSummary>,
    ) {
        (successes(self.usage), successes(self.summaries))
    }

    pub fn failed_tenants(&self) -> Vec<&str> {
        let mut failed: Vec<&str> = self
            .usage
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(t, _)| t.as_str())
            .chain(
                self.summaries
                    .iter()
                    .filter(|(_, r)| r.is_err())
                    .map(|(t, _)| t.as_str()),
            )
            .collect();
        failed.sort_unstable();
        failed.dedup();
        failed
    }
}

fn successes<T>(results: Vec<(String, StatsResult<T>)>) -> HashMap<String, T> {
    results
        .into_iter()
        .filter_map(|(tenant, result)| result.ok().map(|value| (tenant, value)))
        .collect()
}

/// Client for the statistics API.
///
/// No retries: a failed request surfaces as an error for that tenant.
#[derive(Clone)]
pub struct StatisticsClient {
    http_client: Client,
    base_url: Url,
    bearer_token: Option<String>,
    routing: TenantRouting,
}

impl StatisticsClient {
    pub fn from_config(backend: &BackendConfig) -> StatsResult<Self> {
        let http_client = Client::builder().timeout(backend.timeout()).build()?;
        let raw = format!(
            "{}{}",
            backend.base_url_trimmed(),
            backend.statistics_path.trim_end_matches('/')
        );
        let base_url =
            Url::parse(&raw).map_err(|e| StatsError::InvalidUrl(format!("{raw}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StatsError::InvalidUrl(raw));
        }

        Ok(Self {
            http_client,
            base_url,
            bearer_token: backend.bearer_token.clone(),
            routing: TenantRouting::from_config(backend),
        })
    }

    pub fn routing(&self) -> &TenantRouting {
        &self.routing
    }

    /// Fetch one tenant's usage series for `metric` over `window`.
    pub async fn fetch_usage(
        &self,
        metric: Metric,
        tenant: &str,
        window: &TimeWindow,
    ) -> StatsResult<UsageResponse> {
        let url = self.endpoint(&[metric.path_segment(), tenant]);
        let mut response: UsageResponse = self.get(url, tenant, &window.query()).await?;
        if response.tenant.is_empty() {
            response.tenant = tenant.to_string();
        }
        Ok(response)
    }

    /// Fetch one tenant's usage summary for `metric`.
    pub async fn fetch_summary(
        &self,
        metric: Metric,
        tenant: &str,
    ) -> StatsResult<StatisticsSummary> {
        let url = self.endpoint(&[metric.path_segment(), tenant, "summary"]);
        self.get(url, tenant, &[]).await
    }

    /// Fetch series and summaries of every tenant concurrently.
    ///
    /// Failures are logged and kept per tenant.
    pub async fn fetch_all_tenants(
        &self,
        metric: Metric,
        tenants: &[String],
        window: &TimeWindow,
    ) -> TenantResults {
        let usage = tenants.iter().map(|tenant| async move {
            let result = self.fetch_usage(metric, tenant, window).await;
            (tenant.clone(), result)
        });
        let summaries = tenants.iter().map(|tenant| async move {
            let result = self.fetch_summary(metric, tenant).await;
            (tenant.clone(), result)
        });

        let (usage, summaries) = futures::future::join(
            futures::future::join_all(usage),
            futures::future::join_all(summaries),
        )
        .await;

        for (tenant, error) in usage
            .iter()
            .filter_map(|(t, r)| r.as_ref().err().map(|e| (t, e)))
        {
            tracing::warn!(metric = metric.slug(), tenant = %tenant, error = %error, "Failed to fetch tenant usage");
        }
        for (tenant, error) in summaries
            .iter()
            .filter_map(|(t, r)| r.as_ref().err().map(|e| (t, e)))
        {
            tracing::warn!(metric = metric.slug(), tenant = %tenant, error = %error, "Failed to fetch tenant summary");
        }

        TenantResults { usage, summaries }
    }

    /// Append percent-encoded path segments to the statistics base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        tenant: &str,
        query: &[(&str, String)],
    ) -> StatsResult<T> {
        let mut request = self
            .http_client
            .get(url)
            .query(query)
            .header(self.routing.header_name.as_str(), self.routing.header_tenant(tenant));
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StatsError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    use super::*;

    fn backend(server: &MockServer) -> BackendConfig {
        BackendConfig {
            base_url: server.uri(),
            session_tenant: Some("ops".to_string()),
            platform_tenants: vec!["platform".to_string()],
            ..Default::default()
        }
    }

    fn march() -> TimeWindow {
        TimeWindow::days(
            TimeUnit::Day,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
    }

    fn usage_body(tenant: &str, requests: u64) -> serde_json::Value {
        json!({
            "tenant": tenant,
            "tenantUsage": {
                "range": {
                    "period": "day",
                    "startTime": "2024-03-01T00:00:00.000Z",
                    "endTime": "2024-03-31T23:59:59.999Z",
                    "values": [{"date": "2024-03-01", "requestsCount": requests}]
                }
            }
        })
    }

    #[test]
    fn test_window_bounds() {
        let window = march();
        let query = window.query();
        assert_eq!(query[0].1, "day");
        assert_eq!(query[1].1, "2024-03-01T00:00:00.000Z");
        assert_eq!(query[2].1, "2024-03-31T23:59:59.999Z");

        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(TimeWindow::trailing_days(TimeUnit::Day, today, 31), window);
    }

    #[test]
    fn test_header_routing() {
        let routing = TenantRouting {
            header_name: "x-tenant-id".to_string(),
            session_tenant: Some("ops".to_string()),
            platform_tenants: vec!["platform".to_string()],
        };
        assert_eq!(routing.header_tenant("platform"), "ops");
        assert_eq!(routing.header_tenant("acme"), "acme");

        let no_session = TenantRouting {
            session_tenant: None,
            ..routing
        };
        assert_eq!(no_session.header_tenant("platform"), "platform");
    }

    #[tokio::test]
    async fn test_fetch_usage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/statistics/apicalls/acme"))
            .and(query_param("timeunit", "day"))
            .and(query_param("startTime", "2024-03-01T00:00:00.000Z"))
            .and(query_param("endTime", "2024-03-31T23:59:59.999Z"))
            .and(header("x-tenant-id", "acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(usage_body("acme", 12)))
            .expect(1)
            .mount(&server)
            .await;

        let client = StatisticsClient::from_config(&backend(&server)).unwrap();
        let usage = client
            .fetch_usage(Metric::ApiCalls, "acme", &march())
            .await
            .unwrap();
        assert_eq!(usage.values()[0].value("requestsCount"), 12.0);
    }

    #[tokio::test]
    async fn test_tenant_is_a_single_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/statistics/webhooks/acme%2Feu%3Fx%23y/summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"yesterday": 4})))
            .expect(1)
            .mount(&server)
            .await;

        let client = StatisticsClient::from_config(&backend(&server)).unwrap();
        let summary = client
            .fetch_summary(Metric::Webhooks, "acme/eu?x#y")
            .await
            .unwrap();
        assert_eq!(summary.yesterday, 4.0);
    }

    #[test]
    fn test_endpoint_with_trailing_slashes() {
        let backend = BackendConfig {
            base_url: "http://stats.internal:9000/api/".to_string(),
            statistics_path: "/statistics/".to_string(),
            ..Default::default()
        };
        let client = StatisticsClient::from_config(&backend).unwrap();
        assert_eq!(
            client.endpoint(&["make", "acme"]).as_str(),
            "http://stats.internal:9000/api/statistics/make/acme"
        );
    }

    #[tokio::test]
    async fn test_platform_tenant_uses_session_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/statistics/aiTokens/platform/summary"))
            .and(header("x-tenant-id", "ops"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"yesterday": 3, "thisWeek": null})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = StatisticsClient::from_config(&backend(&server)).unwrap();
        let summary = client
            .fetch_summary(Metric::AiTokens, "platform")
            .await
            .unwrap();
        assert_eq!(summary.yesterday, 3.0);
        assert_eq!(summary.this_week, 0.0);
    }

    #[tokio::test]
    async fn test_fetch_all_tenants_isolates_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/statistics/apicalls/a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(usage_body("a", 1)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/statistics/apicalls/b"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/statistics/apicalls/c"))
            .respond_with(ResponseTemplate::new(200).set_body_json(usage_body("c", 5)))
            .mount(&server)
            .await;
        for tenant in ["a", "b", "c"] {
            Mock::given(method("GET"))
                .and(path(format!("/statistics/apicalls/{tenant}/summary")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"thisMonth": 10})))
                .mount(&server)
                .await;
        }

        let client = StatisticsClient::from_config(&backend(&server)).unwrap();
        let tenants: Vec<String> = ["a", "b", "c"].iter().map(|t| t.to_string()).collect();
        let results = client
            .fetch_all_tenants(Metric::ApiCalls, &tenants, &march())
            .await;

        assert_eq!(results.failed_tenants(), vec!["b"]);
        assert!(matches!(
            results.usage[1].1,
            Err(StatsError::Api { status: 500, .. })
        ));

        let (usage, summaries) = results.into_maps();
        assert_eq!(usage.len(), 2);
        assert!(!usage.contains_key("b"));
        assert_eq!(summaries.len(), 3);

        let aggregation =
            crate::stats::aggregate_api_calls_data(&tenants, &usage, &summaries);
        assert_eq!(aggregation.summary.this_month, 30.0);
        assert_eq!(
            aggregation.data.unwrap().values()[0].value("requestsCount"),
            6.0
        );
    }
}
