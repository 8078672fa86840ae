//! Per-tenant usage statistics.
//!
//! The statistics backend serves one time series per (metric, tenant):
//!
//! ```json
//! {
//!   "tenant": "acme",
//!   "tenantUsage": {
//!     "range": {
//!       "period": "day",
//!       "startTime": "2024-03-01T00:00:00.000Z",
//!       "endTime": "2024-03-31T23:59:59.999Z",
//!       "values": [{ "date": "2024-03-01", "requestsCount": 120 }]
//!     }
//!   }
//! }
//! ```
//!
//! and a [`StatisticsSummary`] per (metric, tenant). The submodules combine
//! several tenants into one series ([`aggregate`]), serialize series to CSV
//! ([`csv`]), format values for display ([`format`]) and fetch them
//! ([`client`]).

pub mod aggregate;
pub mod client;
pub mod csv;
pub mod format;

use std::ops::{Add, AddAssign};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub use aggregate::{
    Aggregation, aggregate, aggregate_ai_tokens_data, aggregate_api_calls_data,
    aggregate_cloudinary_data, aggregate_database_data, aggregate_make_data,
    aggregate_webhooks_data,
};
pub use client::{
    StatisticsClient, StatsError, StatsResult, TenantResults, TenantRouting, TimeWindow,
};
pub use self::csv::{
    CSV_MIME_TYPE, CsvExportError, NO_DATA, convert_multi_tenant_to_csv, convert_to_csv,
    csv_filename,
};
pub use format::{
    BYTES_PER_GIB, ChartPoint, ChartSeries, Locale, bytes_to_gib, chart_series, format_gib_csv,
    format_gib_tooltip, format_number, series_label, tooltip_value,
};

/// Tenant tag of an aggregated series.
pub const AGGREGATED_TENANT: &str = "aggregated";

/// Display label of an aggregated series.
pub const AGGREGATED_LABEL: &str = "Total (All Selected Tenants)";

/// Usage metrics tracked per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// API calls
    ApiCalls,
    /// Make (automation) operations
    MakeOperations,
    /// Database storage in bytes
    DatabaseStorage,
    /// Cloudinary media storage in bytes
    CloudinaryStorage,
    /// AI input and output tokens
    AiTokens,
    /// Emitted webhook events
    Webhooks,
}

/// A numeric field of a [`UsagePoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricField {
    /// JSON key in the backend response.
    pub key: &'static str,
    /// Column label used in CSV exports.
    pub label: &'static str,
}

const API_CALLS_FIELDS: &[MetricField] = &[MetricField {
    key: "requestsCount",
    label: "Requests",
}];
const MAKE_FIELDS: &[MetricField] = &[MetricField {
    key: "operations",
    label: "Operations",
}];
const DATABASE_FIELDS: &[MetricField] = &[MetricField {
    key: "totalBytes",
    label: "Storage (GiB)",
}];
const CLOUDINARY_FIELDS: &[MetricField] = &[MetricField {
    key: "storageBytes",
    label: "Storage (GiB)",
}];
const AI_TOKENS_FIELDS: &[MetricField] = &[
    MetricField {
        key: "inputUsage",
        label: "Input Tokens",
    },
    MetricField {
        key: "outputUsage",
        label: "Output Tokens",
    },
];
const WEBHOOKS_FIELDS: &[MetricField] = &[MetricField {
    key: "emittedEvents",
    label: "Emitted Events",
}];

impl Metric {
    /// Path segment of the statistics endpoint.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Metric::ApiCalls => "apicalls",
            Metric::MakeOperations => "make",
            Metric::DatabaseStorage => "mongodbStorage",
            Metric::CloudinaryStorage => "cloudinary",
            Metric::AiTokens => "aiTokens",
            Metric::Webhooks => "webhooks",
        }
    }

    /// Short name used in export filenames.
    pub fn slug(&self) -> &'static str {
        match self {
            Metric::ApiCalls => "api-calls",
            Metric::MakeOperations => "make-operations",
            Metric::DatabaseStorage => "database",
            Metric::CloudinaryStorage => "cloudinary",
            Metric::AiTokens => "ai-tokens",
            Metric::Webhooks => "webhooks",
        }
    }

    /// Numeric fields carried by each point of this metric's series.
    pub fn fields(&self) -> &'static [MetricField] {
        match self {
            Metric::ApiCalls => API_CALLS_FIELDS,
            Metric::MakeOperations => MAKE_FIELDS,
            Metric::DatabaseStorage => DATABASE_FIELDS,
            Metric::CloudinaryStorage => CLOUDINARY_FIELDS,
            Metric::AiTokens => AI_TOKENS_FIELDS,
            Metric::Webhooks => WEBHOOKS_FIELDS,
        }
    }

    /// Whether values are byte counts, displayed in GiB.
    pub fn is_bytes(&self) -> bool {
        matches!(self, Metric::DatabaseStorage | Metric::CloudinaryStorage)
    }
}

/// Bucket size of a usage series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    Day,
    Week,
    Month,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
        }
    }
}

/// Usage totals over fixed periods.
///
/// Missing and `null` values deserialize as 0, negative values are clamped
/// to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSummary {
    #[serde(default, deserialize_with = "non_negative")]
    pub yesterday: f64,
    #[serde(default, deserialize_with = "non_negative")]
    pub this_week: f64,
    #[serde(default, deserialize_with = "non_negative")]
    pub this_month: f64,
    #[serde(default, deserialize_with = "non_negative")]
    pub this_year: f64,
    #[serde(default, deserialize_with = "non_negative")]
    pub agreed_annual: f64,
}

impl StatisticsSummary {
    pub const ZERO: StatisticsSummary = StatisticsSummary {
        yesterday: 0.0,
        this_week: 0.0,
        this_month: 0.0,
        this_year: 0.0,
        agreed_annual: 0.0,
    };
}

impl Add for StatisticsSummary {
    type Output = StatisticsSummary;

    fn add(self, rhs: StatisticsSummary) -> StatisticsSummary {
        StatisticsSummary {
            yesterday: self.yesterday + rhs.yesterday,
            this_week: self.this_week + rhs.this_week,
            this_month: self.this_month + rhs.this_month,
            this_year: self.this_year + rhs.this_year,
            agreed_annual: self.agreed_annual + rhs.agreed_annual,
        }
    }
}

impl AddAssign for StatisticsSummary {
    fn add_assign(&mut self, rhs: StatisticsSummary) {
        *self = *self + rhs;
    }
}

fn non_negative<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.filter(|v| v.is_finite()).unwrap_or(0.0).max(0.0))
}

/// One bucket of a usage series.
///
/// The numeric fields depend on the metric (see [`Metric::fields`]) and are
/// kept as they arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePoint {
    pub date: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl UsagePoint {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            fields: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.set(key, value);
        self
    }

    /// Numeric value of `key`; absent or non-numeric values are 0.
    pub fn value(&self, key: &str) -> f64 {
        self.fields.get(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    pub fn set(&mut self, key: &str, value: f64) {
        let number = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        self.fields.insert(key.to_string(), number);
    }

    /// The bucket's start, if the date is readable.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        parse_point_date(&self.date)
    }

    /// The bucket's calendar day as `YYYY-MM-DD`, or the raw date.
    pub fn day_label(&self) -> String {
        self.timestamp()
            .map(|t| t.date().format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| self.date.clone())
    }
}

/// Chronological ordering key for point dates. Unreadable dates sort last.
pub fn date_sort_key(date: &str) -> (bool, Option<NaiveDateTime>, String) {
    let parsed = parse_point_date(date);
    (parsed.is_none(), parsed, date.to_string())
}

fn parse_point_date(date: &str) -> Option<NaiveDateTime> {
    let date = date.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// The requested range and its buckets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRange {
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub values: Vec<UsagePoint>,
}

impl UsageRange {
    /// Points in chronological order.
    pub fn sorted_values(&self) -> Vec<&UsagePoint> {
        let mut values: Vec<&UsagePoint> = self.values.iter().collect();
        values.sort_by_cached_key(|p| date_sort_key(&p.date));
        values
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TenantUsage {
    #[serde(default)]
    pub range: UsageRange,
}

/// One tenant's usage series for one metric.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    #[serde(default)]
    pub tenant: String,
    #[serde(default)]
    pub tenant_usage: TenantUsage,
}

impl UsageResponse {
    pub fn values(&self) -> &[UsagePoint] {
        &self.tenant_usage.range.values
    }

    pub fn is_aggregated(&self) -> bool {
        self.tenant == AGGREGATED_TENANT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_coerces_missing_and_null() {
        let summary: StatisticsSummary =
            serde_json::from_str(r#"{"yesterday": 5, "thisWeek": null, "thisYear": -2}"#).unwrap();
        assert_eq!(
            summary,
            StatisticsSummary {
                yesterday: 5.0,
                ..StatisticsSummary::ZERO
            }
        );
    }

    #[test]
    fn test_summary_add() {
        let a = StatisticsSummary {
            yesterday: 5.0,
            agreed_annual: 100.0,
            ..Default::default()
        };
        let b = StatisticsSummary {
            yesterday: 7.0,
            this_month: 1.5,
            ..Default::default()
        };
        let mut total = StatisticsSummary::ZERO;
        total += a;
        total += b;
        assert_eq!(total.yesterday, 12.0);
        assert_eq!(total.this_month, 1.5);
        assert_eq!(total.agreed_annual, 100.0);
    }

    #[test]
    fn test_deserialize_usage_response() {
        let json = r#"{
            "tenant": "acme",
            "tenantUsage": {
                "range": {
                    "period": "day",
                    "startTime": "2024-03-01T00:00:00.000Z",
                    "endTime": "2024-03-03T23:59:59.999Z",
                    "values": [
                        {"date": "2024-03-02", "inputUsage": 10, "outputUsage": 4},
                        {"date": "2024-03-01", "inputUsage": 3}
                    ]
                }
            }
        }"#;
        let response: UsageResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.tenant, "acme");
        assert_eq!(response.values().len(), 2);
        assert_eq!(response.values()[1].value("outputUsage"), 0.0);

        let sorted = response.tenant_usage.range.sorted_values();
        assert_eq!(sorted[0].date, "2024-03-01");
        assert_eq!(sorted[1].value("inputUsage"), 10.0);
    }

    #[test]
    fn test_date_sort_key_orders_unreadable_last() {
        let mut dates = vec!["garbage", "2024-03-02T00:00:00Z", "2024-03-01"];
        dates.sort_by_key(|d| date_sort_key(d));
        assert_eq!(dates, vec!["2024-03-01", "2024-03-02T00:00:00Z", "garbage"]);
    }

    #[test]
    fn test_day_label() {
        assert_eq!(UsagePoint::new("2024-03-02T00:00:00.000Z").day_label(), "2024-03-02");
        assert_eq!(UsagePoint::new("week 12").day_label(), "week 12");
    }

    #[test]
    fn test_metric_fields() {
        assert_eq!(Metric::ApiCalls.fields()[0].key, "requestsCount");
        assert_eq!(Metric::AiTokens.fields().len(), 2);
        assert!(Metric::CloudinaryStorage.is_bytes());
        assert!(!Metric::Webhooks.is_bytes());
    }
}
