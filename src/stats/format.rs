//! Display formatting for usage values.
//!
//! Byte metrics are shown in GiB: 3 decimals in CSV exports, 4 decimals in
//! chart tooltips. Locale is always passed in explicitly.

use serde::{Deserialize, Serialize};

use super::{AGGREGATED_LABEL, AGGREGATED_TENANT, Metric, UsageResponse};

pub const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

const CSV_GIB_DECIMALS: usize = 3;
const TOOLTIP_GIB_DECIMALS: usize = 4;

pub fn bytes_to_gib(bytes: f64) -> f64 {
    bytes / BYTES_PER_GIB
}

/// GiB value as written into CSV exports.
pub fn format_gib_csv(bytes: f64) -> String {
    format!("{:.*}", CSV_GIB_DECIMALS, bytes_to_gib(bytes))
}

/// GiB value as shown in chart tooltips, e.g. `1.5000 GiB`.
pub fn format_gib_tooltip(bytes: f64, locale: Locale) -> String {
    format!(
        "{} GiB",
        format_number(bytes_to_gib(bytes), TOOLTIP_GIB_DECIMALS, locale)
    )
}

/// Number formatting conventions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    De,
    Fr,
}

impl Locale {
    fn group_separator(&self) -> &'static str {
        match self {
            Locale::En => ",",
            Locale::De => ".",
            Locale::Fr => "\u{202f}",
        }
    }

    fn decimal_separator(&self) -> &'static str {
        match self {
            Locale::En => ".",
            Locale::De | Locale::Fr => ",",
        }
    }
}

/// Format `value` with digit grouping and exactly `decimals` fraction digits.
pub fn format_number(value: f64, decimals: usize, locale: Locale) -> String {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (fixed.as_str(), None),
    };

    let mut out = String::with_capacity(fixed.len() + int_part.len() / 3 + 1);
    if value.is_sign_negative() && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        out.push('-');
    }
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push_str(locale.group_separator());
        }
        out.push(digit);
    }
    if let Some(frac_part) = frac_part {
        out.push_str(locale.decimal_separator());
        out.push_str(frac_part);
    }
    out
}

/// Tooltip text for one value of `metric`.
pub fn tooltip_value(metric: Metric, value: f64, locale: Locale) -> String {
    if metric.is_bytes() {
        format_gib_tooltip(value, locale)
    } else {
        format_number(value, 0, locale)
    }
}

/// Legend label of a series, relabelling the aggregated tenant.
pub fn series_label(tenant: &str) -> &str {
    if tenant == AGGREGATED_TENANT {
        AGGREGATED_LABEL
    } else {
        tenant
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: String,
    /// One value per [`Metric::fields`] entry, bytes already in GiB.
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub tenant: String,
    pub label: String,
    pub points: Vec<ChartPoint>,
}

/// Prepare a response for charting: points in date order, labelled.
pub fn chart_series(metric: Metric, response: &UsageResponse) -> ChartSeries {
    let points = response
        .tenant_usage
        .range
        .sorted_values()
        .into_iter()
        .map(|point| ChartPoint {
            date: point.day_label(),
            values: metric
                .fields()
                .iter()
                .map(|field| {
                    let value = point.value(field.key);
                    if metric.is_bytes() {
                        bytes_to_gib(value)
                    } else {
                        value
                    }
                })
                .collect(),
        })
        .collect();

    ChartSeries {
        tenant: response.tenant.clone(),
        label: series_label(&response.tenant).to_string(),
        points,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::stats::{TenantUsage, UsagePoint, UsageRange};

    #[rstest]
    #[case(0.0, "0.000")]
    #[case(BYTES_PER_GIB, "1.000")]
    #[case(1_610_612_736.0, "1.500")]
    #[case(1024.0, "0.000")]
    fn test_format_gib_csv(#[case] bytes: f64, #[case] expected: &str) {
        assert_eq!(format_gib_csv(bytes), expected);
    }

    #[test]
    fn test_gib_csv_is_monotonic_and_non_negative() {
        let mut previous = -1.0;
        let mut bytes = 0.0;
        while bytes < 64.0 * BYTES_PER_GIB {
            let formatted: f64 = format_gib_csv(bytes).parse().unwrap();
            assert!(formatted >= 0.0);
            assert!(formatted >= previous);
            previous = formatted;
            bytes = bytes * 1.7 + 12_345.0;
        }
    }

    #[rstest]
    #[case(Locale::En, "1.5000 GiB")]
    #[case(Locale::De, "1,5000 GiB")]
    fn test_format_gib_tooltip(#[case] locale: Locale, #[case] expected: &str) {
        assert_eq!(format_gib_tooltip(1_610_612_736.0, locale), expected);
    }

    #[rstest]
    #[case(1234567.0, 0, Locale::En, "1,234,567")]
    #[case(1234567.891, 2, Locale::De, "1.234.567,89")]
    #[case(1234.5, 1, Locale::Fr, "1\u{202f}234,5")]
    #[case(-1000.0, 0, Locale::En, "-1,000")]
    #[case(-0.0001, 2, Locale::En, "0.00")]
    #[case(999.0, 0, Locale::En, "999")]
    fn test_format_number(
        #[case] value: f64,
        #[case] decimals: usize,
        #[case] locale: Locale,
        #[case] expected: &str,
    ) {
        assert_eq!(format_number(value, decimals, locale), expected);
    }

    #[test]
    fn test_tooltip_value_by_metric() {
        assert_eq!(tooltip_value(Metric::ApiCalls, 4200.0, Locale::En), "4,200");
        assert_eq!(
            tooltip_value(Metric::DatabaseStorage, BYTES_PER_GIB * 2.0, Locale::En),
            "2.0000 GiB"
        );
    }

    #[test]
    fn test_chart_series_sorts_and_labels() {
        let response = UsageResponse {
            tenant: AGGREGATED_TENANT.to_string(),
            tenant_usage: TenantUsage {
                range: UsageRange {
                    values: vec![
                        UsagePoint::new("2024-03-02").with("storageBytes", BYTES_PER_GIB),
                        UsagePoint::new("2024-03-01").with("storageBytes", 0.0),
                    ],
                    ..Default::default()
                },
            },
        };

        let series = chart_series(Metric::CloudinaryStorage, &response);
        assert_eq!(series.label, AGGREGATED_LABEL);
        assert_eq!(series.points[0].date, "2024-03-01");
        assert_eq!(series.points[1].values, vec![1.0]);
    }

    #[test]
    fn test_series_label_passes_through_tenants() {
        assert_eq!(series_label("acme"), "acme");
    }
}
