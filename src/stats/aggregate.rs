//! "All selected tenants" views.
//!
//! Aggregation only applies when at least two tenants are selected. With zero
//! or one tenant the caller renders the single tenant's own series, so the
//! aggregate is empty.

use std::collections::HashMap;

use super::{
    AGGREGATED_TENANT, Metric, StatisticsSummary, TenantUsage, UsagePoint, UsageRange,
    UsageResponse,
};

/// The combined series and summary of the selected tenants.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggregation {
    /// `None` when fewer than two tenants are selected or none has data.
    pub data: Option<UsageResponse>,
    pub summary: StatisticsSummary,
}

/// Sum `metric` across the selected tenants.
///
/// Summaries are summed field-wise over the tenants that have one. Series
/// values are summed per calendar day ([`UsagePoint::day_label`]), so
/// `2024-03-01` and `2024-03-01T00:00:00.000Z` are the same bucket. Tenants
/// missing a day contribute 0.
/// The output takes its range metadata and date list from the first selected
/// tenant that has data, so dates only other tenants report are not part of
/// the aggregated series. CSV export of the same tenants covers every date.
pub fn aggregate(
    metric: Metric,
    selected_tenants: &[String],
    tenant_data: &HashMap<String, UsageResponse>,
    tenant_summaries: &HashMap<String, StatisticsSummary>,
) -> Aggregation {
    if selected_tenants.len() <= 1 {
        return Aggregation {
            data: None,
            summary: StatisticsSummary::ZERO,
        };
    }

    let summary = selected_tenants
        .iter()
        .filter_map(|tenant| tenant_summaries.get(tenant))
        .fold(StatisticsSummary::ZERO, |acc, s| acc + *s);

    let fields = metric.fields();
    let mut totals: HashMap<String, Vec<f64>> = HashMap::new();
    for response in selected_tenants.iter().filter_map(|t| tenant_data.get(t)) {
        for point in response.values() {
            let sums = totals
                .entry(point.day_label())
                .or_insert_with(|| vec![0.0; fields.len()]);
            for (sum, field) in sums.iter_mut().zip(fields) {
                *sum += point.value(field.key);
            }
        }
    }

    let Some(scaffold) = selected_tenants.iter().find_map(|t| tenant_data.get(t)) else {
        tracing::debug!(
            metric = metric.slug(),
            tenants = selected_tenants.len(),
            "No usage data for any selected tenant"
        );
        return Aggregation {
            data: None,
            summary,
        };
    };

    let values = scaffold
        .values()
        .iter()
        .map(|point| {
            let mut combined = UsagePoint::new(point.date.clone());
            if let Some(sums) = totals.get(&point.day_label()) {
                for (field, sum) in fields.iter().zip(sums) {
                    combined.set(field.key, *sum);
                }
            }
            combined
        })
        .collect();

    let range = &scaffold.tenant_usage.range;
    Aggregation {
        data: Some(UsageResponse {
            tenant: AGGREGATED_TENANT.to_string(),
            tenant_usage: TenantUsage {
                range: UsageRange {
                    period: range.period.clone(),
                    start_time: range.start_time.clone(),
                    end_time: range.end_time.clone(),
                    values,
                },
            },
        }),
        summary,
    }
}

pub fn aggregate_api_calls_data(
    selected_tenants: &[String],
    tenant_data: &HashMap<String, UsageResponse>,
    tenant_summaries: &HashMap<String, StatisticsSummary>,
) -> Aggregation {
    aggregate(Metric::ApiCalls, selected_tenants, tenant_data, tenant_summaries)
}

pub fn aggregate_make_data(
    selected_tenants: &[String],
    tenant_data: &HashMap<String, UsageResponse>,
    tenant_summaries: &HashMap<String, StatisticsSummary>,
) -> Aggregation {
    aggregate(
        Metric::MakeOperations,
        selected_tenants,
        tenant_data,
        tenant_summaries,
    )
}

pub fn aggregate_database_data(
    selected_tenants: &[String],
    tenant_data: &HashMap<String, UsageResponse>,
    tenant_summaries: &HashMap<String, StatisticsSummary>,
) -> Aggregation {
    aggregate(
        Metric::DatabaseStorage,
        selected_tenants,
        tenant_data,
        tenant_summaries,
    )
}

pub fn aggregate_cloudinary_data(
    selected_tenants: &[String],
    tenant_data: &HashMap<String, UsageResponse>,
    tenant_summaries: &HashMap<String, StatisticsSummary>,
) -> Aggregation {
    aggregate(
        Metric::CloudinaryStorage,
        selected_tenants,
        tenant_data,
        tenant_summaries,
    )
}

pub fn aggregate_ai_tokens_data(
    selected_tenants: &[String],
    tenant_data: &HashMap<String, UsageResponse>,
    tenant_summaries: &HashMap<String, StatisticsSummary>,
) -> Aggregation {
    aggregate(Metric::AiTokens, selected_tenants, tenant_data, tenant_summaries)
}

pub fn aggregate_webhooks_data(
    selected_tenants: &[String],
    tenant_data: &HashMap<String, UsageResponse>,
    tenant_summaries: &HashMap<String, StatisticsSummary>,
) -> Aggregation {
    aggregate(Metric::Webhooks, selected_tenants, tenant_data, tenant_summaries)
}
