//! CSV export of usage series.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use csv::Writer;
use thiserror::Error;

use super::{Metric, UsagePoint, UsageResponse, date_sort_key, format::format_gib_csv};

/// Returned in place of a CSV document when there is nothing to export.
pub const NO_DATA: &str = "No data available";

pub const CSV_MIME_TYPE: &str = "text/csv;charset=utf-8;";

#[derive(Debug, Error)]
pub enum CsvExportError {
    #[error("CSV write error: {0}")]
    Write(#[from] csv::Error),

    #[error("CSV flush error: {0}")]
    Flush(String),

    #[error("CSV output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// `<metric>-statistics-<tenant>-<YYYY-MM-DD>.csv`, with `all-tenants` when
/// no single tenant is exported.
pub fn csv_filename(metric: Metric, tenant: Option<&str>, date: NaiveDate) -> String {
    format!(
        "{}-statistics-{}-{}.csv",
        metric.slug(),
        tenant.unwrap_or("all-tenants"),
        date.format("%Y-%m-%d")
    )
}

/// One tenant's series with running totals.
///
/// Columns are `Date`, one column per metric field, then one `Cumulative`
/// column per field. Rows are in chronological order.
pub fn convert_to_csv(metric: Metric, data: Option<&UsageResponse>) -> String {
    let Some(data) = data.filter(|d| !d.values().is_empty()) else {
        return NO_DATA.to_string();
    };
    try_convert_to_csv(metric, data).unwrap_or_else(|e| {
        tracing::error!(metric = metric.slug(), tenant = %data.tenant, error = %e, "CSV export failed");
        NO_DATA.to_string()
    })
}

pub fn try_convert_to_csv(metric: Metric, data: &UsageResponse) -> Result<String, CsvExportError> {
    let fields = metric.fields();
    let mut wtr = Writer::from_writer(vec![]);

    let mut header = vec!["Date".to_string()];
    header.extend(fields.iter().map(|f| f.label.to_string()));
    header.extend(fields.iter().map(|f| format!("Cumulative {}", f.label)));
    wtr.write_record(&header)?;

    let mut cumulative = vec![0.0; fields.len()];
    for point in data.tenant_usage.range.sorted_values() {
        let mut record = vec![point.day_label()];
        for (field, total) in fields.iter().zip(cumulative.iter_mut()) {
            let value = point.value(field.key);
            *total += value;
            record.push(format_value(metric, value));
        }
        record.extend(cumulative.iter().map(|total| format_value(metric, *total)));
        wtr.write_record(&record)?;
    }

    finish(wtr)
}

/// Several tenants side by side, one row per (date, tenant).
///
/// Dates are the union over all tenants with data, in chronological order.
/// A tenant without a value for a date gets 0. Tenants without data are
/// left out.
pub fn convert_multi_tenant_to_csv(
    metric: Metric,
    tenants: &[String],
    data: &HashMap<String, UsageResponse>,
) -> String {
    match try_convert_multi_tenant_to_csv(metric, tenants, data) {
        Ok(Some(csv)) => csv,
        Ok(None) => NO_DATA.to_string(),
        Err(e) => {
            tracing::error!(
                metric = metric.slug(),
                tenants = tenants.len(),
                error = %e,
                "Multi-tenant CSV export failed"
            );
            NO_DATA.to_string()
        }
    }
}

pub fn try_convert_multi_tenant_to_csv(
    metric: Metric,
    tenants: &[String],
    data: &HashMap<String, UsageResponse>,
) -> Result<Option<String>, CsvExportError> {
    let by_tenant: Vec<(&str, HashMap<String, &UsagePoint>)> = tenants
        .iter()
        .filter_map(|tenant| {
            let response = data.get(tenant)?;
            let points = response
                .values()
                .iter()
                .map(|p| (p.day_label(), p))
                .collect();
            Some((tenant.as_str(), points))
        })
        .collect();

    let mut dates: Vec<&String> = by_tenant
        .iter()
        .flat_map(|(_, points)| points.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if dates.is_empty() {
        return Ok(None);
    }
    dates.sort_by_cached_key(|d| date_sort_key(d));

    let fields = metric.fields();
    let mut wtr = Writer::from_writer(vec![]);

    let mut header = vec!["Date".to_string(), "Tenant".to_string()];
    header.extend(fields.iter().map(|f| f.label.to_string()));
    wtr.write_record(&header)?;

    for date in dates {
        for (tenant, points) in &by_tenant {
            let point = points.get(date.as_str());
            let mut record = vec![date.clone(), tenant.to_string()];
            record.extend(fields.iter().map(|field| {
                let value = point.map(|p| p.value(field.key)).unwrap_or(0.0);
                format_value(metric, value)
            }));
            wtr.write_record(&record)?;
        }
    }

    finish(wtr).map(Some)
}

fn format_value(metric: Metric, value: f64) -> String {
    if metric.is_bytes() {
        format_gib_csv(value)
    } else {
        value.to_string()
    }
}

fn finish(wtr: Writer<Vec<u8>>) -> Result<String, CsvExportError> {
    let bytes = wtr
        .into_inner()
        .map_err(|e| CsvExportError::Flush(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}
