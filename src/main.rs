use std::path::PathBuf;

use admin_console::{
    catalog::{self, ExportError},
    config::{ConfigError, ConsoleConfig},
    listing::{ListError, ListingClient, Page, Resource},
    observability,
    query::{QueryConfig, QueryParams, SortOrder, build_query_params},
    stats::{
        self, CSV_MIME_TYPE, Locale, Metric, StatisticsClient, StatsError, TimeUnit, TimeWindow,
    },
};
use chrono::{NaiveDate, Utc};
use clap::Parser;

/// CLI arguments for the admin console
#[derive(Parser, Debug)]
#[command(version, about = "Admin console toolkit", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (TOML). Built-in defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Build a list query string, or fetch the page it selects
    Query {
        /// Resource whose query configuration is applied
        #[arg(short, long)]
        resource: Option<Resource>,
        /// Sort field
        #[arg(long)]
        sort: Option<String>,
        /// Sort order
        #[arg(long, value_enum, default_value_t = SortOrder::Desc)]
        order: SortOrder,
        /// Page number (1-based)
        #[arg(long)]
        page: Option<u32>,
        /// Page size
        #[arg(long)]
        rows: Option<u32>,
        /// Filter as `field=value` (repeatable)
        #[arg(short, long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
        /// Exact-match field (repeatable); replaces the resource's list
        #[arg(long)]
        exact: Vec<String>,
        /// Agent scope
        #[arg(long)]
        agent_id: Option<String>,
        /// Fetch the page from the backend and print it as JSON
        #[arg(long, requires = "resource")]
        fetch: bool,
    },
    /// Fetch usage statistics for one or more tenants
    Stats {
        #[arg(short, long, value_enum)]
        metric: Metric,
        /// Tenant (repeatable); two or more print the combined view
        #[arg(short, long = "tenant", required = true)]
        tenants: Vec<String>,
        #[arg(long, value_enum, default_value_t = TimeUnit::Day)]
        unit: TimeUnit,
        /// First day of the window (defaults to the 30 days ending with --to)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day of the window (defaults to today, UTC)
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, value_enum, default_value_t = Locale::En)]
        locale: Locale,
        /// Write a CSV export
        #[arg(long)]
        csv: bool,
        /// CSV output path (defaults to the standard export filename)
        #[arg(short, long, requires = "csv")]
        output: Option<PathBuf>,
    },
    /// Decode a catalog export blob and print its data
    DecodeExport {
        /// File holding the blob (defaults to stdin)
        input: Option<PathBuf>,
    },
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got '{raw}'"))?;
    if field.is_empty() {
        return Err(format!("missing field name in '{raw}'"));
    }
    Ok((field.to_string(), value.to_string()))
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    List(#[from] ListError),
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid export blob, see log for details")]
    InvalidExport,
    #[error("No statistics could be fetched for any tenant")]
    NoStatistics,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match ConsoleConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => ConsoleConfig::default(),
    };

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let result = match args.command {
        Command::Query {
            resource,
            sort,
            order,
            page,
            rows,
            filters,
            exact,
            agent_id,
            fetch,
        } => {
            let mut params = QueryParams {
                sort_by: sort,
                sort_order: Some(order),
                page_number: page,
                page_size: rows,
                agent_id,
                filters,
                expressions: Vec::new(),
            };
            if page.is_some() && rows.is_none() {
                params.page_size = Some(config.query.default_rows);
            }
            run_query(&config, resource, params, exact, fetch).await
        }
        Command::Stats {
            metric,
            tenants,
            unit,
            from,
            to,
            locale,
            csv,
            output,
        } => {
            let to = to.unwrap_or_else(|| Utc::now().date_naive());
            let window = match from {
                Some(from) => TimeWindow::days(unit, from, to),
                None => TimeWindow::trailing_days(unit, to, 30),
            };
            let export = csv.then(|| output.unwrap_or_else(|| default_csv_path(metric, &tenants)));
            run_stats(&config, metric, &tenants, &window, locale, export).await
        }
        Command::DecodeExport { input } => run_decode_export(input).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_query(
    config: &ConsoleConfig,
    resource: Option<Resource>,
    params: QueryParams,
    exact: Vec<String>,
    fetch: bool,
) -> Result<(), CliError> {
    let mut query_config = resource
        .map(|r| config.query_config(r))
        .unwrap_or_else(|| QueryConfig {
            agent_id_field: config.query.agent_id_field.clone(),
            ..Default::default()
        });
    if !exact.is_empty() {
        query_config.exact_match_fields = exact;
    }

    let Some(resource) = resource.filter(|_| fetch) else {
        println!("{}", build_query_params(&params, &query_config));
        return Ok(());
    };

    let mut config = config.clone();
    config
        .resources
        .entry(resource.name().to_string())
        .or_default()
        .exact_match_fields = Some(query_config.exact_match_fields);

    let client = ListingClient::from_config(&config)?;
    let page: Page<serde_json::Value> = client.fetch_page(resource, &params).await?;
    tracing::info!(
        resource = resource.name(),
        items = page.items.len(),
        total = page.total_count,
        "Fetched page"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "totalCount": page.total_count,
            "items": page.items,
        }))?
    );
    Ok(())
}

fn default_csv_path(metric: Metric, tenants: &[String]) -> PathBuf {
    let tenant = match tenants {
        [single] => Some(single.as_str()),
        _ => None,
    };
    PathBuf::from(stats::csv_filename(metric, tenant, Utc::now().date_naive()))
}

async fn run_stats(
    config: &ConsoleConfig,
    metric: Metric,
    tenants: &[String],
    window: &TimeWindow,
    locale: Locale,
    export: Option<PathBuf>,
) -> Result<(), CliError> {
    let client = StatisticsClient::from_config(&config.backend)?;
    let results = client.fetch_all_tenants(metric, tenants, window).await;
    let failed: Vec<String> = results
        .failed_tenants()
        .into_iter()
        .map(str::to_string)
        .collect();
    let (usage, summaries) = results.into_maps();
    if usage.is_empty() && summaries.is_empty() {
        return Err(CliError::NoStatistics);
    }
    if !failed.is_empty() {
        eprintln!("Warning: no data for {}", failed.join(", "));
    }

    let aggregation = stats::aggregate(metric, tenants, &usage, &summaries);
    let (summary, series) = match (&aggregation.data, tenants) {
        (Some(data), _) => (aggregation.summary, Some(data)),
        (None, [tenant]) => (
            summaries.get(tenant).copied().unwrap_or_default(),
            usage.get(tenant),
        ),
        (None, _) => (aggregation.summary, None),
    };

    let fmt = |value: f64| stats::tooltip_value(metric, value, locale);
    println!("Yesterday:     {}", fmt(summary.yesterday));
    println!("This week:     {}", fmt(summary.this_week));
    println!("This month:    {}", fmt(summary.this_month));
    println!("This year:     {}", fmt(summary.this_year));
    println!("Agreed annual: {}", fmt(summary.agreed_annual));

    if let Some(series) = series {
        println!();
        println!("{}", stats::series_label(&series.tenant));
        for point in series.tenant_usage.range.sorted_values() {
            let values: Vec<String> = metric
                .fields()
                .iter()
                .map(|field| format!("{}={}", field.label, fmt(point.value(field.key))))
                .collect();
            println!("  {}  {}", point.day_label(), values.join("  "));
        }
    }

    if let Some(path) = export {
        let csv = match tenants {
            [tenant] => stats::convert_to_csv(metric, usage.get(tenant)),
            _ => stats::convert_multi_tenant_to_csv(metric, tenants, &usage),
        };
        tokio::fs::write(&path, csv).await?;
        tracing::info!(path = %path.display(), mime = CSV_MIME_TYPE, "Wrote CSV export");
        eprintln!("CSV written to {}", path.display());
    }

    Ok(())
}

async fn run_decode_export(input: Option<PathBuf>) -> Result<(), CliError> {
    let encoded = match input {
        Some(path) => tokio::fs::read_to_string(&path).await?,
        None => std::io::read_to_string(std::io::stdin())?,
    };

    let blob = catalog::decode_export(&encoded).ok_or(CliError::InvalidExport)?;
    match blob.catalog() {
        Ok(catalog) => {
            tracing::info!(
                products = catalog.products.len(),
                prices = catalog.prices.len(),
                "Decoded catalog export"
            );
            for price in catalog.prices_with_unknown_currency() {
                tracing::warn!(
                    price = %price.id,
                    currency = %price.currency,
                    "Price references a currency missing from the export"
                );
            }
            println!("{}", serde_json::to_string_pretty(&catalog)?);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Export data is not a catalog, printing raw data");
            println!("{}", serde_json::to_string_pretty(&blob.data)?);
        }
    }
    Ok(())
}
