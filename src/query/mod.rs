//! Table state to backend query-string translation.
//!
//! Every paginated list endpoint accepts the same parameters:
//!
//! ```text
//! sort=<field>:<ASC|DESC>
//! pageSize=<n>
//! pageNumber=<n>
//! q=<clause> <clause> ...
//! ```
//!
//! A clause is `field:value` for exact matches and date ranges, or
//! `field:~(value)` for fuzzy matches. The total number of records is returned
//! in the `x-total-count` response header.
//!
//! Column filters coming from the table widgets go through [`filter`], which
//! dispatches on the filter's match mode.

mod date_range;
pub mod filter;

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

pub use date_range::*;
pub use filter::{
    Bound, DateValue, FilterClause, FilterMapping, FilterValue, MatchMode, TableFilterValue,
    TableFilters, convert_filters_to_api, format_filter_query,
};

/// Response header carrying the total number of records for a list query.
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Default field name used to scope list queries to a single agent.
pub const DEFAULT_AGENT_ID_FIELD: &str = "agentId";

/// Sort order for list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending order
    Asc,
    /// Descending order
    #[default]
    Desc,
}

impl SortOrder {
    /// Get the direction string understood by the list endpoints.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// Get the opposite sort order.
    pub fn opposite(&self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// Inputs for [`build_query_params`].
///
/// Filters keep their insertion order so the emitted `q` clause is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub page_size: Option<u32>,
    pub page_number: Option<u32>,
    /// Entity scope, emitted as `<agent_id_field>:<id>` ahead of the filters.
    pub agent_id: Option<String>,
    /// Raw values, matched fuzzily unless exact or already a date range.
    pub filters: Vec<(String, String)>,
    /// Rendered right-hand sides such as `>=3` or `<=2024-03-15T00:00:00.000Z`,
    /// emitted as `field:<expr>` after the filters.
    pub expressions: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(field.into());
        self.sort_order = Some(order);
        self
    }

    pub fn page(mut self, page_number: u32, page_size: u32) -> Self {
        self.page_number = Some(page_number);
        self.page_size = Some(page_size);
        self
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn expression(mut self, field: impl Into<String>, expr: impl Into<String>) -> Self {
        self.expressions.push((field.into(), expr.into()));
        self
    }
}

/// Per-endpoint configuration for [`build_query_params`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    /// Fields matched exactly (and uppercased) instead of fuzzily.
    #[serde(default)]
    pub exact_match_fields: Vec<String>,

    /// Field used for the agent scope clause.
    #[serde(default = "default_agent_id_field")]
    pub agent_id_field: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            exact_match_fields: Vec::new(),
            agent_id_field: default_agent_id_field(),
        }
    }
}

impl QueryConfig {
    pub fn with_exact_match_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exact_match_fields: fields.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    fn is_exact_match(&self, field: &str) -> bool {
        self.exact_match_fields.iter().any(|f| f == field)
    }
}

fn default_agent_id_field() -> String {
    DEFAULT_AGENT_ID_FIELD.to_string()
}

/// Whether a filter value is already a date-range expression such as
/// `(>="2024-03-15T00:00:00.000Z" AND <"...")`.
pub fn is_date_range_expression(value: &str) -> bool {
    value.starts_with("(>=") || value.starts_with("(>")
}

/// Build the query string for a list endpoint.
///
/// Returns `""` when no parameter qualifies, otherwise a `?`-prefixed,
/// form-urlencoded string. Parameters are emitted in the order `sort`,
/// `pageSize`, `pageNumber`, `q`; none of them is ever emitted empty.
pub fn build_query_params(params: &QueryParams, config: &QueryConfig) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());

    if let Some(field) = params.sort_by.as_deref().filter(|f| !f.is_empty()) {
        let order = params.sort_order.unwrap_or_default();
        serializer.append_pair("sort", &format!("{field}:{}", order.as_str()));
    }

    if let Some(size) = params.page_size.filter(|s| *s > 0) {
        serializer.append_pair("pageSize", &size.to_string());
    }

    if let Some(number) = params.page_number.filter(|n| *n > 0) {
        serializer.append_pair("pageNumber", &number.to_string());
    }

    let clauses = query_clauses(params, config);
    if !clauses.is_empty() {
        serializer.append_pair("q", &clauses.join(" "));
    }

    let encoded = serializer.finish();
    if encoded.is_empty() {
        String::new()
    } else {
        format!("?{encoded}")
    }
}

/// The individual `q` clauses, scope clause first.
pub fn query_clauses(params: &QueryParams, config: &QueryConfig) -> Vec<String> {
    let mut clauses = Vec::with_capacity(params.filters.len() + 1);

    if let Some(agent_id) = params.agent_id.as_deref().filter(|id| !id.is_empty()) {
        clauses.push(format!("{}:{}", config.agent_id_field, agent_id));
    }

    for (field, raw) in &params.filters {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }

        if is_date_range_expression(value) {
            clauses.push(format!("{field}:{value}"));
        } else if config.is_exact_match(field) {
            clauses.push(format!("{field}:{}", value.to_uppercase()));
        } else {
            clauses.push(format!("{field}:~({value})"));
        }
    }

    for (field, raw) in &params.expressions {
        let expr = raw.trim();
        if expr.is_empty() {
            continue;
        }

        if config.is_exact_match(field) && !is_date_range_expression(expr) {
            clauses.push(format!("{field}:{}", expr.to_uppercase()));
        } else {
            clauses.push(format!("{field}:{expr}"));
        }
    }

    clauses
}

/// Read the total record count from a list response.
///
/// Header lookup is case-insensitive; a missing or unparseable value is 0.
pub fn parse_total_count(headers: &HeaderMap) -> u64 {
    headers
        .get(TOTAL_COUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use http::{HeaderName, HeaderValue};
    use rstest::rstest;

    use super::*;

    fn decode_q(query: &str) -> String {
        let query = query.strip_prefix('?').unwrap();
        form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[test]
    fn test_empty_params_produce_empty_string() {
        assert_eq!(
            build_query_params(&QueryParams::default(), &QueryConfig::default()),
            ""
        );
    }

    #[test]
    fn test_blank_values_are_not_emitted() {
        let params = QueryParams {
            sort_by: Some(String::new()),
            page_size: Some(0),
            page_number: Some(0),
            agent_id: Some(String::new()),
            filters: vec![("status".into(), "   ".into()), ("name".into(), "".into())],
            ..Default::default()
        };
        assert_eq!(build_query_params(&params, &QueryConfig::default()), "");
    }

    #[test]
    fn test_sort_and_paging() {
        let params = QueryParams::new()
            .sort("createdAt", SortOrder::Desc)
            .page(2, 25);
        assert_eq!(
            build_query_params(&params, &QueryConfig::default()),
            "?sort=createdAt%3ADESC&pageSize=25&pageNumber=2"
        );
    }

    #[test]
    fn test_sort_without_order_defaults_to_descending() {
        let params = QueryParams {
            sort_by: Some("name".into()),
            ..Default::default()
        };
        assert_eq!(
            build_query_params(&params, &QueryConfig::default()),
            "?sort=name%3ADESC"
        );
    }

    #[rstest]
    #[case("message", "timeout", "message:~(timeout)")]
    #[case("message", "  padded  ", "message:~(padded)")]
    #[case("jobName", "Nightly sync", "jobName:~(Nightly sync)")]
    fn test_fuzzy_match_clause(#[case] field: &str, #[case] value: &str, #[case] want: &str) {
        let params = QueryParams::new().filter(field, value);
        let query = build_query_params(&params, &QueryConfig::default());
        assert_eq!(decode_q(&query), want);
    }

    #[rstest]
    #[case("status", "failed", "status:FAILED")]
    #[case("status", " Running ", "status:RUNNING")]
    fn test_exact_match_uppercases(#[case] field: &str, #[case] value: &str, #[case] want: &str) {
        let config = QueryConfig::with_exact_match_fields(["status"]);
        let params = QueryParams::new().filter(field, value);
        assert_eq!(decode_q(&build_query_params(&params, &config)), want);
    }

    #[test]
    fn test_date_range_emitted_verbatim() {
        let range = r#"(>="2024-03-15T00:00:00.000Z" AND <"2024-03-15T23:59:59.000Z")"#;
        let config = QueryConfig::with_exact_match_fields(["createdAt"]);
        let params = QueryParams::new()
            .filter("createdAt", range)
            .filter("updatedAt", r#"(>"2024-03-15T00:00:00.000Z"+AND+<"x")"#);
        assert_eq!(
            decode_q(&build_query_params(&params, &config)),
            format!(r#"createdAt:{range} updatedAt:(>"2024-03-15T00:00:00.000Z"+AND+<"x")"#)
        );
    }

    #[test]
    fn test_agent_scope_is_prepended() {
        let params = QueryParams::new().filter("level", "warn").agent("agent-7");
        let query = build_query_params(&params, &QueryConfig::default());
        assert_eq!(decode_q(&query), "agentId:agent-7 level:~(warn)");
    }

    #[test]
    fn test_agent_scope_field_is_configurable() {
        let config = QueryConfig {
            agent_id_field: "workerId".into(),
            ..Default::default()
        };
        let params = QueryParams::new().agent("w-1");
        assert_eq!(decode_q(&build_query_params(&params, &config)), "workerId:w-1");
    }

    #[test]
    fn test_q_is_form_encoded() {
        let params = QueryParams::new().filter("name", "a b");
        assert_eq!(
            build_query_params(&params, &QueryConfig::default()),
            "?q=name%3A%7E%28a+b%29"
        );
    }

    #[test]
    fn test_parse_total_count() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_total_count(&headers), 0);

        headers.insert(
            HeaderName::from_bytes(b"X-Total-Count").unwrap(),
            HeaderValue::from_static("42"),
        );
        assert_eq!(parse_total_count(&headers), 42);

        headers.insert("x-total-count", HeaderValue::from_static("not-a-number"));
        assert_eq!(parse_total_count(&headers), 0);

        headers.insert("x-total-count", HeaderValue::from_static("-3"));
        assert_eq!(parse_total_count(&headers), 0);
    }

    #[test]
    fn test_expressions_follow_filters_verbatim() {
        let config = QueryConfig::with_exact_match_fields(["status"]);
        let params = QueryParams::new()
            .expression("retries", ">=3")
            .expression("status", "failed")
            .expression("note", "  ")
            .filter("message", "oom")
            .agent("a1");
        assert_eq!(
            decode_q(&build_query_params(&params, &config)),
            "agentId:a1 message:~(oom) retries:>=3 status:FAILED"
        );
    }
}
