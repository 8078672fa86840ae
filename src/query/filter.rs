//! Column filters to `q` clauses.
//!
//! Table widgets hand over one [`TableFilterValue`] per column: a loosely
//! typed value plus a match mode. Each is turned into a [`FilterClause`] and
//! rendered as `field:<expr>`:
//!
//! | Match mode | Expression          |
//! |------------|---------------------|
//! | `contains` | `~(value)`          |
//! | `equals`   | `value`             |
//! | `lt`       | `<value`            |
//! | `lte`      | `<=value`           |
//! | `gt`       | `>value`            |
//! | `gte`      | `>=value`           |
//! | `dateIs`   | local-day date range |

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::date_range::{DateRangeStyle, DayWindow, INVALID_DATE, parse_local_date, to_local_iso};

/// Column name to filter state, as kept by a table.
pub type TableFilters = BTreeMap<String, TableFilterValue>;

/// Filter match modes offered by the table widgets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchMode {
    #[default]
    Contains,
    Equals,
    Lt,
    Lte,
    Gt,
    Gte,
    DateIs,
}

/// Raw value of a column filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Date(DateTime<FixedOffset>),
    Text(String),
}

impl FilterValue {
    pub fn text(value: impl Into<String>) -> Self {
        FilterValue::Text(value.into())
    }

    /// Text values that are empty after trimming count as no value.
    pub fn is_blank(&self) -> bool {
        matches!(self, FilterValue::Text(t) if t.trim().is_empty())
    }

    /// The value as it appears in equality and fuzzy clauses.
    pub fn render_plain(&self) -> String {
        match self {
            FilterValue::Number(n) => n.to_string(),
            FilterValue::Date(dt) => to_local_iso(&dt.naive_local()),
            FilterValue::Text(t) => t.trim().to_string(),
        }
    }
}

/// One column's filter state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableFilterValue {
    #[serde(default)]
    pub value: Option<FilterValue>,
    #[serde(rename = "matchMode", default)]
    pub match_mode: MatchMode,
}

impl TableFilterValue {
    pub fn new(value: FilterValue, match_mode: MatchMode) -> Self {
        Self {
            value: Some(value),
            match_mode,
        }
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Self::new(FilterValue::text(value), MatchMode::Contains)
    }

    pub fn equals(value: impl Into<String>) -> Self {
        Self::new(FilterValue::text(value), MatchMode::Equals)
    }

    pub fn date_is(date: DateTime<FixedOffset>) -> Self {
        Self::new(FilterValue::Date(date), MatchMode::DateIs)
    }

    /// A filter slot with no value, as tables create for every column.
    pub fn empty(match_mode: MatchMode) -> Self {
        Self {
            value: None,
            match_mode,
        }
    }

    /// Absent filters never reach the emitted query.
    pub fn is_absent(&self) -> bool {
        self.value.as_ref().is_none_or(FilterValue::is_blank)
    }
}

/// Operand of an ordering comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Number(f64),
    /// Local wall-clock date-time.
    Date(NaiveDateTime),
    Text(String),
}

impl Bound {
    fn from_value(value: &FilterValue, date_field: bool) -> Self {
        match value {
            FilterValue::Number(n) => Bound::Number(*n),
            FilterValue::Date(dt) => Bound::Date(dt.naive_local()),
            FilterValue::Text(t) if date_field => parse_local_date_time(t)
                .map(Bound::Date)
                .unwrap_or_else(|| Bound::Text(INVALID_DATE.to_string())),
            FilterValue::Text(t) => Bound::Text(t.trim().to_string()),
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Number(n) => write!(f, "{n}"),
            Bound::Date(dt) => write!(f, "{}", to_local_iso(dt)),
            Bound::Text(t) => write!(f, "{t}"),
        }
    }
}

/// The calendar day of a `dateIs` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateValue {
    Day(NaiveDate),
    /// The input could not be read as a date; renders as `Invalid Date`.
    Invalid,
}

impl DateValue {
    fn from_value(value: &FilterValue) -> Self {
        let day = match value {
            FilterValue::Date(dt) => Some(dt.date_naive()),
            FilterValue::Text(t) => parse_local_date(t),
            FilterValue::Number(_) => None,
        };
        day.map(DateValue::Day).unwrap_or(DateValue::Invalid)
    }

    pub fn window(&self) -> Option<DayWindow> {
        match self {
            DateValue::Day(day) => Some(DayWindow::for_date(*day)),
            DateValue::Invalid => None,
        }
    }
}

/// A typed column filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    Contains(String),
    Equals(String),
    Lt(Bound),
    Lte(Bound),
    Gt(Bound),
    Gte(Bound),
    DateIs(DateValue),
}

impl FilterClause {
    /// Type a raw filter value under its match mode.
    ///
    /// On date columns `equals` means "on that day" and ordering operands are
    /// read as local date-times.
    pub fn from_filter(value: &FilterValue, mode: MatchMode, date_field: bool) -> Self {
        match mode {
            MatchMode::Contains => FilterClause::Contains(value.render_plain()),
            MatchMode::Equals if date_field => FilterClause::DateIs(DateValue::from_value(value)),
            MatchMode::Equals => FilterClause::Equals(value.render_plain()),
            MatchMode::Lt => FilterClause::Lt(Bound::from_value(value, date_field)),
            MatchMode::Lte => FilterClause::Lte(Bound::from_value(value, date_field)),
            MatchMode::Gt => FilterClause::Gt(Bound::from_value(value, date_field)),
            MatchMode::Gte => FilterClause::Gte(Bound::from_value(value, date_field)),
            MatchMode::DateIs => FilterClause::DateIs(DateValue::from_value(value)),
        }
    }

    /// Render the right-hand side of a `field:<expr>` clause.
    pub fn render(&self, style: DateRangeStyle) -> String {
        match self {
            FilterClause::Contains(v) => format!("~({v})"),
            FilterClause::Equals(v) => v.clone(),
            FilterClause::Lt(b) => format!("<{b}"),
            FilterClause::Lte(b) => format!("<={b}"),
            FilterClause::Gt(b) => format!(">{b}"),
            FilterClause::Gte(b) => format!(">={b}"),
            FilterClause::DateIs(d) => style.render(d.window().as_ref()),
        }
    }
}

/// Column-to-API translation rules for [`convert_filters_to_api`].
#[derive(Debug, Clone, Default)]
pub struct FilterMapping {
    /// Column name to API field name.
    pub field_mappings: HashMap<String, String>,
    /// Per column, raw value to API value (e.g. severity name to numeric code).
    pub enum_conversions: HashMap<String, HashMap<String, String>>,
    /// Columns holding dates.
    pub date_fields: HashSet<String>,
}

impl FilterMapping {
    pub fn map_field(mut self, column: impl Into<String>, api_field: impl Into<String>) -> Self {
        self.field_mappings.insert(column.into(), api_field.into());
        self
    }

    pub fn convert_enum<I, K, V>(mut self, column: impl Into<String>, table: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let table = table
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.enum_conversions.insert(column.into(), table);
        self
    }

    pub fn date_field(mut self, column: impl Into<String>) -> Self {
        self.date_fields.insert(column.into());
        self
    }

    fn api_field<'a>(&'a self, column: &'a str) -> &'a str {
        self.field_mappings
            .get(column)
            .map(String::as_str)
            .unwrap_or(column)
    }

    fn convert_value(&self, column: &str, value: &FilterValue) -> FilterValue {
        if let FilterValue::Text(raw) = value
            && let Some(converted) = self
                .enum_conversions
                .get(column)
                .and_then(|table| table.get(raw.trim()))
        {
            return FilterValue::Text(converted.clone());
        }
        value.clone()
    }
}

/// Render table filters as space-joined `q` clauses.
///
/// Date filters use [`DateRangeStyle::Encoded`].
pub fn format_filter_query(filters: &TableFilters) -> String {
    filters
        .iter()
        .filter_map(|(field, filter)| {
            let value = active_value(filter)?;
            let clause = FilterClause::from_filter(value, filter.match_mode, false);
            Some(format!("{field}:{}", clause.render(DateRangeStyle::Encoded)))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render table filters as `q` clauses after applying column mappings,
/// enum conversions and date-column handling.
///
/// Date filters use [`DateRangeStyle::Inclusive`].
pub fn convert_filters_to_api(filters: &TableFilters, mapping: &FilterMapping) -> String {
    filters
        .iter()
        .filter_map(|(column, filter)| {
            let value = active_value(filter)?;
            let value = mapping.convert_value(column, value);
            let date_field = mapping.date_fields.contains(column);
            let clause = FilterClause::from_filter(&value, filter.match_mode, date_field);
            Some(format!(
                "{}:{}",
                mapping.api_field(column),
                clause.render(DateRangeStyle::Inclusive)
            ))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn active_value(filter: &TableFilterValue) -> Option<&FilterValue> {
    filter.value.as_ref().filter(|v| !v.is_blank())
}

fn parse_local_date_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}
