//! Per-table pagination, sort and filter state.
//!
//! A [`TableState`] owns one table's [`PaginationState`] and applies the
//! table widget's page, sort and filter events to it. Every mutation is
//! announced to the registered state-change listeners, and the `page`/`rows`
//! URL parameters are kept in sync through [`TableState::write_url`]. The URL
//! is only read once, when the table is created ([`TableState::from_url`]).
//!
//! Sorting is a three-state cycle per column:
//!
//! ```text
//! unsorted --click a--> a asc --click a--> a desc --click a--> unsorted
//!                 \--click b--> b asc
//! ```

use std::fmt;

use url::Url;

use crate::query::{
    DateRangeStyle, FilterClause, FilterValue, MatchMode, QueryParams, SortOrder, TableFilters,
};

/// Page size used until the URL or the widget says otherwise.
pub const DEFAULT_ROWS: u32 = 10;

/// URL parameter holding the one-based page number.
pub const PAGE_PARAM: &str = "page";

/// URL parameter holding the page size.
pub const ROWS_PARAM: &str = "rows";

/// Pagination, sort and filter state of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationState {
    /// One-based page number.
    pub current_page: u32,
    /// Page size.
    pub rows: u32,
    /// Zero-based offset of the first row, always `(current_page - 1) * rows`.
    pub first: u32,
    pub sort_field: Option<String>,
    pub sort_order: Option<SortOrder>,
    /// `None` when no filter is active.
    pub filters: Option<TableFilters>,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            current_page: 1,
            rows: DEFAULT_ROWS,
            first: 0,
            sort_field: None,
            sort_order: Some(SortOrder::Desc),
            filters: None,
        }
    }
}

impl PaginationState {
    fn set_page(&mut self, current_page: u32, rows: u32) {
        self.current_page = current_page.max(1);
        self.rows = rows.max(1);
        self.first = (self.current_page - 1).saturating_mul(self.rows);
    }
}

/// Page change emitted by the table widget; `page` is zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEvent {
    pub first: u32,
    pub page: u32,
    pub rows: u32,
}

/// Header click emitted by the table widget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortEvent {
    pub sort_field: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl SortEvent {
    pub fn field(field: impl Into<String>) -> Self {
        Self {
            sort_field: Some(field.into()),
            sort_order: None,
        }
    }
}

type StateListener = Box<dyn FnMut(&PaginationState) + Send>;

/// Owner of one table's [`PaginationState`].
pub struct TableState {
    state: PaginationState,
    listeners: Vec<StateListener>,
}

impl fmt::Debug for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableState")
            .field("state", &self.state)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for TableState {
    fn default() -> Self {
        Self::new(PaginationState::default())
    }
}

impl TableState {
    pub fn new(state: PaginationState) -> Self {
        Self {
            state,
            listeners: Vec::new(),
        }
    }

    /// Create the state for a freshly mounted table, rehydrating the page and
    /// page size from the URL. Missing or invalid parameters keep defaults.
    pub fn from_url(url: &Url) -> Self {
        let mut state = PaginationState::default();
        let mut page = state.current_page;
        let mut rows = state.rows;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                PAGE_PARAM => match value.parse::<u32>() {
                    Ok(p) if p >= 1 => page = p,
                    _ => tracing::debug!(value = %value, "Ignoring invalid page parameter"),
                },
                ROWS_PARAM => match value.parse::<u32>() {
                    Ok(r) if r >= 1 => rows = r,
                    _ => tracing::debug!(value = %value, "Ignoring invalid rows parameter"),
                },
                _ => {}
            }
        }

        state.set_page(page, rows);
        Self::new(state)
    }

    pub fn state(&self) -> &PaginationState {
        &self.state
    }

    /// Register a listener called with the new state after every change.
    pub fn on_state_change(&mut self, listener: impl FnMut(&PaginationState) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Apply a page change.
    pub fn on_page(&mut self, event: PageEvent) {
        self.state.set_page(event.page.saturating_add(1), event.rows);
        if event.first != self.state.first {
            tracing::debug!(
                event_first = event.first,
                first = self.state.first,
                "Page event offset disagrees with page * rows, using computed offset"
            );
        }
        self.notify();
    }

    /// Apply a header click.
    ///
    /// A new column sorts ascending; the same column cycles ascending,
    /// descending, unsorted; an event without a column clears sorting.
    pub fn on_sort(&mut self, event: SortEvent) {
        let field = event.sort_field.filter(|f| !f.is_empty());

        match field {
            None => self.clear_sort(),
            Some(field) if self.state.sort_field.as_deref() == Some(field.as_str()) => {
                match self.state.sort_order {
                    Some(order @ SortOrder::Asc) => self.state.sort_order = Some(order.opposite()),
                    _ => self.clear_sort(),
                }
            }
            Some(field) => {
                self.state.sort_field = Some(field);
                self.state.sort_order = Some(SortOrder::Asc);
            }
        }

        self.notify();
    }

    /// Apply a filter change.
    ///
    /// Always returns to the first page. Blank text values are cleared, and
    /// the filters are stored as `None` when nothing remains active.
    pub fn on_filter(&mut self, mut filters: TableFilters) {
        for filter in filters.values_mut() {
            if filter.value.as_ref().is_some_and(FilterValue::is_blank) {
                filter.value = None;
            }
        }

        self.state.filters = is_filters_active(&filters).then_some(filters);
        self.state.set_page(1, self.state.rows);
        self.notify();
    }

    /// Mirror the page and page size into `url`, keeping other parameters.
    pub fn write_url(&self, url: &mut Url) {
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != PAGE_PARAM && k != ROWS_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(PAGE_PARAM, &self.state.current_page.to_string());
        pairs.append_pair(ROWS_PARAM, &self.state.rows.to_string());
    }

    /// The list query for the current state.
    ///
    /// `contains` filters become raw values for
    /// [`build_query_params`](crate::query::build_query_params) to match. Every
    /// other match mode is rendered as a typed [`FilterClause`] expression;
    /// `dateIs` and date-valued `equals` filters become local-day ranges
    /// ([`DateRangeStyle::Inclusive`]).
    pub fn to_query_params(&self) -> QueryParams {
        let mut filters = Vec::new();
        let mut expressions = Vec::new();

        for (field, filter) in self.state.filters.iter().flatten() {
            let Some(value) = filter.value.as_ref().filter(|v| !v.is_blank()) else {
                continue;
            };
            match filter.match_mode {
                MatchMode::Contains => filters.push((field.clone(), value.render_plain())),
                mode => {
                    let date_field = matches!(value, FilterValue::Date(_));
                    let clause = FilterClause::from_filter(value, mode, date_field);
                    expressions.push((field.clone(), clause.render(DateRangeStyle::Inclusive)));
                }
            }
        }

        QueryParams {
            sort_by: self.state.sort_field.clone(),
            sort_order: self.state.sort_field.as_ref().and(self.state.sort_order),
            page_size: Some(self.state.rows),
            page_number: Some(self.state.current_page),
            agent_id: None,
            filters,
            expressions,
        }
    }

    fn clear_sort(&mut self) {
        self.state.sort_field = None;
        self.state.sort_order = None;
    }

    fn notify(&mut self) {
        for listener in &mut self.listeners {
            listener(&self.state);
        }
    }
}

/// Whether any filter carries a value.
pub fn is_filters_active(filters: &TableFilters) -> bool {
    filters.values().any(|f| f.value.is_some())
}
