//! Data layer for the admin console dashboards.
//!
//! The console renders backend list endpoints (agent logs, jobs, sessions and
//! the product catalog) into filterable, paginated tables, and per-tenant
//! usage statistics into charts and CSV exports. This crate owns the logic
//! behind those views:
//!
//! - [`query`]: table state to backend query-string translation
//! - [`pagination`]: the per-table pagination/sort/filter state machine
//! - [`stats`]: multi-tenant usage aggregation, CSV export and formatting
//! - [`listing`]: async client for paginated list endpoints
//! - [`catalog`]: catalog models and the base64 export blob
//! - [`config`]: TOML configuration

pub mod catalog;
pub mod config;
pub mod listing;
#[cfg(feature = "cli")]
pub mod observability;
pub mod pagination;
pub mod query;
pub mod stats;
