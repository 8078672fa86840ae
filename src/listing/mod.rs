//! List endpoints behind the log, job, session and catalog tables.
//!
//! Every list endpoint takes the same `sort`/`pageSize`/`pageNumber`/`q`
//! parameters built by [`build_query_params`] and reports the unpaginated
//! row count in the `x-total-count` response header.

mod sequence;

use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub use sequence::{RequestSequence, RequestToken};

use crate::{
    config::ConsoleConfig,
    query::{QueryParams, build_query_params, parse_total_count},
};

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{resource} request failed with status {status}: {message}")]
    Api {
        resource: &'static str,
        status: u16,
        message: String,
    },
}

pub type ListResult<T> = Result<T, ListError>;

/// Tables backed by a list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Logs,
    Jobs,
    Sessions,
    Products,
    Categories,
    Prices,
    Taxes,
    Currencies,
}

impl Resource {
    pub const ALL: [Resource; 8] = [
        Resource::Logs,
        Resource::Jobs,
        Resource::Sessions,
        Resource::Products,
        Resource::Categories,
        Resource::Prices,
        Resource::Taxes,
        Resource::Currencies,
    ];

    /// Name used in `[resources.<name>]` config sections.
    pub fn name(&self) -> &'static str {
        match self {
            Resource::Logs => "logs",
            Resource::Jobs => "jobs",
            Resource::Sessions => "sessions",
            Resource::Products => "products",
            Resource::Categories => "categories",
            Resource::Prices => "prices",
            Resource::Taxes => "taxes",
            Resource::Currencies => "currencies",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }

    pub fn default_path(&self) -> &'static str {
        match self {
            Resource::Logs => "/agentic-ai/logs",
            Resource::Jobs => "/agentic-ai/jobs",
            Resource::Sessions => "/agentic-ai/sessions",
            Resource::Products => "/products",
            Resource::Categories => "/categories",
            Resource::Prices => "/prices",
            Resource::Taxes => "/taxes",
            Resource::Currencies => "/currencies",
        }
    }

    /// Enumerated columns that the backend only matches exactly.
    pub fn default_exact_match_fields(&self) -> &'static [&'static str] {
        match self {
            Resource::Logs => &["level", "status"],
            Resource::Jobs | Resource::Sessions => &["status"],
            Resource::Prices => &["currency", "interval"],
            Resource::Currencies => &["code"],
            Resource::Products | Resource::Categories | Resource::Taxes => &[],
        }
    }
}

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Rows matching the query across all pages, 0 when not reported.
    pub total_count: u64,
}

/// Client for the list endpoints.
#[derive(Clone)]
pub struct ListingClient {
    http_client: Client,
    config: ConsoleConfig,
}

impl ListingClient {
    pub fn from_config(config: &ConsoleConfig) -> ListResult<Self> {
        let http_client = Client::builder().timeout(config.backend.timeout()).build()?;
        Ok(Self {
            http_client,
            config: config.clone(),
        })
    }

    pub fn url(&self, resource: Resource, params: &QueryParams) -> String {
        let query = build_query_params(params, &self.config.query_config(resource));
        format!(
            "{}{}{}",
            self.config.backend.base_url_trimmed(),
            self.config.resource_path(resource),
            query
        )
    }

    /// Fetch one page of `resource`.
    ///
    /// The body is a JSON array of rows; the total comes from
    /// `x-total-count`.
    pub async fn fetch_page<T: DeserializeOwned>(
        &self,
        resource: Resource,
        params: &QueryParams,
    ) -> ListResult<Page<T>> {
        let url = self.url(resource, params);
        tracing::debug!(resource = resource.name(), url = %url, "Fetching list page");

        let mut request = self.http_client.get(&url);
        if let Some(tenant) = &self.config.backend.session_tenant {
            request = request.header(self.config.backend.tenant_header.as_str(), tenant);
        }
        if let Some(token) = &self.config.backend.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.inspect_err(|e| {
            tracing::warn!(resource = resource.name(), error = %e, "List request failed");
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(
                resource = resource.name(),
                status = status.as_u16(),
                "List endpoint returned an error"
            );
            return Err(ListError::Api {
                resource: resource.name(),
                status: status.as_u16(),
                message,
            });
        }

        let total_count = parse_total_count(response.headers());
        let items: Vec<T> = response.json().await?;
        Ok(Page { items, total_count })
    }
}
