use std::time::Duration;

use http::HeaderName;
use serde::{Deserialize, Serialize};
use url::Url;

use super::ConfigError;

/// Backend API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the admin API (e.g., "https://api.example.com/v1").
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Header carrying the tenant a request is made for.
    #[serde(default = "default_tenant_header")]
    pub tenant_header: String,

    /// Tenant of the signed-in operator.
    ///
    /// Sent in the tenant header when the target tenant is a platform tenant;
    /// the target then travels in the request path only.
    #[serde(default)]
    pub session_tenant: Option<String>,

    /// Tenants that must be addressed through the session tenant.
    #[serde(default)]
    pub platform_tenants: Vec<String>,

    /// Bearer token sent with every request. Usually `${VAR}`-expanded.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Path prefix of the statistics endpoints.
    #[serde(default = "default_statistics_path")]
    pub statistics_path: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            tenant_header: default_tenant_header(),
            session_tenant: None,
            platform_tenants: Vec::new(),
            bearer_token: None,
            statistics_path: default_statistics_path(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_tenant_header() -> String {
    "x-tenant-id".to_string()
}

fn default_statistics_path() -> String {
    "/statistics".to_string()
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base URL without a trailing slash.
    pub fn base_url_trimmed(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            ConfigError::Validation(format!("backend.base_url '{}': {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "backend.base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "backend.timeout_secs must be greater than 0".into(),
            ));
        }

        HeaderName::from_bytes(self.tenant_header.as_bytes()).map_err(|_| {
            ConfigError::Validation(format!(
                "backend.tenant_header '{}' is not a valid header name",
                self.tenant_header
            ))
        })?;

        if !self.platform_tenants.is_empty() && self.session_tenant.is_none() {
            return Err(ConfigError::Validation(
                "backend.platform_tenants requires backend.session_tenant".into(),
            ));
        }

        if !self.statistics_path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "backend.statistics_path '{}' must start with '/'",
                self.statistics_path
            )));
        }

        Ok(())
    }
}
