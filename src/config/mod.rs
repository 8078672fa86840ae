//! Configuration for the admin console.
//!
//! The console is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [backend]
//! base_url = "https://api.example.com/v1"
//! session_tenant = "platform"
//! platform_tenants = ["platform", "internal"]
//! bearer_token = "${ADMIN_API_TOKEN}"
//!
//! [query]
//! agent_id_field = "agentId"
//!
//! [resources.logs]
//! path = "/agentic-ai/logs"
//! exact_match_fields = ["level", "status"]
//! ```

mod backend;
mod observability;

use std::{collections::BTreeMap, path::Path};

pub use backend::*;
use once_cell::sync::Lazy;
pub use observability::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    listing::Resource,
    pagination::DEFAULT_ROWS,
    query::{DEFAULT_AGENT_ID_FIELD, QueryConfig},
};

/// Root configuration.
///
/// Every section is optional; an empty file yields a console pointed at a
/// local backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsoleConfig {
    /// Backend API connection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Defaults applied to every list query.
    #[serde(default)]
    pub query: QueryDefaults,

    /// Per-resource overrides, keyed by resource name (e.g. `logs`).
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceConfig>,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Defaults applied to every list query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryDefaults {
    /// Field the agent scoping clause is written against.
    #[serde(default = "default_agent_id_field")]
    pub agent_id_field: String,

    /// Page size before the user picks one.
    #[serde(default = "default_rows")]
    pub default_rows: u32,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            agent_id_field: default_agent_id_field(),
            default_rows: default_rows(),
        }
    }
}

fn default_agent_id_field() -> String {
    DEFAULT_AGENT_ID_FIELD.to_string()
}

fn default_rows() -> u32 {
    DEFAULT_ROWS
}

/// Overrides for one list resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    /// Endpoint path, relative to `backend.base_url`.
    #[serde(default)]
    pub path: Option<String>,

    /// Fields matched exactly (and uppercased) instead of fuzzily.
    #[serde(default)]
    pub exact_match_fields: Option<Vec<String>>,

    /// Overrides `query.agent_id_field` for this resource.
    #[serde(default)]
    pub agent_id_field: Option<String>,
}

impl ConsoleConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: ConsoleConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.backend.validate()?;

        if self.query.default_rows == 0 {
            return Err(ConfigError::Validation(
                "query.default_rows must be greater than 0".into(),
            ));
        }
        if self.query.agent_id_field.trim().is_empty() {
            return Err(ConfigError::Validation(
                "query.agent_id_field must not be empty".into(),
            ));
        }

        for (name, config) in &self.resources {
            if Resource::from_name(name).is_none() {
                return Err(ConfigError::Validation(format!(
                    "unknown resource 'resources.{name}'"
                )));
            }
            if let Some(path) = &config.path
                && !path.starts_with('/')
            {
                return Err(ConfigError::Validation(format!(
                    "resources.{name}.path '{path}' must start with '/'"
                )));
            }
        }

        Ok(())
    }

    pub fn resource(&self, resource: Resource) -> Option<&ResourceConfig> {
        self.resources.get(resource.name())
    }

    /// Endpoint path of `resource`, configured or default.
    pub fn resource_path(&self, resource: Resource) -> &str {
        self.resource(resource)
            .and_then(|r| r.path.as_deref())
            .unwrap_or(resource.default_path())
    }

    /// Query configuration for `resource`: configured overrides first, then
    /// the resource's defaults.
    pub fn query_config(&self, resource: Resource) -> QueryConfig {
        let overrides = self.resource(resource);
        let exact_match_fields = overrides
            .and_then(|r| r.exact_match_fields.clone())
            .unwrap_or_else(|| {
                resource
                    .default_exact_match_fields()
                    .iter()
                    .map(|f| f.to_string())
                    .collect()
            });
        let agent_id_field = overrides
            .and_then(|r| r.agent_id_field.clone())
            .unwrap_or_else(|| self.query.agent_id_field.clone());

        QueryConfig {
            exact_match_fields,
            agent_id_field,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

static ENV_VAR: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\$\{([^}]+)\}").unwrap()
});

/// Replace `${VAR}` with the variable's value. References after a `#` on the
/// same line are left alone.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in ENV_VAR.captures_iter(line) {
            let Some(whole) = cap.get(0) else { continue };
            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);
            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);
            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
