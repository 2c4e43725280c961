use super::{env_bool, env_string, env_u64};
use crate::turn::DocEffort;

/// Data-warehouse SQL tool settings.
///
/// `SQL_CONNECTION_STRING` wins when set; otherwise a DSN is assembled from
/// `SQL_SERVER` + `SQL_DATABASE`. The identity behind either MUST be
/// read-only — model-generated SQL is executed as-is.
#[derive(Debug, Clone)]
pub struct SqlConfig {
    pub server: Option<String>,
    pub database: Option<String>,
    pub connection_string_override: Option<String>,
    /// Per-query timeout, seconds (default 30).
    pub timeout_secs: u64,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            server: None,
            database: None,
            connection_string_override: None,
            timeout_secs: 30,
        }
    }
}

impl SqlConfig {
    pub fn from_env() -> Self {
        Self {
            server: env_string("SQL_SERVER"),
            database: env_string("SQL_DATABASE"),
            connection_string_override: env_string("SQL_CONNECTION_STRING"),
            timeout_secs: env_u64("SQL_TIMEOUT_SECONDS", 30),
        }
    }

    /// The effective DSN, or `None` when the SQL tool is unconfigured.
    pub fn connection_string(&self) -> Option<String> {
        if let Some(dsn) = &self.connection_string_override {
            return Some(dsn.clone());
        }
        match (&self.server, &self.database) {
            (Some(server), Some(database)) => {
                Some(format!("postgres://{server}/{database}"))
            }
            _ => None,
        }
    }
}

/// Agentic document retrieval settings.
#[derive(Debug, Clone)]
pub struct DocSearchConfig {
    /// `DOC_SEARCH_ENDPOINT`.
    pub endpoint: Option<String>,
    /// `DOC_KNOWLEDGE_BASE`.
    pub knowledge_base: String,
    /// `DOC_DEFAULT_EFFORT` (default `minimal`).
    pub default_effort: DocEffort,
}

impl Default for DocSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            knowledge_base: d_knowledge_base(),
            default_effort: DocEffort::Minimal,
        }
    }
}

impl DocSearchConfig {
    pub fn from_env() -> Self {
        let default_effort = match env_string("DOC_DEFAULT_EFFORT").as_deref() {
            Some("low") => DocEffort::Low,
            Some("medium") => DocEffort::Medium,
            _ => DocEffort::Minimal,
        };
        Self {
            endpoint: env_string("DOC_SEARCH_ENDPOINT"),
            knowledge_base: env_string("DOC_KNOWLEDGE_BASE").unwrap_or_else(d_knowledge_base),
            default_effort,
        }
    }
}

fn d_knowledge_base() -> String {
    "default".into()
}

/// Web grounding search settings.
#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    /// `PROJECT_ENDPOINT` — the grounding project base URL.
    pub project_endpoint: Option<String>,
    /// `WEB_CONNECTION_NAME` — named connection within the project.
    pub connection_name: String,
    /// Hard upper bound on a search, seconds (default 90).
    pub timeout_secs: u64,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            project_endpoint: None,
            connection_name: d_connection(),
            timeout_secs: 90,
        }
    }
}

impl WebSearchConfig {
    pub fn from_env() -> Self {
        Self {
            project_endpoint: env_string("PROJECT_ENDPOINT"),
            connection_name: env_string("WEB_CONNECTION_NAME").unwrap_or_else(d_connection),
            timeout_secs: env_u64("WEB_TIMEOUT_SECONDS", 90),
        }
    }
}

fn d_connection() -> String {
    "default".into()
}

/// Remote JSON-RPC analytics tool server settings.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// `RPC_ANALYTICS_URL`.
    pub url: Option<String>,
    /// `RPC_ENABLED` (default false).
    pub enabled: bool,
    /// Per-call timeout, seconds (default 60).
    pub timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: None,
            enabled: false,
            timeout_secs: 60,
        }
    }
}

impl RpcConfig {
    pub fn from_env() -> Self {
        Self {
            url: env_string("RPC_ANALYTICS_URL"),
            enabled: env_bool("RPC_ENABLED", false),
            timeout_secs: env_u64("RPC_TIMEOUT_SECONDS", 60),
        }
    }
}
