mod history;
mod llm;
mod runtime;
mod server;
mod tools;

pub use history::*;
pub use llm::*;
pub use runtime::*;
pub use server::*;
pub use tools::*;

use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process configuration, assembled once at startup from the environment.
///
/// Secrets (API keys, connection strings) arrive via workload identity as
/// environment variables; nothing is ever read from request bodies.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub sql: SqlConfig,
    pub docs: DocSearchConfig,
    pub web: WebSearchConfig,
    pub rpc: RpcConfig,
    pub history: HistoryConfig,
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Read every recognized option from the environment.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            llm: LlmConfig::from_env(),
            sql: SqlConfig::from_env(),
            docs: DocSearchConfig::from_env(),
            web: WebSearchConfig::from_env(),
            rpc: RpcConfig::from_env(),
            history: HistoryConfig::from_env(),
            runtime: RuntimeConfig::from_env(),
        }
    }

    /// Validate the assembled configuration. Errors make the process refuse
    /// to start; warnings are logged and the affected feature is disabled.
    pub fn issues(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.llm.base_url_responses.is_none() && self.llm.base_url_chat.is_none() {
            issues.push(ConfigIssue::error(
                "llm",
                "neither LLM_BASE_URL_RESPONSES nor LLM_BASE_URL_CHAT is set; \
                 no LLM client can be constructed (demo mode still works)",
            ));
        }
        if self.sql.connection_string().is_none() {
            issues.push(ConfigIssue::warning(
                "sql",
                "no SQL_CONNECTION_STRING or SQL_SERVER/SQL_DATABASE set; \
                 the SQL tool will be unavailable",
            ));
        }
        if self.docs.endpoint.is_none() {
            issues.push(ConfigIssue::warning(
                "docs",
                "DOC_SEARCH_ENDPOINT not set; the document retrieval tool will be unavailable",
            ));
        }
        if self.web.project_endpoint.is_none() {
            issues.push(ConfigIssue::warning(
                "web",
                "PROJECT_ENDPOINT not set; the web grounding tool will be unavailable",
            ));
        }
        if self.rpc.enabled && self.rpc.url.is_none() {
            issues.push(ConfigIssue::warning(
                "rpc",
                "RPC_ENABLED is set but RPC_ANALYTICS_URL is missing; \
                 analytics tools will be unavailable",
            ));
        }
        if self.history.enabled && self.history.url.is_none() {
            issues.push(ConfigIssue::warning(
                "history",
                "HISTORY_ENABLED is set but HISTORY_URL is missing; \
                 conversations will not be persisted",
            ));
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    fn error(field: &str, message: &str) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }
    fn warning(field: &str, message: &str) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

// ── Shared env helpers ─────────────────────────────────────────────

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_bool(key: &str, default: bool) -> bool {
    match env_string(key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

pub(crate) fn env_u64(key: &str, default: u64) -> u64 {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_reports_missing_llm_as_error() {
        let config = Config::default();
        let issues = config.issues();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.field == "llm"));
    }

    #[test]
    fn issue_display_includes_severity_tag() {
        let issue = ConfigIssue::warning("sql", "tool unavailable");
        assert_eq!(format!("{issue}"), "[WARN] sql: tool unavailable");
    }
}
