use super::env_string;

/// LLM endpoint and deployment settings.
///
/// The presence of `LLM_BASE_URL_RESPONSES` decides whether the
/// Responses-style client is constructed; the Chat-style client needs
/// `LLM_BASE_URL_CHAT`. Selection between them is by agent mode and is
/// centralized in the gateway — there is no request-time fallback chain.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    /// `MODEL_PRIMARY` — primary deployment name.
    pub model_primary: String,
    /// `MODEL_SECONDARY` — secondary deployment name.
    pub model_secondary: String,
    /// `LLM_BASE_URL_RESPONSES`.
    pub base_url_responses: Option<String>,
    /// `LLM_BASE_URL_CHAT`.
    pub base_url_chat: Option<String>,
    /// `LLM_API_VERSION` — appended as a query parameter on every call.
    pub api_version: Option<String>,
    /// `LLM_API_KEY` — injected by workload identity.
    pub api_key: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            model_primary: env_string("MODEL_PRIMARY").unwrap_or_else(d_primary),
            model_secondary: env_string("MODEL_SECONDARY").unwrap_or_else(d_secondary),
            base_url_responses: env_string("LLM_BASE_URL_RESPONSES"),
            base_url_chat: env_string("LLM_BASE_URL_CHAT"),
            api_version: env_string("LLM_API_VERSION"),
            api_key: env_string("LLM_API_KEY"),
        }
    }
}

fn d_primary() -> String {
    "gpt-primary".into()
}

fn d_secondary() -> String {
    "gpt-secondary".into()
}
