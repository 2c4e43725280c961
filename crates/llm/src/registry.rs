//! Client registry.
//!
//! Constructs the configured LLM clients at startup and answers the
//! orchestrator's "give me the client for this shape" question. Selection
//! is fully deterministic: the Responses client exists iff
//! `LLM_BASE_URL_RESPONSES` is set, the Chat client iff `LLM_BASE_URL_CHAT`
//! is set, and demo mode shadows both. There is no request-time fallback.

use std::sync::Arc;

use fm_domain::config::LlmConfig;
use fm_domain::error::{Error, Result};

use crate::chat::ChatClient;
use crate::demo::DemoClient;
use crate::responses::ResponsesClient;
use crate::traits::{ClientShape, LlmClient};

pub struct LlmClients {
    responses: Option<Arc<dyn LlmClient>>,
    chat: Option<Arc<dyn LlmClient>>,
    model_primary: String,
    model_secondary: String,
}

impl LlmClients {
    /// Build clients from config. Clients whose base URL is absent are
    /// simply not constructed; the orchestrator reports a validation error
    /// when a mode needs a shape that has no client.
    pub fn from_config(config: &LlmConfig, demo_mode: bool) -> Result<Self> {
        if demo_mode {
            tracing::info!("demo mode enabled, using deterministic LLM clients");
            return Ok(Self {
                responses: Some(Arc::new(DemoClient::new(ClientShape::Responses))),
                chat: Some(Arc::new(DemoClient::new(ClientShape::Chat))),
                model_primary: config.model_primary.clone(),
                model_secondary: config.model_secondary.clone(),
            });
        }

        let responses = match &config.base_url_responses {
            Some(url) => {
                let client = ResponsesClient::new(
                    url.clone(),
                    config.api_version.clone(),
                    config.api_key.clone(),
                )?;
                tracing::info!(base_url = %url, "registered responses-style LLM client");
                Some(Arc::new(client) as Arc<dyn LlmClient>)
            }
            None => None,
        };

        let chat = match &config.base_url_chat {
            Some(url) => {
                let client = ChatClient::new(
                    url.clone(),
                    config.api_version.clone(),
                    config.api_key.clone(),
                )?;
                tracing::info!(base_url = %url, "registered chat-style LLM client");
                Some(Arc::new(client) as Arc<dyn LlmClient>)
            }
            None => None,
        };

        Ok(Self {
            responses,
            chat,
            model_primary: config.model_primary.clone(),
            model_secondary: config.model_secondary.clone(),
        })
    }

    /// The client for a shape, or a validation error naming the missing
    /// configuration so the caller can fail the turn fast.
    pub fn for_shape(&self, shape: ClientShape) -> Result<Arc<dyn LlmClient>> {
        match shape {
            ClientShape::Responses => self.responses.clone().ok_or_else(|| {
                Error::Validation(
                    "this agent mode needs the responses client; set LLM_BASE_URL_RESPONSES"
                        .into(),
                )
            }),
            ClientShape::Chat => self.chat.clone().ok_or_else(|| {
                Error::Validation(
                    "this agent mode needs the chat client; set LLM_BASE_URL_CHAT".into(),
                )
            }),
        }
    }

    /// Resolve a deployment name for the requested model choice.
    pub fn deployment(&self, choice: fm_domain::turn::ModelChoice) -> &str {
        match choice {
            fm_domain::turn::ModelChoice::Primary => &self.model_primary,
            fm_domain::turn::ModelChoice::Secondary => &self.model_secondary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_mode_provides_both_shapes() {
        let clients = LlmClients::from_config(&LlmConfig::default(), true).unwrap();
        assert!(clients.for_shape(ClientShape::Responses).is_ok());
        assert!(clients.for_shape(ClientShape::Chat).is_ok());
    }

    #[test]
    fn missing_base_url_yields_validation_error() {
        let clients = LlmClients::from_config(&LlmConfig::default(), false).unwrap();
        assert!(matches!(
            clients.for_shape(ClientShape::Responses),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn responses_client_built_when_url_present() {
        let config = LlmConfig {
            base_url_responses: Some("https://llm.example.com".into()),
            ..Default::default()
        };
        let clients = LlmClients::from_config(&config, false).unwrap();
        assert!(clients.for_shape(ClientShape::Responses).is_ok());
        assert!(clients.for_shape(ClientShape::Chat).is_err());
    }

    #[test]
    fn deployment_resolution() {
        let config = LlmConfig {
            model_primary: "gpt-a".into(),
            model_secondary: "gpt-b".into(),
            ..Default::default()
        };
        let clients = LlmClients::from_config(&config, true).unwrap();
        assert_eq!(
            clients.deployment(fm_domain::turn::ModelChoice::Primary),
            "gpt-a"
        );
        assert_eq!(
            clients.deployment(fm_domain::turn::ModelChoice::Secondary),
            "gpt-b"
        );
    }
}
