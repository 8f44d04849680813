//! Provider selected by the `[llm]` table.

use crate::config::{LlmConfig, ProviderKind};
use crate::error::{CliError, Result};
use lectern_domain::LlmProvider;
use lectern_llm::{LlmError, MockProvider, OpenAiProvider};
use std::env;
use std::time::Duration;
use tracing::{info, warn};

/// Either configured provider, behind one `LlmProvider` impl.
pub enum ConfiguredProvider {
    /// OpenAI-compatible endpoint
    OpenAi(OpenAiProvider),
    /// Canned replies
    Mock(MockProvider),
}

impl ConfiguredProvider {
    /// Build the provider; `timeout` bounds one HTTP exchange.
    pub fn from_config(config: &LlmConfig, timeout: Duration) -> Result<Self> {
        match config.provider {
            ProviderKind::Mock => {
                info!("Using mock LLM provider");
                Ok(Self::Mock(MockProvider::new(config.mock_response.clone())))
            }
            ProviderKind::OpenAi => {
                let api_key = match env::var(&config.api_key_env) {
                    Ok(key) if !key.trim().is_empty() => Some(key),
                    Ok(_) | Err(env::VarError::NotPresent) => {
                        warn!(var = %config.api_key_env, "API key variable not set, sending unauthenticated requests");
                        None
                    }
                    Err(env::VarError::NotUnicode(_)) => {
                        return Err(CliError::Config(format!(
                            "{} does not hold valid UTF-8",
                            config.api_key_env
                        )));
                    }
                };
                let provider =
                    OpenAiProvider::new(config.endpoint.clone(), config.model.clone(), api_key, timeout)?
                        .with_temperature(config.temperature);
                info!(endpoint = %config.endpoint, model = %config.model, "Using OpenAI-compatible provider");
                Ok(Self::OpenAi(provider))
            }
        }
    }
}

impl LlmProvider for ConfiguredProvider {
    type Error = LlmError;

    fn complete(&self, prompt: &str) -> std::result::Result<String, Self::Error> {
        match self {
            Self::OpenAi(provider) => provider.complete(prompt),
            Self::Mock(provider) => provider.complete(prompt),
        }
    }

    fn model_name(&self) -> &str {
        match self {
            Self::OpenAi(provider) => provider.model_name(),
            Self::Mock(provider) => provider.model_name(),
        }
    }
}
