//! LLM: multi-provider adapter for summaries, task extraction and speech-to-text.
//!
//! DESIGN
//! ======
//! Uses environment variables instead of config files. The `LlmClient` enum
//! dispatches to Anthropic or an `OpenAI`-compatible API based on
//! `LLM_PROVIDER`. Speech-to-text goes through `WhisperClient`. Both sit
//! behind traits (`LlmChat`, `Transcriber`) so services can be tested with
//! mocks.

pub mod anthropic;
pub mod config;
#[cfg(test)]
pub mod mock;
pub mod openai;
pub mod types;
pub mod whisper;

use config::{LlmConfig, LlmProviderKind};
pub use types::{LlmChat, Transcriber};
use types::{ChatRequest, ChatResponse, LlmError};
pub use whisper::WhisperClient;

// =============================================================================
// CLIENT DISPATCH
// =============================================================================

/// Concrete LLM client that dispatches to either Anthropic or an OpenAI-compatible API.
///
/// Configured from environment variables by [`LlmClient::from_env`].
pub struct LlmClient {
    inner: LlmProvider,
    model: String,
}

enum LlmProvider {
    Anthropic(anthropic::AnthropicClient),
    OpenAi(openai::OpenAiClient),
}

impl LlmClient {
    /// Build an LLM client from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client fails.
    pub fn from_env() -> Result<Self, LlmError> {
        let config = LlmConfig::from_env()?;
        Self::from_config(config)
    }

    /// Build an LLM client from a parsed typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider HTTP client fails to build.
    pub fn from_config(config: LlmConfig) -> Result<Self, LlmError> {
        let model = config.model.clone();
        let inner = match config.provider {
            LlmProviderKind::Anthropic => {
                LlmProvider::Anthropic(anthropic::AnthropicClient::new(config.api_key, config.timeouts)?)
            }
            LlmProviderKind::OpenAi => LlmProvider::OpenAi(openai::OpenAiClient::new(
                config.api_key,
                config.openai_mode,
                config.openai_base_url,
                config.timeouts,
            )?),
        };
        Ok(Self { inner, model })
    }

    /// Return the configured model name (e.g. `"llama-3.3-70b-versatile"`).
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl LlmChat for LlmClient {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse, LlmError> {
        match &self.inner {
            LlmProvider::Anthropic(c) => c.chat(&self.model, &request).await,
            LlmProvider::OpenAi(c) => c.chat(&self.model, &request).await,
        }
    }
}
