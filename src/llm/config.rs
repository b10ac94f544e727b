//! LLM and speech-to-text configuration parsed from environment variables.

use super::types::LlmError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_API_KEY_ENV: &str = "GROQ_API_KEY";
pub const DEFAULT_STT_MODEL: &str = "whisper-large-v3-turbo";
pub const DEFAULT_STT_LANGUAGE: &str = "en";
pub const DEFAULT_LLM_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LLM_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    Anthropic,
    OpenAi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiApiMode {
    ChatCompletions,
    Responses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub api_key: String,
    pub model: String,
    pub openai_mode: OpenAiApiMode,
    pub openai_base_url: String,
    pub timeouts: LlmTimeouts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SttConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub language: String,
    pub timeouts: LlmTimeouts,
}

impl LlmConfig {
    /// Build typed LLM config from environment variables.
    ///
    /// - `LLM_API_KEY_ENV`: names the env var holding the key (default `GROQ_API_KEY`)
    /// - `LLM_PROVIDER`: `openai` (default, any OpenAI-compatible API) or `anthropic`
    /// - `LLM_MODEL`: provider default when absent
    /// - `LLM_OPENAI_MODE`: `chat_completions` (default) or `responses`
    /// - `LLM_OPENAI_BASE_URL`: default Groq's OpenAI-compatible endpoint
    /// - `LLM_REQUEST_TIMEOUT_SECS`: default 120
    /// - `LLM_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error when the key is missing or a mode/provider is unknown.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Self, LlmError> {
        let provider = parse_provider(get("LLM_PROVIDER").as_deref())?;
        let api_key = api_key(get, "LLM_API_KEY_ENV")?;
        let model = get("LLM_MODEL").unwrap_or_else(|| default_model(provider).to_string());
        let openai_mode = parse_openai_mode(get("LLM_OPENAI_MODE").as_deref())?;
        let openai_base_url = base_url(get("LLM_OPENAI_BASE_URL"));
        let timeouts = timeouts(get);

        Ok(Self { provider, api_key, model, openai_mode, openai_base_url, timeouts })
    }
}

impl SttConfig {
    /// Build Whisper transcription config from environment variables.
    ///
    /// - `STT_API_KEY_ENV`: falls back to `LLM_API_KEY_ENV`, then `GROQ_API_KEY`
    /// - `STT_BASE_URL`: falls back to `LLM_OPENAI_BASE_URL`, then Groq
    /// - `STT_MODEL`: default `whisper-large-v3-turbo`
    /// - `STT_LANGUAGE`: default `en`
    ///
    /// # Errors
    ///
    /// Returns an error when the key is missing.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Self, LlmError> {
        let key_env = if get("STT_API_KEY_ENV").is_some() { "STT_API_KEY_ENV" } else { "LLM_API_KEY_ENV" };
        let api_key = api_key(get, key_env)?;
        let base_url = base_url(get("STT_BASE_URL").or_else(|| get("LLM_OPENAI_BASE_URL")));
        let model = get("STT_MODEL").unwrap_or_else(|| DEFAULT_STT_MODEL.to_string());
        let language = get("STT_LANGUAGE").unwrap_or_else(|| DEFAULT_STT_LANGUAGE.to_string());

        Ok(Self { api_key, base_url, model, language, timeouts: timeouts(get) })
    }
}

fn api_key(get: &dyn Fn(&str) -> Option<String>, key_env_var: &str) -> Result<String, LlmError> {
    let key_var = get(key_env_var).unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());
    get(&key_var)
        .filter(|k| !k.trim().is_empty())
        .ok_or(LlmError::MissingApiKey { var: key_var })
}

fn base_url(raw: Option<String>) -> String {
    raw.unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

fn timeouts(get: &dyn Fn(&str) -> Option<String>) -> LlmTimeouts {
    LlmTimeouts {
        request_secs: parse_u64(get("LLM_REQUEST_TIMEOUT_SECS"), DEFAULT_LLM_REQUEST_TIMEOUT_SECS),
        connect_secs: parse_u64(get("LLM_CONNECT_TIMEOUT_SECS"), DEFAULT_LLM_CONNECT_TIMEOUT_SECS),
    }
}

fn parse_u64(raw: Option<String>, default: u64) -> u64 {
    raw.and_then(|v| v.parse::<u64>().ok()).unwrap_or(default)
}

fn parse_provider(raw: Option<&str>) -> Result<LlmProviderKind, LlmError> {
    match raw.unwrap_or("openai") {
        "anthropic" => Ok(LlmProviderKind::Anthropic),
        "openai" | "groq" => Ok(LlmProviderKind::OpenAi),
        other => Err(LlmError::ConfigParse(format!("unknown LLM_PROVIDER: {other}"))),
    }
}

fn parse_openai_mode(raw: Option<&str>) -> Result<OpenAiApiMode, LlmError> {
    match raw.unwrap_or("chat_completions") {
        "responses" => Ok(OpenAiApiMode::Responses),
        "chat_completions" => Ok(OpenAiApiMode::ChatCompletions),
        other => Err(LlmError::ConfigParse(format!(
            "unsupported openai_api mode '{other}' (expected 'responses' or 'chat_completions')"
        ))),
    }
}

fn default_model(provider: LlmProviderKind) -> &'static str {
    match provider {
        LlmProviderKind::Anthropic => "claude-sonnet-4-5-20250929",
        LlmProviderKind::OpenAi => "llama-3.3-70b-versatile",
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
