use std::collections::HashMap;

use super::*;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_target_groq_chat_completions() {
    let cfg = LlmConfig::from_lookup(&lookup(&[("GROQ_API_KEY", "gsk-test")])).unwrap();
    assert_eq!(cfg.provider, LlmProviderKind::OpenAi);
    assert_eq!(cfg.model, "llama-3.3-70b-versatile");
    assert_eq!(cfg.openai_mode, OpenAiApiMode::ChatCompletions);
    assert_eq!(cfg.openai_base_url, DEFAULT_OPENAI_BASE_URL);
    assert_eq!(
        cfg.timeouts,
        LlmTimeouts { request_secs: DEFAULT_LLM_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_LLM_CONNECT_TIMEOUT_SECS }
    );
    assert_eq!(cfg.api_key, "gsk-test");
}

#[test]
fn parses_anthropic_overrides() {
    let cfg = LlmConfig::from_lookup(&lookup(&[
        ("LLM_PROVIDER", "anthropic"),
        ("LLM_API_KEY_ENV", "ANTHROPIC_API_KEY"),
        ("ANTHROPIC_API_KEY", "sk-ant"),
        ("LLM_REQUEST_TIMEOUT_SECS", "42"),
        ("LLM_CONNECT_TIMEOUT_SECS", "7"),
    ]))
    .unwrap();
    assert_eq!(cfg.provider, LlmProviderKind::Anthropic);
    assert_eq!(cfg.model, "claude-sonnet-4-5-20250929");
    assert_eq!(cfg.timeouts, LlmTimeouts { request_secs: 42, connect_secs: 7 });
}

#[test]
fn trims_trailing_slash_from_base_url() {
    let cfg = LlmConfig::from_lookup(&lookup(&[
        ("GROQ_API_KEY", "k"),
        ("LLM_OPENAI_BASE_URL", "https://example.test/v1/"),
        ("LLM_OPENAI_MODE", "responses"),
    ]))
    .unwrap();
    assert_eq!(cfg.openai_base_url, "https://example.test/v1");
    assert_eq!(cfg.openai_mode, OpenAiApiMode::Responses);
}

#[test]
fn missing_key_names_the_variable() {
    let err = LlmConfig::from_lookup(&lookup(&[("LLM_API_KEY_ENV", "MY_KEY")])).unwrap_err();
    assert!(matches!(err, LlmError::MissingApiKey { ref var } if var == "MY_KEY"));
}

#[test]
fn blank_key_counts_as_missing() {
    let err = LlmConfig::from_lookup(&lookup(&[("GROQ_API_KEY", "  ")])).unwrap_err();
    assert!(matches!(err, LlmError::MissingApiKey { .. }));
}

#[test]
fn unknown_provider_errors() {
    let err = LlmConfig::from_lookup(&lookup(&[("GROQ_API_KEY", "k"), ("LLM_PROVIDER", "bad")]))
        .unwrap_err()
        .to_string();
    assert!(err.contains("unknown LLM_PROVIDER"));
}

#[test]
fn unknown_openai_mode_errors() {
    let err = LlmConfig::from_lookup(&lookup(&[("GROQ_API_KEY", "k"), ("LLM_OPENAI_MODE", "bad_mode")]))
        .unwrap_err()
        .to_string();
    assert!(err.contains("unsupported openai_api mode"));
}

#[test]
fn stt_config_inherits_llm_key_and_base_url() {
    let cfg = SttConfig::from_lookup(&lookup(&[
        ("LLM_API_KEY_ENV", "OPENAI_API_KEY"),
        ("OPENAI_API_KEY", "sk-test"),
        ("LLM_OPENAI_BASE_URL", "https://api.openai.com/v1/"),
    ]))
    .unwrap();
    assert_eq!(cfg.api_key, "sk-test");
    assert_eq!(cfg.base_url, "https://api.openai.com/v1");
    assert_eq!(cfg.model, DEFAULT_STT_MODEL);
    assert_eq!(cfg.language, "en");
}

#[test]
fn stt_config_prefers_its_own_overrides() {
    let cfg = SttConfig::from_lookup(&lookup(&[
        ("GROQ_API_KEY", "gsk"),
        ("STT_API_KEY_ENV", "WHISPER_KEY"),
        ("WHISPER_KEY", "wk"),
        ("STT_BASE_URL", "https://stt.example/v1"),
        ("STT_MODEL", "whisper-1"),
    ]))
    .unwrap();
    assert_eq!(cfg.api_key, "wk");
    assert_eq!(cfg.base_url, "https://stt.example/v1");
    assert_eq!(cfg.model, "whisper-1");
}
