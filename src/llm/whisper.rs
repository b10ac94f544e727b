//! Whisper-style speech-to-text client.
//!
//! Posts a multipart form to `{base_url}/audio/transcriptions`, the route
//! shared by Groq and `OpenAI`. Parsing lives in `parse_transcription` so it
//! can be tested without a network.

use std::time::Duration;

use serde_json::Value;

use super::config::SttConfig;
use super::types::{LlmError, Transcriber};

/// Container formats the transcription endpoint accepts.
pub const SUPPORTED_AUDIO_EXTENSIONS: &[&str] = &["flac", "mp3", "mp4", "mpeg", "mpga", "m4a", "ogg", "wav", "webm"];
const FALLBACK_EXTENSION: &str = "mp3";

pub struct WhisperClient {
    http: reqwest::Client,
    config: SttConfig,
}

impl WhisperClient {
    /// Build a client from a parsed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: SttConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Build a client from environment variables (see [`SttConfig::from_env`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client fails.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::new(SttConfig::from_env()?)
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait::async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, LlmError> {
        let file_name = audio_file_name(file_name);
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name.clone())
            .mime_str(audio_mime(&file_name))
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("language", self.config.language.clone())
            .text("temperature", "0")
            .text("response_format", "json");

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        if status != 200 {
            return Err(LlmError::ApiResponse { status, body: text });
        }
        parse_transcription(&text)
    }
}

pub(crate) fn parse_transcription(json_text: &str) -> Result<String, LlmError> {
    let root: Value = serde_json::from_str(json_text).map_err(|e| LlmError::ApiParse(e.to_string()))?;
    root.get("text")
        .and_then(Value::as_str)
        .map(|t| t.trim().to_owned())
        .ok_or_else(|| LlmError::ApiParse("transcription: missing text".to_string()))
}

/// Normalize an upload name to `audio.<ext>` with a supported extension.
#[must_use]
pub fn audio_file_name(original: &str) -> String {
    let ext = original
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| SUPPORTED_AUDIO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_owned());
    format!("audio.{ext}")
}

fn audio_mime(file_name: &str) -> &'static str {
    match file_name.rsplit_once('.').map_or("", |(_, ext)| ext) {
        "flac" => "audio/flac",
        "mp4" | "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        _ => "audio/mpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_transcription_trims_text() {
        assert_eq!(parse_transcription(r#"{"text":"  hello there "}"#).unwrap(), "hello there");
    }

    #[test]
    fn parse_transcription_missing_text_errors() {
        assert!(matches!(parse_transcription(r#"{"segments":[]}"#), Err(LlmError::ApiParse(_))));
    }

    #[test]
    fn audio_file_name_keeps_supported_extension() {
        assert_eq!(audio_file_name("Standup 03.WAV"), "audio.wav");
        assert_eq!(audio_file_name("call.m4a"), "audio.m4a");
    }

    #[test]
    fn audio_file_name_falls_back_to_mp3() {
        assert_eq!(audio_file_name("notes.txt"), "audio.mp3");
        assert_eq!(audio_file_name("no_extension"), "audio.mp3");
    }

    #[test]
    fn audio_mime_matches_extension() {
        assert_eq!(audio_mime("audio.wav"), "audio/wav");
        assert_eq!(audio_mime("audio.m4a"), "audio/mp4");
        assert_eq!(audio_mime("audio.mpga"), "audio/mpeg");
    }
}
