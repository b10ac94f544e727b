//! Anthropic Messages API client.
//!
//! The Messages API has no JSON switch. For [`ResponseFormat::JsonObject`]
//! the assistant turn is prefilled with `{`, the model continues the object,
//! and `parse_response` stitches the prefill back onto the reply so callers
//! see one complete JSON text.

use super::config::LlmTimeouts;
use super::types::{ChatRequest, ChatResponse, ContentBlock, LlmError, Message, ResponseFormat};
use std::time::Duration;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const JSON_PREFILL: &str = "{";
/// Low temperature keeps summaries and extracted boards stable between runs.
const TEMPERATURE: f32 = 0.2;

// =============================================================================
// CLIENT
// =============================================================================

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key })
    }

    pub async fn chat(&self, model: &str, request: &ChatRequest<'_>) -> Result<ChatResponse, LlmError> {
        let prefill = prefill_for(request.format);
        let messages = build_messages(request.messages, prefill);
        let body = ApiRequest {
            model,
            max_tokens: request.max_tokens,
            system: request.system,
            messages: &messages,
            temperature: TEMPERATURE,
        };

        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
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

        parse_response(&text, prefill)
    }
}

fn prefill_for(format: ResponseFormat) -> Option<&'static str> {
    match format {
        ResponseFormat::Text => None,
        ResponseFormat::JsonObject => Some(JSON_PREFILL),
    }
}

/// Conversation as sent: the caller's turns, then the prefilled assistant turn.
fn build_messages(messages: &[Message], prefill: Option<&str>) -> Vec<Message> {
    let mut out = messages.to_vec();
    if let Some(prefill) = prefill {
        out.push(Message::assistant(prefill));
    }
    out
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: &'a [Message],
    temperature: f32,
}

#[derive(serde::Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    model: String,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Default, serde::Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_response(json: &str, prefill: Option<&str>) -> Result<ChatResponse, LlmError> {
    let api: ApiResponse = serde_json::from_str(json).map_err(|e| LlmError::ApiParse(e.to_string()))?;

    let mut content: Vec<ContentBlock> = api
        .content
        .into_iter()
        .filter(|block| matches!(block, ContentBlock::Text { .. }))
        .collect();

    if let Some(prefill) = prefill {
        match content.first_mut() {
            Some(ContentBlock::Text { text }) => text.insert_str(0, prefill),
            _ => content.insert(0, ContentBlock::Text { text: prefill.to_owned() }),
        }
    }

    Ok(ChatResponse {
        content,
        model: api.model,
        stop_reason: api.stop_reason.unwrap_or_else(|| "end_turn".to_owned()),
        input_tokens: api.usage.input_tokens,
        output_tokens: api.usage.output_tokens,
    })
}

#[cfg(test)]
#[path = "anthropic_test.rs"]
mod tests;
