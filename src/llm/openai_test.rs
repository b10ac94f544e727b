use super::*;

// =============================================================================
// chat completions
// =============================================================================

#[test]
fn cc_parse_text_response() {
    let json = serde_json::json!({
        "model": "llama-3.3-70b-versatile",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": "Hello!" },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5 }
    })
    .to_string();
    let resp = parse_chat_completions_response(&json).unwrap();
    assert_eq!(resp.text(), "Hello!");
    assert_eq!(resp.stop_reason, "end_turn");
    assert_eq!(resp.input_tokens, 10);
    assert_eq!(resp.output_tokens, 5);
}

#[test]
fn cc_parse_length_finish_maps_to_max_tokens() {
    let json = serde_json::json!({
        "choices": [{ "message": { "content": "partial" }, "finish_reason": "length" }]
    })
    .to_string();
    let resp = parse_chat_completions_response(&json).unwrap();
    assert_eq!(resp.stop_reason, "max_tokens");
}

#[test]
fn cc_parse_null_content_yields_no_blocks() {
    let json = serde_json::json!({
        "choices": [{ "message": { "content": null }, "finish_reason": "stop" }]
    })
    .to_string();
    let resp = parse_chat_completions_response(&json).unwrap();
    assert!(resp.content.is_empty());
}

#[test]
fn cc_parse_missing_choices() {
    let json = serde_json::json!({ "model": "m", "choices": [] }).to_string();
    assert!(parse_chat_completions_response(&json).is_err());
}

#[test]
fn cc_parse_invalid_json() {
    assert!(matches!(parse_chat_completions_response("not json"), Err(LlmError::ApiParse(_))));
}

#[test]
fn cc_messages_prepend_system_and_flatten_blocks() {
    let messages = vec![
        Message::user("first"),
        Message {
            role: "assistant".into(),
            content: Content::Blocks(vec![
                ContentBlock::Text { text: "a".into() },
                ContentBlock::Thinking { thinking: "skip".into() },
                ContentBlock::Text { text: "b".into() },
            ]),
        },
        Message { role: "user".into(), content: Content::Blocks(vec![]) },
    ];
    let out = build_chat_completions_messages("be brief", &messages);
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].role, "system");
    assert_eq!(out[0].content, "be brief");
    assert_eq!(out[2].content, "ab");
}

#[test]
fn cc_messages_skip_blank_system() {
    let out = build_chat_completions_messages("  ", &[Message::user("x")]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].role, "user");
}

// =============================================================================
// responses API
// =============================================================================

#[test]
fn resp_parse_text_response() {
    let json = serde_json::json!({
        "model": "gpt-4o",
        "output": [{
            "type": "message",
            "content": [{ "type": "output_text", "text": "Done!" }]
        }],
        "usage": { "input_tokens": 15, "output_tokens": 8 }
    })
    .to_string();
    let resp = parse_responses_response(&json).unwrap();
    assert_eq!(resp.text(), "Done!");
    assert_eq!(resp.stop_reason, "end_turn");
    assert_eq!(resp.input_tokens, 15);
}

#[test]
fn resp_parse_output_text_fallback() {
    let json = serde_json::json!({ "model": "gpt-4o", "output_text": "Fallback text" }).to_string();
    let resp = parse_responses_response(&json).unwrap();
    assert_eq!(resp.text(), "Fallback text");
}

#[test]
fn resp_parse_incomplete_maps_to_max_tokens() {
    let json = serde_json::json!({
        "output": [],
        "incomplete_details": { "reason": "max_output_tokens" }
    })
    .to_string();
    let resp = parse_responses_response(&json).unwrap();
    assert_eq!(resp.stop_reason, "max_tokens");
}

#[test]
fn resp_input_wraps_text_as_input_text() {
    let input = build_responses_input(&[Message::user("hi")]);
    let json = serde_json::to_value(&input).unwrap();
    assert_eq!(
        json,
        serde_json::json!([{ "type": "message", "role": "user", "content": [{ "type": "input_text", "text": "hi" }] }])
    );
}

// =============================================================================
// response format
// =============================================================================

#[test]
fn cc_json_request_sets_response_format() {
    let messages = [Message::user("Transcript:\nShip it.")];
    let body = build_chat_completions_request("llama", &ChatRequest::json(800, "Return JSON.", &messages));
    let value = serde_json::to_value(&body).unwrap();
    assert_eq!(value["response_format"], serde_json::json!({ "type": "json_object" }));
    assert_eq!(value["messages"][0]["role"], "system");
    assert_eq!(value["max_tokens"], 800);
}

#[test]
fn cc_text_request_omits_response_format() {
    let messages = [Message::user("hi")];
    let request = ChatRequest { max_tokens: 10, system: "", messages: &messages, format: ResponseFormat::Text };
    let value = serde_json::to_value(build_chat_completions_request("m", &request)).unwrap();
    assert!(value.get("response_format").is_none());
}

#[test]
fn resp_json_request_sets_text_format() {
    let messages = [Message::user("Transcript:\nShip it.")];
    let body = build_responses_request("gpt", &ChatRequest::json(500, "Return JSON.", &messages));
    let value = serde_json::to_value(&body).unwrap();
    assert_eq!(value["text"], serde_json::json!({ "format": { "type": "json_object" } }));
    assert_eq!(value["instructions"], "Return JSON.");
    assert_eq!(value["max_output_tokens"], 500);
}
