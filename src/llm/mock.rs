//! Scripted providers for service and route tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::types::{ChatRequest, ChatResponse, ContentBlock, LlmChat, LlmError, Message, ResponseFormat, Transcriber};

pub fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        content: vec![ContentBlock::Text { text: text.into() }],
        model: "mock".into(),
        stop_reason: "end_turn".into(),
        input_tokens: 10,
        output_tokens: 20,
    }
}

/// Replies with queued texts in order, then with `{}`. Records every call.
#[derive(Default)]
pub struct MockLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    pub calls: Mutex<Vec<(String, Vec<Message>)>>,
    /// Requested format of every call.
    pub formats: Mutex<Vec<ResponseFormat>>,
}

impl MockLlm {
    pub fn with_replies(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| Ok((*r).to_owned())).collect()),
            calls: Mutex::new(Vec::new()),
            formats: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(LlmError::ApiResponse { status: 500, body: "boom".into() })])),
            calls: Mutex::new(Vec::new()),
            formats: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Text of the first user message of call `idx`.
    pub fn prompt(&self, idx: usize) -> String {
        let calls = self.calls.lock().unwrap();
        match &calls[idx].1[0].content {
            super::types::Content::Text(text) => text.clone(),
            super::types::Content::Blocks(_) => String::new(),
        }
    }
}

#[async_trait::async_trait]
impl LlmChat for MockLlm {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.system.to_owned(), request.messages.to_vec()));
        self.formats.lock().unwrap().push(request.format);
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(text_response(&text)),
            Some(Err(e)) => Err(e),
            None => Ok(text_response("{}")),
        }
    }
}

/// Returns queued transcriptions in order, then an empty string.
#[derive(Default)]
pub struct MockTranscriber {
    texts: Mutex<VecDeque<String>>,
    /// `(byte length, file name)` of every request.
    pub calls: Mutex<Vec<(usize, String)>>,
    fail: bool,
}

impl MockTranscriber {
    pub fn with_texts(texts: &[&str]) -> Self {
        Self {
            texts: Mutex::new(texts.iter().map(|t| (*t).to_owned()).collect()),
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((audio.len(), file_name.to_owned()));
        if self.fail {
            return Err(LlmError::ApiResponse { status: 503, body: "unavailable".into() });
        }
        Ok(self.texts.lock().unwrap().pop_front().unwrap_or_default())
    }
}
