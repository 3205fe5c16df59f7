use std::fmt;

use serde::Serialize;

use super::client::CompletionError;

/// Error type a fragment sink may return to abort a completion.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Receiver for incremental completion text.
///
/// Fragments are delivered one at a time, in arrival order, and the next
/// fragment is not delivered until the previous call has returned. Returning
/// an error aborts the whole completion with [`CompletionError::Sink`].
pub trait FragmentSink {
    /// Receives one fragment.
    fn on_fragment(&mut self, fragment: &str) -> Result<(), SinkError>;
}

impl<F> FragmentSink for F
where
    F: FnMut(&str) -> Result<(), SinkError>,
{
    fn on_fragment(&mut self, fragment: &str) -> Result<(), SinkError> {
        self(fragment)
    }
}

/// Per-request options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOptions {
    /// Request an SSE stream (`Accept: text/event-stream`).
    pub stream: bool,
    /// Overrides the client's default model.
    pub model: Option<String>,
    /// Optional system message sent before the user prompt.
    pub system_message: Option<String>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            stream: true,
            model: None,
            system_message: None,
        }
    }
}

impl ChatOptions {
    /// Options for a single JSON response with the given system message.
    pub fn non_streaming(system_message: impl Into<String>) -> Self {
        Self {
            stream: false,
            model: None,
            system_message: Some(system_message.into()),
        }
    }
}

/// One chat message in the request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// Wire body of a chat-completion request.
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequestBody<'a> {
    pub model: &'a str,
    pub stream: bool,
    pub messages: Vec<ChatMessage<'a>>,
}

/// A fully resolved chat-completion request.
///
/// Construct with [`CompletionRequest::new`], which enforces that the prompt is
/// non-empty and that the endpoint is an absolute URL ending in
/// `/chat/completions`.
#[derive(Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    endpoint: String,
    api_key: String,
    model: String,
    streaming: bool,
    system_message: Option<String>,
    user_prompt: String,
}

impl CompletionRequest {
    /// Validates and builds a request.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        streaming: bool,
        system_message: Option<String>,
        user_prompt: impl Into<String>,
    ) -> Result<Self, CompletionError> {
        let endpoint = endpoint.into();
        let user_prompt = user_prompt.into();

        if user_prompt.trim().is_empty() {
            return Err(CompletionError::EmptyPrompt);
        }

        let url = reqwest::Url::parse(&endpoint)
            .map_err(|e| CompletionError::InvalidUrl(format!("{endpoint}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || !url.path().ends_with("/chat/completions")
        {
            return Err(CompletionError::InvalidUrl(format!(
                "{endpoint}: expected an http(s) URL ending in /chat/completions"
            )));
        }

        Ok(Self {
            endpoint,
            api_key: api_key.into(),
            model: model.into(),
            streaming,
            system_message: system_message.filter(|s| !s.is_empty()),
            user_prompt,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn streaming(&self) -> bool {
        self.streaming
    }

    pub fn system_message(&self) -> Option<&str> {
        self.system_message.as_deref()
    }

    pub fn user_prompt(&self) -> &str {
        &self.user_prompt
    }

    /// Builds the JSON body: optional system message, then the user prompt.
    pub(crate) fn body(&self) -> ChatRequestBody<'_> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.system_message.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &self.user_prompt,
        });

        ChatRequestBody {
            model: &self.model,
            stream: self.streaming,
            messages,
        }
    }

    /// Value for the `Accept` header.
    pub(crate) fn accept(&self) -> &'static str {
        if self.streaming {
            "text/event-stream"
        } else {
            "application/json"
        }
    }
}

impl fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionRequest")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("streaming", &self.streaming)
            .field("system_message", &self.system_message)
            .field("user_prompt", &self.user_prompt)
            .finish()
    }
}

/// Output of a completion.
///
/// `full_text` is always the concatenation of `fragments` in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionResult {
    pub full_text: String,
    pub fragments: Vec<String>,
}

impl CompletionResult {
    pub(crate) fn push(&mut self, fragment: String) {
        self.full_text.push_str(&fragment);
        self.fragments.push(fragment);
    }
}
