/// Chat-completion HTTP client implementation.
///
/// This module provides `CompletionClient` for making synchronous requests to an
/// OpenAI-compatible `/chat/completions` endpoint, along with error types and the
/// builder used to configure it.
use std::io::{self, Read};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::sse::SseDecoder;
use super::types::{ChatOptions, CompletionRequest, CompletionResult, FragmentSink, SinkError};

/// Base URL used when neither the builder nor `AITAG_BASE_URL` provides one.
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";

/// Model used when neither the builder, the options, nor `AITAG_MODEL` provides one.
pub const DEFAULT_MODEL: &str = "deepseek-chat";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_CHUNK_SIZE: usize = 8 * 1024;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Errors that can occur when requesting a chat completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Network-related errors (connection failures, DNS resolution, timeouts)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Non-2xx response; `body` is the drained response text
    #[error("HTTP error: status {status}: {body}")]
    Http { status: u16, body: String },

    /// A non-streaming response body that is not valid JSON
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Endpoint that is not an absolute http(s) URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Prompt that is empty after trimming
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    /// Failure while reading an event stream
    #[error("Stream read error: {0}")]
    Stream(#[source] io::Error),

    /// The fragment sink rejected a fragment
    #[error("Fragment sink failed: {0}")]
    Sink(#[source] SinkError),
}

/// Returns the chat-completions endpoint for a base URL.
///
/// Trailing slashes are stripped before `/chat/completions` is appended.
///
/// ```
/// use aitag::completion::completions_endpoint;
///
/// assert_eq!(
///     completions_endpoint("https://api.example.com/v1///"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn completions_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Builder for constructing `CompletionClient` instances.
///
/// # Examples
///
/// ```
/// use aitag::completion::CompletionClientBuilder;
///
/// let client = CompletionClientBuilder::new()
///     .base_url("http://localhost:8080/v1")
///     .api_key("test-key")
///     .build()
///     .expect("Failed to create client");
/// assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
/// ```
#[derive(Debug, Default)]
pub struct CompletionClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
}

impl CompletionClientBuilder {
    /// Creates a new `CompletionClientBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API base URL (e.g. `https://api.deepseek.com/v1`).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the bearer token sent with every request.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the default model name.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets a total request timeout. Streams are unbounded when unset.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the `CompletionClient` with the configured settings.
    ///
    /// # Environment Variables
    ///
    /// Values not set on the builder are read from `AITAG_BASE_URL`,
    /// `AITAG_API_KEY` and `AITAG_MODEL`. Without them the base URL defaults
    /// to [`DEFAULT_BASE_URL`], the key to an empty string and the model to
    /// [`DEFAULT_MODEL`].
    pub fn build(self) -> Result<CompletionClient, CompletionError> {
        let base_url = self
            .base_url
            .or_else(|| std::env::var("AITAG_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let api_key = self
            .api_key
            .or_else(|| std::env::var("AITAG_API_KEY").ok())
            .unwrap_or_default();

        let model = self
            .model
            .or_else(|| std::env::var("AITAG_MODEL").ok())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let endpoint = completions_endpoint(&base_url);
        let url = reqwest::Url::parse(&endpoint)
            .map_err(|e| CompletionError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CompletionError::InvalidUrl(format!(
                "{}: unsupported scheme {}",
                base_url,
                url.scheme()
            )));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(CompletionError::Network)?;

        Ok(CompletionClient {
            client,
            endpoint,
            api_key,
            model,
        })
    }
}

/// Synchronous client for an OpenAI-compatible chat-completions endpoint.
///
/// Each call issues exactly one POST; there is no retry. Construct it with
/// `CompletionClientBuilder`.
pub struct CompletionClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

/// Trait for chat-completion operations.
///
/// This trait enables mocking in unit tests and decouples callers from the
/// HTTP transport.
pub trait CompletionClientTrait: Send + Sync {
    /// Requests a completion for `prompt`.
    ///
    /// Every non-empty fragment is passed to `sink` (when given) in arrival
    /// order before the next one is read. The returned result holds all
    /// fragments and their concatenation.
    fn complete(
        &self,
        prompt: &str,
        sink: Option<&mut dyn FragmentSink>,
        options: &ChatOptions,
    ) -> Result<CompletionResult, CompletionError>;
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl CompletionClient {
    /// Returns the full chat-completions URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the default model.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns `true` when an API key is configured.
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn complete_internal(
        &self,
        prompt: &str,
        mut sink: Option<&mut dyn FragmentSink>,
        options: &ChatOptions,
    ) -> Result<CompletionResult, CompletionError> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let request = CompletionRequest::new(
            self.endpoint.as_str(),
            self.api_key.as_str(),
            model,
            options.stream,
            options.system_message.clone(),
            prompt,
        )?;

        let request_id = next_request_id();
        let started = Instant::now();
        info!(
            request_id = %request_id,
            endpoint = %request.endpoint(),
            model = %request.model(),
            stream = request.streaming(),
            prompt_len = request.user_prompt().len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(request.endpoint())
            .bearer_auth(request.api_key())
            .header(ACCEPT, request.accept())
            .json(&request.body())
            .send()
            .map_err(CompletionError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(http_error(status.as_u16(), response.text()));
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("text/event-stream"));

        let mut result = CompletionResult::default();
        if is_event_stream {
            debug!(request_id = %request_id, "Consuming event stream");
            consume_event_stream(response, &mut sink, &mut result)?;
        } else {
            let text = response.text().map_err(CompletionError::Network)?;
            if let Some(content) = parse_json_completion(&text)? {
                deliver(&mut sink, &mut result, content)?;
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            request_id = %request_id,
            duration_ms,
            response_len = result.full_text.len(),
            fragments = result.fragments.len(),
            "Chat completion finished"
        );

        Ok(result)
    }
}

impl CompletionClientTrait for CompletionClient {
    fn complete(
        &self,
        prompt: &str,
        sink: Option<&mut dyn FragmentSink>,
        options: &ChatOptions,
    ) -> Result<CompletionResult, CompletionError> {
        self.complete_internal(prompt, sink, options)
    }
}

fn next_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let seq = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("req-{millis}-{seq}")
}

/// Hands one fragment to the sink, then records it.
fn deliver(
    sink: &mut Option<&mut dyn FragmentSink>,
    result: &mut CompletionResult,
    fragment: String,
) -> Result<(), CompletionError> {
    if let Some(sink) = sink.as_mut() {
        sink.on_fragment(&fragment).map_err(CompletionError::Sink)?;
    }
    result.push(fragment);
    Ok(())
}

/// Reads an SSE body to the end (or `[DONE]`), delivering fragments in order.
fn consume_event_stream<R: Read>(
    mut reader: R,
    sink: &mut Option<&mut dyn FragmentSink>,
    result: &mut CompletionResult,
) -> Result<(), CompletionError> {
    let mut decoder = SseDecoder::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CompletionError::Stream(e)),
        };

        for fragment in decoder.feed(&buf[..read]) {
            deliver(sink, result, fragment)?;
        }
        if decoder.is_done() {
            return Ok(());
        }
    }

    for fragment in decoder.finish() {
        deliver(sink, result, fragment)?;
    }
    Ok(())
}

/// Builds the error for a non-success status.
///
/// An unreadable body still yields [`CompletionError::Http`] so the status is
/// not lost.
fn http_error<E: Display>(status: u16, body: Result<String, E>) -> CompletionError {
    let body = match body {
        Ok(body) => body,
        Err(error) => {
            let message = error.to_string();
            warn!(status, error = %message, "Failed to read error response body");
            format!("<unreadable body: {message}>")
        }
    };
    CompletionError::Http { status, body }
}

/// Parses a non-streaming body and returns `choices[0].message.content`.
///
/// Missing or empty content yields `None`.
fn parse_json_completion(text: &str) -> Result<Option<String>, CompletionError> {
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(CompletionError::Serialization)?;
    Ok(json
        .pointer("/choices/0/message/content")
        .and_then(serde_json::Value::as_str)
        .filter(|content| !content.is_empty())
        .map(str::to_string))
}
