//! Chat-completion client for OpenAI-compatible endpoints.
//!
//! The client issues a single POST to `{base_url}/chat/completions` and handles
//! both response shapes a compatible server may choose:
//!
//! - a plain JSON document (`choices[0].message.content`), delivered as one
//!   fragment, or
//! - a Server-Sent-Events stream of `data: {...}` frames terminated by
//!   `data: [DONE]`, decoded incrementally by [`SseDecoder`].
//!
//! Fragments are handed to an optional [`FragmentSink`] in arrival order while
//! the full text is accumulated into a [`CompletionResult`].
//!
//! # Examples
//!
//! ```no_run
//! use aitag::completion::{ChatOptions, CompletionClientBuilder, CompletionClientTrait, SinkError};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CompletionClientBuilder::new()
//!     .base_url("https://api.deepseek.com/v1")
//!     .api_key("sk-...")
//!     .build()?;
//!
//! let mut print = |fragment: &str| -> Result<(), SinkError> {
//!     print!("{fragment}");
//!     Ok(())
//! };
//! let result = client.complete("Say hello", Some(&mut print), &ChatOptions::default())?;
//! println!("\n{} fragments", result.fragments.len());
//! # Ok(())
//! # }
//! ```

mod client;
mod sse;
mod types;

pub use client::{
    CompletionClient, CompletionClientBuilder, CompletionClientTrait, CompletionError,
    DEFAULT_BASE_URL, DEFAULT_MODEL, completions_endpoint,
};
pub use sse::SseDecoder;
pub use types::{
    ChatMessage, ChatOptions, CompletionRequest, CompletionResult, FragmentSink, SinkError,
};
