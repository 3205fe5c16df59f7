//! Incremental Server-Sent-Events decoding for chat-completion streams.

use serde_json::Value;
use tracing::warn;

/// Incremental decoder for an SSE chat-completion body.
///
/// Bytes are appended to a rolling buffer and split on blank-line separators
/// (`\n\n`, `\r\n\r\n`, or mixed). An event block is only decoded once its
/// separator has arrived, so blocks may span any number of network chunks.
/// The buffer holds raw bytes: separators are ASCII, so a complete block never
/// ends inside a multi-byte UTF-8 sequence.
///
/// Within a block only `data:` lines count. The `[DONE]` sentinel ends the
/// stream and everything after it is ignored. Payloads that are not valid JSON
/// are logged and skipped.
///
/// # Examples
///
/// ```
/// use aitag::completion::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// let mut fragments = decoder.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel");
/// assert!(fragments.is_empty());
///
/// fragments.extend(decoder.feed(b"lo\"}}]}\n\ndata: [DONE]\n\n"));
/// assert_eq!(fragments, vec!["Hello"]);
/// assert!(decoder.is_done());
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once `[DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Appends a network chunk and returns the fragments of every event block
    /// it completes, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut fragments = Vec::new();
        if self.done {
            return fragments;
        }

        self.buffer.extend_from_slice(chunk);

        while let Some((block_end, next_start)) = find_separator(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..next_start).take(block_end).collect();
            self.process_block(&String::from_utf8_lossy(&block), &mut fragments);
            if self.done {
                self.buffer.clear();
                break;
            }
        }

        fragments
    }

    /// Decodes whatever is left in the buffer as a final block.
    ///
    /// Servers do not always terminate the last event with a blank line.
    pub fn finish(&mut self) -> Vec<String> {
        let mut fragments = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.process_block(&String::from_utf8_lossy(&rest), &mut fragments);
        }
        self.buffer.clear();
        fragments
    }

    fn process_block(&mut self, block: &str, fragments: &mut Vec<String>) {
        for raw_line in block.split('\n') {
            let line = raw_line.trim();
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim();
            if payload.is_empty() {
                continue;
            }
            if payload == "[DONE]" {
                self.done = true;
                return;
            }

            match serde_json::from_str::<Value>(payload) {
                Ok(value) => {
                    if let Some(fragment) = extract_fragment(&value) {
                        fragments.push(fragment.to_string());
                    }
                }
                Err(error) => {
                    warn!(payload, %error, "Skipping malformed streaming chunk");
                }
            }
        }
    }
}

/// Reads the fragment of one event payload.
///
/// Streaming chunks carry `choices[0].delta.content`; some servers send the
/// non-streaming `choices[0].message.content` shape inside a stream.
fn extract_fragment(value: &Value) -> Option<&str> {
    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .or_else(|| {
            value
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
        })
        .filter(|fragment| !fragment.is_empty())
}

/// Finds the first blank-line separator (`\r?\n\r?\n`).
///
/// Returns the end of the block (exclusive, before any `\r`) and the index
/// just past the separator.
fn find_separator(buffer: &[u8]) -> Option<(usize, usize)> {
    for (i, &byte) in buffer.iter().enumerate() {
        if byte != b'\n' {
            continue;
        }
        let mut j = i + 1;
        if buffer.get(j) == Some(&b'\r') {
            j += 1;
        }
        if buffer.get(j) == Some(&b'\n') {
            let block_end = if i > 0 && buffer[i - 1] == b'\r' {
                i - 1
            } else {
                i
            };
            return Some((block_end, j + 1));
        }
    }
    None
}
