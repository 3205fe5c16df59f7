//! Title and tag extraction from raw completion text.
//!
//! Models are asked to answer with `{"title": "...", "tags": ["..."]}` but
//! routinely wrap the object in prose or code fences. Extraction is best-effort
//! and never fails: the worst case is an empty title and no tags.

use serde_json::Value;

/// Maximum title length in characters.
pub const MAX_TITLE_CHARS: usize = 80;

/// Tag limit used when the configured value is missing or not positive.
pub const DEFAULT_TAG_LIMIT: usize = 3;

/// Upper bound for the configured tag limit.
pub const MAX_TAG_LIMIT: usize = 10;

const QUOTE_CHARS: &[char] = &['"', '\'', '“', '”', '‘', '’'];

/// Title and tags extracted from one completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AiMetadata {
    /// Normalised title; empty when nothing usable was produced.
    pub title: String,
    /// Tag titles in first-seen order, exact duplicates removed.
    pub tags: Vec<String>,
    /// The unmodified completion text.
    pub raw: String,
}

impl AiMetadata {
    /// Returns `true` when there is neither a title nor any tag to apply.
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.tags.is_empty()
    }
}

/// Parses a completion into a title and at most `max_tags` tags.
///
/// The JSON object is taken from the first `{` to the last `}` of the trimmed
/// text. If that fails to parse as an object, the whole trimmed text becomes
/// the candidate title. Titles equal to `fallback_title` are dropped so an
/// unchanged title is not reported as an update.
///
/// # Examples
///
/// ```
/// use aitag::parse_ai_title_and_tags;
///
/// let raw = "Sure! {\"title\": \"Rust Ownership\", \"tags\": [\"rust\", \"rust\", \"memory\"]}";
/// let metadata = parse_ai_title_and_tags(raw, "Old title", 5);
///
/// assert_eq!(metadata.title, "Rust Ownership");
/// assert_eq!(metadata.tags, vec!["rust", "memory"]);
/// ```
pub fn parse_ai_title_and_tags(raw: &str, fallback_title: &str, max_tags: usize) -> AiMetadata {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return AiMetadata {
            raw: raw.to_string(),
            ..AiMetadata::default()
        };
    }

    let payload = extract_json(trimmed).unwrap_or(trimmed);
    let (candidate_title, candidate_tags) = match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(object)) => {
            let title = object
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let tags = object
                .get("tags")
                .and_then(Value::as_array)
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::trim)
                        .filter(|tag| !tag.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            (title, tags)
        }
        _ => (trimmed.to_string(), Vec::new()),
    };

    let mut tags: Vec<String> = Vec::new();
    for tag in candidate_tags.into_iter().take(max_tags) {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    AiMetadata {
        title: normalise_title(&candidate_title, fallback_title),
        tags,
        raw: raw.to_string(),
    }
}

/// Reduces a candidate title to a single clean line.
///
/// Takes the first non-blank line, strips surrounding quotes and whitespace,
/// and truncates to [`MAX_TITLE_CHARS`]. Returns an empty string for
/// `untitled` (any case) and for a title equal to `fallback`.
///
/// ```
/// use aitag::normalise_title;
///
/// assert_eq!(normalise_title("\n  “Weekly Review”  \nmore", ""), "Weekly Review");
/// assert_eq!(normalise_title("Untitled", ""), "");
/// assert_eq!(normalise_title("Same", "Same"), "");
/// ```
pub fn normalise_title(raw: &str, fallback: &str) -> String {
    let Some(line) = raw.lines().map(str::trim).find(|line| !line.is_empty()) else {
        return String::new();
    };

    let stripped = line.trim_matches(|c: char| c.is_whitespace() || QUOTE_CHARS.contains(&c));
    if stripped.is_empty() {
        return String::new();
    }

    let title = if stripped.chars().count() > MAX_TITLE_CHARS {
        stripped
            .chars()
            .take(MAX_TITLE_CHARS)
            .collect::<String>()
            .trim()
            .to_string()
    } else {
        stripped.to_string()
    };

    if title.eq_ignore_ascii_case("untitled") || title == fallback {
        return String::new();
    }
    title
}

/// Clamps a configured tag limit into `1..=10`.
///
/// Values that are zero or negative fall back to [`DEFAULT_TAG_LIMIT`].
///
/// ```
/// use aitag::clamp_tag_limit;
///
/// assert_eq!(clamp_tag_limit(0), 3);
/// assert_eq!(clamp_tag_limit(7), 7);
/// assert_eq!(clamp_tag_limit(50), 10);
/// ```
pub fn clamp_tag_limit(raw: i64) -> usize {
    if raw <= 0 {
        return DEFAULT_TAG_LIMIT;
    }
    usize::try_from(raw)
        .unwrap_or(MAX_TAG_LIMIT)
        .clamp(1, MAX_TAG_LIMIT)
}

/// Extracts the brace-delimited JSON object from a response.
///
/// LLMs may wrap JSON in markdown code blocks or add explanatory text.
fn extract_json(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;

    if start < end {
        Some(&response[start..=end])
    } else {
        None
    }
}
