//! Prompt construction for title and tag generation.
//!
//! The system message is an XML document carrying the user's title and tag
//! guidance (in CDATA), the tag pool, and the expected output format. The user
//! prompt carries the note itself.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::tag_pool::TagPool;

/// Note bodies longer than this many characters are truncated before prompting.
pub const MAX_BODY_CHARS: usize = 4000;

/// Placeholder shown to the model for notes without a title.
pub const UNTITLED_PLACEHOLDER: &str = "(untitled)";

/// Title guidance used when the configured prompt is blank.
pub const DEFAULT_TITLE_SYSTEM_PROMPT: &str = "You are a knowledge-management assistant. \
Write a concise, specific title that captures what the note is about.";

/// Tag guidance used when the configured prompt is blank.
pub const DEFAULT_TAG_SYSTEM_PROMPT: &str = "\
# Role
You are a strict generator of atomic tags.

# Background
Tags are combined freely later for filtering and search, so each tag must be a single, \
indivisible concept.

# Rules
1. **Primary entity first**
    The first tag is the most specific entity the note is about (a tool, project, or named \
concept). It is the only proper-noun tag allowed.

2. **Split compounds**
    Never emit compound tags. Split them into their parts:
    - noun phrases joined by \"of\" (\"backup of data\" -> `data, backup`)
    - two nouns glued together (\"data management\" -> `data, management`)
    - noun plus action (\"format conversion\" -> `format, conversion`)

3. **Pure parts of speech**
    Every tag is either a single-concept noun (`Python`) or a clear gerund/action noun \
(`backup`, `migration`).

# Procedure
1. **Anchor**: pick the most specific entity as the first tag
2. **Decompose**: extract the remaining actions, attributes, and domains, splitting every compound
3. **Check**: make sure every tag is atomic and independent of the others";

static HEADING: LazyLock<Regex> = LazyLock::new(|| build_regex(r"\s*(#+\s+)"));
static QUOTE: LazyLock<Regex> = LazyLock::new(|| build_regex(r"\s*((?:>+\s+))"));
static BULLET: LazyLock<Regex> = LazyLock::new(|| build_regex(r"\s*((?:[-*+]\s+))"));
static NUMBERED: LazyLock<Regex> = LazyLock::new(|| build_regex(r"\s*((?:\d+\.\s+))"));
static FENCE: LazyLock<Regex> = LazyLock::new(|| build_regex(r"\s*(```)"));
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| build_regex(r"\n{3,}"));

fn build_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

/// Escapes the five XML special characters.
///
/// ```
/// use aitag::prompt::escape_xml;
///
/// assert_eq!(escape_xml("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
/// ```
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Wraps text in a CDATA section, splitting any embedded `]]>`.
///
/// ```
/// use aitag::prompt::wrap_in_cdata;
///
/// assert_eq!(wrap_in_cdata(""), "<![CDATA[]]>");
/// assert_eq!(wrap_in_cdata("a]]>b"), "<![CDATA[a]]]]><![CDATA[>b]]>");
/// ```
pub fn wrap_in_cdata(input: &str) -> String {
    format!("<![CDATA[{}]]>", input.replace("]]>", "]]]]><![CDATA[>"))
}

/// Cleans up a user-edited prompt.
///
/// Literal `\n` and `\r\n` escape sequences become real newlines. Single-line
/// input pasted from a form field gets line breaks restored before markdown
/// markers (headings, quotes, bullets, numbered items, code fences). Runs of
/// blank lines are collapsed and trailing whitespace is removed from each line.
pub fn normalise_prompt_input(raw: &str) -> String {
    let unescaped = raw
        .replace("\r\n", "\n")
        .replace("\\r\\n", "\n")
        .replace("\\n", "\n");

    let trimmed = unescaped.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if trimmed.contains('\n') {
        return collapse_blank_lines(trimmed);
    }

    let mut structured = trimmed.to_string();
    for pattern in [&*HEADING, &*QUOTE, &*BULLET, &*NUMBERED, &*FENCE] {
        structured = insert_breaks(&structured, pattern);
    }
    collapse_blank_lines(&structured)
}

fn insert_breaks(value: &str, pattern: &Regex) -> String {
    pattern
        .replace_all(value, |caps: &Captures<'_>| {
            let marker = &caps[1];
            if caps.get(0).is_some_and(|m| m.start() == 0) {
                marker.to_string()
            } else {
                format!("\n{marker}")
            }
        })
        .into_owned()
}

fn collapse_blank_lines(value: &str) -> String {
    BLANK_RUN
        .replace_all(value, "\n\n")
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncates a note body to [`MAX_BODY_CHARS`] characters.
pub fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Builds the system message for title and tag generation.
///
/// Blank guidance falls back to the built-in defaults. At most the first
/// 200 tag-pool entries are listed.
pub fn build_system_message(
    title_prompt: &str,
    tag_prompt: &str,
    tag_limit: usize,
    tag_pool: &TagPool,
) -> String {
    let title_guidance = non_empty_or(normalise_prompt_input(title_prompt), DEFAULT_TITLE_SYSTEM_PROMPT);
    let tag_guidance = non_empty_or(normalise_prompt_input(tag_prompt), DEFAULT_TAG_SYSTEM_PROMPT);

    let mut lines = vec![
        "<systemInstructions>".to_string(),
        "  <meta>".to_string(),
        "    <role>ai-tools</role>".to_string(),
        "    <purpose>generate-note-title-and-tags</purpose>".to_string(),
        "    <language>en</language>".to_string(),
        "    <version>1.0</version>".to_string(),
        "  </meta>".to_string(),
        format!("  <titleGuidance>{}</titleGuidance>", wrap_in_cdata(&title_guidance)),
        format!("  <tagGuidance>{}</tagGuidance>", wrap_in_cdata(&tag_guidance)),
        "  <reusePolicy>".to_string(),
        "    <item>Prefer semantically matching tags from the tag pool; create a new tag only when nothing fits.</item>".to_string(),
        "  </reusePolicy>".to_string(),
    ];

    push_tag_list(&mut lines, "tagPool", tag_pool);

    lines.extend([
        "  <output>".to_string(),
        r#"    <format>{"title":"...","tags":["..."]}</format>"#.to_string(),
        format!("    <tagLimit>{tag_limit}</tagLimit>"),
        "    <constraints>".to_string(),
        "      <item>Do not return anything outside the JSON object.</item>".to_string(),
        "      <item>Ensure tags are relevant, deduplicated, and trimmed.</item>".to_string(),
        "    </constraints>".to_string(),
        "  </output>".to_string(),
        "</systemInstructions>".to_string(),
    ]);

    lines.join("\n")
}

/// Builds the user prompt describing one note.
///
/// ```
/// use aitag::prompt::build_user_prompt;
/// use aitag::TagPool;
///
/// let prompt = build_user_prompt("", "Body & more", &TagPool::default());
/// assert!(prompt.contains("<originalTitle>(untitled)</originalTitle>"));
/// assert!(prompt.contains("<body><![CDATA[Body & more]]></body>"));
/// ```
pub fn build_user_prompt(original_title: &str, body: &str, tag_pool: &TagPool) -> String {
    let title = if original_title.is_empty() {
        UNTITLED_PLACEHOLDER
    } else {
        original_title
    };

    let mut lines = vec![
        "<note>".to_string(),
        format!("  <originalTitle>{}</originalTitle>", escape_xml(title)),
        format!("  <body>{}</body>", wrap_in_cdata(body)),
    ];
    push_tag_list(&mut lines, "tagPoolSnapshot", tag_pool);
    lines.push("</note>".to_string());

    lines.join("\n")
}

fn push_tag_list(lines: &mut Vec<String>, element: &str, tag_pool: &TagPool) {
    let tags = tag_pool.for_prompt();
    if tags.is_empty() {
        return;
    }
    lines.push(format!("  <{element}>"));
    for tag in tags {
        lines.push(format!("    <tag>{}</tag>", escape_xml(tag)));
    }
    lines.push(format!("  </{element}>"));
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}
