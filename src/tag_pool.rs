//! The tag pool: every tag title known to the store.
//!
//! The pool is offered to the model so it reuses existing tags instead of
//! inventing near-duplicates. It is persisted as a JSON array in the settings
//! file and rebuilt from the store when missing or corrupt.

use std::collections::HashSet;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::reconcile::list_all_note_tags;
use crate::store::{NoteStore, PageRequest};

/// Maximum number of pool entries embedded in a prompt.
pub const TAG_POOL_PROMPT_LIMIT: usize = 200;

/// Page size used when scanning notes to rebuild the pool.
const REFRESH_PAGE_SIZE: u32 = 50;

/// Sorted, trimmed, de-duplicated list of tag titles.
///
/// Duplicates are removed by exact match, so `Rust` and `rust` may both be
/// present. Built pools are ordered case-insensitively; [`TagPool::append`]
/// adds to the end without re-sorting.
///
/// # Examples
///
/// ```
/// use aitag::TagPool;
///
/// let pool = TagPool::from_titles(["  web ", "Rust", "", "web", "api"]);
/// assert_eq!(pool.titles(), ["api", "Rust", "web"]);
/// assert_eq!(pool.to_json(), r#"["api","Rust","web"]"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagPool {
    tags: Vec<String>,
}

impl TagPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a normalised pool from arbitrary titles.
    pub fn from_titles<I, T>(titles: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut tags: Vec<String> = Vec::new();
        for title in titles {
            let cleaned = title.as_ref().trim();
            if cleaned.is_empty() || !seen.insert(cleaned.to_string()) {
                continue;
            }
            tags.push(cleaned.to_string());
        }
        tags.sort_by_cached_key(|tag| tag.to_lowercase());
        Self { tags }
    }

    /// Parses a persisted pool.
    ///
    /// Blank input yields an empty pool. Input that is not a JSON array of
    /// strings is logged and also yields an empty pool, which makes the caller
    /// rebuild it from the store.
    pub fn from_json(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
            Ok(values) => Self::from_titles(values.iter().filter_map(serde_json::Value::as_str)),
            Err(error) => {
                warn!(%error, "Failed to parse stored tag pool, it will be rebuilt");
                Self::default()
            }
        }
    }

    /// Serialises the pool as a JSON array.
    pub fn to_json(&self) -> String {
        serde_json::Value::from(self.tags.clone()).to_string()
    }

    /// Scans every note's tags and builds a fresh pool.
    pub fn refresh_from_store<S: NoteStore + ?Sized>(store: &S) -> Result<Self> {
        let mut collected = Vec::new();
        let mut page = PageRequest::first(REFRESH_PAGE_SIZE);
        loop {
            let notes = store.list_notes(page)?;
            for note in &notes.items {
                match list_all_note_tags(store, note.id()) {
                    Ok(tags) => {
                        collected.extend(tags.into_iter().map(|tag| tag.title().to_string()));
                    }
                    Err(error) => {
                        let message = format!("{error:#}");
                        warn!(
                            note_id = %note.id(),
                            error = %message,
                            "Skipping note tags in pool refresh"
                        );
                    }
                }
            }
            if !notes.has_more {
                break;
            }
            page = page.next();
        }

        let pool = Self::from_titles(collected);
        info!(tags = pool.len(), "Tag pool rebuilt from store");
        Ok(pool)
    }

    /// Appends trimmed titles that are not already present.
    ///
    /// Existing entries keep their positions and new ones go to the end in
    /// the order given, so a batch's prompt prefix stays stable as it grows.
    pub fn append<I, T>(&mut self, titles: I)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        for title in titles {
            let cleaned = title.as_ref().trim();
            if !cleaned.is_empty() && !self.contains(cleaned) {
                self.tags.push(cleaned.to_string());
            }
        }
    }

    /// Returns all titles in order.
    pub fn titles(&self) -> &[String] {
        &self.tags
    }

    /// Returns the titles embedded in prompts (at most 200).
    pub fn for_prompt(&self) -> &[String] {
        &self.tags[..self.tags.len().min(TAG_POOL_PROMPT_LIMIT)]
    }

    /// Returns `true` if the exact title is in the pool.
    pub fn contains(&self, title: &str) -> bool {
        self.tags.iter().any(|tag| tag == title)
    }

    /// Returns the number of titles.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns `true` if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// One title per line, for display.
    pub fn preview(&self) -> String {
        self.tags.join("\n")
    }
}
