//! Tag reconciliation: bringing a note's tags in line with a desired set.
//!
//! Matching is case-insensitive throughout. Existing tags whose lowercase
//! title is not desired are detached; desired titles with no existing match
//! are resolved to an id (cache, then store scan, then creation) and attached.
//! Tags present on both sides are left untouched.

use anyhow::{Context, Result};
use tracing::debug;

use crate::context::TagIdCache;
use crate::store::{NoteStore, collect_all};
use crate::{NoteId, Tag, TagId};

/// Page size for tag listings.
pub const TAG_PAGE_SIZE: u32 = 100;

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagReconciliation {
    /// Tags newly attached to the note.
    pub added: usize,
    /// Tags detached from the note.
    pub removed: usize,
    /// The cleaned desired titles. Not re-read from the store.
    pub final_tags: Vec<String>,
}

impl TagReconciliation {
    /// Returns `true` if anything was attached or detached.
    pub fn changed(&self) -> bool {
        self.added > 0 || self.removed > 0
    }
}

/// Lists every tag attached to a note.
pub fn list_all_note_tags<S: NoteStore + ?Sized>(store: &S, note: NoteId) -> Result<Vec<Tag>> {
    collect_all(TAG_PAGE_SIZE, |page| store.list_note_tags(note, page))
}

/// Resolves a tag title to an id, creating the tag if no title matches.
///
/// The cache is consulted first; on a miss every tag in the store is scanned
/// for a case-insensitive match. The resolved id is cached either way.
pub fn get_or_create_tag_id<S: NoteStore + ?Sized>(
    store: &S,
    cache: &mut TagIdCache,
    title: &str,
) -> Result<TagId> {
    let cleaned = title.trim();
    if let Some(id) = cache.get(cleaned) {
        debug!(tag = cleaned, %id, "Tag id cache hit");
        return Ok(id);
    }

    let key = cleaned.to_lowercase();
    let existing = collect_all(TAG_PAGE_SIZE, |page| store.list_tags(page))?
        .into_iter()
        .find(|tag| tag.key() == key);

    let id = match existing {
        Some(tag) => tag.id(),
        None => store
            .create_tag(cleaned)
            .with_context(|| format!("Failed to create tag '{cleaned}'"))?
            .id(),
    };

    cache.insert(cleaned, id);
    Ok(id)
}

/// Applies desired tag titles to notes with the minimum number of changes.
///
/// # Examples
///
/// ```
/// use aitag::{Database, TagIdCache, TagReconciler};
///
/// # fn main() -> anyhow::Result<()> {
/// let db = Database::in_memory()?;
/// let note = db.create_note("", "body", None)?;
/// let mut cache = TagIdCache::new();
///
/// let mut reconciler = TagReconciler::new(&db, &mut cache);
/// let outcome = reconciler.apply(note.id(), &["rust", " web ", "Rust"])?;
///
/// assert_eq!(outcome.added, 2);
/// assert_eq!(outcome.final_tags, vec!["rust", "web", "Rust"]);
/// # Ok(())
/// # }
/// ```
pub struct TagReconciler<'a, S: NoteStore + ?Sized> {
    store: &'a S,
    cache: &'a mut TagIdCache,
}

impl<'a, S: NoteStore + ?Sized> TagReconciler<'a, S> {
    pub fn new(store: &'a S, cache: &'a mut TagIdCache) -> Self {
        Self { store, cache }
    }

    /// Replaces the note's tags with `desired`.
    ///
    /// Store errors propagate; changes made before the failure are kept.
    pub fn apply<T: AsRef<str>>(&mut self, note: NoteId, desired: &[T]) -> Result<TagReconciliation> {
        let cleaned = clean_titles(desired);

        // Lowercase key to title, first key position, last spelling
        let mut wanted: Vec<(String, &str)> = Vec::new();
        for title in &cleaned {
            let key = title.to_lowercase();
            match wanted.iter_mut().find(|entry| entry.0 == key) {
                Some(entry) => entry.1 = title.as_str(),
                None => wanted.push((key, title.as_str())),
            }
        }

        let existing = list_all_note_tags(self.store, note)?;

        let mut removed = 0;
        for tag in &existing {
            let key = tag.key();
            if !wanted.iter().any(|entry| entry.0 == key) {
                self.store.detach_tag(tag.id(), note)?;
                removed += 1;
            }
        }

        let mut added = 0;
        for (key, title) in &wanted {
            if existing.iter().any(|tag| tag.key() == *key) {
                continue;
            }
            let id = get_or_create_tag_id(self.store, self.cache, title)?;
            self.store.attach_tag(id, note)?;
            added += 1;
        }

        debug!(%note, added, removed, "Reconciled note tags");

        Ok(TagReconciliation {
            added,
            removed,
            final_tags: cleaned,
        })
    }

    /// Detaches every tag from the note and returns how many were removed.
    pub fn remove_all(&mut self, note: NoteId) -> Result<usize> {
        remove_all_tags(self.store, note)
    }
}

/// Detaches every tag from a note and returns how many were removed.
pub fn remove_all_tags<S: NoteStore + ?Sized>(store: &S, note: NoteId) -> Result<usize> {
    let existing = list_all_note_tags(store, note)?;
    for tag in &existing {
        store.detach_tag(tag.id(), note)?;
    }
    Ok(existing.len())
}

/// Trims, drops empty entries, and removes exact duplicates in order.
fn clean_titles<T: AsRef<str>>(titles: &[T]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for title in titles {
        let trimmed = title.as_ref().trim();
        if !trimmed.is_empty() && !cleaned.iter().any(|t| t == trimmed) {
            cleaned.push(trimmed.to_string());
        }
    }
    cleaned
}
