//! Per-process runtime state shared by enrichment operations.

use std::collections::HashMap;

use crate::TagId;
use crate::tag_pool::TagPool;

/// Maps lowercase tag titles to store ids.
///
/// Entries are added on lookup or creation and never expire on their own.
/// A tag renamed or deleted outside this process leaves a stale entry until
/// [`TagIdCache::invalidate`] or [`TagIdCache::clear`] is called.
#[derive(Debug, Default, Clone)]
pub struct TagIdCache {
    ids: HashMap<String, TagId>,
}

impl TagIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a title case-insensitively.
    pub fn get(&self, title: &str) -> Option<TagId> {
        self.ids.get(&title.trim().to_lowercase()).copied()
    }

    /// Records the id for a title.
    pub fn insert(&mut self, title: &str, id: TagId) {
        self.ids.insert(title.trim().to_lowercase(), id);
    }

    /// Forgets one title.
    pub fn invalidate(&mut self, title: &str) -> Option<TagId> {
        self.ids.remove(&title.trim().to_lowercase())
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Caches owned by one enrichment session.
///
/// `tag_pool` is `None` until it has been loaded from settings or rebuilt
/// from the store.
#[derive(Debug, Default)]
pub struct AiContext {
    pub tag_ids: TagIdCache,
    pub tag_pool: Option<TagPool>,
}

impl AiContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops both caches.
    pub fn reset(&mut self) {
        self.tag_ids.clear();
        self.tag_pool = None;
    }
}
