use serde::{Deserialize, Serialize};

use super::TagId;

/// A tag as stored in the note store.
///
/// Titles keep the case they were created with. Lookups against the store
/// and the tag-id cache compare titles case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    id: TagId,
    title: String,
}

impl Tag {
    /// Creates a new tag.
    ///
    /// # Examples
    ///
    /// ```
    /// use aitag::{Tag, TagId};
    ///
    /// let tag = Tag::new(TagId::new(1), "Rust");
    /// assert_eq!(tag.id(), TagId::new(1));
    /// assert_eq!(tag.title(), "Rust");
    /// assert_eq!(tag.key(), "rust");
    /// ```
    pub fn new(id: TagId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
        }
    }

    /// Returns the tag's unique identifier.
    pub fn id(&self) -> TagId {
        self.id
    }

    /// Returns the tag title as stored.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the lowercase title used for case-insensitive matching.
    pub fn key(&self) -> String {
        self.title.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_keeps_original_case() {
        let tag = Tag::new(TagId::new(3), "Machine-Learning");

        assert_eq!(tag.id(), TagId::new(3));
        assert_eq!(tag.title(), "Machine-Learning");
    }

    #[test]
    fn key_is_lowercase() {
        let tag = Tag::new(TagId::new(1), "ÉCOLE Notes");
        assert_eq!(tag.key(), "école notes");
    }
}
