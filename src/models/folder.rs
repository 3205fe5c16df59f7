use serde::{Deserialize, Serialize};

use super::FolderId;

/// A folder (notebook). Folders nest through `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    id: FolderId,
    title: String,
    parent_id: Option<FolderId>,
}

impl Folder {
    /// Creates a new folder.
    pub fn new(id: FolderId, title: impl Into<String>, parent_id: Option<FolderId>) -> Self {
        Self {
            id,
            title: title.into(),
            parent_id,
        }
    }

    /// Returns the folder's unique identifier.
    pub fn id(&self) -> FolderId {
        self.id
    }

    /// Returns the folder title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the parent folder, or `None` for a top-level notebook.
    pub fn parent_id(&self) -> Option<FolderId> {
        self.parent_id
    }
}
