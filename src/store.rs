//! Paginated note store interface.
//!
//! The enrichment core only talks to notes, folders, and tags through
//! `NoteStore`. Every listing operation is paginated with a 1-based page
//! cursor and a `has_more` flag; callers that need the full collection must
//! drive the cursor to exhaustion with [`collect_all`].

use anyhow::Result;

use crate::{Folder, FolderId, Note, NoteId, Tag, TagId};

/// A page request: 1-based page number and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Creates a request for the first page with the given page size.
    pub fn first(limit: u32) -> Self {
        Self { page: 1, limit }
    }

    /// Returns the request for the following page.
    pub fn next(self) -> Self {
        Self {
            page: self.page + 1,
            ..self
        }
    }

    /// Returns the number of items preceding this page.
    pub fn offset(self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Creates a page.
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        Self { items, has_more }
    }
}

/// Storage operations the enrichment core depends on.
///
/// Errors are not interpreted by the core; they propagate to the caller.
pub trait NoteStore {
    /// Lists all notes.
    fn list_notes(&self, page: PageRequest) -> Result<Page<Note>>;

    /// Fetches a single note.
    fn get_note(&self, id: NoteId) -> Result<Option<Note>>;

    /// Replaces a note's title.
    fn update_note_title(&self, id: NoteId, title: &str) -> Result<()>;

    /// Lists the notes directly inside a folder.
    fn list_folder_notes(&self, folder: FolderId, page: PageRequest) -> Result<Page<Note>>;

    /// Fetches a single folder.
    fn get_folder(&self, id: FolderId) -> Result<Option<Folder>>;

    /// Lists the direct sub-folders of a folder.
    fn list_child_folders(&self, folder: FolderId, page: PageRequest) -> Result<Page<Folder>>;

    /// Lists the tags attached to a note.
    fn list_note_tags(&self, note: NoteId, page: PageRequest) -> Result<Page<Tag>>;

    /// Lists every tag in the store.
    fn list_tags(&self, page: PageRequest) -> Result<Page<Tag>>;

    /// Creates a tag with the given title.
    fn create_tag(&self, title: &str) -> Result<Tag>;

    /// Attaches a tag to a note.
    fn attach_tag(&self, tag: TagId, note: NoteId) -> Result<()>;

    /// Detaches a tag from a note.
    fn detach_tag(&self, tag: TagId, note: NoteId) -> Result<()>;
}

impl<S: NoteStore + ?Sized> NoteStore for &S {
    fn list_notes(&self, page: PageRequest) -> Result<Page<Note>> {
        (**self).list_notes(page)
    }

    fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        (**self).get_note(id)
    }

    fn update_note_title(&self, id: NoteId, title: &str) -> Result<()> {
        (**self).update_note_title(id, title)
    }

    fn list_folder_notes(&self, folder: FolderId, page: PageRequest) -> Result<Page<Note>> {
        (**self).list_folder_notes(folder, page)
    }

    fn get_folder(&self, id: FolderId) -> Result<Option<Folder>> {
        (**self).get_folder(id)
    }

    fn list_child_folders(&self, folder: FolderId, page: PageRequest) -> Result<Page<Folder>> {
        (**self).list_child_folders(folder, page)
    }

    fn list_note_tags(&self, note: NoteId, page: PageRequest) -> Result<Page<Tag>> {
        (**self).list_note_tags(note, page)
    }

    fn list_tags(&self, page: PageRequest) -> Result<Page<Tag>> {
        (**self).list_tags(page)
    }

    fn create_tag(&self, title: &str) -> Result<Tag> {
        (**self).create_tag(title)
    }

    fn attach_tag(&self, tag: TagId, note: NoteId) -> Result<()> {
        (**self).attach_tag(tag, note)
    }

    fn detach_tag(&self, tag: TagId, note: NoteId) -> Result<()> {
        (**self).detach_tag(tag, note)
    }
}

/// Drives a paginated listing until `has_more` is false.
///
/// # Examples
///
/// ```
/// use aitag::store::{collect_all, Page, PageRequest};
///
/// let data: Vec<u32> = (0..7).collect();
/// let all = collect_all(3, |req| {
///     let start = req.offset() as usize;
///     let end = (start + req.limit as usize).min(data.len());
///     Ok(Page::new(data[start..end].to_vec(), end < data.len()))
/// })
/// .unwrap();
/// assert_eq!(all, data);
/// ```
pub fn collect_all<T, F>(limit: u32, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(PageRequest) -> Result<Page<T>>,
{
    let mut output = Vec::new();
    let mut request = PageRequest::first(limit);

    loop {
        let page = fetch(request)?;
        output.extend(page.items);
        if !page.has_more {
            break;
        }
        request = request.next();
    }

    Ok(output)
}

#[cfg(test)]
pub(crate) mod testing;
