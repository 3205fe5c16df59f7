//! Test store that injects listing failures on top of an in-memory database.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};

use super::{NoteStore, Page, PageRequest};
use crate::{Database, Folder, FolderId, Note, NoteId, Tag, TagId};

/// Wraps a [`Database`] and fails selected listings.
pub(crate) struct FaultyStore {
    inner: Database,
    /// Child-folder listings fail from this page onwards.
    child_folder_faults: HashMap<FolderId, u32>,
    folder_note_faults: HashSet<FolderId>,
    note_tag_faults: HashSet<NoteId>,
}

impl FaultyStore {
    pub(crate) fn new(inner: Database) -> Self {
        Self {
            inner,
            child_folder_faults: HashMap::new(),
            folder_note_faults: HashSet::new(),
            note_tag_faults: HashSet::new(),
        }
    }

    pub(crate) fn fail_child_folders(mut self, folder: FolderId, from_page: u32) -> Self {
        self.child_folder_faults.insert(folder, from_page);
        self
    }

    pub(crate) fn fail_folder_notes(mut self, folder: FolderId) -> Self {
        self.folder_note_faults.insert(folder);
        self
    }

    pub(crate) fn fail_note_tags(mut self, note: NoteId) -> Self {
        self.note_tag_faults.insert(note);
        self
    }

    pub(crate) fn inner(&self) -> &Database {
        &self.inner
    }
}

impl NoteStore for FaultyStore {
    fn list_notes(&self, page: PageRequest) -> Result<Page<Note>> {
        self.inner.list_notes(page)
    }

    fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        self.inner.get_note(id)
    }

    fn update_note_title(&self, id: NoteId, title: &str) -> Result<()> {
        self.inner.update_note_title(id, title)
    }

    fn list_folder_notes(&self, folder: FolderId, page: PageRequest) -> Result<Page<Note>> {
        if self.folder_note_faults.contains(&folder) {
            bail!("folder listing failed");
        }
        self.inner.list_folder_notes(folder, page)
    }

    fn get_folder(&self, id: FolderId) -> Result<Option<Folder>> {
        self.inner.get_folder(id)
    }

    fn list_child_folders(&self, folder: FolderId, page: PageRequest) -> Result<Page<Folder>> {
        if let Some(&from_page) = self.child_folder_faults.get(&folder)
            && page.page >= from_page
        {
            bail!("child folder listing failed");
        }
        self.inner.list_child_folders(folder, page)
    }

    fn list_note_tags(&self, note: NoteId, page: PageRequest) -> Result<Page<Tag>> {
        if self.note_tag_faults.contains(&note) {
            bail!("tag listing failed");
        }
        self.inner.list_note_tags(note, page)
    }

    fn list_tags(&self, page: PageRequest) -> Result<Page<Tag>> {
        self.inner.list_tags(page)
    }

    fn create_tag(&self, title: &str) -> Result<Tag> {
        self.inner.create_tag(title)
    }

    fn attach_tag(&self, tag: TagId, note: NoteId) -> Result<()> {
        self.inner.attach_tag(tag, note)
    }

    fn detach_tag(&self, tag: TagId, note: NoteId) -> Result<()> {
        self.inner.detach_tag(tag, note)
    }
}
