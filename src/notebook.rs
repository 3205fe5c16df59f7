//! Note traversal: whole store, or a folder and all of its descendants.

use std::collections::HashSet;

use anyhow::Result;
use tracing::warn;

use crate::store::{NoteStore, PageRequest};
use crate::{FolderId, Note};

/// Page size for sub-folder listings.
const FOLDER_PAGE_SIZE: u32 = 50;

/// Returns the ids of `root` and every folder nested below it.
///
/// Traversal is depth-first and each folder is visited once, even if the
/// store reports a cycle. A missing root yields an empty list. A sub-folder
/// listing that fails is logged; children from pages already fetched are
/// kept and the rest of that branch is skipped.
pub fn collect_notebook_folder_ids<S: NoteStore + ?Sized>(
    store: &S,
    root: FolderId,
) -> Result<Vec<FolderId>> {
    if store.get_folder(root)?.is_none() {
        return Ok(Vec::new());
    }

    let mut collected = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![root];

    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        collected.push(current);

        let mut page = PageRequest::first(FOLDER_PAGE_SIZE);
        loop {
            let children = match store.list_child_folders(current, page) {
                Ok(children) => children,
                Err(error) => {
                    let message = format!("{error:#}");
                    warn!(folder = %current, error = %message, "Failed to list sub-folders");
                    break;
                }
            };
            stack.extend(
                children
                    .items
                    .iter()
                    .map(|child| child.id())
                    .filter(|id| !seen.contains(id)),
            );
            if !children.has_more {
                break;
            }
            page = page.next();
        }
    }

    Ok(collected)
}

/// Calls `visit` for every note in the notebook rooted at `root`.
///
/// Notes are fetched `page_size` at a time, folder by folder. A folder whose
/// note listing fails is logged and skipped. An error from `visit` stops the
/// walk and is returned.
pub fn for_each_note_in_notebook<S, F>(
    store: &S,
    root: FolderId,
    page_size: u32,
    mut visit: F,
) -> Result<()>
where
    S: NoteStore + ?Sized,
    F: FnMut(Note) -> Result<()>,
{
    for folder in collect_notebook_folder_ids(store, root)? {
        let mut page = PageRequest::first(page_size);
        loop {
            let notes = match store.list_folder_notes(folder, page) {
                Ok(notes) => notes,
                Err(error) => {
                    let message = format!("{error:#}");
                    warn!(%folder, error = %message, "Failed to list notes");
                    break;
                }
            };
            for note in notes.items {
                visit(note)?;
            }
            if !notes.has_more {
                break;
            }
            page = page.next();
        }
    }
    Ok(())
}

/// Calls `visit` for every note in the store, `page_size` at a time.
pub fn for_each_note<S, F>(store: &S, page_size: u32, mut visit: F) -> Result<()>
where
    S: NoteStore + ?Sized,
    F: FnMut(Note) -> Result<()>,
{
    let mut page = PageRequest::first(page_size);
    loop {
        let notes = store.list_notes(page)?;
        for note in notes.items {
            visit(note)?;
        }
        if !notes.has_more {
            return Ok(());
        }
        page = page.next();
    }
}
