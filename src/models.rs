mod folder;
mod ids;
mod note;
mod tag;

pub use folder::Folder;
pub use ids::{FolderId, NoteId, TagId};
pub use note::{Note, NoteBuilder};
pub use tag::Tag;
