//! AI title and tag generation for notes.
//!
//! The crate streams chat completions from an OpenAI-compatible endpoint,
//! turns the model's answer into a title and a bounded tag list, and applies
//! them to notes with the fewest tag changes. Notes, folders, and tags are
//! reached through the paginated [`store::NoteStore`] trait; [`Database`] is
//! the SQLite implementation used by the CLI.

pub mod completion;
pub mod config;
pub mod context;
pub mod db;
pub mod metadata;
pub mod models;
pub mod notebook;
pub mod prompt;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod tag_pool;
pub mod utils;

pub use config::Settings;
pub use context::{AiContext, TagIdCache};
pub use db::Database;
pub use metadata::{AiMetadata, clamp_tag_limit, normalise_title, parse_ai_title_and_tags};
pub use models::{Folder, FolderId, Note, NoteBuilder, NoteId, Tag, TagId};
pub use reconcile::{TagReconciler, TagReconciliation};
pub use service::{
    BatchSummary, ClearSummary, EnrichmentService, NoteOutcome, NoteUpdate, SkipReason,
};
pub use tag_pool::TagPool;
