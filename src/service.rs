use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::completion::{ChatOptions, CompletionClientTrait, CompletionResult, FragmentSink};
use crate::config::Settings;
use crate::context::{AiContext, TagIdCache};
use crate::metadata::parse_ai_title_and_tags;
use crate::notebook::{for_each_note, for_each_note_in_notebook};
use crate::prompt::{build_system_message, build_user_prompt, truncate_body};
use crate::reconcile::{TagReconciler, TagReconciliation, remove_all_tags};
use crate::store::NoteStore;
use crate::tag_pool::TagPool;
use crate::{FolderId, Note, NoteId};

/// Page size for note listings during batch generation.
const GENERATE_PAGE_SIZE: u32 = 20;

/// Page size for note listings while clearing tags.
const CLEAR_PAGE_SIZE: u32 = 50;

/// Why a note was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The note body is blank.
    EmptyBody,
    /// The model produced no usable title and no tags.
    NothingGenerated,
    /// The generated title and tags matched what the note already had.
    NoChanges,
}

/// Changes applied to one note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteUpdate {
    pub note_id: NoteId,
    /// The new title, if it was changed.
    pub new_title: Option<String>,
    /// Tag changes, if the model returned tags.
    pub tags: Option<TagReconciliation>,
}

impl NoteUpdate {
    pub fn title_updated(&self) -> bool {
        self.new_title.is_some()
    }

    pub fn tags_changed(&self) -> bool {
        self.tags.as_ref().is_some_and(TagReconciliation::changed)
    }
}

/// Result of generating metadata for one note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteOutcome {
    Updated(NoteUpdate),
    Skipped(SkipReason),
}

/// Aggregate result of a batch generation run.
///
/// Per-note failures do not stop the batch; they are collected in `errors`
/// as `"{note_id}: {message}"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    /// Notes whose title or tags changed.
    pub updated: usize,
    pub titles_updated: usize,
    /// Notes whose tags changed.
    pub tag_updates: usize,
    pub tags_added: usize,
    pub tags_removed: usize,
    pub skipped: Vec<NoteId>,
    pub errors: Vec<String>,
}

impl BatchSummary {
    fn record(&mut self, note_id: NoteId, outcome: Result<NoteOutcome>) {
        self.processed += 1;
        match outcome {
            Ok(NoteOutcome::Skipped(_)) => self.skipped.push(note_id),
            Ok(NoteOutcome::Updated(update)) => {
                self.updated += 1;
                if update.title_updated() {
                    self.titles_updated += 1;
                }
                if let Some(tags) = update.tags.as_ref()
                    && tags.changed()
                {
                    self.tag_updates += 1;
                    self.tags_added += tags.added;
                    self.tags_removed += tags.removed;
                }
            }
            Err(error) => {
                let message = format!("{error:#}");
                warn!(%note_id, error = %message, "Failed to update note");
                self.errors.push(format!("{note_id}: {message}"));
            }
        }
    }

    /// Returns `true` if any note gained or lost a tag.
    pub fn tags_changed(&self) -> bool {
        self.tags_added > 0 || self.tags_removed > 0
    }
}

/// Aggregate result of a clear-tags run.
///
/// Like [`BatchSummary`], a note that fails is recorded in `errors` and the
/// run continues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearSummary {
    pub processed: usize,
    /// Notes that had at least one tag removed.
    pub cleared_notes: usize,
    pub removed_tags: usize,
    pub errors: Vec<String>,
}

impl ClearSummary {
    fn record(&mut self, note_id: NoteId, outcome: Result<usize>) {
        self.processed += 1;
        match outcome {
            Ok(0) => {}
            Ok(removed) => {
                self.cleared_notes += 1;
                self.removed_tags += removed;
            }
            Err(error) => {
                let message = format!("{error:#}");
                warn!(%note_id, error = %message, "Failed to clear note tags");
                self.errors.push(format!("{note_id}: {message}"));
            }
        }
    }
}

/// Borrowed pieces needed to enrich one note.
///
/// Kept separate from the service so a batch can hold it while the store is
/// also borrowed for pagination.
struct Enricher<'a, S: NoteStore> {
    store: &'a S,
    client: &'a dyn CompletionClientTrait,
    settings: &'a Settings,
    tag_ids: &'a mut TagIdCache,
}

impl<S: NoteStore> Enricher<'_, S> {
    /// Generates and applies a title and tags for `note`.
    ///
    /// Final tag titles are added to `working_pool` so later notes in the
    /// same batch see them.
    fn enrich(&mut self, note: &Note, working_pool: &mut TagPool) -> Result<NoteOutcome> {
        if note.body().trim().is_empty() {
            return Ok(NoteOutcome::Skipped(SkipReason::EmptyBody));
        }

        let tag_limit = self.settings.effective_tag_limit();
        let system_message = build_system_message(
            &self.settings.title_system_prompt,
            &self.settings.tag_system_prompt,
            tag_limit,
            working_pool,
        );
        let prompt = build_user_prompt(note.title(), truncate_body(note.body()), working_pool);

        let completion =
            self.client
                .complete(&prompt, None, &ChatOptions::non_streaming(system_message))?;
        let metadata = parse_ai_title_and_tags(&completion.full_text, note.title(), tag_limit);

        let update_title = !metadata.title.is_empty() && metadata.title != note.title();
        let update_tags = !metadata.tags.is_empty();
        if !update_title && !update_tags {
            return Ok(NoteOutcome::Skipped(SkipReason::NothingGenerated));
        }

        if update_title {
            self.store.update_note_title(note.id(), &metadata.title)?;
        }

        let tags = if update_tags {
            let reconciliation =
                TagReconciler::new(self.store, &mut *self.tag_ids).apply(note.id(), &metadata.tags)?;
            working_pool.append(&reconciliation.final_tags);
            Some(reconciliation)
        } else {
            None
        };

        let update = NoteUpdate {
            note_id: note.id(),
            new_title: update_title.then_some(metadata.title),
            tags,
        };
        if !update.title_updated() && !update.tags_changed() {
            return Ok(NoteOutcome::Skipped(SkipReason::NoChanges));
        }
        Ok(NoteOutcome::Updated(update))
    }
}

/// AI enrichment of notes: title and tag generation, tag clearing, and chat.
///
/// Owns the store, the completion client, the settings, and the caches
/// (tag-id cache and tag pool). Settings changes made here, including the
/// persisted tag pool, are written back when a settings path is configured.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use aitag::{Database, EnrichmentService, Settings};
///
/// # fn main() -> anyhow::Result<()> {
/// let settings = Settings::default().with_env_overrides();
/// let client = settings.completion_client()?;
/// let db = Database::in_memory()?;
/// let note = db.create_note("", "Notes on borrowing and lifetimes", None)?;
///
/// let mut service = EnrichmentService::new(db, Arc::new(client), settings);
/// let outcome = service.generate_for_note(note.id())?;
/// println!("{outcome:?}");
/// # Ok(())
/// # }
/// ```
pub struct EnrichmentService<S: NoteStore> {
    store: S,
    client: Arc<dyn CompletionClientTrait>,
    settings: Settings,
    settings_path: Option<PathBuf>,
    context: AiContext,
}

impl<S: NoteStore> EnrichmentService<S> {
    /// Creates a service. Settings are kept in memory only.
    pub fn new(store: S, client: Arc<dyn CompletionClientTrait>, settings: Settings) -> Self {
        Self {
            store,
            client,
            settings,
            settings_path: None,
            context: AiContext::new(),
        }
    }

    /// Persists settings changes to `path`.
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn context(&self) -> &AiContext {
        &self.context
    }

    /// Drops the tag-id cache and the in-memory tag pool.
    pub fn reset_context(&mut self) {
        self.context.reset();
    }

    fn persist_settings(&self) -> Result<()> {
        if let Some(path) = &self.settings_path {
            self.settings.save(path)?;
        }
        Ok(())
    }

    fn require_api_key(&self) -> Result<()> {
        if !self.settings.has_api_key() {
            bail!("API key is not configured");
        }
        Ok(())
    }

    /// Returns the tag pool, loading it on first use.
    ///
    /// The persisted pool is used when it holds any tags; otherwise the pool is
    /// rebuilt from the store.
    pub fn ensure_tag_pool(&mut self) -> Result<&TagPool> {
        if self.context.tag_pool.is_none() {
            let stored = TagPool::from_json(&self.settings.tag_pool_storage);
            if stored.is_empty() {
                return self.refresh_tag_pool();
            }
            self.context.tag_pool = Some(stored);
        }
        Ok(self.context.tag_pool.get_or_insert_with(TagPool::default))
    }

    /// Rebuilds the tag pool from the store and persists it.
    pub fn refresh_tag_pool(&mut self) -> Result<&TagPool> {
        let pool = TagPool::refresh_from_store(&self.store)?;
        self.settings.tag_pool_storage = pool.to_json();
        self.persist_settings()?;
        Ok(self.context.tag_pool.insert(pool))
    }

    /// Updates the title and tag guidance and the tag limit.
    ///
    /// `None` leaves a value unchanged; an empty string restores the built-in
    /// prompt.
    pub fn update_prompts(
        &mut self,
        title_prompt: Option<String>,
        tag_prompt: Option<String>,
        tag_limit: Option<i64>,
    ) -> Result<()> {
        if let Some(prompt) = title_prompt {
            self.settings.title_system_prompt = prompt;
        }
        if let Some(prompt) = tag_prompt {
            self.settings.tag_system_prompt = prompt;
        }
        if let Some(limit) = tag_limit {
            self.settings.tag_limit = limit;
        }
        self.persist_settings()
    }

    /// Generates a title and tags for one note and applies them.
    ///
    /// # Errors
    ///
    /// Fails if no API key is configured, the note does not exist, the
    /// completion fails, or the store rejects a change.
    pub fn generate_for_note(&mut self, note_id: NoteId) -> Result<NoteOutcome> {
        self.require_api_key()?;
        let Some(note) = self.store.get_note(note_id)? else {
            bail!("Note {note_id} not found");
        };
        if note.body().trim().is_empty() {
            return Ok(NoteOutcome::Skipped(SkipReason::EmptyBody));
        }

        let mut working_pool = self.ensure_tag_pool()?.clone();
        let outcome = Enricher {
            store: &self.store,
            client: self.client.as_ref(),
            settings: &self.settings,
            tag_ids: &mut self.context.tag_ids,
        }
        .enrich(&note, &mut working_pool)?;

        if let NoteOutcome::Updated(update) = &outcome
            && update.tags_changed()
        {
            self.refresh_tag_pool()?;
        }

        Ok(outcome)
    }

    /// Generates titles and tags for every note in a notebook and its sub-notebooks.
    pub fn generate_for_notebook(&mut self, folder: FolderId) -> Result<BatchSummary> {
        self.require_api_key()?;
        if self.store.get_folder(folder)?.is_none() {
            bail!("Notebook {folder} not found");
        }

        let summary = self.run_batch(|store, visit| {
            for_each_note_in_notebook(store, folder, GENERATE_PAGE_SIZE, visit)
        })?;
        info!(
            %folder,
            processed = summary.processed,
            updated = summary.updated,
            titles = summary.titles_updated,
            tag_updates = summary.tag_updates,
            skipped = summary.skipped.len(),
            errors = summary.errors.len(),
            "Notebook generation finished"
        );
        Ok(summary)
    }

    /// Generates titles and tags for every note in the store.
    pub fn generate_for_all_notes(&mut self) -> Result<BatchSummary> {
        self.require_api_key()?;

        let summary =
            self.run_batch(|store, visit| for_each_note(store, GENERATE_PAGE_SIZE, visit))?;
        info!(
            processed = summary.processed,
            updated = summary.updated,
            titles = summary.titles_updated,
            tag_updates = summary.tag_updates,
            skipped = summary.skipped.len(),
            errors = summary.errors.len(),
            "Generation for all notes finished"
        );
        Ok(summary)
    }

    /// Runs enrichment over the notes produced by `walk`.
    ///
    /// The working pool grows with each note's final tags. Afterwards the pool
    /// is rebuilt if any tags changed.
    fn run_batch<W>(&mut self, walk: W) -> Result<BatchSummary>
    where
        W: FnOnce(&S, &mut dyn FnMut(Note) -> Result<()>) -> Result<()>,
    {
        let mut working_pool = self.ensure_tag_pool()?.clone();
        let mut summary = BatchSummary::default();

        let mut enricher = Enricher {
            store: &self.store,
            client: self.client.as_ref(),
            settings: &self.settings,
            tag_ids: &mut self.context.tag_ids,
        };
        let mut visit = |note: Note| -> Result<()> {
            let outcome = enricher.enrich(&note, &mut working_pool);
            summary.record(note.id(), outcome);
            Ok(())
        };
        walk(&self.store, &mut visit)?;

        if summary.tags_changed() {
            self.refresh_tag_pool()?;
        } else {
            self.ensure_tag_pool()?;
        }
        Ok(summary)
    }

    /// Removes every tag from one note. Returns the number removed.
    pub fn clear_tags_for_note(&mut self, note_id: NoteId) -> Result<usize> {
        if self.store.get_note(note_id)?.is_none() {
            bail!("Note {note_id} not found");
        }
        let removed = remove_all_tags(&self.store, note_id)?;
        if removed > 0 {
            self.refresh_tag_pool()?;
        }
        Ok(removed)
    }

    /// Removes every tag from the notes of a notebook and its sub-notebooks.
    pub fn clear_tags_for_notebook(&mut self, folder: FolderId) -> Result<ClearSummary> {
        if self.store.get_folder(folder)?.is_none() {
            bail!("Notebook {folder} not found");
        }

        let mut summary = ClearSummary::default();
        for_each_note_in_notebook(&self.store, folder, CLEAR_PAGE_SIZE, |note| {
            summary.record(note.id(), remove_all_tags(&self.store, note.id()));
            Ok(())
        })?;
        info!(
            %folder,
            processed = summary.processed,
            cleared = summary.cleared_notes,
            removed = summary.removed_tags,
            errors = summary.errors.len(),
            "Notebook tags cleared"
        );

        self.finish_clear(&summary)?;
        Ok(summary)
    }

    /// Removes every tag from every note.
    pub fn clear_tags_for_all_notes(&mut self) -> Result<ClearSummary> {
        let mut summary = ClearSummary::default();
        for_each_note(&self.store, CLEAR_PAGE_SIZE, |note| {
            summary.record(note.id(), remove_all_tags(&self.store, note.id()));
            Ok(())
        })?;
        info!(
            processed = summary.processed,
            cleared = summary.cleared_notes,
            removed = summary.removed_tags,
            errors = summary.errors.len(),
            "All note tags cleared"
        );

        self.finish_clear(&summary)?;
        Ok(summary)
    }

    fn finish_clear(&mut self, summary: &ClearSummary) -> Result<()> {
        if summary.removed_tags > 0 {
            self.refresh_tag_pool()?;
        } else {
            self.ensure_tag_pool()?;
        }
        Ok(())
    }

    /// Streams a free-form chat completion into `sink`.
    pub fn chat(&self, prompt: &str, sink: &mut dyn FragmentSink) -> Result<CompletionResult> {
        self.require_api_key()?;
        if prompt.trim().is_empty() {
            bail!("Prompt cannot be empty");
        }
        Ok(self
            .client
            .complete(prompt, Some(sink), &ChatOptions::default())?)
    }
}

#[cfg(test)]
mod tests;
