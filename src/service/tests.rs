use std::collections::VecDeque;
use std::sync::Mutex;

use super::*;
use crate::Database;
use crate::completion::{CompletionError, SinkError};
use crate::reconcile::list_all_note_tags;
use crate::store::testing::FaultyStore;

/// Scripted response for [`MockClient`].
enum MockReply {
    Text(&'static str),
    Http(u16),
}

/// Completion client that replays scripted replies and records requests.
#[derive(Default)]
struct MockClient {
    replies: Mutex<VecDeque<MockReply>>,
    prompts: Mutex<Vec<String>>,
    system_messages: Mutex<Vec<Option<String>>>,
}

impl MockClient {
    fn with_replies(replies: impl IntoIterator<Item = MockReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        })
    }

    fn silent() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn last_system_message(&self) -> Option<String> {
        self.system_messages.lock().unwrap().last().cloned().flatten()
    }
}

impl CompletionClientTrait for MockClient {
    fn complete(
        &self,
        prompt: &str,
        sink: Option<&mut dyn FragmentSink>,
        options: &ChatOptions,
    ) -> Result<CompletionResult, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.system_messages
            .lock()
            .unwrap()
            .push(options.system_message.clone());

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MockReply::Text(""));
        match reply {
            MockReply::Http(status) => Err(CompletionError::Http {
                status,
                body: "scripted failure".to_string(),
            }),
            MockReply::Text(text) => {
                let mut result = CompletionResult::default();
                let mut sink = sink;
                // Two fragments so streaming callers see more than one call
                let split = text.len() / 2;
                for fragment in [&text[..split], &text[split..]] {
                    if fragment.is_empty() {
                        continue;
                    }
                    if let Some(sink) = sink.as_mut() {
                        sink.on_fragment(fragment).map_err(CompletionError::Sink)?;
                    }
                    result.full_text.push_str(fragment);
                    result.fragments.push(fragment.to_string());
                }
                Ok(result)
            }
        }
    }
}

fn settings() -> Settings {
    Settings {
        api_key: "sk-test".to_string(),
        ..Settings::default()
    }
}

fn service_with(client: Arc<MockClient>) -> EnrichmentService<Database> {
    let db = Database::in_memory().expect("failed to create in-memory database");
    EnrichmentService::new(db, client, settings())
}

fn tag_titles(service: &EnrichmentService<Database>, note: NoteId) -> Vec<String> {
    let mut titles: Vec<String> = list_all_note_tags(service.store(), note)
        .expect("failed to list note tags")
        .into_iter()
        .map(|tag| tag.title().to_string())
        .collect();
    titles.sort();
    titles
}

fn note_title(service: &EnrichmentService<Database>, note: NoteId) -> String {
    service
        .store()
        .get_note(note)
        .expect("failed to load note")
        .expect("note should exist")
        .title()
        .to_string()
}

#[test]
fn generate_for_note_updates_title_and_tags() {
    let client = MockClient::with_replies([MockReply::Text(
        r#"{"title": "Ownership basics", "tags": ["rust", "memory"]}"#,
    )]);
    let mut service = service_with(client.clone());
    let note = service
        .store()
        .create_note("draft", "Notes about ownership and borrowing.", None)
        .expect("failed to create note");

    let outcome = service.generate_for_note(note.id()).expect("generation failed");

    let NoteOutcome::Updated(update) = outcome else {
        panic!("expected an update, got {outcome:?}");
    };
    assert_eq!(update.new_title.as_deref(), Some("Ownership basics"));
    assert_eq!(update.tags.as_ref().map(|t| t.added), Some(2));
    assert_eq!(note_title(&service, note.id()), "Ownership basics");
    assert_eq!(tag_titles(&service, note.id()), vec!["memory", "rust"]);

    // Tags changed, so the pool is rebuilt and persisted
    let pool = service.context().tag_pool.as_ref().expect("pool should be cached");
    assert_eq!(pool.titles(), ["memory", "rust"]);
    assert!(service.settings().tag_pool_storage.contains("memory"));
    assert_eq!(client.calls(), 1);
}

#[test]
fn generate_for_note_sends_non_streaming_request_with_guidance() {
    let client = MockClient::with_replies([MockReply::Text(r#"{"title":"T","tags":[]}"#)]);
    let mut service = service_with(client.clone());
    let note = service
        .store()
        .create_note("Old", "Body with <markup> & symbols", None)
        .expect("failed to create note");
    let mut cache = TagIdCache::new();
    TagReconciler::new(service.store(), &mut cache)
        .apply(note.id(), &["existing-topic"])
        .expect("failed to tag note");

    service.generate_for_note(note.id()).expect("generation failed");

    let system = client.last_system_message().expect("system message sent");
    assert!(system.contains("<systemInstructions>"));
    assert!(system.contains("<tagLimit>3</tagLimit>"));
    assert!(system.contains("existing-topic"));

    let prompt = client.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("<originalTitle>Old</originalTitle>"));
    assert!(prompt.contains("Body with <markup> & symbols"));
    assert!(prompt.contains("<tagPoolSnapshot>"));
}

#[test]
fn empty_body_is_skipped_without_calling_the_model() {
    let client = MockClient::silent();
    let mut service = service_with(client.clone());
    let note = service
        .store()
        .create_note("title", "   \n ", None)
        .expect("failed to create note");

    let outcome = service.generate_for_note(note.id()).expect("generation failed");

    assert_eq!(outcome, NoteOutcome::Skipped(SkipReason::EmptyBody));
    assert_eq!(client.calls(), 0);
}

#[test]
fn unchanged_title_and_tags_report_no_changes() {
    let client = MockClient::with_replies([
        MockReply::Text(r#"{"title":"Same","tags":["a"]}"#),
        MockReply::Text(r#"{"title":"Same","tags":["A"]}"#),
    ]);
    let mut service = service_with(client);
    let note = service
        .store()
        .create_note("Same", "body", None)
        .expect("failed to create note");

    let first = service.generate_for_note(note.id()).expect("first run failed");
    let second = service.generate_for_note(note.id()).expect("second run failed");

    assert!(matches!(first, NoteOutcome::Updated(_)));
    assert_eq!(second, NoteOutcome::Skipped(SkipReason::NoChanges));
}

#[test]
fn empty_model_output_is_skipped() {
    let client = MockClient::with_replies([MockReply::Text(r#"{"title":"","tags":[]}"#)]);
    let mut service = service_with(client);
    let note = service
        .store()
        .create_note("Keep me", "body", None)
        .expect("failed to create note");

    let outcome = service.generate_for_note(note.id()).expect("generation failed");

    assert_eq!(outcome, NoteOutcome::Skipped(SkipReason::NothingGenerated));
    assert_eq!(note_title(&service, note.id()), "Keep me");
}

#[test]
fn plain_text_reply_becomes_the_title() {
    let client = MockClient::with_replies([MockReply::Text("\"A plain title\"")]);
    let mut service = service_with(client);
    let note = service
        .store()
        .create_note("", "body", None)
        .expect("failed to create note");

    service.generate_for_note(note.id()).expect("generation failed");

    assert_eq!(note_title(&service, note.id()), "A plain title");
    assert!(tag_titles(&service, note.id()).is_empty());
}

#[test]
fn missing_api_key_is_rejected() {
    let client = MockClient::silent();
    let db = Database::in_memory().expect("failed to create in-memory database");
    let mut service = EnrichmentService::new(db, client.clone(), Settings::default());

    let err = service.generate_for_note(NoteId::new(1)).unwrap_err();

    assert!(err.to_string().contains("not configured"));
    assert_eq!(client.calls(), 0);
}

#[test]
fn missing_note_is_reported() {
    let mut service = service_with(MockClient::silent());

    let err = service.generate_for_note(NoteId::new(42)).unwrap_err();

    assert_eq!(err.to_string(), "Note 42 not found");
}

#[test]
fn http_failure_propagates_for_single_note() {
    let mut service = service_with(MockClient::with_replies([MockReply::Http(401)]));
    let note = service
        .store()
        .create_note("t", "body", None)
        .expect("failed to create note");

    let err = service.generate_for_note(note.id()).unwrap_err();

    assert!(format!("{err:#}").contains("401"));
}

#[test]
fn notebook_batch_counts_outcomes_and_continues_after_errors() {
    let client = MockClient::with_replies([
        MockReply::Text(r#"{"title":"First","tags":["alpha"]}"#),
        MockReply::Http(500),
        MockReply::Text(r#"{"title":"Third","tags":["alpha","beta"]}"#),
    ]);
    let mut service = service_with(client.clone());
    let root = service
        .store()
        .create_folder("Root", None)
        .expect("failed to create folder");
    let child = service
        .store()
        .create_folder("Child", Some(root.id()))
        .expect("failed to create folder");
    let first = service
        .store()
        .create_note("one", "body one", Some(root.id()))
        .expect("failed to create note");
    let failing = service
        .store()
        .create_note("two", "body two", Some(root.id()))
        .expect("failed to create note");
    let empty = service
        .store()
        .create_note("empty", "", Some(root.id()))
        .expect("failed to create note");
    let nested = service
        .store()
        .create_note("three", "body three", Some(child.id()))
        .expect("failed to create note");
    service
        .store()
        .create_note("outside", "not in notebook", None)
        .expect("failed to create note");

    let summary = service
        .generate_for_notebook(root.id())
        .expect("batch should not fail");

    assert_eq!(summary.processed, 4);
    assert_eq!(summary.updated, 2);
    assert_eq!(summary.titles_updated, 2);
    assert_eq!(summary.tag_updates, 2);
    assert_eq!(summary.tags_added, 3);
    assert_eq!(summary.skipped, vec![empty.id()]);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].starts_with(&format!("{}:", failing.id())));
    assert_eq!(client.calls(), 3);

    assert_eq!(note_title(&service, first.id()), "First");
    assert_eq!(tag_titles(&service, nested.id()), vec!["alpha", "beta"]);
    let pool = service.context().tag_pool.as_ref().expect("pool should be cached");
    assert_eq!(pool.titles(), ["alpha", "beta"]);
}

#[test]
fn batch_grows_working_pool_between_notes() {
    let client = MockClient::with_replies([
        MockReply::Text(r#"{"title":"A","tags":["fresh-tag"]}"#),
        MockReply::Text(r#"{"title":"B","tags":[]}"#),
    ]);
    let mut service = service_with(client.clone());
    service
        .store()
        .create_note("a", "first body", None)
        .expect("failed to create note");
    service
        .store()
        .create_note("b", "second body", None)
        .expect("failed to create note");

    service.generate_for_all_notes().expect("batch failed");

    // The second request already offers the tag created for the first note
    let system = client.last_system_message().expect("system message sent");
    assert!(system.contains("fresh-tag"));
}

#[test]
fn unknown_notebook_is_reported() {
    let mut service = service_with(MockClient::silent());

    let err = service.generate_for_notebook(FolderId::new(7)).unwrap_err();

    assert_eq!(err.to_string(), "Notebook 7 not found");
}

#[test]
fn stored_tag_pool_is_used_without_scanning() {
    let client = MockClient::silent();
    let db = Database::in_memory().expect("failed to create in-memory database");
    db.create_tag("from-store").expect("failed to create tag");
    let settings = Settings {
        tag_pool_storage: r#"["persisted"]"#.to_string(),
        ..settings()
    };
    let mut service = EnrichmentService::new(db, client, settings);

    let pool = service.ensure_tag_pool().expect("pool should load");

    assert_eq!(pool.titles(), ["persisted"]);
}

#[test]
fn refresh_tag_pool_persists_to_settings_file() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("settings.json");
    let db = Database::in_memory().expect("failed to create in-memory database");
    let note = db.create_note("n", "body", None).expect("failed to create note");
    let mut cache = TagIdCache::new();
    TagReconciler::new(&db, &mut cache)
        .apply(note.id(), &["Zeta", "alpha"])
        .expect("failed to tag note");
    let mut service = EnrichmentService::new(db, MockClient::silent(), settings())
        .with_settings_path(&path);

    service.refresh_tag_pool().expect("refresh failed");

    let saved = Settings::load(&path).expect("settings should be saved");
    assert_eq!(TagPool::from_json(&saved.tag_pool_storage).titles(), ["alpha", "Zeta"]);
}

#[test]
fn clear_tags_for_notebook_counts_removals() {
    let client = MockClient::silent();
    let mut service = service_with(client.clone());
    let root = service
        .store()
        .create_folder("Root", None)
        .expect("failed to create folder");
    let tagged = service
        .store()
        .create_note("tagged", "body", Some(root.id()))
        .expect("failed to create note");
    service
        .store()
        .create_note("bare", "body", Some(root.id()))
        .expect("failed to create note");
    let mut cache = TagIdCache::new();
    TagReconciler::new(service.store(), &mut cache)
        .apply(tagged.id(), &["x", "y"])
        .expect("failed to tag note");

    let summary = service
        .clear_tags_for_notebook(root.id())
        .expect("clear failed");

    assert_eq!(
        summary,
        ClearSummary {
            processed: 2,
            cleared_notes: 1,
            removed_tags: 2,
            errors: Vec::new(),
        }
    );
    assert!(tag_titles(&service, tagged.id()).is_empty());
    assert_eq!(client.calls(), 0);
}

#[test]
fn clear_tags_for_single_note() {
    let mut service = service_with(MockClient::silent());
    let note = service
        .store()
        .create_note("n", "body", None)
        .expect("failed to create note");
    let mut cache = TagIdCache::new();
    TagReconciler::new(service.store(), &mut cache)
        .apply(note.id(), &["only"])
        .expect("failed to tag note");

    assert_eq!(service.clear_tags_for_note(note.id()).expect("clear failed"), 1);
    assert_eq!(service.clear_tags_for_note(note.id()).expect("clear failed"), 0);
    assert!(service.clear_tags_for_note(NoteId::new(99)).is_err());
}

#[test]
fn clear_tags_for_all_notes_walks_store() {
    let mut service = service_with(MockClient::silent());
    let mut cache = TagIdCache::new();
    for i in 0..3 {
        let note = service
            .store()
            .create_note(&format!("n{i}"), "body", None)
            .expect("failed to create note");
        TagReconciler::new(service.store(), &mut cache)
            .apply(note.id(), &["shared"])
            .expect("failed to tag note");
    }

    let summary = service.clear_tags_for_all_notes().expect("clear failed");

    assert_eq!(summary.cleared_notes, 3);
    assert_eq!(summary.removed_tags, 3);
}

#[test]
fn chat_streams_fragments_to_sink() {
    let client = MockClient::with_replies([MockReply::Text("Hello there")]);
    let service = service_with(client.clone());
    let mut received = Vec::new();
    let mut sink = |fragment: &str| -> Result<(), SinkError> {
        received.push(fragment.to_string());
        Ok(())
    };

    let result = service.chat("hi", &mut sink).expect("chat failed");

    assert_eq!(result.full_text, "Hello there");
    assert_eq!(received.concat(), "Hello there");
    assert!(received.len() > 1);
    assert_eq!(client.last_system_message(), None);
}

#[test]
fn chat_rejects_blank_prompt() {
    let service = service_with(MockClient::silent());
    let mut sink = |_: &str| -> Result<(), SinkError> { Ok(()) };

    let err = service.chat("   ", &mut sink).unwrap_err();

    assert!(err.to_string().contains("cannot be empty"));
}

#[test]
fn update_prompts_changes_only_given_values() {
    let mut service = service_with(MockClient::silent());

    service
        .update_prompts(Some("Short titles".to_string()), None, Some(15))
        .expect("update failed");

    assert_eq!(service.settings().title_system_prompt, "Short titles");
    assert_eq!(service.settings().tag_system_prompt, "");
    assert_eq!(service.settings().effective_tag_limit(), 10);
}

#[test]
fn batch_summary_record_tallies_outcomes() {
    let mut summary = BatchSummary::default();
    summary.record(
        NoteId::new(1),
        Ok(NoteOutcome::Updated(NoteUpdate {
            note_id: NoteId::new(1),
            new_title: None,
            tags: Some(TagReconciliation {
                added: 1,
                removed: 2,
                final_tags: vec!["a".to_string()],
            }),
        })),
    );
    summary.record(NoteId::new(2), Ok(NoteOutcome::Skipped(SkipReason::NoChanges)));
    summary.record(NoteId::new(3), Err(anyhow::anyhow!("boom")));

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.titles_updated, 0);
    assert_eq!(summary.tag_updates, 1);
    assert_eq!(summary.tags_removed, 2);
    assert_eq!(summary.skipped, vec![NoteId::new(2)]);
    assert_eq!(summary.errors, vec!["3: boom".to_string()]);
    assert!(summary.tags_changed());
}

#[test]
fn notebook_batch_skips_folder_whose_notes_cannot_be_listed() {
    let client = MockClient::with_replies([MockReply::Text(r#"{"title":"Kept","tags":["ok"]}"#)]);
    let db = Database::in_memory().expect("failed to create in-memory database");
    let root = db.create_folder("Root", None).expect("failed to create folder");
    let bad = db
        .create_folder("bad", Some(root.id()))
        .expect("failed to create folder");
    let reachable = db
        .create_note("root note", "body", Some(root.id()))
        .expect("failed to create note");
    db.create_note("bad note", "body", Some(bad.id()))
        .expect("failed to create note");
    let store = FaultyStore::new(db).fail_folder_notes(bad.id());
    let mut service = EnrichmentService::new(store, client.clone(), settings());

    let summary = service
        .generate_for_notebook(root.id())
        .expect("batch should not fail");

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.updated, 1);
    assert!(summary.errors.is_empty());
    assert_eq!(client.calls(), 1);
    let title = service
        .store()
        .inner()
        .get_note(reachable.id())
        .expect("failed to load note")
        .expect("note should exist");
    assert_eq!(title.title(), "Kept");
}

#[test]
fn clear_batch_records_failing_note_and_continues() {
    let db = Database::in_memory().expect("failed to create in-memory database");
    let mut cache = TagIdCache::new();
    let mut notes = Vec::new();
    for i in 0..2 {
        let note = db
            .create_note(&format!("n{i}"), "body", None)
            .expect("failed to create note");
        TagReconciler::new(&db, &mut cache)
            .apply(note.id(), &["shared"])
            .expect("failed to tag note");
        notes.push(note.id());
    }
    let store = FaultyStore::new(db).fail_note_tags(notes[0]);
    let mut service = EnrichmentService::new(store, MockClient::silent(), settings());

    let summary = service.clear_tags_for_all_notes().expect("clear should not fail");

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.cleared_notes, 1);
    assert_eq!(summary.removed_tags, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].starts_with(&format!("{}:", notes[0])));
    assert!(summary.errors[0].contains("tag listing failed"));
    let remaining = list_all_note_tags(service.store().inner(), notes[1])
        .expect("failed to list note tags");
    assert!(remaining.is_empty());
}
