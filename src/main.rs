use std::io::Write;
use std::sync::Arc;

use aitag::completion::SinkError;
use aitag::service::{BatchSummary, ClearSummary};
use aitag::utils::{ensure_parent_directory, get_database_path, get_settings_path};
use aitag::{Database, EnrichmentService, FolderId, NoteId, NoteOutcome, Settings, TagPool};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// aitag - AI titles and tags for your notes
#[derive(Parser)]
#[command(name = "aitag")]
#[command(about = "Generate note titles and tags with an OpenAI-compatible model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Manage notes
    #[command(subcommand)]
    Note(NoteCommand),

    /// Manage notebooks
    #[command(subcommand)]
    Notebook(NotebookCommand),

    /// Generate titles and tags
    Generate(TargetArgs),

    /// Remove all tags from notes
    ClearTags(TargetArgs),

    /// Send a prompt and stream the answer
    Chat(ChatCommand),

    /// Inspect or rebuild the tag pool
    #[command(subcommand)]
    TagPool(TagPoolCommand),

    /// Configure generation prompts
    #[command(subcommand)]
    Prompts(PromptsCommand),
}

#[derive(Subcommand)]
enum NoteCommand {
    /// Add a note
    Add {
        /// The body of the note
        #[arg(value_name = "BODY")]
        body: String,

        /// Optional title
        #[arg(short, long)]
        title: Option<String>,

        /// Notebook id to file the note under
        #[arg(short, long, value_name = "ID")]
        notebook: Option<i64>,
    },
}

#[derive(Subcommand)]
enum NotebookCommand {
    /// Add a notebook
    Add {
        /// Notebook title
        #[arg(value_name = "TITLE")]
        title: String,

        /// Parent notebook id
        #[arg(short, long, value_name = "ID")]
        parent: Option<i64>,
    },
}

/// Which notes a command applies to
#[derive(Args)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// A single note
    #[arg(long, value_name = "ID")]
    note: Option<i64>,

    /// A notebook and all of its sub-notebooks
    #[arg(long, value_name = "ID")]
    notebook: Option<i64>,

    /// Every note
    #[arg(long)]
    all: bool,
}

/// Which notes a command applies to, resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Note(NoteId),
    Notebook(FolderId),
    All,
}

impl TargetArgs {
    fn target(&self) -> Target {
        match (self.note, self.notebook) {
            (Some(id), _) => Target::Note(NoteId::new(id)),
            (None, Some(id)) => Target::Notebook(FolderId::new(id)),
            (None, None) => Target::All,
        }
    }
}

#[derive(Args)]
struct ChatCommand {
    /// The prompt to send
    #[arg(value_name = "PROMPT")]
    prompt: String,
}

#[derive(Subcommand)]
enum TagPoolCommand {
    /// Print the current tag pool
    Show,
    /// Rebuild the tag pool from every note's tags
    Refresh,
}

#[derive(Subcommand)]
enum PromptsCommand {
    /// Update title and tag guidance
    Set {
        /// Guidance for titles; an empty string restores the default
        #[arg(long)]
        title_prompt: Option<String>,

        /// Guidance for tags; an empty string restores the default
        #[arg(long)]
        tag_prompt: Option<String>,

        /// Maximum tags per note (1-10)
        #[arg(long)]
        tag_limit: Option<i64>,
    },
}

fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aitag=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = run(cli.command);

    if let Err(e) = result {
        // Determine exit code based on error type
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors cover missing configuration, blank input, and unknown ids.
/// Everything else (database, network, I/O) is internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        let error_msg = cause.to_string();
        ["cannot be empty", "not configured", "not found"]
            .iter()
            .any(|needle| error_msg.contains(needle))
    })
}

fn run(command: Commands) -> Result<()> {
    let db = open_database()?;
    match command {
        Commands::Note(NoteCommand::Add {
            body,
            title,
            notebook,
        }) => execute_note_add(&db, &body, title.as_deref(), notebook.map(FolderId::new)),
        Commands::Notebook(NotebookCommand::Add { title, parent }) => {
            execute_notebook_add(&db, &title, parent.map(FolderId::new))
        }
        Commands::Generate(args) => execute_generate(&mut open_service(db)?, args.target()),
        Commands::ClearTags(args) => execute_clear_tags(&mut open_service(db)?, args.target()),
        Commands::Chat(ChatCommand { prompt }) => execute_chat(&open_service(db)?, &prompt),
        Commands::TagPool(command) => execute_tag_pool(&mut open_service(db)?, command),
        Commands::Prompts(PromptsCommand::Set {
            title_prompt,
            tag_prompt,
            tag_limit,
        }) => {
            let mut service = open_service(db)?;
            service.update_prompts(title_prompt, tag_prompt, tag_limit)?;
            println!(
                "Prompts saved (tag limit: {})",
                service.settings().effective_tag_limit()
            );
            Ok(())
        }
    }
}

fn open_database() -> Result<Database> {
    let db_path = get_database_path()?;
    ensure_parent_directory(&db_path)?;
    Database::open(&db_path).context("Failed to open database")
}

/// Loads settings (file, then environment) and builds the service.
fn open_service(db: Database) -> Result<EnrichmentService<Database>> {
    let settings_path = get_settings_path()?;
    let settings = Settings::load(&settings_path)?.with_env_overrides();
    let client = settings.completion_client()?;
    Ok(EnrichmentService::new(db, Arc::new(client), settings).with_settings_path(settings_path))
}

/// Executes the `note add` command against a provided database.
fn execute_note_add(
    db: &Database,
    body: &str,
    title: Option<&str>,
    notebook: Option<FolderId>,
) -> Result<()> {
    if body.trim().is_empty() {
        anyhow::bail!("Note body cannot be empty");
    }
    let note = db
        .create_note(title.unwrap_or_default().trim(), body, notebook)
        .context("Failed to create note")?;
    println!("Note created (id: {})", note.id());
    Ok(())
}

/// Executes the `notebook add` command against a provided database.
fn execute_notebook_add(db: &Database, title: &str, parent: Option<FolderId>) -> Result<()> {
    if title.trim().is_empty() {
        anyhow::bail!("Notebook title cannot be empty");
    }
    let folder = db
        .create_folder(title.trim(), parent)
        .context("Failed to create notebook")?;
    println!("Notebook created (id: {})", folder.id());
    Ok(())
}

fn execute_generate(service: &mut EnrichmentService<Database>, target: Target) -> Result<()> {
    match target {
        Target::Note(id) => {
            let outcome = service.generate_for_note(id)?;
            println!("{}", describe_outcome(id, &outcome));
        }
        Target::Notebook(id) => {
            let summary = service.generate_for_notebook(id)?;
            println!("{}", describe_batch(&summary));
        }
        Target::All => {
            let summary = service.generate_for_all_notes()?;
            println!("{}", describe_batch(&summary));
        }
    }
    Ok(())
}

fn execute_clear_tags(service: &mut EnrichmentService<Database>, target: Target) -> Result<()> {
    match target {
        Target::Note(id) => {
            let removed = service.clear_tags_for_note(id)?;
            println!("Removed {removed} tag(s) from note {id}");
        }
        Target::Notebook(id) => {
            let summary = service.clear_tags_for_notebook(id)?;
            println!("{}", describe_clear(&summary));
        }
        Target::All => {
            let summary = service.clear_tags_for_all_notes()?;
            println!("{}", describe_clear(&summary));
        }
    }
    Ok(())
}

/// Streams the answer to stdout as fragments arrive.
fn execute_chat(service: &EnrichmentService<Database>, prompt: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    let mut sink = |fragment: &str| -> Result<(), SinkError> {
        stdout.write_all(fragment.as_bytes())?;
        stdout.flush()?;
        Ok(())
    };
    service.chat(prompt, &mut sink)?;
    println!();
    Ok(())
}

fn execute_tag_pool(
    service: &mut EnrichmentService<Database>,
    command: TagPoolCommand,
) -> Result<()> {
    match command {
        TagPoolCommand::Show => {
            println!("{}", describe_pool(service.ensure_tag_pool()?));
        }
        TagPoolCommand::Refresh => {
            let pool = service.refresh_tag_pool()?;
            println!("Tag pool rebuilt: {} tag(s)", pool.len());
        }
    }
    Ok(())
}

fn describe_pool(pool: &TagPool) -> String {
    if pool.is_empty() {
        return "Tag pool is empty".to_string();
    }
    format!("{} tag(s):\n{}", pool.len(), pool.preview())
}

fn describe_outcome(id: NoteId, outcome: &NoteOutcome) -> String {
    match outcome {
        NoteOutcome::Updated(update) => {
            let mut parts = Vec::new();
            if let Some(title) = &update.new_title {
                parts.push(format!("title \"{title}\""));
            }
            if let Some(tags) = &update.tags {
                parts.push(format!("tags [{}]", tags.final_tags.join(", ")));
            }
            format!("Note {id} updated: {}", parts.join(", "))
        }
        NoteOutcome::Skipped(reason) => format!("Note {id} unchanged ({reason:?})"),
    }
}

fn describe_batch(summary: &BatchSummary) -> String {
    let mut text = format!(
        "Processed {} note(s): {} updated, {} title(s), {} tag update(s), {} skipped",
        summary.processed,
        summary.updated,
        summary.titles_updated,
        summary.tag_updates,
        summary.skipped.len()
    );
    for error in &summary.errors {
        text.push_str(&format!("\n  failed {error}"));
    }
    text
}

fn describe_clear(summary: &ClearSummary) -> String {
    let mut text = format!(
        "Processed {} note(s): removed {} tag(s) from {} note(s)",
        summary.processed, summary.removed_tags, summary.cleared_notes
    );
    for error in &summary.errors {
        text.push_str(&format!("\n  failed {error}"));
    }
    text
}
