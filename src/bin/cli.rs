// Exiting on unrecoverable errors is fine for a CLI.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::Value;

use folio::action::params::{
    PhotoConsolidatePayload, PhotoCreatePayload, PhotoRestorePayload, PhotosOfItem,
    TemplateImportPayload, VocabImportPayload,
};
use folio::action::{self, Action, ActionType};
use folio::command::{registry, Command, Completed, Options};
use folio::db::Database;
use folio::error::{AppError, DbError};
use folio::history::HistoryStack;
use folio::model;
use folio::prompt::{NoPrompt, Prompt, PromptKind};
use folio::settings::{self, AppSettings};
use folio::store::Store;

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "folio-cli", about = "Folio headless CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config directory override
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// tracing filter directive (overrides FOLIO_LOG and settings)
    #[arg(long, global = true)]
    log: Option<String>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    /// Never ask questions; prompts answer as if cancelled
    #[arg(long, global = true)]
    batch: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project file
    Init {
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
        /// Where relative photo paths resolve from (project, home, pictures, or a path)
        #[arg(long, default_value = "project")]
        base: String,
    },
    /// Show project summary
    Info { file: PathBuf },
    /// Import photos into an item (a new item when --item is omitted)
    Import {
        file: PathBuf,
        #[arg(long)]
        item: Option<i64>,
        /// Insert position within the item
        #[arg(long)]
        idx: Option<usize>,
        /// Photos to import; asks when empty
        photos: Vec<PathBuf>,
    },
    /// List the photos of an item, or of the whole project
    Photos {
        file: PathBuf,
        #[arg(long)]
        item: Option<i64>,
    },
    /// Move photos of an item to the trash
    Delete {
        file: PathBuf,
        #[arg(long)]
        item: i64,
        #[arg(long, value_delimiter = ',')]
        photos: Vec<i64>,
    },
    /// Restore trashed photos at the given positions
    Restore {
        file: PathBuf,
        #[arg(long)]
        item: i64,
        #[arg(long, value_delimiter = ',')]
        photos: Vec<i64>,
        #[arg(long, value_delimiter = ',')]
        idx: Vec<usize>,
    },
    /// Re-check photo files on disk (all photos when none are given)
    Consolidate {
        file: PathBuf,
        #[arg(long)]
        force: bool,
        /// Ask for a new location of missing files
        #[arg(long)]
        prompt: bool,
        #[arg(long, value_delimiter = ',')]
        photos: Vec<i64>,
    },
    /// Import vocabulary files
    VocabImport {
        file: PathBuf,
        #[arg(long)]
        protected: bool,
        vocabs: Vec<PathBuf>,
    },
    /// Import template files
    TemplateImport {
        file: PathBuf,
        #[arg(long)]
        protected: bool,
        templates: Vec<PathBuf>,
    },
    /// List registered commands with parameter schemas
    Commands {
        /// Show only this action type (e.g. photo.create)
        name: Option<String>,
    },
    /// Run a JSON array of actions; history.undo and history.redo replay
    Script { file: PathBuf, script: PathBuf },
}

// ── Interactive prompt ───────────────────────────────────────────

struct TerminalPrompt;

fn ask(kind: PromptKind) -> Option<Vec<PathBuf>> {
    let label = match kind {
        PromptKind::Images => "Photos to import (comma separated)",
        PromptKind::Relocate => "New location of the missing file",
        PromptKind::Vocabularies => "Vocabulary files (comma separated)",
        PromptKind::Templates => "Template files (comma separated)",
    };
    let answer: String = dialoguer::Input::new()
        .with_prompt(label)
        .allow_empty(true)
        .interact_text()
        .ok()?;
    let files: Vec<PathBuf> = answer
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect();
    (!files.is_empty()).then_some(files)
}

#[async_trait]
impl Prompt for TerminalPrompt {
    async fn prompt_files(&self, kind: PromptKind) -> Option<Vec<PathBuf>> {
        tokio::task::spawn_blocking(move || ask(kind)).await.ok().flatten()
    }
}

// ── Project session ──────────────────────────────────────────────

struct Project {
    options: Options,
    history: HistoryStack,
}

impl Project {
    async fn open(file: &Path, prompt: Arc<dyn Prompt>, history_limit: usize) -> Result<Self, AppError> {
        registry::init()?;
        let db = Database::open(file).await?;
        if !db.call(model::project::exists).await? {
            return Err(DbError::NoProject(file.display().to_string()).into());
        }
        db.migrate().await?;
        let owned = file.to_path_buf();
        let summary = db.call(move |c| model::project::load(c, &owned)).await?;

        let store = Store::new();
        store.dispatch(action::project::opened(&summary));
        Ok(Self {
            options: Options::new(db, store).with_prompt(prompt),
            history: HistoryStack::new(history_limit),
        })
    }

    async fn run(&mut self, action: Action) -> Completed {
        let action = self.options.store.dispatch(action);
        let done = match Command::create(action, self.options.clone()) {
            Ok(command) => command.run().await,
            Err(e) => fail(&e.into()),
        };
        if let Some(entry) = done.history() {
            self.history.record(entry);
        }
        done
    }

    async fn close(self) {
        if let Err(e) = self.options.db.close().await {
            eprintln!("Warning: failed to close project: {e}");
        }
    }
}

// ── Output formatting ────────────────────────────────────────────

fn fail(e: &AppError) -> ! {
    eprintln!("Error: {e}");
    process::exit(1);
}

fn print_value(value: &Value, raw_json: bool) {
    if raw_json {
        println!("{value}");
    } else {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }
}

fn print_completed(done: &Completed, raw_json: bool) {
    if raw_json {
        println!("{}", serde_json::to_string(done).unwrap_or_default());
        return;
    }
    if let Some(error) = done.error() {
        eprintln!("{done} failed after {:?}: {error}", done.duration());
        return;
    }
    eprintln!("{done} done in {:?}", done.duration());
    if let Some(result) = done.result() {
        print_value(result, false);
    }
}

fn exit_status(done: &Completed) {
    if done.failure().is_some() {
        process::exit(1);
    }
}

// ── Subcommands ──────────────────────────────────────────────────

async fn init(file: &Path, name: Option<String>, base: String) -> Result<Value, AppError> {
    if file.exists() {
        return Err(format!("{} already exists", file.display()).into());
    }
    let db = Database::create(file).await?;
    db.migrate().await?;
    let name = name.unwrap_or_else(|| {
        file.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let owned = file.to_path_buf();
    let summary = db
        .call(move |c| {
            model::project::create(c, &name, Some(&base))?;
            model::project::load(c, &owned)
        })
        .await?;
    db.close().await?;
    Ok(serde_json::to_value(summary)?)
}

async fn photos(project: &Project, item: Option<i64>) -> Result<Value, AppError> {
    let photos = project
        .options
        .db
        .call(move |c| {
            let ids = match item {
                Some(item) => model::photo::order(c, item)?,
                None => model::photo::all(c)?,
            };
            model::photo::load(c, &ids)
        })
        .await?;
    Ok(serde_json::to_value(photos)?)
}

fn catalog(name: Option<&str>) -> Result<Value, AppError> {
    let registry = registry::init()?;
    let mut entries = registry.catalog();
    if let Some(name) = name {
        let kind: ActionType = folio::util::from_serde_str(name)
            .ok_or_else(|| AppError::Validation(format!("unknown action type {name}")))?;
        entries.retain(|e| e.name == kind);
    }
    Ok(serde_json::to_value(entries)?)
}

async fn script(project: &mut Project, script: &Path, raw_json: bool) -> Result<(), AppError> {
    let actions: Vec<Action> = folio::util::read_json(script)?;
    for action in actions {
        let action = match action.kind {
            ActionType::HistoryUndo => project.history.undo(),
            ActionType::HistoryRedo => project.history.redo(),
            kind if kind.is_command() => Some(action),
            kind => {
                eprintln!("Skipping {kind}: only commands and history.undo/redo can be scripted");
                None
            }
        };
        if let Some(action) = action {
            let done = project.run(action).await;
            print_completed(&done, raw_json);
        }
    }
    let state = project.history.state();
    print_value(&serde_json::to_value(state)?, raw_json);
    Ok(())
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let app_config_dir = folio::paths::app_config_dir(cli.config_dir.as_deref())
        .unwrap_or_else(|| fail(&"cannot resolve a config directory".into()));
    let mut app_settings = settings::load_settings(&app_config_dir).unwrap_or_default();

    let env_filter = std::env::var(folio::logging::LOG_ENV).ok();
    folio::logging::init(&folio::logging::resolve_filter(
        cli.log.as_deref(),
        env_filter.as_deref(),
        app_settings.log_filter.as_deref(),
    ));

    let prompt: Arc<dyn Prompt> = if cli.batch {
        Arc::new(NoPrompt)
    } else {
        Arc::new(TerminalPrompt)
    };
    let raw = cli.json;

    let file = match &cli.command {
        Commands::Init { .. } | Commands::Commands { .. } => None,
        Commands::Info { file }
        | Commands::Import { file, .. }
        | Commands::Photos { file, .. }
        | Commands::Delete { file, .. }
        | Commands::Restore { file, .. }
        | Commands::Consolidate { file, .. }
        | Commands::VocabImport { file, .. }
        | Commands::TemplateImport { file, .. }
        | Commands::Script { file, .. } => Some(file.clone()),
    };

    match cli.command {
        Commands::Init { file, name, base } => {
            let summary = init(&file, name, base).await.unwrap_or_else(|e| fail(&e));
            remember(&mut app_settings, &app_config_dir, &file);
            print_value(&summary, raw);
        }
        Commands::Commands { name } => {
            let entries = catalog(name.as_deref()).unwrap_or_else(|e| fail(&e));
            print_value(&entries, raw);
        }
        command => {
            let Some(file) = file else { return };
            let mut project = Project::open(&file, prompt, app_settings.history_limit)
                .await
                .unwrap_or_else(|e| fail(&e));
            remember(&mut app_settings, &app_config_dir, &file);
            run_project_command(&mut project, command, raw).await;
            project.close().await;
        }
    }
}

async fn run_project_command(project: &mut Project, command: Commands, raw: bool) {
    let action = match command {
        Commands::Info { .. } => {
            let summary = project.options.store.select(|s| s.project.clone());
            print_value(&serde_json::to_value(summary).unwrap_or_default(), raw);
            return;
        }
        Commands::Photos { item, .. } => {
            let photos = photos(project, item).await.unwrap_or_else(|e| fail(&e));
            print_value(&photos, raw);
            return;
        }
        Commands::Script { script: path, .. } => {
            script(project, &path, raw).await.unwrap_or_else(|e| fail(&e));
            return;
        }
        Commands::Import {
            item,
            idx,
            photos,
            ..
        } => {
            let item = match item {
                Some(item) => item,
                None => {
                    let created = project.run(action::item::create()).await;
                    exit_status(&created);
                    created.result().and_then(|r| r["id"].as_i64()).unwrap_or_default()
                }
            };
            action::photo::create(&PhotoCreatePayload {
                item,
                files: (!photos.is_empty()).then_some(photos),
                idx,
            })
        }
        Commands::Delete { item, photos, .. } => {
            action::photo::delete(&PhotosOfItem { item, photos })
        }
        Commands::Restore {
            item, photos, idx, ..
        } => action::photo::restore(&PhotoRestorePayload { item, photos, idx }),
        Commands::Consolidate {
            force,
            prompt,
            photos,
            ..
        } => action::photo::consolidate(&PhotoConsolidatePayload {
            photos,
            force,
            prompt,
        }),
        Commands::VocabImport {
            protected, vocabs, ..
        } => action::vocab::import(&VocabImportPayload {
            files: (!vocabs.is_empty()).then_some(vocabs),
            protected,
        }),
        Commands::TemplateImport {
            protected,
            templates,
            ..
        } => action::template::import(&TemplateImportPayload {
            files: (!templates.is_empty()).then_some(templates),
            protected,
        }),
        Commands::Init { .. } | Commands::Commands { .. } => return,
    };

    let done = project.run(action).await;
    print_completed(&done, raw);
    exit_status(&done);
}

fn remember(app_settings: &mut AppSettings, app_config_dir: &Path, file: &Path) {
    let file = std::fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
    app_settings.touch_recent(&file);
    if let Err(e) = settings::save_settings(app_config_dir, app_settings) {
        eprintln!("Warning: failed to save settings: {e}");
    }
}
