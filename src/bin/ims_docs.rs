use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use ims_docstore::annotations::Annotation;
use ims_docstore::app::App;
use ims_docstore::config::SettingsLoader;
use ims_docstore::conflict::{Conflict, ConflictPolicy, ConflictPrompt, PromptResponse};
use ims_docstore::domain::{ConflictAction, DatasetRef, DocumentType, Kind};
use ims_docstore::error::CatalogError;
use ims_docstore::importer::TextXyLoader;
use ims_docstore::output::{JsonOutput, OutputMode, TextOutput};
use ims_docstore::payload::Axis;
use ims_docstore::store::SessionStore;
use ims_docstore::tui::Tui;

#[derive(Parser)]
#[command(name = "ims-docs")]
#[command(about = "Document and dataset catalog for ion-mobility mass spectrometry")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Session file to open and save (defaults to the `default` session).
    #[arg(long, global = true)]
    session: Option<Utf8PathBuf>,

    /// Settings file (defaults to the user config directory).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create an empty document")]
    New(NewArgs),
    #[command(about = "Import two-column text files")]
    Import(ImportArgs),
    #[command(about = "List open documents")]
    List,
    #[command(about = "Print the document tree")]
    Tree,
    #[command(about = "Rename a document")]
    Rename(RenameArgs),
    #[command(about = "Close a document")]
    Delete(TitleArgs),
    #[command(about = "Copy a document under a new title")]
    Duplicate(TitleArgs),
    #[command(about = "Remove one dataset")]
    Remove(DatasetArgs),
    #[command(about = "Rename a keyed dataset")]
    RenameDataset(RenameDatasetArgs),
    #[command(about = "Copy a keyed dataset within its document")]
    DuplicateDataset(DatasetArgs),
    #[command(about = "Attach an annotation to a dataset")]
    Annotate(AnnotateArgs),
    #[command(about = "Remove an annotation from a dataset")]
    Unannotate(UnannotateArgs),
    #[command(about = "Relabel and rescale one axis of a dataset")]
    Relabel(RelabelArgs),
    #[command(about = "Restore the original axes of a dataset")]
    RestoreAxes(DatasetArgs),
    #[command(about = "List saved sessions")]
    Sessions,
    #[command(about = "Browse documents in the terminal")]
    Browse,
}

#[derive(Args)]
struct NewArgs {
    title: String,

    #[arg(long = "type", value_enum, default_value_t = DocumentType::Origami)]
    document_type: DocumentType,
}

#[derive(Args)]
struct ImportArgs {
    #[arg(required = true)]
    files: Vec<Utf8PathBuf>,

    #[arg(long, value_enum, default_value_t = Kind::MassSpectrum)]
    kind: Kind,

    /// Add the datasets to this document instead of opening one per file.
    #[arg(long)]
    into: Option<String>,

    /// Resolve every conflict this way without asking.
    #[arg(long, value_enum)]
    on_conflict: Option<ConflictAction>,
}

#[derive(Args)]
struct RenameArgs {
    old: String,
    new: String,
}

#[derive(Args)]
struct TitleArgs {
    title: String,
}

#[derive(Args, Clone)]
struct DatasetArgs {
    document: String,

    #[arg(value_enum)]
    kind: Kind,

    key: Option<String>,
}

impl DatasetArgs {
    fn dataset(self) -> DatasetRef {
        DatasetRef {
            document: self.document,
            kind: self.kind,
            key: self.key,
        }
    }
}

#[derive(Args)]
struct RenameDatasetArgs {
    #[command(flatten)]
    dataset: DatasetArgs,

    #[arg(long)]
    to: String,
}

#[derive(Args)]
struct AnnotateArgs {
    #[command(flatten)]
    dataset: DatasetArgs,

    #[arg(long)]
    name: String,

    #[arg(long)]
    label: Option<String>,

    #[arg(long)]
    position: f64,

    #[arg(long)]
    intensity: f64,

    #[arg(long)]
    charge: Option<i32>,
}

#[derive(Args)]
struct UnannotateArgs {
    #[command(flatten)]
    dataset: DatasetArgs,

    #[arg(long)]
    name: String,
}

#[derive(Args)]
struct RelabelArgs {
    #[command(flatten)]
    dataset: DatasetArgs,

    #[arg(long, value_enum)]
    axis: Axis,

    #[arg(long)]
    label: String,

    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    #[arg(long, default_value_t = 0.0)]
    offset: f64,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CatalogError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::DocumentNotFound(_) | CatalogError::KeyNotFound(_) => 2,
        CatalogError::InvalidConflictPolicy
        | CatalogError::ConfigRead(_)
        | CatalogError::ConfigParse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let session_path = match cli.session {
        Some(path) => path,
        None => SessionStore::new()?.session_path("default"),
    };
    let (settings_path, settings) = SettingsLoader::resolve(cli.config.as_deref())?;
    let registry = SessionStore::load_or_default(&session_path)?;
    let mut app = App::new(registry, settings).with_settings_path(settings_path);

    let command = match (cli.command, output_mode) {
        (Some(command), _) => command,
        (None, OutputMode::Interactive) => Commands::Browse,
        (None, OutputMode::NonInteractive) => {
            return Err(miette::Report::msg(
                "command required (try `ims-docs --help`)",
            ));
        }
    };

    let changed = run_command(command, &mut app, output_mode)?;
    if changed {
        let summary = SessionStore::save(&session_path, app.registry())?;
        match output_mode {
            OutputMode::NonInteractive => JsonOutput::print_session(&summary).into_diagnostic()?,
            OutputMode::Interactive => eprintln!(
                "saved {} document(s), {} dataset(s) to {}",
                summary.documents, summary.datasets, summary.path
            ),
        }
    }
    Ok(())
}

/// Returns whether the session changed and needs saving.
fn run_command(command: Commands, app: &mut App, output_mode: OutputMode) -> miette::Result<bool> {
    match command {
        Commands::New(args) => {
            let document_type = args.document_type;
            app.registry_mut()
                .create(&args.title, document_type, Default::default())?;
            Ok(true)
        }
        Commands::Import(args) => run_import(args, app, output_mode).map(|()| true),
        Commands::List => {
            let result = app.list();
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_list(&result).into_diagnostic()?,
                OutputMode::Interactive => {
                    TextOutput::print(&TextOutput::render_list(&result)).into_diagnostic()?
                }
            }
            Ok(false)
        }
        Commands::Tree => {
            let result = app.tree();
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_tree(&result).into_diagnostic()?,
                OutputMode::Interactive => {
                    TextOutput::print(&TextOutput::render_tree(&result)).into_diagnostic()?
                }
            }
            Ok(false)
        }
        Commands::Rename(args) => {
            app.registry_mut().rename(&args.old, &args.new)?;
            Ok(true)
        }
        Commands::Delete(args) => match app.registry_mut().delete(&args.title) {
            Some(_) => Ok(true),
            None => Err(CatalogError::DocumentNotFound(args.title).into()),
        },
        Commands::Duplicate(args) => {
            let copy = app.registry_mut().duplicate(&args.title)?;
            report(output_mode, "document", &copy)?;
            Ok(true)
        }
        Commands::Remove(args) => {
            let dataset = args.dataset();
            let removed = app.registry_mut().remove_dataset(&dataset)?;
            if removed.is_none() {
                tracing::info!(dataset = %dataset, "nothing to remove");
            }
            Ok(removed.is_some())
        }
        Commands::RenameDataset(args) => {
            let dataset = args.dataset.dataset();
            let renamed = app.registry_mut().rename_dataset(&dataset, &args.to)?;
            report(output_mode, "dataset", &renamed.to_string())?;
            Ok(true)
        }
        Commands::DuplicateDataset(args) => {
            let copy = app.registry_mut().duplicate_dataset(&args.dataset())?;
            report(output_mode, "dataset", &copy.to_string())?;
            Ok(true)
        }
        Commands::Annotate(args) => {
            let dataset = args.dataset.dataset();
            let label = args.label.unwrap_or_else(|| args.name.clone());
            let mut annotation = Annotation::new(label, args.position, args.intensity);
            if let Some(charge) = args.charge {
                annotation = annotation.with_charge(charge);
            }
            app.registry_mut()
                .attach_annotation(&dataset, &args.name, annotation)?;
            Ok(true)
        }
        Commands::Unannotate(args) => {
            let dataset = args.dataset.dataset();
            let removed = app.registry_mut().detach_annotation(&dataset, &args.name)?;
            Ok(removed.is_some())
        }
        Commands::Relabel(args) => {
            let dataset = args.dataset.dataset();
            let (scale, offset) = (args.scale, args.offset);
            app.registry_mut()
                .relabel_axes(&dataset, args.axis, &args.label, |value| value * scale + offset)?;
            Ok(true)
        }
        Commands::RestoreAxes(args) => {
            let restored = app.registry_mut().restore_axes(&args.dataset())?;
            Ok(restored)
        }
        Commands::Sessions => {
            let sessions = SessionStore::new()?.list()?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_json(&sessions).into_diagnostic()?,
                OutputMode::Interactive => {
                    for session in sessions {
                        println!("{session}");
                    }
                }
            }
            Ok(false)
        }
        Commands::Browse => {
            if matches!(output_mode, OutputMode::NonInteractive) {
                return Err(miette::Report::msg("browse needs an interactive terminal"));
            }
            let mut tui = Tui::new();
            tui.browse(app)?;
            Ok(true)
        }
    }
}

fn run_import(args: ImportArgs, app: &mut App, output_mode: OutputMode) -> miette::Result<()> {
    let mut loader = TextXyLoader::new(args.kind);
    if let Some(document) = args.into {
        loader = loader.into_document(document);
    }
    let loader = Arc::new(loader);

    if let Some(action) = args.on_conflict {
        app.override_conflict_policy(ConflictPolicy::fixed(action));
    }

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.import_files(loader, args.files, None, &JsonOutput)?;
            JsonOutput::print_import(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let fallback = app
                .settings()
                .import
                .default_action
                .unwrap_or(ConflictAction::Merge);
            let mut prompt = LinePrompt {
                input: io::stdin().lock(),
                fallback,
            };
            let result = app.import_files(loader, args.files, Some(&mut prompt), &TextOutput)?;
            for failure in &result.failures {
                eprintln!("failed: {} ({})", failure.path, failure.error);
            }
        }
    }
    Ok(())
}

fn report(output_mode: OutputMode, what: &str, name: &str) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            JsonOutput::print_json(&BTreeMap::from([(what, name)])).into_diagnostic()
        }
        OutputMode::Interactive => {
            println!("created {what} {name}");
            Ok(())
        }
    }
}

/// Asks on the terminal. A trailing `!` on the answer means "don't ask again".
struct LinePrompt<R> {
    input: R,
    /// Taken for an empty answer or at end of input.
    fallback: ConflictAction,
}

impl<R: BufRead> ConflictPrompt for LinePrompt<R> {
    fn ask(&mut self, conflict: &Conflict<'_>) -> PromptResponse {
        loop {
            eprint!(
                "{}. [o]verride, [m]erge or [d]uplicate? (append ! to remember) ",
                conflict.describe()
            );
            let _ = io::stderr().flush();

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) | Err(_) => {
                    return PromptResponse {
                        action: self.fallback,
                        remember: false,
                    };
                }
                Ok(_) => {}
            }
            let answer = line.trim();
            let (answer, remember) = match answer.strip_suffix('!') {
                Some(stripped) => (stripped, true),
                None => (answer, false),
            };
            let action = match answer.to_ascii_lowercase().as_str() {
                "o" | "override" => ConflictAction::Override,
                "m" | "merge" => ConflictAction::Merge,
                "d" | "duplicate" => ConflictAction::Duplicate,
                "" => self.fallback,
                _ => continue,
            };
            return PromptResponse { action, remember };
        }
    }
}
