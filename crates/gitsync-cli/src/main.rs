use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gitsync_core::config::{GitSettings, LoggingSettings, SyncSettings};
use gitsync_core::logging::{init_logging, init_stderr_logging};
use gitsync_core::{ContentStore, FsContentStore, GitCommand, Notebook, Origin, Settings};
use gitsync_resolver::{
    ConflictChoice, ConflictPrompt, ConflictReport, FixedPrompt, NotebookResolver, TextResolver,
};
use gitsync_service::{DiskNotebookEditor, DiskTextEditor, FileTracker, SyncFile, SyncService};

#[derive(Parser)]
#[command(
    name = "gitsync",
    about = "Keep open files in sync with a git remote, merging concurrent edits"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the settings file
    #[arg(long, default_value = ".gitsync/settings.json")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Three-way merge of three files (text or .ipynb)
    Merge {
        base: PathBuf,
        local: PathBuf,
        remote: PathBuf,
        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// What to do when the merge conflicts
        #[arg(long, value_enum, default_value_t = OnConflict::Diff)]
        on_conflict: OnConflict,
    },
    /// Run the sync service until Ctrl+C
    Start {
        /// Files to sync, relative to the repository (defaults to the configured list)
        files: Vec<String>,
    },
    /// Run interactive setup wizard
    Setup,
    /// Show the configuration
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum OnConflict {
    /// Ask interactively
    Ask,
    /// Keep the local version
    Local,
    /// Keep the remote version
    Remote,
    /// Write the result with conflict markers
    Diff,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Merge {
            base,
            local,
            remote,
            output,
            on_conflict,
        } => cmd_merge(base, local, remote, output.as_deref(), *on_conflict).await,
        Commands::Start { files } => cmd_start(&cli, files).await,
        Commands::Setup => cmd_setup(&cli).await,
        Commands::Status => cmd_status(&cli).await,
    }
}

fn is_notebook(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ipynb"))
}

fn prompt_for(on_conflict: OnConflict) -> Box<dyn ConflictPrompt> {
    match on_conflict {
        OnConflict::Ask => Box::new(DialoguerPrompt),
        OnConflict::Local => Box::new(FixedPrompt(ConflictChoice::KeepLocal)),
        OnConflict::Remote => Box::new(FixedPrompt(ConflictChoice::KeepRemote)),
        OnConflict::Diff => Box::new(FixedPrompt(ConflictChoice::ViewDiff)),
    }
}

async fn cmd_merge(
    base: &Path,
    local: &Path,
    remote: &Path,
    output: Option<&Path>,
    on_conflict: OnConflict,
) -> anyhow::Result<()> {
    init_stderr_logging("warn");

    let base_text = tokio::fs::read_to_string(base).await?;
    let local_text = tokio::fs::read_to_string(local).await?;
    let remote_text = tokio::fs::read_to_string(remote).await?;
    let prompt = prompt_for(on_conflict);
    let name = local.display().to_string();

    let (merged, conflict) = if is_notebook(local) {
        let mut resolver = NotebookResolver::new(name);
        resolver.add_version(Notebook::from_json(&base_text)?, Origin::Base);
        resolver.add_version(Notebook::from_json(&local_text)?, Origin::Local);
        resolver.add_version(Notebook::from_json(&remote_text)?, Origin::Remote);
        let merged = match resolver.merge_versions(prompt.as_ref()).await? {
            Some(notebook) => notebook.to_json()?,
            None => local_text,
        };
        (merged, resolver.conflict())
    } else {
        let mut resolver = TextResolver::new(name);
        resolver.add_version(base_text, Origin::Base);
        resolver.add_version(local_text.clone(), Origin::Local);
        resolver.add_version(remote_text, Origin::Remote);
        let merged = resolver
            .merge_versions(prompt.as_ref())
            .await?
            .unwrap_or(local_text);
        (merged, resolver.conflict())
    };

    match output {
        Some(path) => {
            tokio::fs::write(path, &merged).await?;
            eprintln!("Merged result written to {}", path.display());
        }
        None => print!("{}", merged),
    }

    if conflict {
        eprintln!("Merge has conflicts");
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_start(cli: &Cli, files: &[String]) -> anyhow::Result<()> {
    let settings = match Settings::load(&cli.config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!(
                "Could not load {} ({}). Run 'gitsync setup' first.",
                cli.config.display(),
                e
            );
            std::process::exit(1);
        }
    };

    let _guard = if settings.logging.file {
        let log_dir = cli
            .config
            .parent()
            .map(|p| p.join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"));
        Some(init_logging(&log_dir, &settings.logging.filter)?)
    } else {
        init_stderr_logging(&settings.logging.filter);
        None
    };

    tracing::info!(repo = %settings.git.repo.display(), "Starting gitsync...");

    let store: Arc<dyn ContentStore> = Arc::new(FsContentStore::new(&settings.git.repo));
    let tracker = Arc::new(FileTracker::new());
    let paths = if files.is_empty() {
        settings.sync.files.clone()
    } else {
        files.to_vec()
    };
    if paths.is_empty() {
        eprintln!("No files to sync. Pass them as arguments or list them in sync.files.");
        std::process::exit(1);
    }

    for path in &paths {
        let file = if is_notebook(Path::new(path)) {
            let editor = Arc::new(DiskNotebookEditor::open(path.as_str(), store.clone()).await?);
            SyncFile::notebook(path.as_str(), &settings.git.repo, editor, store.clone())
        } else {
            let editor = Arc::new(DiskTextEditor::open(path.as_str(), store.clone()).await?);
            SyncFile::text(path.as_str(), &settings.git.repo, editor, store.clone())
        };
        tracker.open(file);
        tracing::info!(path = %path, "Opened file");
    }

    let service = SyncService::new(
        tracker.clone(),
        Arc::new(GitCommand::new(&settings.git)),
        Arc::new(DialoguerPrompt),
        settings.sync.interval(),
    );
    let _status = service.status_changed().connect(|update| match &update.message {
        Some(message) => println!("[{}] {}", update.status, message),
        None => println!("[{}]", update.status),
    });

    println!("gitsync started. Press Ctrl+C to stop.");
    println!();
    println!("Repository: {}", settings.git.repo.display());
    println!("Remote: {} ({})", settings.git.remote, settings.git.branch);
    println!("Files: {:?}", paths);
    println!("Interval: {}s", settings.sync.interval_secs);

    if settings.sync.auto_start {
        service.start();
    } else if let Err(e) = service.sync().await {
        tracing::warn!(error = %e, "Initial sync failed");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    service.stop();
    tracker.save_all().await.ok();
    tracing::info!("gitsync stopped");

    Ok(())
}

async fn cmd_setup(cli: &Cli) -> anyhow::Result<()> {
    println!();
    println!("gitsync - Setup Wizard");
    println!("======================");
    println!();

    let defaults = Settings::load(&cli.config).unwrap_or_default();

    let repo: String = dialoguer::Input::new()
        .with_prompt("Repository path")
        .default(defaults.git.repo.display().to_string())
        .interact_text()?;
    let remote: String = dialoguer::Input::new()
        .with_prompt("Remote")
        .default(defaults.git.remote.clone())
        .interact_text()?;
    let branch: String = dialoguer::Input::new()
        .with_prompt("Branch")
        .default(defaults.git.branch.clone())
        .interact_text()?;

    println!();
    let interval_secs: u64 = dialoguer::Input::new()
        .with_prompt("Sync interval (seconds)")
        .default(defaults.sync.interval_secs)
        .validate_with(|v: &u64| if *v > 0 { Ok(()) } else { Err("must be greater than zero") })
        .interact_text()?;
    let files: String = dialoguer::Input::new()
        .with_prompt("Files to sync (comma separated, relative to the repository)")
        .default(defaults.sync.files.join(","))
        .allow_empty(true)
        .interact_text()?;
    let auto_start = dialoguer::Confirm::new()
        .with_prompt("Start syncing immediately on 'gitsync start'?")
        .default(defaults.sync.auto_start)
        .interact()?;
    let log_file = dialoguer::Confirm::new()
        .with_prompt("Write logs to a file?")
        .default(defaults.logging.file)
        .interact()?;

    let settings = Settings {
        sync: SyncSettings {
            interval_secs,
            auto_start,
            files: files
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect(),
        },
        git: GitSettings {
            repo: PathBuf::from(repo),
            remote,
            branch,
            commit_message: defaults.git.commit_message,
        },
        logging: LoggingSettings {
            filter: defaults.logging.filter,
            file: log_file,
        },
    };
    settings.validate()?;
    settings.save(&cli.config)?;

    println!();
    println!("Configuration saved to {}", cli.config.display());
    println!();
    println!("Start with: gitsync start");
    println!();

    Ok(())
}

async fn cmd_status(cli: &Cli) -> anyhow::Result<()> {
    println!("gitsync Status");
    println!("==============");
    println!();

    let settings = match Settings::load(&cli.config) {
        Ok(s) => s,
        Err(e) => {
            println!("Config: not found ({})", e);
            println!("Run 'gitsync setup' to configure.");
            return Ok(());
        }
    };

    println!("Config: {}", cli.config.display());
    println!("Repository: {}", settings.git.repo.display());
    println!("Remote: {} ({})", settings.git.remote, settings.git.branch);
    println!("Interval: {}s", settings.sync.interval_secs);
    println!("Auto start: {}", settings.sync.auto_start);
    println!("Log filter: {}", settings.logging.filter);
    println!();
    println!("Files:");
    if settings.sync.files.is_empty() {
        println!("  (none)");
    }
    for file in &settings.sync.files {
        let exists = settings.git.repo.join(file).exists();
        println!("  {} {}", if exists { "ok     " } else { "missing" }, file);
    }

    println!();
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

/// Asks on the terminal which way to settle a conflict.
struct DialoguerPrompt;

#[async_trait::async_trait]
impl ConflictPrompt for DialoguerPrompt {
    async fn choose(&self, report: &ConflictReport) -> ConflictChoice {
        let report = report.clone();
        match tokio::task::spawn_blocking(move || ask(&report)).await {
            Ok(Ok(choice)) => choice,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Conflict prompt failed, leaving conflict unresolved");
                ConflictChoice::Ignore
            }
            Err(e) => {
                tracing::error!(error = %e, "Conflict prompt task failed");
                ConflictChoice::Ignore
            }
        }
    }
}

fn ask(report: &ConflictReport) -> anyhow::Result<ConflictChoice> {
    println!();
    println!("Conflict in {}", report.path);
    println!("----------------------------------------");
    println!("{}", report.marked);
    println!("----------------------------------------");

    let labels: Vec<&str> = ConflictChoice::ALL.iter().map(|c| c.label()).collect();
    let index = dialoguer::Select::new()
        .with_prompt("How should this conflict be resolved?")
        .items(&labels)
        .default(2)
        .interact()?;
    Ok(ConflictChoice::ALL[index])
}
