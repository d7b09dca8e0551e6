use anyhow::{bail, Result};
use chunkwise_common::logger::{self, mask_credential};
use chunkwise_common::{storage, AppConfig};
use chunkwise_llm::{
    split_document, validate_credentials, CredentialPool, DocumentKind, DocumentPipeline,
    MemoryMode, OpenAiClient, RetryPolicy, RunReport,
};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Find project root by looking for .git directory
fn find_project_root() -> Option<PathBuf> {
    let mut current_dir = std::env::current_dir().ok()?;

    loop {
        if current_dir.join(".git").exists() {
            return Some(current_dir);
        }

        if !current_dir.pop() {
            break;
        }
    }

    None
}

/// Load .env file from project root
fn load_dotenv_from_project_root() {
    if let Some(root) = find_project_root() {
        let env_path = root.join(".env");
        if env_path.exists() {
            dotenv::from_path(&env_path).ok();
        }
    } else {
        // Fallback to default dotenv behavior
        dotenv::dotenv().ok();
    }
}

#[derive(Parser)]
#[command(name = "chunkwise")]
#[command(about = "Chunkwise - incremental summarization of long documents", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./chunkwise.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the summarizing commands
#[derive(Args)]
struct RunArgs {
    /// Completion model
    #[arg(long)]
    model_name: Option<String>,

    /// Credential store, one API key per line
    #[arg(long)]
    apikey_file: Option<PathBuf>,

    /// Log file
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Summarize every chunk independently
    #[arg(long)]
    no_scm: bool,

    /// Documents processed concurrently
    #[arg(long)]
    jobs: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize plain-text books
    Summarize {
        /// Book files
        #[arg(long, required = true, num_args = 1..)]
        book_files: Vec<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Summarize meeting transcripts (JSON arrays of {speaker, text})
    Meeting {
        /// Meeting transcript files
        #[arg(long, required = true, num_args = 1..)]
        meeting_files: Vec<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Split books into chunks and write the chunk artifacts only
    Split {
        /// Book files
        #[arg(long, required = true, num_args = 1..)]
        book_files: Vec<PathBuf>,

        /// Model whose tokenizer measures the chunks
        #[arg(long)]
        model_name: Option<String>,

        /// Token budget per chunk
        #[arg(long)]
        max_tokens: Option<usize>,
    },

    /// Probe every key in the credential store
    ValidateKeys {
        /// Credential store
        #[arg(long)]
        apikey_file: Option<PathBuf>,

        /// Model used for the probe
        #[arg(long)]
        model_name: Option<String>,

        /// Report the answering keys without rewriting the store
        #[arg(long)]
        dry_run: bool,
    },
}

impl RunArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(model) = &self.model_name {
            config.llm_model = model.clone();
        }
        if let Some(path) = &self.apikey_file {
            config.apikey_file = path.clone();
        }
        if let Some(path) = &self.logfile {
            config.log_file = path.clone();
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
    }

    fn memory_mode(&self) -> MemoryMode {
        if self.no_scm {
            MemoryMode::NoMemory
        } else {
            MemoryMode::WithMemory
        }
    }
}

fn build_client(config: &AppConfig) -> Result<Arc<OpenAiClient>> {
    Ok(Arc::new(OpenAiClient::new(
        &config.openai_base_url,
        &config.llm_model,
        &config.embedding_model,
        config.request_timeout(),
    )?))
}

/// Cancel `token` on Ctrl-C; running documents stop at the next turn boundary
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current turns...");
            token.cancel();
        }
    });
}

async fn run_summaries(config: AppConfig, files: Vec<PathBuf>, kind: DocumentKind, mode: MemoryMode) -> Result<()> {
    if !config.apikey_file.exists() {
        bail!("Credential store not found: {}", config.apikey_file.display());
    }

    let pool = Arc::new(CredentialPool::load(&config.apikey_file, RetryPolicy::from_config(&config))?);
    let client = build_client(&config)?;

    tracing::info!("Chunkwise starting...");
    tracing::info!("Configuration loaded:");
    tracing::info!("  Model: {}", config.llm_model);
    tracing::info!("  Credentials: {}", pool.active_tokens().len());
    tracing::info!("  Output: {}", config.history_dir.display());

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let pipeline = DocumentPipeline::new(config, client, pool.clone());
    let report: RunReport = match kind {
        DocumentKind::Book => pipeline.summarize_books(&files, mode, &cancel).await,
        DocumentKind::Meeting => pipeline.summarize_meetings(&files, mode, &cancel).await,
    };

    // Runs once per process, after exhaustion too
    let store = pool.remove_deprecated_keys();
    finish_run(&report, store)
}

/// Print the run summary, then fail if the run stopped early or the
/// credential store could not be rewritten
fn finish_run(report: &RunReport, store: chunkwise_common::Result<Vec<String>>) -> Result<()> {
    println!(
        "{} completed, {} aborted, {} skipped",
        report.completed(),
        report.aborted(),
        report.skipped()
    );

    let survivors = match store {
        Ok(survivors) => survivors,
        Err(e) => {
            tracing::error!("Failed to rewrite credential store: {}", e);
            bail!("Credential store not saved: {}", e);
        }
    };
    tracing::info!("{} credentials remain in the store", survivors.len());

    if let Some(fatal) = report.fatal_error() {
        bail!("Run stopped: {}", fatal);
    }
    Ok(())
}

async fn run_split(config: AppConfig, files: Vec<PathBuf>) -> Result<()> {
    let client = build_client(&config)?;
    for file in &files {
        let chunks = split_document(&config, client.as_ref(), file, DocumentKind::Book).await?;
        let oversized = chunks.iter().filter(|c| c.oversized).count();
        println!(
            "{}: {} chunks ({} oversized)",
            file.display(),
            chunks.len(),
            oversized
        );
    }
    Ok(())
}

async fn run_validate_keys(config: AppConfig, dry_run: bool) -> Result<()> {
    let store: &Path = &config.apikey_file;
    if !store.exists() {
        bail!("Credential store not found: {}", store.display());
    }

    let tokens = storage::read_lines(store)?;
    let client = build_client(&config)?;
    let valid = validate_credentials(client.as_ref(), &tokens, config.request_timeout()).await;

    println!("{}/{} keys are valid", valid.len(), tokens.len());
    for token in &valid {
        println!("  {}", mask_credential(token));
    }

    if dry_run {
        return Ok(());
    }

    if let Some(backup) = storage::overwrite_lines(store, &valid)? {
        println!("Previous store kept at {}", backup.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load environment variables from .env at project root
    load_dotenv_from_project_root();

    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Summarize { book_files, run } => {
            run.apply(&mut config);
            config.validate()?;
            logger::setup_logging(&config.log_file, &config.log_level)?;
            run_summaries(config, book_files, DocumentKind::Book, run.memory_mode()).await
        }
        Commands::Meeting { meeting_files, run } => {
            run.apply(&mut config);
            config.validate()?;
            logger::setup_logging(&config.log_file, &config.log_level)?;
            run_summaries(config, meeting_files, DocumentKind::Meeting, run.memory_mode()).await
        }
        Commands::Split {
            book_files,
            model_name,
            max_tokens,
        } => {
            if let Some(model) = model_name {
                config.llm_model = model;
            }
            if let Some(max_tokens) = max_tokens {
                config.book_max_tokens = max_tokens;
            }
            config.validate()?;
            logger::setup_console_logging(&config.log_level)?;
            run_split(config, book_files).await
        }
        Commands::ValidateKeys {
            apikey_file,
            model_name,
            dry_run,
        } => {
            if let Some(path) = apikey_file {
                config.apikey_file = path;
            }
            if let Some(model) = model_name {
                config.llm_model = model;
            }
            config.validate()?;
            logger::setup_console_logging(&config.log_level)?;
            run_validate_keys(config, dry_run).await
        }
    }
}
