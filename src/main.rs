//! Jobhive - in-process background job engine
//!
//! Entry point for the `jobhive` CLI.

mod adapters;
mod cli;
mod jobs_file;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jobhive_config::{Config, ConfigLoader, ConfigValidator, LoggingSection, ValidationResult};
use jobhive_queue::handlers::{AiAnalysisHandler, EmailNotificationHandler, FileProcessingHandler};
use jobhive_queue::{Engine, EngineConfig, EngineEvent, FileDeadLetterStore};

use adapters::{
    ExtractionSummaryService, KeywordSubjectDetector, LogNotifier, MemoryAnalysisRepository,
    MemoryFileRepository, TextExtractor,
};
use cli::{Cli, Commands};

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(ConfigLoader::expand_path(&path.to_string_lossy()))
}

fn init_tracing(logging: &LoggingSection) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("invalid log level '{}'", logging.level))?,
    };

    let file_layer = match &logging.log_dir {
        Some(dir) => {
            let log_dir = expand(dir);
            std::fs::create_dir_all(&log_dir)
                .with_context(|| format!("creating log directory {}", log_dir.display()))?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("jobhive")
                .filename_suffix("log")
                .max_log_files(14)
                .build(&log_dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // The guard flushes on drop, so it lives as long as the process.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    let json_layer = logging.json.then(|| fmt::layer().json().with_current_span(false));
    let text_layer = (!logging.json).then(|| fmt::layer().with_target(true).with_ansi(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::CheckConfig) => check_config(&cli.config),
        Some(Commands::Run {
            jobs,
            files,
            drain_secs,
        }) => run(&cli.config, jobs, files, drain_secs).await,
        None => run(&cli.config, None, None, 30).await,
    }
}

fn print_validation(validation: &ValidationResult) {
    for warning in &validation.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &validation.errors {
        println!("error: {}: {}", error.path, error.message);
    }
}

fn check_config(path: &Path) -> Result<()> {
    let config = match ConfigLoader::load(path) {
        Ok(config) => config,
        Err(jobhive_config::ConfigError::NotFound(_)) => {
            println!("{} not found, built-in defaults apply", path.display());
            Config::default()
        }
        Err(e) => return Err(e.into()),
    };

    let validation = ConfigValidator::validate(&config);
    print_validation(&validation);
    if !validation.is_valid() {
        bail!("{} has {} error(s)", path.display(), validation.errors.len());
    }

    println!("{}: ok", path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

async fn run(
    config_path: &Path,
    jobs: Option<PathBuf>,
    files: Option<PathBuf>,
    drain_secs: u64,
) -> Result<()> {
    let (config, found) = ConfigLoader::load_or_default(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    init_tracing(&config.logging)?;

    info!("Starting Jobhive v{}", env!("CARGO_PKG_VERSION"));
    if found {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "No configuration file, using defaults");
    }

    let validation = ConfigValidator::validate(&config);
    for warning in &validation.warnings {
        warn!(path = %warning.path, "{}", warning.message);
    }
    if !validation.is_valid() {
        print_validation(&validation);
        bail!("invalid configuration");
    }

    let mut engine_config = EngineConfig::from(&config.engine);
    engine_config.dead_letter_dir = engine_config.dead_letter_dir.as_deref().map(expand);

    let files_repo = Arc::new(match files {
        Some(dir) => MemoryFileRepository::from_dir(&expand(&dir))
            .await
            .with_context(|| format!("loading files from {}", dir.display()))?,
        None => MemoryFileRepository::default(),
    });
    let analyses = Arc::new(MemoryAnalysisRepository::default());

    let mut builder = Engine::builder(engine_config.clone())
        .with_handler(FileProcessingHandler::new(
            files_repo.clone(),
            Arc::new(TextExtractor),
            Arc::new(KeywordSubjectDetector),
        ))
        .with_handler(AiAnalysisHandler::new(
            Arc::new(ExtractionSummaryService::new(files_repo.clone())),
            analyses.clone(),
        ))
        .with_handler(EmailNotificationHandler::new(Arc::new(LogNotifier)));

    if let Some(dir) = &engine_config.dead_letter_dir {
        let store = FileDeadLetterStore::new(dir)
            .await
            .with_context(|| format!("opening dead-letter store in {}", dir.display()))?;
        builder = builder.with_dead_letter_store(Arc::new(store));
    }

    let engine = builder.build();
    let monitor = tokio::spawn(watch_events(engine.subscribe()));

    engine.start()?;

    if let Some(path) = jobs {
        let entries = jobs_file::read_jobs(&expand(&path)).await?;
        let count = entries.len();
        for (job_type, payload) in entries {
            engine.enqueue(job_type, payload);
        }
        info!(count, path = %path.display(), "Enqueued jobs from file");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    engine.stop().await?;
    if !engine.drain(Duration::from_secs(drain_secs)).await {
        warn!(drain_secs, "Shutting down with jobs still in flight");
    }
    monitor.abort();

    let stats = serde_json::to_string(&engine.stats())?;
    let dead_letters = engine.dead_letters().list().await?.len();
    let analyses = analyses.len().await;
    info!(%stats, dead_letters, analyses, "Jobhive stopped");
    Ok(())
}

async fn watch_events(mut events: tokio::sync::broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::JobFailed { job, reason }) => {
                warn!(job_id = %job.id(), job_type = %job.job_type(), %reason, "Job abandoned");
            }
            Ok(EngineEvent::JobRetryScheduled { job, delay }) => {
                info!(
                    job_id = %job.id(),
                    retry_count = job.retry_count(),
                    delay_secs = delay.as_secs(),
                    "Retry scheduled"
                );
            }
            Ok(event) => debug!(?event, "Engine event"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event monitor lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
