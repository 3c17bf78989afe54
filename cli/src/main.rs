mod console;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use stimulus_client::autogen::{AutoGenerator, chat_for};
use stimulus_client::config::{ConfigError, parse_session};
use stimulus_client::net::api::{HttpJobApi, JobApi};
use stimulus_client::net::connection::{ConnectionManager, ConnectionState};
use stimulus_client::net::transport::SocketIoTransport;
use stimulus_client::net::types::JobStatus;
use stimulus_client::poller::PollOutcome;
use stimulus_client::progress::ProgressReconciler;
use stimulus_client::tables::{RequirementRow, ScoringRow};
use stimulus_client::{ClientConfig, ClientError, JobRunner, JobSpec, SessionGuard};

use crate::console::ConsoleUi;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("api request failed: {0}")]
    Api(#[from] stimulus_client::net::api::ApiError),
    #[error("chat client setup failed: {0}")]
    Llm(#[from] stimulus_client::llm::LlmError),
    #[error("job file {}: {source}", path.display())]
    JobFile { path: PathBuf, source: std::io::Error },
    #[error("invalid job file: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("job file has no model; set \"model\" before running autogen")]
    MissingModel,
    #[error("failed to wait for interrupt: {0}")]
    Signal(std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "stimulus-cli", about = "Stimulus generation service client")]
struct Cli {
    #[arg(long, env = "STIMULUS_BASE_URL", default_value = stimulus_client::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// Session token.
    #[arg(long, env = "STIMULUS_SESSION", conflicts_with = "session_url")]
    session: Option<String>,

    /// Page URL embedding the session token.
    #[arg(long, env = "STIMULUS_SESSION_URL")]
    session_url: Option<String>,

    /// Fallback API key when the job file leaves it blank.
    #[arg(long, env = "STIMULUS_OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full guarded generation job and save the artifact.
    Generate {
        #[arg(long)]
        job: PathBuf,
        #[arg(long, env = "STIMULUS_OUT_DIR", default_value = ".")]
        out: PathBuf,
    },
    /// Fetch the job status once.
    Status,
    /// Ask the server to stop the running job.
    Stop,
    /// Stream progress and agent logs until interrupted.
    Watch,
    /// Infer Validator and Scorer tables for a job file.
    Autogen {
        #[arg(long)]
        job: PathBuf,
        /// Write the filled tables back into the job file.
        #[arg(long, default_value_t = false)]
        write: bool,
    },
}

struct CliContext {
    config: ClientConfig,
    openai_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();

    let raw_session = cli.session.or(cli.session_url).ok_or(ConfigError::MissingSession)?;
    let mut config = ClientConfig::new(&cli.base_url, parse_session(&raw_session)?)?;
    config.apply_env_overrides();
    tracing::debug!(base_url = %config.base_url, session = %config.session, "config loaded");
    let ctx = CliContext { config, openai_api_key: cli.openai_api_key };

    match cli.command {
        Command::Generate { job, out } => run_generate(&ctx, &job, out).await,
        Command::Status => run_status(&ctx).await,
        Command::Stop => run_stop(&ctx).await,
        Command::Watch => run_watch(&ctx).await,
        Command::Autogen { job, write } => run_autogen(&ctx, &job, write).await,
    }
}

async fn run_generate(ctx: &CliContext, job_path: &Path, out: PathBuf) -> Result<(), CliError> {
    let spec = load_job(ctx, job_path)?;
    let ui = Arc::new(ConsoleUi::new(out));
    let connection = ConnectionManager::new(&ctx.config, Arc::new(SocketIoTransport), ui.clone());
    let guard = SessionGuard::new(ui.clone(), &ctx.config.guard);
    let api = Arc::new(HttpJobApi::new(ctx.config.clone())?);
    let runner = JobRunner::new(&ctx.config, api, ui.clone(), connection.clone(), guard);

    let job = runner.start_generation(&spec).await;
    let outcome = match job {
        Ok(job) => {
            tokio::select! {
                outcome = job.finish() => outcome,
                interrupted = tokio::signal::ctrl_c() => {
                    interrupted.map_err(CliError::Signal)?;
                    tracing::info!("interrupted, stopping job");
                    let _ = runner.stop().await;
                    PollOutcome::Cancelled
                }
            }
        }
        Err(e) => {
            connection.disconnect();
            return Err(e.into());
        }
    };
    connection.disconnect();

    let file = outcome.into_result()?;
    tracing::info!(%file, "generation complete");
    for path in ui.saved() {
        println!("{}", path.display());
    }
    Ok(())
}

async fn run_status(ctx: &CliContext) -> Result<(), CliError> {
    let api = HttpJobApi::new(ctx.config.clone())?;
    let status = api.generation_status().await?;
    print_json(&status_json(&status))
}

async fn run_stop(ctx: &CliContext) -> Result<(), CliError> {
    let api = HttpJobApi::new(ctx.config.clone())?;
    let response = api.stop_generation().await?;
    println!("{}", response.message);
    Ok(())
}

async fn run_watch(ctx: &CliContext) -> Result<(), CliError> {
    let ui = Arc::new(ConsoleUi::new("."));
    let connection = ConnectionManager::new(&ctx.config, Arc::new(SocketIoTransport), ui.clone());
    connection.route_progress_to(Arc::new(ProgressReconciler::new(ui)));
    let mut states = connection.subscribe_state();
    connection.connect();

    let result = loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = *states.borrow_and_update();
                tracing::info!(?state, "push channel");
                if state == ConnectionState::Failed {
                    break Ok(());
                }
            }
            interrupted = tokio::signal::ctrl_c() => break interrupted.map_err(CliError::Signal),
        }
    };
    connection.disconnect();
    result
}

async fn run_autogen(ctx: &CliContext, job_path: &Path, write: bool) -> Result<(), CliError> {
    let mut spec = load_job(ctx, job_path)?;
    let ui = Arc::new(ConsoleUi::new("."));
    let guard = SessionGuard::new(ui.clone(), &ctx.config.guard);
    let chat = chat_for(spec.model.as_ref().ok_or(CliError::MissingModel)?)?;

    AutoGenerator::new(ui, guard).auto_generate(&mut spec, &chat).await?;

    if write {
        let text = serde_json::to_string_pretty(&spec)?;
        std::fs::write(job_path, text).map_err(|source| CliError::JobFile { path: job_path.to_owned(), source })?;
        tracing::info!(path = %job_path.display(), "job file updated");
    }
    print_json(&tables_json(&spec.requirements, &spec.scoring))
}

fn load_job(ctx: &CliContext, path: &Path) -> Result<JobSpec, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::JobFile { path: path.to_owned(), source })?;
    let mut spec: JobSpec = serde_json::from_str(&text)?;
    if let (Some(model), Some(key)) = (spec.model.as_mut(), ctx.openai_api_key.as_deref()) {
        model.fill_api_key(key);
    }
    Ok(spec)
}

fn status_json(status: &JobStatus) -> Value {
    match status {
        JobStatus::Running { progress } => json!({ "status": "running", "progress": progress }),
        JobStatus::Completed { file } => json!({ "status": "completed", "file": file }),
        JobStatus::Stopped => json!({ "status": "stopped" }),
        JobStatus::Error { message } => json!({ "status": "error", "error_message": message }),
        JobStatus::Unknown(status) => json!({ "status": status }),
    }
}

fn tables_json(requirements: &[RequirementRow], scoring: &[ScoringRow]) -> Value {
    json!({ "requirements": requirements, "scoring": scoring })
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
