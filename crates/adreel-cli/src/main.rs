//! adreel - personalized video ad campaigns from the command line.

mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use adreel_adapters::build_collaborators;
use adreel_core::{
    AdreelConfig, CampaignJob, CampaignOrchestrator, JobJournal, JobOutcome, JobStatus,
};
use adreel_proto::{CampaignError, CampaignRequest};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for a job that ended `failed`.
const EXIT_FAILED: i32 = 1;
/// Exit code for a request rejected before any upstream call.
const EXIT_INVALID: i32 = 2;
/// Exit code for a job cancelled with Ctrl-C.
const EXIT_CANCELLED: i32 = 130;

/// adreel - generate, render, and deliver personalized video ads
#[derive(Parser, Debug)]
#[command(name = "adreel", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = adreel_core::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the .adreel job journal
    #[arg(long, default_value = ".", global = true)]
    workspace: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a new campaign job end to end
    Run(RunArgs),

    /// Continue a failed or interrupted job from where it stopped
    Resume(JobArgs),

    /// Retry only the email delivery of a rendered job
    Deliver(JobArgs),

    /// List recorded jobs
    Jobs(JobsArgs),

    /// Show one job
    Status(JobArgs),

    /// Write a starter adreel.yml
    Init(InitArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// User whose stored preferences personalize the ad
    #[arg(long = "user")]
    user_id: String,

    /// Product being advertised
    #[arg(long)]
    product: String,

    /// Target audience description
    #[arg(long)]
    audience: String,

    /// Campaign goal (defaults to pipeline.default_goal)
    #[arg(long)]
    goal: Option<String>,

    /// Recipient of the finished ad
    #[arg(long)]
    email: String,

    /// Print the final job as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct JobArgs {
    /// Job id, as printed by `adreel run` or `adreel jobs`
    job_id: String,

    /// Print the job as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct JobsArgs {
    /// Only list jobs with this status
    #[arg(long)]
    status: Option<JobStatus>,

    /// Print the jobs as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays parseable.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match cli.command {
        Commands::Run(args) => run_command(&cli.config, &cli.workspace, args).await?,
        Commands::Resume(args) => {
            job_command(&cli.config, &cli.workspace, args, JobAction::Resume).await?
        }
        Commands::Deliver(args) => {
            job_command(&cli.config, &cli.workspace, args, JobAction::Deliver).await?
        }
        Commands::Jobs(args) => jobs_command(&cli.workspace, args)?,
        Commands::Status(args) => status_command(&cli.workspace, args)?,
        Commands::Init(args) => init_command(&cli.config, args)?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn run_command(config_path: &Path, workspace: &Path, args: RunArgs) -> Result<i32> {
    let request = CampaignRequest {
        user_id: args.user_id,
        product_name: args.product,
        audience: args.audience,
        goal: args.goal,
        recipient_email: args.email,
    };

    // Reject bad input before credentials or the network are touched.
    if let Err(err) = request.validate() {
        eprintln!("error: {err}");
        return Ok(EXIT_INVALID);
    }

    let config = load_config(config_path)?;
    let orchestrator = build_orchestrator(&config, workspace)?;
    let cancel = cancel_on_ctrl_c();

    let outcome = orchestrator.run(request, &cancel).await;
    report(&outcome, args.json)
}

#[derive(Debug, Clone, Copy)]
enum JobAction {
    Resume,
    Deliver,
}

async fn job_command(
    config_path: &Path,
    workspace: &Path,
    args: JobArgs,
    action: JobAction,
) -> Result<i32> {
    let journal = JobJournal::new(workspace);
    let job = journal
        .get(&args.job_id)
        .with_context(|| format!("Failed to load job {}", args.job_id))?;

    let config = load_config(config_path)?;
    let orchestrator = build_orchestrator(&config, workspace)?;
    let cancel = cancel_on_ctrl_c();

    let outcome = match action {
        JobAction::Resume => orchestrator.resume(job, &cancel).await,
        JobAction::Deliver => orchestrator.deliver(job, &cancel).await,
    };
    report(&outcome, args.json)
}

fn jobs_command(workspace: &Path, args: JobsArgs) -> Result<i32> {
    let journal = JobJournal::new(workspace);
    let jobs = match args.status {
        Some(status) => journal.list_by_status(status),
        None => journal.list(),
    }
    .context("Failed to read job journal")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
    } else {
        print!("{}", output::format_job_list(&jobs));
    }
    Ok(0)
}

fn status_command(workspace: &Path, args: JobArgs) -> Result<i32> {
    let journal = JobJournal::new(workspace);
    let job = journal
        .get(&args.job_id)
        .with_context(|| format!("Failed to load job {}", args.job_id))?;

    print_job(&job, args.json)?;
    Ok(0)
}

fn init_command(config_path: &Path, args: InitArgs) -> Result<i32> {
    if config_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    std::fs::write(config_path, AdreelConfig::template())
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Created {}", config_path.display());
    Ok(0)
}

fn load_config(path: &Path) -> Result<AdreelConfig> {
    let config = AdreelConfig::load_or_default(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

fn build_orchestrator(config: &AdreelConfig, workspace: &Path) -> Result<CampaignOrchestrator> {
    let services = build_collaborators(config).context("Failed to set up service clients")?;
    let orchestrator = CampaignOrchestrator::new(services, config.pipeline.clone());

    if config.journal.enabled {
        Ok(orchestrator.with_sink(Arc::new(JobJournal::new(workspace))))
    } else {
        Ok(orchestrator)
    }
}

/// Cancels the returned token on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl-C, cancelling job");
            trigger.cancel();
        }
    });
    cancel
}

/// Prints the outcome and picks the exit code.
fn report(outcome: &JobOutcome, json: bool) -> Result<i32> {
    match outcome {
        Ok(job) => {
            print_job(job, json)?;
            Ok(0)
        }
        Err(failure) => {
            print_job(&failure.job, json)?;
            eprintln!("error: {}", failure.error);
            Ok(exit_code_for(&failure.error))
        }
    }
}

fn print_job(job: &CampaignJob, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(job)?);
    } else {
        print!("{}", output::format_job(job));
    }
    Ok(())
}

fn exit_code_for(error: &CampaignError) -> i32 {
    match error {
        CampaignError::InvalidRequest(_) => EXIT_INVALID,
        CampaignError::Cancelled => EXIT_CANCELLED,
        _ => EXIT_FAILED,
    }
}
