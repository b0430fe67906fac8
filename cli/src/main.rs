//! `printdesk` command-line front end.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use printdesk::pipeline::{count_pages, COUNT_PAGES_COMMAND};
use printdesk::task::PaperSize;
use printdesk::{config, AcceptedTask, JobOptions, PrintDesk, PrintOptions, ReprintOptions};

#[derive(Parser, Debug)]
#[command(name = "printdesk", version, about = "Self-service print desk: intake, pricing and portal printing")]
struct Cli {
    /// JSON config file. Defaults plus PRINTDESK_* variables when omitted.
    #[arg(long, short, global = true, env = "PRINTDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Log line format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload documents as a new job.
    Submit {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Wait for every document to finish processing.
        #[arg(long)]
        wait: bool,
    },
    /// Turn a raw .eml message into a job.
    IngestEmail {
        file: PathBuf,
        #[arg(long)]
        wait: bool,
    },
    /// Per-task status of a job.
    Status { job_id: String },
    /// Every job, newest first.
    Jobs,
    /// Revenue and page totals over printed tasks.
    Stats,
    /// Price a job's ready tasks and record the options.
    Quote {
        job_id: String,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Quote a job, then print it through the portal.
    Print {
        job_id: String,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Print already-printed documents again.
    Reprint {
        #[command(subcommand)]
        target: ReprintTarget,
    },
    /// Scan the email inbox and sweep stale tasks until interrupted.
    Watch,
    /// Delete one task row.
    Delete { task_id: String },
    /// Delete every task row.
    Purge {
        #[arg(long)]
        yes: bool,
    },
    /// Page-count helper used by the subprocess counter.
    #[command(name = COUNT_PAGES_COMMAND, hide = true)]
    CountPages { pdf: PathBuf },
}

#[derive(Subcommand, Debug)]
enum ReprintTarget {
    Task {
        task_id: String,
        #[command(flatten)]
        options: ReprintArgs,
    },
    Job {
        job_id: String,
        #[command(flatten)]
        options: ReprintArgs,
    },
}

#[derive(Args, Debug)]
struct OptionArgs {
    /// JSON object of options keyed by task id. Overrides the flags below.
    #[arg(long)]
    options_file: Option<PathBuf>,
    #[arg(long)]
    color: bool,
    #[arg(long)]
    duplex: bool,
    #[arg(long, default_value_t = 1)]
    copies: u32,
    #[arg(long, value_enum, default_value_t = PaperArg::A4)]
    paper: PaperArg,
    /// First page of a range, 1-based.
    #[arg(long, requires = "to_page")]
    from_page: Option<u32>,
    #[arg(long, requires = "from_page")]
    to_page: Option<u32>,
}

#[derive(Args, Debug)]
struct ReprintArgs {
    #[arg(long)]
    color: bool,
    #[arg(long)]
    duplex: bool,
    #[arg(long, default_value_t = 1)]
    copies: u32,
}

impl From<&ReprintArgs> for ReprintOptions {
    fn from(args: &ReprintArgs) -> Self {
        ReprintOptions {
            copies: args.copies,
            color: args.color,
            duplex: args.duplex,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum PaperArg {
    A3,
    A4,
    A5,
    Letter,
    Legal,
}

impl From<PaperArg> for PaperSize {
    fn from(arg: PaperArg) -> Self {
        match arg {
            PaperArg::A3 => PaperSize::A3,
            PaperArg::A4 => PaperSize::A4,
            PaperArg::A5 => PaperSize::A5,
            PaperArg::Letter => PaperSize::Letter,
            PaperArg::Legal => PaperSize::Legal,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The helper answers on stdout only; keep it free of setup work.
    if let Command::CountPages { pdf } = &cli.command {
        println!("{}", count_pages(pdf));
        return Ok(());
    }

    init_logging(cli.log_format)?;

    let config = match &cli.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => config::config_from_env().context("Invalid configuration")?,
    };
    let desk = PrintDesk::open(config).context("Failed to open print desk")?;

    match cli.command {
        Command::Submit { files, wait } => {
            let job = desk.submit_files(&files)?;
            let tasks = finish_all(job.tasks, wait).await;
            print_json(&json!({ "job_id": job.job_id, "tasks": tasks }))
        }
        Command::IngestEmail { file, wait } => {
            let raw = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let ingested = desk.ingest_email(&raw)?;
            let tasks = finish_all(ingested.tasks, wait).await;
            print_json(&json!({
                "job_id": ingested.job_id,
                "subject": ingested.subject,
                "sender": ingested.sender,
                "tasks": tasks,
                "skipped": ingested.skipped,
            }))
        }
        Command::Status { job_id } => print_json(&desk.job_status(&job_id)?),
        Command::Jobs => print_json(&desk.list_jobs()?),
        Command::Stats => print_json(&desk.stats()?),
        Command::Quote { job_id, options } => {
            let options = job_options(&desk, &job_id, &options)?;
            print_json(&desk.quote(&job_id, &options)?)
        }
        Command::Print { job_id, options } => {
            let options = job_options(&desk, &job_id, &options)?;
            let report = desk.print(&job_id, &options).await?;
            print_json(&report)?;
            if !report.is_success() {
                bail!("Print run for job {} failed", job_id);
            }
            Ok(())
        }
        Command::Reprint { target } => {
            let report = match &target {
                ReprintTarget::Task { task_id, options } => {
                    desk.reprint_task(task_id, &options.into()).await?
                }
                ReprintTarget::Job { job_id, options } => {
                    desk.reprint_job(job_id, &options.into()).await?
                }
            };
            print_json(&report)?;
            if !report.is_success() {
                bail!("Reprint failed");
            }
            Ok(())
        }
        Command::Watch => watch(&desk).await,
        Command::Delete { task_id } => {
            if !desk.delete_task(&task_id)? {
                bail!("Task {} not found", task_id);
            }
            Ok(())
        }
        Command::Purge { yes } => {
            if !yes {
                bail!("Refusing to delete every task without --yes");
            }
            let removed = desk.purge()?;
            print_json(&json!({ "deleted": removed }))
        }
        Command::CountPages { .. } => Ok(()),
    }
}

fn init_logging(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    }
    .context("Failed to install tracing subscriber")?;

    // Route `log` records from the library into tracing.
    tracing_log::LogTracer::init().context("Failed to install log bridge")?;
    Ok(())
}

#[derive(Serialize)]
struct TaskLine {
    task_id: String,
    filename: String,
    stored_filename: String,
    status: printdesk::TaskStatus,
}

async fn finish_all(tasks: Vec<AcceptedTask>, wait: bool) -> Vec<TaskLine> {
    let mut lines = Vec::with_capacity(tasks.len());
    for task in tasks {
        let task_id = task.task_id.clone();
        let filename = task.original_filename.clone();
        let stored_filename = task.stored_filename.clone();
        let status = if wait { task.finish().await } else { task.status };
        lines.push(TaskLine {
            task_id,
            filename,
            stored_filename,
            status,
        });
    }
    lines
}

/// Options from `--options-file`, or the flags applied to every ready task.
fn job_options(desk: &PrintDesk, job_id: &str, args: &OptionArgs) -> Result<JobOptions> {
    if let Some(path) = &args.options_file {
        return read_options(path);
    }

    let mut options = PrintOptions::default()
        .color(args.color)
        .duplex(args.duplex)
        .copies(args.copies);
    options.paper_size = args.paper.into();
    if let (Some(from), Some(to)) = (args.from_page, args.to_page) {
        options = options.range(from, to);
    }

    Ok(desk
        .store()
        .list_by_job(job_id)?
        .into_iter()
        .filter(|t| t.status.is_ready())
        .map(|t| (t.task_id, options.clone()))
        .collect())
}

fn read_options(path: &Path) -> Result<JobOptions> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid options JSON in {}", path.display()))
}

async fn watch(desk: &PrintDesk) -> Result<()> {
    let sweeper = desk.sweeper();
    let sweep_handle = sweeper.as_ref().map(|s| s.start());
    if sweeper.is_none() {
        tracing::info!("No sweep interval configured, stale tasks are reaped on status reads");
    }

    let Some(scanner) = desk.inbox_scanner() else {
        if sweeper.is_none() {
            bail!("Nothing to watch: set email.inbox_dir or pipeline.sweep_interval_secs");
        }
        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
        stop(sweeper, sweep_handle);
        return Ok(());
    };

    tracing::info!(inbox = %scanner.inbox_dir().display(), "Watching inbox");
    tokio::select! {
        _ = scanner.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Interrupted, shutting down");
        }
    }
    stop(sweeper, sweep_handle);
    Ok(())
}

fn stop(
    sweeper: Option<printdesk::StaleSweeper>,
    handle: Option<tokio::task::JoinHandle<()>>,
) {
    if let Some(sweeper) = sweeper {
        sweeper.stop();
    }
    if let Some(handle) = handle {
        handle.abort();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
