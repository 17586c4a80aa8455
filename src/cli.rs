use crate::builder::JobRequest;
use crate::config::FileConfig;
use crate::model::{
    Complexity, ControllerConfig, ControllerEvent, Job, JobId, JobStatus, DEFAULT_WORLD_SIZE,
};
use crate::orchestrator::{self, run_controller, Command, Controller};
use crate::service::{GenerationService, HttpGenerationClient};
use crate::text_summary;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

/// Sends output lines to the writer task. Stderr notes are dropped in silent mode.
struct Output {
    tx: mpsc::UnboundedSender<OutputLine>,
    silent: bool,
}

impl Output {
    fn stdout(&self, line: impl Into<String>) {
        let _ = self.tx.send(OutputLine::Stdout(line.into()));
    }

    fn stderr(&self, line: impl Into<String>) {
        if !self.silent {
            let _ = self.tx.send(OutputLine::Stderr(line.into()));
        }
    }
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "worldgen",
    version,
    about = "Submit world generation jobs, follow their progress and download the results"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Base URL of the generation service
    #[arg(long, global = true, env = "WORLDGEN_API_URL")]
    pub api_url: Option<String>,

    /// Path to a JSON config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Delay between status checks
    #[arg(long, global = true)]
    pub poll_interval: Option<humantime::Duration>,

    /// Deadline for a single service request
    #[arg(long, global = true)]
    pub request_timeout: Option<humantime::Duration>,

    /// Consecutive failed status checks before giving up (0 = never)
    #[arg(long, global = true)]
    pub max_poll_failures: Option<u32>,

    /// Print JSON results to stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Run silently: suppress all output except results and errors
    #[arg(long, global = true)]
    pub silent: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Commands {
    /// Submit a new world and follow it until it finishes
    Generate(GenerateArgs),

    /// Follow a previously submitted job
    Watch {
        job_id: String,

        #[command(flatten)]
        save: SaveArgs,
    },

    /// List recent jobs
    Jobs {
        /// Number of jobs to list
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Download the world of a completed job
    Download {
        job_id: String,

        /// Directory to write the world file into
        #[arg(long, short)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Debug, clap::Args, Clone)]
pub struct GenerateArgs {
    /// Description of the world to generate
    pub prompt: String,

    /// World size in studs, clamped to 128..=2048 and rounded to a multiple of 64
    #[arg(long, default_value_t = DEFAULT_WORLD_SIZE)]
    pub world_size: u32,

    #[arg(long, value_enum, default_value_t = Complexity::Medium)]
    pub complexity: Complexity,

    /// Optional style hint, e.g. "low poly"
    #[arg(long)]
    pub style: Option<String>,

    #[arg(long)]
    pub no_terrain: bool,

    #[arg(long)]
    pub no_structures: bool,

    #[arg(long)]
    pub no_objects: bool,

    #[command(flatten)]
    pub save: SaveArgs,
}

#[derive(Debug, clap::Args, Clone)]
pub struct SaveArgs {
    /// Directory to write the world file into
    #[arg(long, short)]
    pub output_dir: Option<PathBuf>,

    /// Do not download the world once the job completes
    #[arg(long)]
    pub no_download: bool,
}

impl GenerateArgs {
    fn to_request(&self) -> JobRequest {
        JobRequest {
            prompt: self.prompt.clone(),
            world_size: self.world_size,
            complexity: self.complexity,
            style: self.style.clone(),
            include_terrain: !self.no_terrain,
            include_structures: !self.no_structures,
            include_objects: !self.no_objects,
        }
    }
}

/// Build a `ControllerConfig` from CLI arguments on top of the config file.
pub fn build_config(args: &Cli, file: &FileConfig) -> ControllerConfig {
    let mut cfg = ControllerConfig::default();
    file.apply_to(&mut cfg);

    if let Some(url) = &args.api_url {
        cfg.api_url = url.clone();
    }
    if let Some(d) = args.poll_interval {
        cfg.poll_interval = Duration::from(d);
    }
    if let Some(d) = args.request_timeout {
        cfg.request_timeout = Duration::from(d);
    }
    if let Some(n) = args.max_poll_failures {
        cfg.max_poll_failures = n;
    }
    if let Commands::Jobs { limit: Some(n) } = &args.command {
        cfg.recent_limit = *n;
    }
    cfg
}

pub async fn run(args: Cli) -> Result<()> {
    let file = FileConfig::load(args.config.as_deref()).context("failed to load config file")?;
    let cfg = build_config(&args, &file);
    if cfg.poll_interval.is_zero() {
        bail!("--poll-interval must be greater than zero");
    }
    tracing::debug!(api_url = %cfg.api_url, poll_interval = ?cfg.poll_interval, "configuration loaded");

    let service: Arc<dyn GenerationService> =
        Arc::new(HttpGenerationClient::new(&cfg).context("failed to create service client")?);
    let fallback_dir = file.output_dir.clone();

    let (tx, out_handle) = spawn_output_writer();
    let out = Output {
        tx,
        silent: args.silent,
    };

    let result = match &args.command {
        Commands::Generate(gen) => {
            let dir = output_dir(gen.save.output_dir.as_ref(), fallback_dir.as_ref());
            let save = (!gen.save.no_download).then_some(dir.as_path());
            track(cfg, service, Track::Submit(gen.to_request()), save, args.json, &out).await
        }
        Commands::Watch { job_id, save } => {
            let dir = output_dir(save.output_dir.as_ref(), fallback_dir.as_ref());
            let save = (!save.no_download).then_some(dir.as_path());
            let track_job = Track::Resume(JobId::new(job_id.trim()));
            track(cfg, service, track_job, save, args.json, &out).await
        }
        Commands::Jobs { .. } => list_jobs(cfg, service, args.json, &out).await,
        Commands::Download { job_id, output_dir: dir } => {
            let dir = output_dir(dir.as_ref(), fallback_dir.as_ref());
            download(cfg, service, JobId::new(job_id.trim()), &dir, args.json, &out).await
        }
    };

    drop(out);
    let _ = out_handle.await;
    result
}

fn output_dir(explicit: Option<&PathBuf>, from_file: Option<&PathBuf>) -> PathBuf {
    explicit
        .or(from_file)
        .cloned()
        .unwrap_or_else(orchestrator::default_output_dir)
}

enum Track {
    Submit(JobRequest),
    Resume(JobId),
}

#[derive(Serialize)]
struct TrackOutput {
    job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact: Option<PathBuf>,
}

async fn ask<T>(
    cmd_tx: &mpsc::UnboundedSender<Command>,
    make: impl FnOnce(oneshot::Sender<T>) -> Command,
) -> Result<T> {
    let (reply, rx) = oneshot::channel();
    cmd_tx
        .send(make(reply))
        .map_err(|_| anyhow!("controller stopped"))?;
    rx.await.context("controller stopped")
}

/// Submit or resume a job and print its progress until it reaches a terminal
/// status or the user interrupts. Completed worlds are saved into `save`.
async fn track(
    cfg: ControllerConfig,
    service: Arc<dyn GenerationService>,
    start: Track,
    save: Option<&Path>,
    json: bool,
    out: &Output,
) -> Result<()> {
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<ControllerEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
    let controller = Controller::new(service, cfg, Some(evt_tx));
    let handle = tokio::spawn(run_controller(controller, cmd_rx));

    let job_id = match start {
        Track::Submit(request) => {
            ask(&cmd_tx, |reply| Command::Submit { request, reply })
                .await??
        }
        Track::Resume(job_id) => {
            ask(&cmd_tx, |reply| Command::Resume { job_id, reply })
                .await??
                .id
        }
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let finished = loop {
        tokio::select! {
            ev = evt_rx.recv() => {
                let Some(ev) = ev else {
                    bail!("controller stopped unexpectedly");
                };
                if let Some(line) = text_summary::event_line(&ev) {
                    out.stderr(line);
                }
                match ev {
                    ControllerEvent::Completed { job } | ControllerEvent::Failed { job }
                        if job.id == job_id => break Some(job),
                    ControllerEvent::Resumed { job }
                        if job.id == job_id && job.status.is_terminal() => break Some(job),
                    _ => {}
                }
            }
            _ = &mut ctrl_c => break None,
        }
    };

    let Some(job) = finished else {
        let _ = cmd_tx.send(Command::Quit);
        let _ = handle.await;
        out.stderr(format!(
            "Interrupted. Job {job_id} keeps running on the service; resume with `worldgen watch {job_id}`"
        ));
        return Ok(());
    };

    let mut artifact = None;
    if job.status == JobStatus::Completed {
        if let Some(dir) = save {
            let fetched = ask(&cmd_tx, |reply| Command::Download {
                job_id: job_id.clone(),
                reply,
            })
            .await??;
            let path = orchestrator::save(&fetched, dir)?;
            out.stderr(format!("Saved: {}", path.display()));
            artifact = Some(path);
        }
    }

    let _ = cmd_tx.send(Command::Quit);
    handle.await.context("controller task failed")?;

    if json {
        let output = TrackOutput {
            job: job.clone(),
            artifact,
        };
        out.stdout(serde_json::to_string_pretty(&output)?);
    }

    match job.status {
        JobStatus::Failed => Err(anyhow!(
            "generation failed: {}",
            job.error.as_deref().unwrap_or(orchestrator::UNKNOWN_ERROR)
        )),
        _ => Ok(()),
    }
}

async fn list_jobs(
    cfg: ControllerConfig,
    service: Arc<dyn GenerationService>,
    json: bool,
    out: &Output,
) -> Result<()> {
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<ControllerEvent>();
    let mut controller = Controller::new(service, cfg, Some(evt_tx));
    controller.init().await;

    while let Ok(ev) = evt_rx.try_recv() {
        if let ControllerEvent::RecentJobsRefreshFailed { message } = ev {
            bail!(message);
        }
    }

    if json {
        out.stdout(serde_json::to_string_pretty(controller.recent_jobs())?);
    } else {
        for line in text_summary::recent_jobs_lines(controller.recent_jobs()) {
            out.stdout(line);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct DownloadOutput<'a> {
    job_id: &'a JobId,
    path: &'a Path,
    bytes: usize,
}

async fn download(
    cfg: ControllerConfig,
    service: Arc<dyn GenerationService>,
    job_id: JobId,
    dir: &Path,
    json: bool,
    out: &Output,
) -> Result<()> {
    let mut controller = Controller::new(service, cfg, None);
    controller.init().await;
    if controller.job_status(&job_id).is_none() {
        // Not among the recent jobs; ask the service directly.
        controller.resume(job_id.clone()).await?;
    }

    let result = controller.download(&job_id).await;
    controller.shutdown();
    let artifact = result?;

    let path = orchestrator::save(&artifact, dir)?;
    if json {
        let output = DownloadOutput {
            job_id: &job_id,
            path: &path,
            bytes: artifact.bytes.len(),
        };
        out.stdout(serde_json::to_string_pretty(&output)?);
    } else {
        out.stderr(format!("Saved: {}", path.display()));
    }
    Ok(())
}
