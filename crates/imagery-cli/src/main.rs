use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio::time::{Instant, sleep};
use tracing::info;

use imagery_core::app::AppBuilder;
use imagery_core::config::ServiceConfig;
use imagery_core::domain::{CreateRequest, ImageKind, TaskStatus, Upload};
use imagery_core::impls::{InMemoryBlobStore, InMemoryTaskQueue, InMemoryTaskStore};
use imagery_core::observability::init_tracing;
use imagery_core::ports::SystemClock;

#[derive(Parser)]
#[command(name = "imagery")]
#[command(about = "Asynchronous image transformation: resize, thumbnail, watermark")]
#[command(version)]
struct Cli {
    /// TOML configuration file (IMAGERY__* environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit one image through intake and wait for the worker to finish it
    Process(ProcessArgs),
    /// Print the effective configuration as JSON
    Config,
}

#[derive(Args)]
struct ProcessArgs {
    /// resize, thumbnail or watermark
    #[arg(long)]
    operation: String,

    /// Source image (jpeg, png or gif)
    #[arg(long)]
    source: PathBuf,

    /// Watermark image (png), required for `watermark`
    #[arg(long)]
    watermark: Option<PathBuf>,

    #[arg(short = 'x', long = "width")]
    x: Option<i64>,

    #[arg(short = 'y', long = "height")]
    y: Option<i64>,

    /// Where to write the result; defaults to the result key's file name
    #[arg(long)]
    output: Option<PathBuf>,

    /// Give up waiting after this many seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServiceConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Process(args) => {
            init_tracing(&config.log_filter);
            process(config, args).await?;
        }
    }
    Ok(())
}

async fn process(config: ServiceConfig, args: ProcessArgs) -> Result<()> {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let app = AppBuilder::new()
        .task_store(Arc::new(InMemoryTaskStore::new(Arc::new(SystemClock))))
        .blob_store(Arc::new(InMemoryBlobStore::new()))
        .queue(queue.clone())
        .config(config)
        .build()?;
    let group = app.spawn_background();

    let mut request = CreateRequest::new(args.operation.as_str(), read_upload(&args.source)?)
        .axes(args.x, args.y);
    if let Some(path) = &args.watermark {
        request = request.watermark(read_upload(path)?);
    }

    let task = match app.intake.create(request).await {
        Ok(task) => task,
        Err(e) => {
            group.shutdown_and_join().await;
            bail!("{} ({})", e.public_message(), e.kind().status_code());
        }
    };
    info!(task_id = %task.id, "submitted");
    for note in &task.diagnostics {
        eprintln!("note: {note}");
    }

    let id = task.id.to_string();
    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);
    let finished = loop {
        let current = app.query.get(&id).await?;
        if current.status.is_terminal() {
            break Some(current);
        }
        if Instant::now() >= deadline {
            break None;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break None,
            _ = sleep(Duration::from_millis(50)) => {}
        }
    };
    group.shutdown_and_join().await;
    queue.close();

    let Some(task) = finished else {
        bail!("task {id} did not finish in time");
    };
    if task.status == TaskStatus::Failed {
        bail!("task {id} failed: {}", task.diagnostics.join("; "));
    }

    let result = app.query.load_result(&id).await?;
    let output = match args.output {
        Some(path) => path,
        None => default_output(task.result_key.as_deref().unwrap_or("result")),
    };
    std::fs::write(&output, &result.bytes)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "{id}: {} bytes ({}) -> {}",
        result.bytes.len(),
        result.content_type,
        output.display()
    );
    Ok(())
}

fn read_upload(path: &Path) -> Result<Upload> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let kind = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(ImageKind::from_extension)
        .or_else(|| ImageKind::sniff(&bytes).ok());
    let content_type = kind.map_or("application/octet-stream", ImageKind::content_type);
    Ok(Upload::new(content_type, bytes))
}

fn default_output(result_key: &str) -> PathBuf {
    let name = result_key.rsplit('/').next().unwrap_or(result_key);
    PathBuf::from(name)
}
