//! skiff CLI
//!
//! Download and upload files over HTTP with live progress.

mod config;
mod progress;

use clap::{Parser, Subcommand};
use console::style;
use skiff_core::events::ChannelSink;
use skiff_core::{
    DownloadParams, FsResolver, JobCompletion, JobController, JobId, TransferResult, UploadFile,
    UploadParams,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use config::Config;
use progress::format_bytes;

/// Job id used for the single transfer a CLI invocation runs
const CLI_JOB_ID: JobId = 1;

/// skiff - HTTP downloads and uploads with progress
#[derive(Parser)]
#[command(name = "skiff")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (default: the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a URL to a file
    Download {
        /// Source URL
        #[arg(required = true)]
        url: String,

        /// Destination file
        #[arg(short, long)]
        output: PathBuf,

        /// Extra request header (`Name: value`), repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },

    /// Upload files to a URL
    Upload {
        /// Target URL
        #[arg(required = true)]
        url: String,

        /// File part (`field=path` or just `path`), repeatable
        #[arg(short, long = "file", required = true)]
        files: Vec<String>,

        /// Form field (`name=value`), repeatable
        #[arg(short = 'F', long = "field")]
        fields: Vec<String>,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "POST")]
        method: String,

        /// Send the single file as the raw request body
        #[arg(long)]
        binary: bool,

        /// Extra request header (`Name: value`), repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    config.validate()?;

    // Initialize logging; RUST_LOG overrides the configured level
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let (sink, events) = ChannelSink::new();
    let controller = JobController::with_config(
        Arc::new(FsResolver),
        Arc::new(sink),
        config.transfer.engine_config(),
    )?;

    let (completion, label) = match cli.command {
        Commands::Download {
            url,
            output,
            headers,
        } => {
            let params = download_params(&config, &url, &output, &headers)?;
            println!("Downloading {} -> {}", url, output.display());
            (controller.download(params)?, format!("Downloading: {url}"))
        }
        Commands::Upload {
            url,
            files,
            fields,
            method,
            binary,
            headers,
        } => {
            let params = upload_params(&config, &url, &files, &fields, &method, binary, &headers)?;
            println!("Uploading {} file(s) -> {}", files.len(), url);
            (controller.upload(params)?, format!("Uploading: {url}"))
        }
    };

    let renderer = tokio::spawn(progress::render(events, label));
    let result = wait_or_stop(&controller, completion).await;

    // Dropping the controller closes the event channel and ends the renderer
    drop(controller);
    let bar = renderer.await?;

    report(&result, bar.as_ref())
}

/// Download job for the CLI; timeouts come from the controller's config
fn download_params(
    config: &Config,
    url: &str,
    output: &Path,
    headers: &[String],
) -> anyhow::Result<DownloadParams> {
    let mut params = DownloadParams::new(CLI_JOB_ID, url, output.to_string_lossy())
        .events(true, true)
        .progress(
            config.transfer.progress_interval(),
            config.transfer.progress_divider,
        );
    for header in headers {
        let (name, value) = parse_header(header)?;
        params = params.header(name, value);
    }
    Ok(params)
}

/// Upload job for the CLI; timeouts come from the controller's config
fn upload_params(
    config: &Config,
    url: &str,
    files: &[String],
    fields: &[String],
    method: &str,
    binary: bool,
    headers: &[String],
) -> anyhow::Result<UploadParams> {
    let mut params = UploadParams::new(CLI_JOB_ID, url)
        .method(method)
        .binary_stream_only(binary)
        .events(true, true)
        .progress(
            config.transfer.progress_interval(),
            config.transfer.progress_divider,
        );
    for file in files {
        params = params.file(parse_file(file));
    }
    for field in fields {
        let (name, value) = parse_pair(field, '=')?;
        params = params.field(name, value);
    }
    for header in headers {
        let (name, value) = parse_header(header)?;
        params = params.header(name, value);
    }
    Ok(params)
}

/// Await the job, turning Ctrl+C into a stop request
async fn wait_or_stop(controller: &JobController, completion: JobCompletion) -> TransferResult {
    let job_id = completion.job_id();
    tokio::pin!(completion);

    tokio::select! {
        result = &mut completion => result,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            }
            tracing::info!("Stopping job {}", job_id);
            controller.stop(job_id);
            completion.await
        }
    }
}

fn report(result: &TransferResult, bar: Option<&progress::TransferProgress>) -> anyhow::Result<()> {
    let size = format_bytes(result.bytes_transferred);

    if result.is_success() {
        let status = result.status_code.unwrap_or_default();
        let message = format!("Done: HTTP {status}, {size}");
        if let Some(bar) = bar {
            bar.finish_with_message(message);
        }
        if (200..300).contains(&status) {
            println!("{} HTTP {}, {}", style("Done").green().bold(), status, size);
        } else {
            println!("{} HTTP {}, {}", style("Done").yellow().bold(), status, size);
        }
        if let Some(body) = result.body.as_deref().filter(|b| !b.is_empty()) {
            println!("{body}");
        }
        tracing::debug!("Completion payload: {}", result.to_payload());
        return Ok(());
    }

    if let Some(bar) = bar {
        bar.abandon_with_message(format!("Stopped after {size}"));
    }
    match &result.error {
        Some(error) if result.is_cancelled() => {
            println!("{} after {}", style("Cancelled").yellow().bold(), size);
            anyhow::bail!("{}: {}", error.code(), error)
        }
        Some(error) => {
            eprintln!("{} {}", style("Failed:").red().bold(), error);
            anyhow::bail!("{}: {}", error.code(), error)
        }
        None => anyhow::bail!("transfer ended in state {}", result.state),
    }
}

/// Split `key<sep>value`
fn parse_pair(input: &str, sep: char) -> anyhow::Result<(String, String)> {
    let (key, value) = input
        .split_once(sep)
        .ok_or_else(|| anyhow::anyhow!("expected '{}' in '{}'", sep, input))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("empty name in '{}'", input);
    }
    Ok((key.to_string(), value.trim().to_string()))
}

fn parse_header(input: &str) -> anyhow::Result<(String, String)> {
    parse_pair(input, ':')
}

/// `field=path` or a bare path (field name `file`)
fn parse_file(input: &str) -> UploadFile {
    match input.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => UploadFile::new(name, path),
        _ => UploadFile::new("file", input),
    }
}
