//! Presign Uploadr - validated presigned-URL uploads from the command line
//!
//! Validates local files and uploads them through a presigned-URL API.

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use presign_uploadr::config::Config;
use presign_uploadr::logging::{init_subscriber, LogFormat};
use presign_uploadr::upload::{UploadError, UploadEvent, UploadFile, UploadObserver, UploadOrchestrator};
use presign_uploadr::validation::{FileValidator, SecurityOverrides};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// Presign Uploadr - client-side validated uploads via presigned URLs
#[derive(Parser, Debug)]
#[command(name = "presign-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Log format (json, pretty)
    #[arg(long, default_value = "json", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate and upload files
    Upload(UploadArgs),
    /// Run the validation checks only
    Validate(ValidateArgs),
}

#[derive(ClapArgs, Debug)]
struct UploadArgs {
    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Grant API base URL, overrides grant.base_url
    #[arg(long)]
    endpoint: Option<String>,

    #[command(flatten)]
    overrides: OverrideArgs,

    /// Print Prometheus metrics to stderr when done
    #[arg(long)]
    print_metrics: bool,
}

#[derive(ClapArgs, Debug)]
struct ValidateArgs {
    /// Files to validate
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    overrides: OverrideArgs,
}

#[derive(ClapArgs, Debug)]
struct OverrideArgs {
    /// Maximum file size in bytes for this run
    #[arg(long)]
    max_file_size: Option<u64>,

    /// Allowed MIME type for this run (repeatable)
    #[arg(long = "allow-type")]
    allow_types: Vec<String>,
}

impl OverrideArgs {
    fn to_overrides(&self) -> SecurityOverrides {
        SecurityOverrides {
            max_file_size: self.max_file_size,
            allowed_mime_types: (!self.allow_types.is_empty()).then(|| self.allow_types.clone()),
            allowed_extensions: None,
        }
    }
}

/// Prints each transition as one JSON line on stdout
struct StdoutObserver;

impl UploadObserver for StdoutObserver {
    fn on_transition(&self, event: &UploadEvent) {
        match serde_json::to_string(event) {
            Ok(line) => {
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{}", line);
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize event"),
        }
    }

    fn on_rejected(&self, file_name: &str, error: &UploadError) {
        eprintln!("skipped {}: {}", file_name, error);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let format: LogFormat = args.log_format.parse()?;
    init_subscriber(&args.log_level, format)?;

    info!("Starting Presign Uploadr v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    match args.command {
        Command::Upload(upload) => {
            if let Some(endpoint) = upload.endpoint {
                config.grant.base_url = endpoint;
                config.validate()?;
            }
            run_upload(&config, &upload.files, &upload.overrides, upload.print_metrics).await
        }
        Command::Validate(validate) => {
            run_validate(&config, &validate.files, &validate.overrides).await
        }
    }
}

/// Open every path. Paths that cannot be opened are reported and skipped
/// so the rest of the batch still runs.
async fn load_files(paths: &[PathBuf]) -> (Vec<UploadFile>, usize) {
    let mut files = Vec::with_capacity(paths.len());
    let mut skipped = 0;
    for path in paths {
        match UploadFile::from_path(path, None).await {
            Ok(file) => files.push(file),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot open file");
                eprintln!("skipped {}: cannot open: {}", path.display(), e);
                skipped += 1;
            }
        }
    }
    (files, skipped)
}

async fn run_upload(
    config: &Config,
    paths: &[PathBuf],
    overrides: &OverrideArgs,
    print_metrics: bool,
) -> anyhow::Result<ExitCode> {
    let orchestrator = UploadOrchestrator::from_config(config)?;
    let (files, skipped) = load_files(paths).await;

    let report = orchestrator
        .submit_with(files, &overrides.to_overrides(), &StdoutObserver)
        .await;

    for (task, error) in report.failed() {
        eprintln!("failed {}: {}", task.name, error);
    }

    if print_metrics {
        eprint!("{}", presign_uploadr::metrics::gather_text()?);
    }

    Ok(if skipped == 0 && report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_validate(
    config: &Config,
    paths: &[PathBuf],
    overrides: &OverrideArgs,
) -> anyhow::Result<ExitCode> {
    let security = overrides.to_overrides().apply(&config.security);
    let (files, skipped) = load_files(paths).await;

    let mut all_valid = skipped == 0;
    for file in &files {
        let result = FileValidator::validate(file, &security).await;
        if result.is_valid {
            println!("ok {}", file.name());
        } else {
            all_valid = false;
            println!(
                "rejected {}: {}",
                file.name(),
                result.reason.unwrap_or_default()
            );
        }
    }

    Ok(if all_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
