use clap::{Parser, ValueEnum};
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use dnscache::{Config, InstanceManager};

#[derive(Parser)]
#[command(name = "dnscache")]
#[command(about = "DNS server record cache", long_about = None)]
struct Args {
    /// Load configuration from FILE
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Console)]
    log_format: LogFormat,

    /// Write logs to FILE instead of stderr, rotating it by size
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Rotate the log file once it grows past this many megabytes
    #[arg(long, value_name = "MB", default_value_t = 50)]
    log_size: usize,

    /// Number of rotated log files to keep
    #[arg(long, value_name = "COUNT", default_value_t = 10)]
    log_backups: usize,

    /// Log level (debug, info, warn, error, fatal, panic) or a full RUST_LOG
    /// directive. Falls back to RUST_LOG, then to info.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Console,
    Json,
}

/// Turn a `--log-level` value into a filter directive.
///
/// `fatal` and `panic` have no tracing level of their own and map to `error`.
fn level_directive(level: &str) -> String {
    let level = level.to_lowercase();
    match level.as_str() {
        "fatal" | "panic" => "error".to_string(),
        "warning" => "warn".to_string(),
        _ => level,
    }
}

fn rotating_log(
    path: &Path,
    max_bytes: usize,
    backups: usize,
) -> io::Result<FileRotate<AppendCount>> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    Ok(FileRotate::new(
        path,
        AppendCount::new(backups),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        #[cfg(unix)]
        None,
    ))
}

fn init_logging(args: &Args) -> io::Result<()> {
    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level_directive(level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let writer = match &args.log_file {
        Some(path) => {
            let max_bytes = args.log_size.saturating_mul(1024 * 1024);
            let log = rotating_log(path, max_bytes, args.log_backups)?;
            BoxMakeWriter::new(Mutex::new(log))
        }
        None => BoxMakeWriter::new(io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(args.log_file.is_none());

    match args.log_format {
        LogFormat::Console => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}

async fn run(args: Args) -> dnscache::Result<()> {
    let config = Config::from_file(&args.config).inspect_err(|e| {
        error!(file = %args.config.display(), error = %e, "failed to load configuration");
    })?;
    info!(file = %args.config.display(), caches = config.caches.len(), "configuration loaded");

    let manager = InstanceManager::new(&config);
    let _handles = manager.start().await?;

    // Serve forever
    std::future::pending::<()>().await;

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("failed to open log file: {e}");
        return ExitCode::FAILURE;
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "failed to start application");
            eprintln!("dnscache: {e}");
            ExitCode::FAILURE
        }
    }
}
