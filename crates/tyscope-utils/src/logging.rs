//! # Logging Utilities
//!
//! Logging setup for the tyscope tools, built on `tracing-subscriber`.
//!
//! Console output always goes to stderr: stdout carries command output
//! (type descriptions, layouts) and must stay machine-readable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tyscope_utils::init_logging;
//!
//! // Keep the guard alive for as long as logs should reach the log file
//! let _guard = init_logging().expect("Failed to initialize logging");
//! tracing::info!("Resolver started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: level filter (`RUST_LOG=debug`, `RUST_LOG=tyscope_core=trace`)
//! - `TYSCOPE_LOG_FORMAT`: `pretty` (default) or `json`
//! - `TYSCOPE_LOG_FILE`: also write logs to this file, rotated daily. If the
//!   value names a directory, a dated `tyscope.log` file is created in it.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Output format selector
pub const LOG_FORMAT_ENV: &str = "TYSCOPE_LOG_FORMAT";

/// Optional log file path
pub const LOG_FILE_ENV: &str = "TYSCOPE_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" | "dev" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    /// Includes per-descriptor decoding output
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Keeps the file writer running; logs still buffered are flushed on drop.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LoggingGuard
{
    file: Option<WorkerGuard>,
}

impl LoggingGuard
{
    /// Whether logs are also written to a file.
    #[must_use]
    pub const fn has_file(&self) -> bool
    {
        self.file.is_some()
    }
}

/// Initialize logging from the environment
///
/// `RUST_LOG` is used as the filter (default `warn`), `TYSCOPE_LOG_FORMAT`
/// picks the format and `TYSCOPE_LOG_FILE` enables file output.
///
/// ## Errors
///
/// - `InvalidFormat`: `TYSCOPE_LOG_FORMAT` has an unknown value
/// - `FileError`: the log file cannot be created
/// - `InitializationFailed`: a global subscriber is already installed
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    let format = match env::var(LOG_FORMAT_ENV) {
        Ok(value) => value.parse()?,
        Err(_) => LogFormat::default(),
    };
    let directives = env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Level::WARN.to_string());
    install(format, &directives, log_file_from_env())
}

/// Initialize logging with an explicit level and format
///
/// The level wins over `RUST_LOG`; `TYSCOPE_LOG_FILE` is still honored.
///
/// ## Example
///
/// ```rust,no_run
/// use tyscope_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Pretty).expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Same as [`init_logging`], minus the format check.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    install(format, &Level::from(level).to_string(), log_file_from_env())
}

fn log_file_from_env() -> Option<PathBuf>
{
    env::var_os(LOG_FILE_ENV).filter(|value| !value.is_empty()).map(PathBuf::from)
}

fn install(format: LogFormat, directives: &str, log_file: Option<PathBuf>) -> Result<LoggingGuard, LoggingError>
{
    // Each layer gets its own filter built from the same directives.
    let mut layers: Vec<BoxedLayer> = vec![console_layer(format, EnvFilter::new(directives))];
    let mut guard = LoggingGuard::default();

    if let Some(path) = log_file {
        let (writer, worker) = tracing_appender::non_blocking(file_appender(&path)?);
        let filter = EnvFilter::new(directives);
        let layer = match format {
            LogFormat::Pretty => fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_filter(filter)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_span_list(true)
                .with_filter(filter)
                .boxed(),
        };
        layers.push(layer);
        guard.file = Some(worker);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(guard)
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_appender(path: &Path) -> Result<RollingFileAppender, LoggingError>
{
    if path.is_dir() {
        let name = dated_file_name();
        return RollingFileAppender::builder()
            .rotation(rolling::Rotation::NEVER)
            .filename_prefix(name)
            .build(path)
            .map_err(|err| LoggingError::InitializationFailed(err.to_string()));
    }

    let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(path.display().to_string()))?;
    Ok(rolling::daily(dir, file_name))
}

fn dated_file_name() -> String
{
    format!("{}-tyscope.log", Utc::now().format("%Y-%m-%d"))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    #[error("Invalid log format: {0}. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    #[error("Invalid log level: {0}. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    /// The log file path has no file name
    #[error("Invalid log file path: {0}")]
    InvalidPath(String),

    /// A global subscriber is already set, or the appender could not start
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
