//! Process-wide logging bootstrap.
//!
//! # Responsibility
//! - Start the rotating file logger once per process.
//! - Capture panics as metadata-only log events.
//!
//! # Invariants
//! - Initialization is idempotent for the same level and directory.
//! - Reconfiguring an active logger is rejected, never applied.
//! - Initialization never panics.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "guidance";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

struct LoggingState {
    level: &'static str,
    log_dir: PathBuf,
    _logger: LoggerHandle,
}

/// Errors from logging initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnsupportedLevel(String),
    InvalidDirectory(String),
    /// Logging is already active with a different level or directory.
    AlreadyInitialized { active: String, requested: String },
    Backend(String),
}

impl LoggingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedLevel(_) => "unsupported_log_level",
            Self::InvalidDirectory(_) => "invalid_log_dir",
            Self::AlreadyInitialized { .. } => "logging_already_initialized",
            Self::Backend(_) => "logging_backend",
        }
    }
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDirectory(message) => write!(f, "invalid log directory: {message}"),
            Self::AlreadyInitialized { active, requested } => write!(
                f,
                "logging already initialized with `{active}`; refusing to switch to `{requested}`"
            ),
            Self::Backend(message) => write!(f, "failed to start logger: {message}"),
        }
    }
}

impl Error for LoggingError {}

/// Starts file logging at `level` under `log_dir`.
///
/// # Errors
/// - `UnsupportedLevel` for unknown level names.
/// - `InvalidDirectory` when `log_dir` is empty, relative or cannot be created.
/// - `AlreadyInitialized` when logging runs with another level or directory.
pub fn init_logging(level: &str, log_dir: &Path) -> Result<(), LoggingError> {
    let level = normalize_level(level)?;
    let log_dir = normalize_log_dir(log_dir)?;

    let state = LOGGING_STATE.get_or_try_init(|| start_logger(level, &log_dir))?;
    ensure_same_config(state, level, &log_dir)
}

/// Returns `(level, log_dir)` of the active logger.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.log_dir.clone()))
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(level: &'static str, log_dir: &Path) -> Result<LoggingState, LoggingError> {
    std::fs::create_dir_all(log_dir).map_err(|err| {
        LoggingError::InvalidDirectory(format!("cannot create `{}`: {err}", log_dir.display()))
    })?;

    let logger = Logger::try_with_str(level)
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(log_dir)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    install_panic_hook_once();

    info!(
        "event=core_init module=core status=ok platform={} build_mode={} version={} level={}",
        std::env::consts::OS,
        build_mode(),
        env!("CARGO_PKG_VERSION"),
        level
    );

    Ok(LoggingState {
        level,
        log_dir: log_dir.to_path_buf(),
        _logger: logger,
    })
}

fn ensure_same_config(
    state: &LoggingState,
    level: &'static str,
    log_dir: &Path,
) -> Result<(), LoggingError> {
    if state.log_dir != log_dir {
        return Err(LoggingError::AlreadyInitialized {
            active: state.log_dir.display().to_string(),
            requested: log_dir.display().to_string(),
        });
    }
    if state.level != level {
        return Err(LoggingError::AlreadyInitialized {
            active: state.level.to_string(),
            requested: level.to_string(),
        });
    }
    Ok(())
}

fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(LoggingError::UnsupportedLevel(other.to_string())),
    }
}

fn normalize_log_dir(log_dir: &Path) -> Result<PathBuf, LoggingError> {
    if log_dir.as_os_str().is_empty() {
        return Err(LoggingError::InvalidDirectory(
            "path cannot be empty".to_string(),
        ));
    }
    if !log_dir.is_absolute() {
        return Err(LoggingError::InvalidDirectory(format!(
            "path must be absolute, got `{}`",
            log_dir.display()
        )));
    }
    Ok(log_dir.to_path_buf())
}

fn build_mode() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        // Payloads may carry record content.
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_summary(panic_info);
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location, payload
        );
        previous_hook(panic_info);
    }));
}

fn panic_payload_summary(info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = if let Some(message) = info.payload().downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };

    sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
}

fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::{
        init_logging, logging_status, normalize_level, normalize_log_dir, sanitize_message,
        LoggingError,
    };
    use std::path::Path;

    #[test]
    fn normalize_level_accepts_known_values() {
        assert_eq!(normalize_level("INFO"), Ok("info"));
        assert_eq!(normalize_level(" warning "), Ok("warn"));
        assert!(matches!(
            normalize_level("loud"),
            Err(LoggingError::UnsupportedLevel(_))
        ));
    }

    #[test]
    fn normalize_log_dir_rejects_relative_path() {
        let error = normalize_log_dir(Path::new("logs/dev")).unwrap_err();
        assert_eq!(error.code(), "invalid_log_dir");
    }

    #[test]
    fn sanitize_message_removes_newlines_and_truncates() {
        let sanitized = sanitize_message("line1\nline2\rline3", 8);
        assert!(!sanitized.contains('\n'));
        assert!(!sanitized.contains('\r'));
        assert!(sanitized.ends_with("..."));
    }

    #[test]
    fn init_logging_is_idempotent_for_same_config_and_rejects_conflicts() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        init_logging("info", first.path()).unwrap();
        init_logging("info", first.path()).unwrap();

        let level_error = init_logging("debug", first.path()).unwrap_err();
        assert!(matches!(level_error, LoggingError::AlreadyInitialized { .. }));

        let dir_error = init_logging("info", second.path()).unwrap_err();
        assert!(matches!(dir_error, LoggingError::AlreadyInitialized { .. }));

        let (active_level, active_dir) = logging_status().unwrap();
        assert_eq!(active_level, "info");
        assert_eq!(active_dir, first.path());
    }
}
