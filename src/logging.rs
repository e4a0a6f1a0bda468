//! Tracing configuration and log routing.
//!
//! Logs go to stdout through a compact formatter and, in parallel, to a file written by a
//! non-blocking worker. `DOCCHAT_LOG_FILE` names an explicit file that is appended to;
//! without it a daily-rotated `logs/docchat.log` is used.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_VAR: &str = "DOCCHAT_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "docchat.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where file logs are written.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogDestination {
    /// Append to a single operator-chosen file.
    File(PathBuf),
    /// Rotate daily inside a directory.
    Rolling { dir: PathBuf, file_name: String },
}

impl LogDestination {
    fn resolve(explicit: Option<String>) -> Self {
        match explicit.map(|value| value.trim().to_string()) {
            Some(path) if !path.is_empty() => Self::File(PathBuf::from(path)),
            _ => Self::Rolling {
                dir: PathBuf::from(DEFAULT_LOG_DIR),
                file_name: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }

    fn open(&self) -> std::io::Result<NonBlocking> {
        let (writer, guard) = match self {
            Self::File(path) => {
                ensure_parent(path)?;
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                tracing_appender::non_blocking(file)
            }
            Self::Rolling { dir, file_name } => {
                std::fs::create_dir_all(dir)?;
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name))
            }
        };
        let _ = LOG_GUARD.set(guard);
        Ok(writer)
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Install the global tracing subscriber.
///
/// - Honors `RUST_LOG` (defaults to `info`).
/// - Always logs to stdout; adds a file layer when the destination can be opened.
/// - Keeps the non-blocking worker guard alive for the rest of the process.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let destination = LogDestination::resolve(std::env::var(LOG_FILE_VAR).ok());
    match destination.open() {
        Ok(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        Err(err) => {
            // The subscriber is not installed yet, so report on stderr.
            eprintln!("File logging disabled ({destination:?}): {err}");
            registry.init();
        }
    }
}
