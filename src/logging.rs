//! Structured logging: console plus a daily rolling file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Number of rolled log files kept on disk.
pub const MAX_LOG_FILES: usize = 7;

const LOG_FILE_PREFIX: &str = "school-desk";
const ENV_LOG_DIR: &str = "SCHOOL_DESK_LOG_DIR";

/// Resolve the log directory from `lookup` (an environment reader):
/// `SCHOOL_DESK_LOG_DIR` as given, otherwise `school-desk/logs` under the
/// first of `XDG_DATA_HOME`, `LOCALAPPDATA` and the platform data dir.
fn log_dir_from(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    if let Some(dir) = var(ENV_LOG_DIR) {
        return PathBuf::from(dir);
    }
    let base = var("XDG_DATA_HOME")
        .or_else(|| var("LOCALAPPDATA"))
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            if cfg!(target_os = "windows") {
                PathBuf::from(var("USERPROFILE").unwrap_or_else(|| ".".into()))
                    .join("AppData")
                    .join("Local")
            } else {
                PathBuf::from(var("HOME").unwrap_or_else(|| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join(LOG_FILE_PREFIX).join("logs")
}

pub fn get_log_dir() -> PathBuf {
    log_dir_from(|key| std::env::var(key).ok())
}

/// Rolled files of ours in `log_dir`, newest first. Same-second files fall
/// back to name order, which is date order for daily rolls.
fn rolled_logs(log_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return Vec::new();
    };
    let mut files: Vec<(std::time::SystemTime, PathBuf)> = entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX))
        .filter(|e| e.path().is_file())
        .map(|e| {
            let modified = e
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::UNIX_EPOCH);
            (modified, e.path())
        })
        .collect();
    files.sort_by(|a, b| b.cmp(a));
    files.into_iter().map(|(_, path)| path).collect()
}

/// Delete all but the newest `MAX_LOG_FILES` rolled files.
pub fn prune_old_logs(log_dir: &Path) {
    for path in rolled_logs(log_dir).iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to prune log file");
        }
    }
}

/// Create the log directory and prune it. `None` when it cannot be created.
pub fn prepare_log_dir(log_dir: &Path) -> Option<PathBuf> {
    fs::create_dir_all(log_dir).ok()?;
    prune_old_logs(log_dir);
    Some(log_dir.to_path_buf())
}

/// Install the global subscriber. The returned guard must be held until
/// exit; dropping it flushes the file writer.
pub fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    let default_filter = if verbose {
        "debug,school_desk=trace"
    } else {
        "info,school_desk=debug"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let wanted = get_log_dir();
    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let Some(log_dir) = prepare_log_dir(&wanted) else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        warn!(dir = %wanted.display(), "log directory unavailable, console logging only");
        return None;
    };

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();
    Some(guard)
}
