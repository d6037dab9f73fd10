use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Daily files are written as `inflow.log.YYYY-MM-DD`.
const LOG_FILE_PREFIX: &str = "inflow.log";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    /// `EnvFilter` directives for the JSON file, e.g. `info,orchestrator=debug`.
    pub filter: String,
    /// Directives for the compact stderr copy; `null` turns it off.
    pub stderr_filter: Option<String>,
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./logs/inflow"),
            filter: "info".to_string(),
            stderr_filter: Some("warn".to_string()),
            retention_days: 14,
        }
    }
}

/// Installs the global subscriber. The returned guard flushes the file writer
/// when dropped, so `main` holds it until exit.
pub fn init_tracing(config: &LoggingConfig) -> Result<WorkerGuard> {
    let file_filter = env_filter("logging.filter", &config.filter)?;
    let stderr_filter = config
        .stderr_filter
        .as_deref()
        .map(|directives| env_filter("logging.stderr_filter", directives))
        .transpose()?;

    let log_dir = std::path::absolute(&config.dir)
        .with_context(|| format!("logging.dir '{}' cannot be resolved", config.dir.display()))?;
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create logging directory {}", log_dir.display()))?;
    let sweep = sweep_expired_logs(
        &log_dir,
        OffsetDateTime::now_utc().date(),
        config.retention_days,
    );

    let (writer, guard) =
        tracing_appender::non_blocking(rolling::daily(&log_dir, LOG_FILE_PREFIX));
    let file_layer = fmt::layer()
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_current_span(true)
        .with_span_list(true)
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(file_filter);
    let stderr_layer = stderr_filter.map(|filter| {
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter)
    });

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    tracing::info!(
        target: "logging",
        run_id = %Uuid::now_v7(),
        dir = %log_dir.display(),
        filter = %config.filter,
        retention_days = config.retention_days,
        expired_removed = sweep.removed.len(),
        "logging_initialized"
    );
    for failure in sweep.failures {
        tracing::warn!(target: "logging", error = %failure, "log_retention_sweep_failed");
    }

    Ok(guard)
}

fn env_filter(key: &str, directives: &str) -> Result<EnvFilter> {
    if directives.trim().is_empty() {
        bail!("{key} cannot be empty");
    }
    EnvFilter::try_new(directives).with_context(|| format!("failed to parse {key} '{directives}'"))
}

#[derive(Debug, Default)]
struct RetentionSweep {
    removed: Vec<PathBuf>,
    failures: Vec<String>,
}

/// Deletes daily files dated more than `retention_days` before `today`. Files
/// without a date suffix, including the one being written, are never touched.
fn sweep_expired_logs(log_dir: &Path, today: Date, retention_days: u32) -> RetentionSweep {
    let mut sweep = RetentionSweep::default();
    let cutoff = today
        .checked_sub(Duration::days(i64::from(retention_days)))
        .unwrap_or(Date::MIN);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(err) => {
            sweep
                .failures
                .push(format!("failed to scan {}: {err}", log_dir.display()));
            return sweep;
        }
    };

    for path in entries.flatten().map(|entry| entry.path()) {
        if rotation_date(&path).is_none_or(|rotated_on| rotated_on >= cutoff) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => sweep.removed.push(path),
            Err(err) => sweep
                .failures
                .push(format!("failed to remove {}: {err}", path.display())),
        }
    }
    sweep
}

fn rotation_date(path: &Path) -> Option<Date> {
    let suffix = path
        .file_name()?
        .to_str()?
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_prefix('.')?;
    Date::parse(suffix, format_description!("[year]-[month]-[day]")).ok()
}
