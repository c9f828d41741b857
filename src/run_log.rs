//! Run-scoped log file and retention
//!
//! Installs a global `log` logger that echoes each record to the console and
//! appends it, timestamped and tagged with the run id, to
//! `<log_dir>/sync_<YYYYmmdd_HHMMSS>.log`. Failing to write the file never
//! stops the run; the first failure is reported on standard error.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use log::{Level, LevelFilter, Metadata, Record};
use once_cell::sync::OnceCell;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

const LOG_PREFIX: &str = "sync_";
const LOG_SUFFIX: &str = ".log";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

static RUN_LOG: OnceCell<RunLog> = OnceCell::new();

/// Log Manager errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logging system already initialized")]
    AlreadyInitialized,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct RunLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
    level: LevelFilter,
    run_id: Uuid,
    write_failed: AtomicBool,
}

impl RunLog {
    /// Open the log file for a run started at `started_at`.
    ///
    /// An unopenable file is reported on standard error and the logger keeps
    /// working console-only.
    pub fn create(log_dir: &Path, run_id: Uuid, level: LevelFilter, started_at: DateTime<Utc>) -> Self {
        let path = log_dir.join(log_file_name(started_at));
        let file = fs::create_dir_all(log_dir)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));

        let file = match file {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Cannot open run log {}: {}", path.display(), e);
                None
            }
        };

        Self {
            path,
            write_failed: AtomicBool::new(file.is_none()),
            file: Mutex::new(file),
            level,
            run_id,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line to the run log.
    pub fn append(&self, level: Level, message: &str) {
        let line = format!(
            "{} [{}] [{}] {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level,
            self.run_id,
            message
        );

        let result = match self.file.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(file) => file.write_all(line.as_bytes()),
                None => return,
            },
            Err(_) => return,
        };

        if let Err(e) = result {
            if !self.write_failed.swap(true, Ordering::SeqCst) {
                eprintln!("Writing run log {} failed: {}", self.path.display(), e);
            }
        }
    }
}

impl log::Log for RunLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let msg = record.args().to_string();
            if record.level() <= Level::Warn {
                eprintln!("{} - {}", record.level(), msg);
            } else {
                println!("{} - {}", record.level(), msg);
            }
            self.append(record.level(), &msg);
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

/// Install the run log as the global logger.
pub fn init(
    log_dir: &Path,
    run_id: Uuid,
    level: LevelFilter,
) -> Result<&'static RunLog, LoggingError> {
    RUN_LOG
        .set(RunLog::create(log_dir, run_id, level, Utc::now()))
        .map_err(|_| LoggingError::AlreadyInitialized)?;
    let logger = RUN_LOG.get().ok_or(LoggingError::AlreadyInitialized)?;
    log::set_logger(logger).map_err(|_| LoggingError::AlreadyInitialized)?;
    log::set_max_level(level);
    Ok(logger)
}

/// File name of the log of a run started at `started_at`
pub fn log_file_name(started_at: DateTime<Utc>) -> String {
    format!("{}{}{}", LOG_PREFIX, started_at.format(STAMP_FORMAT), LOG_SUFFIX)
}

/// Start time encoded in a run log file name
pub fn parse_log_file_name(name: &str) -> Option<DateTime<Utc>> {
    let stamp = name.strip_prefix(LOG_PREFIX)?.strip_suffix(LOG_SUFFIX)?;
    let naive = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Delete run logs older than `retention`. Other files in the directory are
/// left alone. Returns the deleted paths.
pub fn prune_old_logs(
    log_dir: &Path,
    retention: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<Vec<PathBuf>, LoggingError> {
    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let cutoff = now - retention;
    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let started = match name.to_str().and_then(parse_log_file_name) {
            Some(started) => started,
            None => continue,
        };
        if started < cutoff && entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
            removed.push(entry.path());
        }
    }
    Ok(removed)
}
