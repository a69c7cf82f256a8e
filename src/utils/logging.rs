//! Logging Utilities
//!
//! File-based and console logging behind the `log` facade.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use log::{Level, LevelFilter, Log, Metadata, Record};

const CRATE_TARGET: &str = "stream_session";

/// Default log file under the app data directory
pub fn get_log_file_path() -> PathBuf {
    super::get_app_data_dir().join("session.log")
}

/// Whether a record passes the filter: this crate down to DEBUG, everything
/// else WARN and above. Transport crates are chatty on every packet.
fn level_allowed(target: &str, level: Level) -> bool {
    if target.starts_with(CRATE_TARGET) {
        level <= Level::Debug
    } else {
        level <= Level::Warn
    }
}

/// Simple file logger
pub struct FileLogger {
    file: Mutex<Option<File>>,
    console: bool,
}

impl FileLogger {
    /// Log to a specific file; logging continues console-only if it cannot be opened
    pub fn with_path(path: &Path, console: bool) -> Self {
        Self {
            file: Mutex::new(Self::open_log_file(path)),
            console,
        }
    }

    fn open_log_file(path: &Path) -> Option<File> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        level_allowed(metadata.target(), metadata.level())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("[{}] {} {} - {}\n", timestamp, record.level(), record.target(), record.args());

        if let Ok(mut guard) = self.file.lock() {
            if let Some(ref mut file) = *guard {
                let _ = file.write_all(line.as_bytes());
            }
        }

        if self.console {
            print!("{}", line);
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(ref mut file) = *guard {
                let _ = file.flush();
            }
        }
    }
}

/// Install a [`FileLogger`] writing to `path` as the global logger.
///
/// Console output stays off unless asked for: blocking console writes on the
/// frame path show up as dropped frames. Fails if a logger is already set.
pub fn init_logging(path: &Path, console: bool) -> Result<(), log::SetLoggerError> {
    log::set_boxed_logger(Box::new(FileLogger::with_path(path, console)))?;
    log::set_max_level(LevelFilter::Debug);
    Ok(())
}
