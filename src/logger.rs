// Logging, per SPEC_FULL.md §2.1. Uses `log` as the facade and
// `env_logger` as the terminal subscriber the way `igankevich-elb` and
// `kkernick-antimony` do; layered alongside it is a small rotating debug
// file (spec.md §7: "full detail is always in the rotating debug log"),
// grounded in the rotation policy named there -- no crate in the
// retrieved pack supplies file rotation, so this is a minimal
// size-based rotator rather than a fabricated dependency.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::error::Result;

const MAX_FILE_BYTES: u64 = 1024 * 1024;
const MAX_ROTATED_FILES: u32 = 5;

/// `$XDG_CACHE_HOME/e4s-cl/debug.log`, falling back to
/// `~/.cache/e4s-cl/debug.log`, per spec.md §7.
pub fn debug_log_path() -> PathBuf {
    let cache_home = std::env::var("XDG_CACHE_HOME").map(PathBuf::from).unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
        PathBuf::from(home).join(".cache")
    });
    cache_home.join("e4s-cl").join("debug.log")
}

/// Reads `--verbose`/`--quiet` and falls back to `E4S_CL_LOGLEVEL` for
/// the terminal logger's level; the debug file always records
/// everything regardless of this setting.
fn terminal_level(verbose: bool, quiet: bool) -> LevelFilter {
    if verbose {
        return LevelFilter::Debug;
    }
    if quiet {
        return LevelFilter::Error;
    }
    std::env::var("E4S_CL_LOGLEVEL")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LevelFilter::Info)
}

struct RotatingFile {
    path: PathBuf,
    file: File,
    size: u64,
}

impl RotatingFile {
    fn open(path: PathBuf) -> std::io::Result<RotatingFile> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(RotatingFile { path, file, size })
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        for i in (1..MAX_ROTATED_FILES).rev() {
            let from = self.rotated_path(i);
            let to = self.rotated_path(i + 1);
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }
        let first = self.rotated_path(1);
        let _ = std::fs::rename(&self.path, &first);
        self.file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
        self.size = 0;
        Ok(())
    }

    fn rotated_path(&self, index: u32) -> PathBuf {
        let mut name = self.path.clone();
        name.set_extension(format!("log.{index}"));
        name
    }

    fn write_line(&mut self, line: &str) {
        if self.size >= MAX_FILE_BYTES {
            let _ = self.rotate();
        }
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.size += line.len() as u64;
        }
    }
}

struct CombinedLogger {
    term: env_logger::Logger,
    file: Mutex<RotatingFile>,
}

fn format_line(record: &Record) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    format!(
        "[{:.3}] {:<5} {}: {}\n",
        secs,
        record.level(),
        record.target(),
        record.args()
    )
}

impl Log for CombinedLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.term.enabled(record.metadata()) {
            self.term.log(record);
        }
        if let Ok(mut file) = self.file.lock() {
            file.write_line(&format_line(record));
        }
    }

    fn flush(&self) {
        self.term.flush();
        if let Ok(mut file) = self.file.lock() {
            let _ = file.file.flush();
        }
    }
}

/// Initializes the global logger: terminal output at `--verbose`
/// (debug) / default (info) / `--quiet` (error), plus the always-on
/// rotating debug file. Safe to call only once per process, like
/// `env_logger::init`; `main` calls it exactly once at startup.
pub fn init(verbose: bool, quiet: bool) -> Result<()> {
    let term_level = terminal_level(verbose, quiet);
    let term = env_logger::Builder::new()
        .filter_level(term_level)
        .format_timestamp(None)
        .build();
    let file = RotatingFile::open(debug_log_path())?;

    let combined = CombinedLogger {
        term,
        file: Mutex::new(file),
    };

    log::set_max_level(LevelFilter::Trace);
    log::set_boxed_logger(Box::new(combined))
        .map_err(|e| crate::error::Error::Configuration(format!("logger already initialized: {e}")))?;

    Ok(())
}

/// Whether `level` would be printed on the current terminal logger --
/// used by callers that want to avoid building an expensive debug
/// string when nothing will show it (the file logger sees everything
/// regardless, so this only ever hides terminal chatter).
pub fn terminal_would_show(verbose: bool, quiet: bool, level: Level) -> bool {
    level <= terminal_level(verbose, quiet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_beats_quiet() {
        assert_eq!(terminal_level(true, true), LevelFilter::Debug);
    }

    #[test]
    fn quiet_lowers_to_error() {
        assert_eq!(terminal_level(false, true), LevelFilter::Error);
    }

    #[test]
    fn default_is_info() {
        std::env::remove_var("E4S_CL_LOGLEVEL");
        assert_eq!(terminal_level(false, false), LevelFilter::Info);
    }

    #[test]
    fn rotation_caps_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        let mut file = RotatingFile::open(path.clone()).unwrap();
        for _ in 0..20_000 {
            file.write_line(&"x".repeat(100));
        }
        assert!(file.size < MAX_FILE_BYTES);
        assert!(path.with_extension("log.1").exists());
    }
}
