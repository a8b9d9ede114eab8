#![deny(missing_docs)]
//! Shared logging utilities for the assetfetch workspace.
//!
//! This crate provides the `fetch_*` logging macros used across the codebase,
//! the process logger initializer, an in-memory [`Transcript`] that captures
//! every log line of a run, and a minimal test initializer.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! fetch_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! fetch_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! fetch_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! fetch_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! fetch_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// In-memory copy of everything logged during a run.
///
/// Cloning is cheap; all clones append to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the captured text, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        let guard = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&guard).into_owned()
    }

    /// Returns the captured text split into lines without trailing newlines.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(ToOwned::to_owned).collect()
    }
}

impl Write for Transcript {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Destination for live log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    /// Write to the terminal (stderr for warnings and errors).
    Terminal,
    /// Write to the given log file only.
    File(PathBuf),
    /// Write to both the terminal and the given log file.
    Both(PathBuf),
}

/// Installs the global logger.
///
/// Every record at or above `level` goes to `destination`, and also into
/// `transcript` when one is given. Silently no-ops if a logger is already set.
pub fn initialize(destination: LogDestination, level: LevelFilter, transcript: Option<Transcript>) {
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    match &destination {
        LogDestination::Terminal => loggers.push(terminal_logger(level)),
        LogDestination::File(path) => {
            if let Some(file_logger) = create_file_logger(level, path) {
                loggers.push(file_logger);
            }
        }
        LogDestination::Both(path) => {
            loggers.push(terminal_logger(level));
            if let Some(file_logger) = create_file_logger(level, path) {
                loggers.push(file_logger);
            }
        }
    }

    if let Some(transcript) = transcript {
        loggers.push(WriteLogger::new(level, transcript_config(), transcript));
    }

    let _ = CombinedLogger::init(loggers);
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

fn terminal_logger(level: LevelFilter) -> Box<TermLogger> {
    TermLogger::new(level, live_config(), TerminalMode::Mixed, ColorChoice::Auto)
}

fn live_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

// Transcript lines carry only level and message; the artifact name holds the timestamp.
fn transcript_config() -> Config {
    ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_location_level(LevelFilter::Off)
        .build()
}

fn create_file_logger(level: LevelFilter, path: &Path) -> Option<Box<WriteLogger<File>>> {
    match File::create(path) {
        Ok(file) => Some(WriteLogger::new(level, live_config(), file)),
        Err(err) => {
            eprintln!("Warning: Could not create log file at {:?}: {}", path, err);
            None
        }
    }
}
