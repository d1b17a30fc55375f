//! Logging backend
//!
//! The library logs through the `log` facade. The `sndframe` binary installs
//! an `env_logger` backend writing to stderr or a log file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use env_logger::{Builder, Target, WriteStyle};

/// Log levels, ordered from quietest to noisiest
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Nothing = 0,
    Error = 1,
    Warning = 2,
    Info = 3,
    Debug = 4,
    All = 5,
}

impl LogLevel {
    /// Create a LogLevel from an integer; out-of-range values mean Info
    pub fn from_i32(level: i32) -> Self {
        match level {
            0 => LogLevel::Nothing,
            1 => LogLevel::Error,
            2 => LogLevel::Warning,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::All,
            _ => LogLevel::Info,
        }
    }

    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Level for a `-v` count: warnings by default, each flag one step louder
    pub fn from_verbosity(count: u8) -> Self {
        Self::from_i32((LogLevel::Warning.as_i32() + count as i32).min(LogLevel::All.as_i32()))
    }

    pub fn filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Nothing => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::All => log::LevelFilter::Trace,
        }
    }
}

/// Install the logger; `file` appends to a log file instead of stderr
///
/// `level` is the base filter; `RUST_LOG` directives, when set, refine it.
/// Fails if a logger is already installed or the file cannot be opened.
pub fn init(level: LogLevel, file: Option<&Path>) -> Result<()> {
    let mut builder = Builder::new();
    builder
        .filter_level(level.filter())
        .format(|buf, record| {
            writeln!(buf, "[{:<5}] {}: {}", record.level(), record.target(), record.args())
        })
        .parse_default_env();
    if let Some(path) = file {
        let sink = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        builder
            .target(Target::Pipe(Box::new(sink)))
            .write_style(WriteStyle::Never);
    }
    builder.try_init().context("Logger already initialized")?;
    Ok(())
}
