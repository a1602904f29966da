// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Logging backend for the `log` facade.
//!
//! Standard output is the frame stream, so console logs go to **stderr**.
//! The verbosity comes from `daq.log_level` at startup; the level filter
//! is applied by the `log` crate itself, the backend only formats and
//! writes.

use std::fs::File;
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Runtime log verbosity, as configured by `daq.log_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    /// Suppress all output.
    Off,
}

impl LogLevel {
    /// Map the configuration integer (0 trace .. 4 error, 5 off).
    pub fn from_config(n: u8) -> Option<Self> {
        match n {
            0 => Some(LogLevel::Trace),
            1 => Some(LogLevel::Debug),
            2 => Some(LogLevel::Info),
            3 => Some(LogLevel::Warn),
            4 => Some(LogLevel::Error),
            5 => Some(LogLevel::Off),
            _ => None,
        }
    }

    fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

/// Destination for formatted log lines.
pub trait Output: Send + Sync {
    /// Write one formatted line.
    fn write(&self, line: &str) -> io::Result<()>;
    /// Flush any buffered output.
    fn flush(&self) -> io::Result<()>;
}

/// Console output on stderr.
pub struct StderrOutput;

impl Output for StderrOutput {
    fn write(&self, line: &str) -> io::Result<()> {
        let mut err = io::stderr().lock();
        writeln!(err, "{}", line)
    }

    fn flush(&self) -> io::Result<()> {
        io::stderr().lock().flush()
    }
}

/// File output, one line per record.
pub struct FileOutput {
    file: Mutex<File>,
}

impl FileOutput {
    /// Create (or truncate) the log file at `path`.
    pub fn create(path: &str) -> io::Result<Self> {
        Ok(Self {
            file: Mutex::new(File::create(path)?),
        })
    }
}

impl Output for FileOutput {
    fn write(&self, line: &str) -> io::Result<()> {
        let mut file = match self.file.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        writeln!(file, "{}", line)
    }

    fn flush(&self) -> io::Result<()> {
        let mut file = match self.file.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        file.flush()
    }
}

struct DaqLogger {
    output: Box<dyn Output>,
}

impl log::Log for DaqLogger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true // level filtering happens via log::set_max_level
    }

    fn log(&self, record: &log::Record<'_>) {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let line = format!(
            "{}.{:03} {:5} {}: {}",
            ts.as_secs(),
            ts.subsec_millis(),
            record.level(),
            record.target(),
            record.args()
        );
        let _ = self.output.write(&line);
    }

    fn flush(&self) {
        let _ = self.output.flush();
    }
}

/// Install the global logger.
///
/// Call once, early in startup, before any thread is spawned. A second
/// call is ignored (the first installation wins).
pub fn init(output: Box<dyn Output>, level: LogLevel) {
    if log::set_boxed_logger(Box::new(DaqLogger { output })).is_ok() {
        log::set_max_level(level.to_filter());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_levels_map_in_order() {
        assert_eq!(LogLevel::from_config(0), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_config(2), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_config(5), Some(LogLevel::Off));
        assert_eq!(LogLevel::from_config(6), None);
    }

    #[test]
    fn off_maps_to_no_output() {
        assert_eq!(LogLevel::Off.to_filter(), log::LevelFilter::Off);
    }

    #[test]
    fn file_output_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daq.log");
        let out = FileOutput::create(path.to_str().unwrap()).unwrap();
        out.write("one").unwrap();
        out.write("two").unwrap();
        out.flush().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "one\ntwo\n");
    }
}
