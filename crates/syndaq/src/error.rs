// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error type.
//!
//! Variants are grouped by lifecycle phase so that `main` can map an error
//! to the right exit code without inspecting message strings: startup and
//! shutdown failures terminate the process with -1, everything else is
//! reported and survived by the component that hit it.

use std::io;

/// All errors produced by the acquisition chain.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Startup Errors (fatal, exit -1)
    // ========================================================================
    /// Configuration file could not be read.
    ConfigRead(String, io::Error),
    /// Configuration key is not recognized (`section.key`).
    UnknownConfigKey(String),
    /// Required configuration key is missing (`section.key`).
    MissingConfigKey(&'static str),
    /// Configuration value failed to parse or is out of range.
    InvalidConfigValue {
        /// Offending key (`section.key`).
        key: &'static str,
        /// What was wrong with the value.
        reason: String,
    },
    /// No device with the expected serial number was found.
    SerialNotFound(String),
    /// Device open failed.
    DeviceOpen {
        /// Driver device index.
        index: usize,
        /// Underlying driver error message.
        reason: String,
    },
    /// The requested driver backend is not compiled into this build.
    DriverUnavailable(&'static str),

    // ========================================================================
    // Driver Errors (recoverable during producer init, logged otherwise)
    // ========================================================================
    /// A tuner operation was rejected by the vendor driver.
    Tuner {
        /// Operation name (e.g. `set_center_freq`).
        op: &'static str,
        /// Driver status code or message.
        reason: String,
    },

    // ========================================================================
    // Control-Plane Errors
    // ========================================================================
    /// Control pipe could not be created.
    ControlPipeCreate(String, io::Error),
    /// Control pipe could not be opened for reading.
    ControlPipeOpen(String, io::Error),

    // ========================================================================
    // Stream Errors (frame codec, used by consumers and tests)
    // ========================================================================
    /// Header buffer shorter than the fixed header length.
    HeaderTooShort(usize),
    /// Sync word in the decoded header does not match the constant.
    BadSyncWord(u32),
    /// Frame type field holds a value outside the wire enum.
    BadFrameType(u32),
    /// Output stream write failed.
    StreamWrite(io::Error),

    // ========================================================================
    // Runtime & Shutdown Errors (fatal, exit -1)
    // ========================================================================
    /// Runtime invariant violation (short driver transfer, lost device).
    Fatal(String),
    /// Asynchronous read could not be canceled on one or more devices.
    CancelFailed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Startup
            Error::ConfigRead(path, e) => write!(f, "cannot read config {}: {}", path, e),
            Error::UnknownConfigKey(key) => write!(f, "unknown config key: {}", key),
            Error::MissingConfigKey(key) => write!(f, "missing config key: {}", key),
            Error::InvalidConfigValue { key, reason } => {
                write!(f, "invalid value for {}: {}", key, reason)
            }
            Error::SerialNotFound(serial) => {
                write!(f, "no device with serial {} present", serial)
            }
            Error::DeviceOpen { index, reason } => {
                write!(f, "cannot open device {}: {}", index, reason)
            }
            Error::DriverUnavailable(name) => {
                write!(f, "driver backend {} not compiled in", name)
            }
            // Driver
            Error::Tuner { op, reason } => write!(f, "tuner {} failed: {}", op, reason),
            // Control
            Error::ControlPipeCreate(path, e) => {
                write!(f, "cannot create control pipe {}: {}", path, e)
            }
            Error::ControlPipeOpen(path, e) => {
                write!(f, "cannot open control pipe {}: {}", path, e)
            }
            // Stream
            Error::HeaderTooShort(len) => write!(f, "header record truncated at {} bytes", len),
            Error::BadSyncWord(word) => write!(f, "bad sync word 0x{:08x}", word),
            Error::BadFrameType(ty) => write!(f, "unknown frame type {}", ty),
            Error::StreamWrite(e) => write!(f, "output stream write failed: {}", e),
            // Runtime & shutdown
            Error::Fatal(reason) => write!(f, "fatal: {}", reason),
            Error::CancelFailed => write!(f, "async read cancel failed at shutdown"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ConfigRead(_, e)
            | Error::ControlPipeCreate(_, e)
            | Error::ControlPipeOpen(_, e)
            | Error::StreamWrite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::StreamWrite(e)
    }
}

/// Convenient alias for results using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
