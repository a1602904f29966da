// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # SYNDAQ - Coherent Multi-Channel SDR Data Acquisition
//!
//! Data-acquisition front end for a coherent multi-channel SDR receiver.
//! N identical tuners on a common reference clock stream raw 8-bit IQ
//! concurrently; the engine aligns them into coherent frames (the same
//! block count from every channel over the same wall-clock window),
//! stamps each frame with a fixed-layout binary header, and emits
//! header-plus-payload records on standard output for the downstream
//! synchronization/decimation pipeline.
//!
//! ## Architecture
//!
//! ```text
//! tuner 0 --driver cb--> producer 0 --> ring 0 --+
//! tuner 1 --driver cb--> producer 1 --> ring 1 --+--> aligner --> stdout
//! tuner N --driver cb--> producer N --> ring N --+       ^
//!                                                        |
//! named pipe --> control reader -----(shared state)------+
//! ```
//!
//! Producers rendezvous at a start barrier so asynchronous reads begin
//! inside the same tight window (the precondition for phase coherence),
//! then copy every transfer into an 8-slot ring. The aligner releases a
//! frame only once every channel has produced the matching block, and
//! applies control-plane changes (retune, regain, noise source, halt) at
//! frame boundaries only, emitting 8 header-only DUMMY frames while the
//! RF path settles.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use syndaq::driver::sim::SimDriver;
//! use syndaq::{AcquisitionEngine, DaqConfig, Result};
//!
//! fn main() -> Result<()> {
//!     let cfg = DaqConfig::load("syndaq.ini")?;
//!     let driver = SimDriver::new(cfg.num_ch);
//!     let engine = AcquisitionEngine::new(cfg, &driver)?;
//!     engine.run(std::io::stdout().lock())
//! }
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`AcquisitionEngine`] | Owns channels, rings and the alignment state; runs the chain |
//! | [`DaqConfig`] | Typed view of the sectioned key-value configuration file |
//! | [`IqHeader`] | The fixed 1024-byte frame header (encode/decode) |
//! | [`control::Command`] | Control-pipe command codec |
//! | [`driver::Tuner`] | Vendor-tuner seam (sim and librtlsdr backends) |

/// Sectioned key-value configuration (closed key set, hard errors).
pub mod config;
/// Control-pipe wire format and reader thread.
pub mod control;
/// Tuner driver seam: traits, simulator, vendor librtlsdr binding.
pub mod driver;
/// The coherent acquisition engine (producers, barrier, aligner).
pub mod engine;
/// Crate-wide error type.
pub mod error;
/// IQ frame header codec.
pub mod header;
/// Logging backend for the `log` facade (stderr/file outputs).
pub mod logging;
/// Per-channel block rings.
pub mod ring;

pub use config::{DaqConfig, DriverKind};
pub use engine::AcquisitionEngine;
pub use error::{Error, Result};
pub use header::{FrameType, IqHeader, HEADER_LEN, HEADER_VERSION, SYNC_WORD};
