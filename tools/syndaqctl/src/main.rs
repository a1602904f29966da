// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SYNDAQ control CLI
//!
//! Encodes control commands and writes them to the daemon's named pipe.
//!
//! # Usage
//!
//! ```bash
//! # Retune the whole chain to 101.3 MHz
//! syndaqctl retune 101300000
//!
//! # Per-channel gains (tenth-dB, one value per channel)
//! syndaqctl gain 158 158 140 140
//!
//! # Calibration noise source
//! syndaqctl noise-on
//! syndaqctl noise-off
//!
//! # Stop the chain
//! syndaqctl halt
//! ```
//!
//! Every command (except halt) makes the daemon emit 8 DUMMY frames
//! while the RF path settles.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use syndaq::control::Command;

#[derive(Parser)]
#[command(name = "syndaqctl")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send control commands to a running syndaq daemon")]
struct Cli {
    /// Control pipe path (must match daq.ctr_pipe_path)
    #[arg(short, long, default_value = "syndaq_control")]
    pipe: PathBuf,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Tune every channel to a new center frequency
    Retune {
        /// New center frequency in Hz
        freq_hz: u32,
    },
    /// Set per-channel tuner gains (tenth-dB, one value per channel)
    Gain {
        /// Gain values in channel order; the count must equal hw.num_ch
        #[arg(required = true)]
        gains: Vec<i32>,
    },
    /// Switch the calibration noise source on
    NoiseOn,
    /// Switch the calibration noise source off
    NoiseOff,
    /// Full tuner reconfiguration (deprecated cancel-and-restart path)
    Reconfigure {
        /// New center frequency in Hz
        freq_hz: u32,
        /// New sample rate in Hz
        sample_rate: u32,
        /// New gain for every channel, tenth-dB
        gain: i32,
    },
    /// Halt the acquisition chain
    Halt,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Cmd::Retune { freq_hz } => Command::Retune(freq_hz),
        Cmd::Gain { gains } => Command::Regain(gains),
        Cmd::NoiseOn => Command::NoiseOn,
        Cmd::NoiseOff => Command::NoiseOff,
        Cmd::Reconfigure {
            freq_hz,
            sample_rate,
            gain,
        } => Command::Reconfigure {
            center_freq: freq_hz,
            sample_rate,
            gain,
        },
        Cmd::Halt => Command::Halt,
    };

    // Blocks until the daemon's reader side has the pipe open.
    let mut pipe = OpenOptions::new()
        .write(true)
        .open(&cli.pipe)
        .with_context(|| format!("opening control pipe {}", cli.pipe.display()))?;
    pipe.write_all(&command.encode())
        .context("writing command")?;
    Ok(())
}
