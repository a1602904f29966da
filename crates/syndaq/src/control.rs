// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control-plane wire format and reader thread.
//!
//! Commands arrive on a named pipe as one opcode byte followed by
//! fixed-width host-endian arguments, no framing beyond that. The format
//! is fragile across hosts but frozen for compatibility, so encode and
//! decode both live here and nowhere else.

use crate::engine::{Shared, QUIESCE_FRAMES};
use crate::error::{Error, Result};
use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// `r`: full tuner reconfiguration (deprecated cancel-and-restart path).
pub const OP_RECONFIGURE: u8 = b'r';
/// `c`: retune all channels.
pub const OP_RETUNE: u8 = b'c';
/// `g`: set per-channel gains.
pub const OP_REGAIN: u8 = b'g';
/// `n`: calibration noise source on.
pub const OP_NOISE_ON: u8 = b'n';
/// `f`: calibration noise source off.
pub const OP_NOISE_OFF: u8 = b'f';
/// Halt the acquisition chain.
pub const OP_HALT: u8 = 0x02;

/// One decoded control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Re-initialize every tuner with new settings (deprecated path:
    /// cancels the async reads; producers re-run init and re-barrier).
    Reconfigure {
        center_freq: u32,
        sample_rate: u32,
        gain: i32,
    },
    /// Tune every channel to a new center frequency at the next frame
    /// boundary.
    Retune(u32),
    /// Set per-channel gains (one entry per channel, tenth-dB).
    Regain(Vec<i32>),
    /// Switch the calibration noise source on.
    NoiseOn,
    /// Switch the calibration noise source off.
    NoiseOff,
    /// Shut the chain down.
    Halt,
    /// Unrecognized opcode byte; logged and discarded.
    Unknown(u8),
}

impl Command {
    /// Wire-encode this command (opcode byte + raw host-endian args).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::Reconfigure {
                center_freq,
                sample_rate,
                gain,
            } => {
                let mut buf = vec![OP_RECONFIGURE];
                buf.extend_from_slice(&center_freq.to_ne_bytes());
                buf.extend_from_slice(&sample_rate.to_ne_bytes());
                buf.extend_from_slice(&gain.to_ne_bytes());
                buf
            }
            Command::Retune(freq) => {
                let mut buf = vec![OP_RETUNE];
                buf.extend_from_slice(&freq.to_ne_bytes());
                buf
            }
            Command::Regain(gains) => {
                let mut buf = vec![OP_REGAIN];
                for gain in gains {
                    buf.extend_from_slice(&gain.to_ne_bytes());
                }
                buf
            }
            Command::NoiseOn => vec![OP_NOISE_ON],
            Command::NoiseOff => vec![OP_NOISE_OFF],
            Command::Halt => vec![OP_HALT],
            Command::Unknown(op) => vec![*op],
        }
    }
}

/// Decode one command from the pipe (blocking).
///
/// `num_ch` sizes the regain gain vector; the wire carries no count.
pub fn read_command(r: &mut dyn Read, num_ch: usize) -> io::Result<Command> {
    let mut opcode = [0u8; 1];
    r.read_exact(&mut opcode)?;
    match opcode[0] {
        OP_RECONFIGURE => Ok(Command::Reconfigure {
            center_freq: read_u32(r)?,
            sample_rate: read_u32(r)?,
            gain: read_i32(r)?,
        }),
        OP_RETUNE => Ok(Command::Retune(read_u32(r)?)),
        OP_REGAIN => {
            let mut gains = Vec::with_capacity(num_ch);
            for _ in 0..num_ch {
                gains.push(read_i32(r)?);
            }
            Ok(Command::Regain(gains))
        }
        OP_NOISE_ON => Ok(Command::NoiseOn),
        OP_NOISE_OFF => Ok(Command::NoiseOff),
        OP_HALT => Ok(Command::Halt),
        other => Ok(Command::Unknown(other)),
    }
}

fn read_u32(r: &mut dyn Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_ne_bytes(buf))
}

fn read_i32(r: &mut dyn Read) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_ne_bytes(buf))
}

/// Create the control FIFO if it does not exist yet.
pub(crate) fn create_pipe(path: &Path) -> Result<()> {
    let cpath = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        Error::ControlPipeCreate(
            path.display().to_string(),
            io::Error::new(io::ErrorKind::InvalidInput, "NUL in path"),
        )
    })?;
    // SAFETY: cpath is a valid NUL-terminated string for the call.
    let ret = unsafe { libc::mkfifo(cpath.as_ptr(), 0o644) };
    if ret == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::AlreadyExists {
        Ok(())
    } else {
        Err(Error::ControlPipeCreate(path.display().to_string(), err))
    }
}

/// Unblock a reader parked in a blocking pipe read by feeding it a halt
/// byte. Used for shutdowns that did not originate on the pipe; a failed
/// open means no reader is parked anymore.
pub(crate) fn unblock_reader(path: &Path) {
    use std::os::unix::fs::OpenOptionsExt;
    if let Ok(mut pipe) = OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
    {
        let _ = pipe.write_all(&[OP_HALT]);
    }
}

/// Control reader thread body.
///
/// Blocks on the pipe, decodes one command at a time, mutates the shared
/// state under the alignment mutex, arms the dummy-frame quiesce window,
/// and signals the aligner. A FIFO returns EOF whenever its last writer
/// closes, so the loop reopens and waits for the next writer.
pub(crate) fn run_reader(path: &Path, num_ch: usize, shared: &Shared) {
    loop {
        // Read+write keeps a writer reference alive inside the daemon
        // (Linux FIFO semantics): the open never blocks waiting for a
        // first client, and the reader does not bounce through EOF
        // between one-shot syndaqctl invocations.
        let mut pipe = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                log::error!(
                    "{}",
                    Error::ControlPipeOpen(path.display().to_string(), e)
                );
                let mut state = shared.state.lock();
                state.exit = true;
                state.control_done = true;
                shared.cond.notify_all();
                return;
            }
        };
        loop {
            match read_command(&mut pipe, num_ch) {
                Ok(cmd) => {
                    if apply(shared, cmd) {
                        shared.state.lock().control_done = true;
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    log::error!("control pipe read failed: {}", e);
                    break;
                }
            }
        }
    }
}

/// Apply one command to the shared state. Returns true when the reader
/// should stop (exit requested).
fn apply(shared: &Shared, cmd: Command) -> bool {
    let mut state = shared.state.lock();
    match cmd {
        Command::Reconfigure {
            center_freq,
            sample_rate,
            gain,
        } => {
            log::info!(
                "control: reconfigure to {} Hz / {} sps / gain {}",
                center_freq,
                sample_rate,
                gain
            );
            for tuning in &mut state.tuning {
                tuning.center_freq = center_freq;
                tuning.sample_rate = sample_rate;
                tuning.gain = gain;
            }
            state.retrigger = true;
            state.dummy_frames_left = QUIESCE_FRAMES;
        }
        Command::Retune(freq) => {
            log::info!("control: retune to {} Hz", freq);
            state.pending_freq = Some(freq);
            state.dummy_frames_left = QUIESCE_FRAMES;
        }
        Command::Regain(gains) => {
            log::info!("control: regain {:?}", gains);
            state.pending_gains = Some(gains);
            state.dummy_frames_left = QUIESCE_FRAMES;
        }
        Command::NoiseOn => {
            log::info!("control: noise source on");
            state.noise_wanted = true;
            state.dummy_frames_left = QUIESCE_FRAMES;
        }
        Command::NoiseOff => {
            log::info!("control: noise source off");
            state.noise_wanted = false;
            state.dummy_frames_left = QUIESCE_FRAMES;
        }
        Command::Halt => {
            log::info!("control: halt");
            state.exit = true;
        }
        Command::Unknown(op) => {
            log::warn!("control: unknown opcode 0x{:02x}, discarded", op);
        }
    }
    shared.cond.notify_all();
    state.exit
}
