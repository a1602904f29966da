// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Coherent acquisition engine.
//!
//! One [`AcquisitionEngine`] value owns everything the run needs: the
//! opened channels with their rings, the alignment mutex/condvar pair,
//! and the control-plane state. Producers and the control reader receive
//! `Arc`s into it; there are no process-wide singletons.
//!
//! Thread layout while running:
//! - one producer thread per channel (`syndaq-ch<i>`), blocked inside the
//!   driver's asynchronous read;
//! - the control reader (`syndaq-ctl`), blocked on the named pipe;
//! - the calling thread, which becomes the aligner/emitter.

mod aligner;
mod producer;

use crate::config::DaqConfig;
use crate::control;
use crate::driver::{Tuner, TunerDriver};
use crate::error::{Error, Result};
use crate::ring::BlockRing;
use parking_lot::{Condvar, Mutex};
use std::io::Write;
use std::sync::{Arc, Barrier};
use std::thread;

/// DUMMY frames emitted after a control command while the RF path
/// settles.
pub const QUIESCE_FRAMES: u32 = 8;

/// Desired and last-read-back tuner settings for one channel.
#[derive(Debug, Clone)]
pub(crate) struct ChannelTuning {
    /// Center frequency in Hz (driver readback once the producer has
    /// initialized).
    pub center_freq: u32,
    /// Tuner gain, tenth-dB.
    pub gain: i32,
    /// ADC sample rate in Hz.
    pub sample_rate: u32,
}

/// Everything under the alignment mutex.
pub(crate) struct AlignState {
    /// Blocks delivered per channel since startup. Written only by the
    /// owning producer's callback, read by the aligner.
    pub produced: Vec<u64>,
    /// Per-channel tuner settings (header gains and frequency come from
    /// here).
    pub tuning: Vec<ChannelTuning>,
    /// Pending retune target (`c` opcode).
    pub pending_freq: Option<u32>,
    /// Pending gain vector (`g` opcode), one entry per channel.
    pub pending_gains: Option<Vec<i32>>,
    /// Deprecated `r` path: cancel async reads so producers re-init.
    pub retrigger: bool,
    /// Desired noise-source state (stamped into every header).
    pub noise_wanted: bool,
    /// Noise-source state last driven onto the GPIO.
    pub noise_applied: bool,
    /// Remaining DUMMY frames in the current quiesce window.
    pub dummy_frames_left: u32,
    /// Cooperative shutdown request.
    pub exit: bool,
    /// Runtime invariant violation that forced the shutdown, if any.
    pub fault: Option<String>,
    /// The control reader has returned (no unblock byte needed).
    pub control_done: bool,
}

/// Alignment mutex + condvar pair shared by every thread of the engine.
pub(crate) struct Shared {
    pub state: Mutex<AlignState>,
    pub cond: Condvar,
}

impl Shared {
    /// Request cooperative shutdown and wake the aligner.
    pub fn request_exit(&self) {
        self.state.lock().exit = true;
        self.cond.notify_all();
    }

    /// Record a runtime invariant violation and shut the chain down.
    /// The first fault wins; the process will exit -1.
    pub fn fail(&self, reason: String) {
        let mut state = self.state.lock();
        if state.fault.is_none() {
            state.fault = Some(reason);
        }
        state.exit = true;
        self.cond.notify_all();
    }

    /// Whether shutdown has been requested.
    pub fn exiting(&self) -> bool {
        self.state.lock().exit
    }
}

/// One coherent channel: opened device plus its block ring.
pub(crate) struct Channel {
    /// Logical channel index (serial 1000 + index).
    pub index: usize,
    pub device: Arc<dyn Tuner>,
    pub ring: BlockRing,
}

/// The multi-device coherent acquisition engine.
pub struct AcquisitionEngine {
    cfg: DaqConfig,
    channels: Vec<Arc<Channel>>,
    shared: Arc<Shared>,
    /// Logical index of the device that drives the noise-source GPIO.
    ctr_channel: usize,
}

impl AcquisitionEngine {
    /// Open all channels and build the engine.
    ///
    /// Channels map to device serials "1000", "1001", …; a missing serial
    /// or a failed open is fatal. The control channel is located by
    /// `daq.ctr_channel_serial_no` and falls back to channel 0 with a
    /// warning.
    pub fn new(cfg: DaqConfig, driver: &dyn TunerDriver) -> Result<Self> {
        let buffer_size = cfg.buffer_size();
        let mut channels = Vec::with_capacity(cfg.num_ch);
        for ch in 0..cfg.num_ch {
            let serial = DaqConfig::channel_serial(ch);
            let index = driver
                .find_serial(&serial)
                .ok_or(Error::SerialNotFound(serial))?;
            let device = driver.open(index)?;
            log::info!("ch{}: opened device {} (serial {})", ch, index, device.serial());
            channels.push(Arc::new(Channel {
                index: ch,
                device,
                ring: BlockRing::new(buffer_size),
            }));
        }

        let ctr_serial = cfg.ctr_channel_serial_no.to_string();
        let ctr_channel = match channels
            .iter()
            .position(|ch| ch.device.serial() == ctr_serial)
        {
            Some(ch) => ch,
            None => {
                log::warn!(
                    "control channel serial {} not present, defaulting to channel 0",
                    ctr_serial
                );
                0
            }
        };

        let tuning = vec![
            ChannelTuning {
                center_freq: cfg.center_freq,
                gain: cfg.gain,
                sample_rate: cfg.sample_rate,
            };
            cfg.num_ch
        ];
        let shared = Arc::new(Shared {
            state: Mutex::new(AlignState {
                produced: vec![0; cfg.num_ch],
                tuning,
                pending_freq: None,
                pending_gains: None,
                retrigger: false,
                noise_wanted: false,
                noise_applied: false,
                dummy_frames_left: 0,
                exit: false,
                fault: None,
                control_done: false,
            }),
            cond: Condvar::new(),
        });

        Ok(Self {
            cfg,
            channels,
            shared,
            ctr_channel,
        })
    }

    /// Run the acquisition chain until halt, emitting frames on `out`.
    ///
    /// The calling thread becomes the aligner. Returns after every
    /// producer and the control reader have been joined; a failed async
    /// cancel at shutdown is fatal.
    pub fn run<W: Write>(&self, out: W) -> Result<()> {
        control::create_pipe(&self.cfg.ctr_pipe_path)?;

        let control_thread = {
            let path = self.cfg.ctr_pipe_path.clone();
            let shared = Arc::clone(&self.shared);
            let num_ch = self.cfg.num_ch;
            thread::Builder::new()
                .name("syndaq-ctl".into())
                .spawn(move || control::run_reader(&path, num_ch, &shared))?
        };

        let barrier = Arc::new(Barrier::new(self.cfg.num_ch));
        let producers: Vec<_> = self
            .channels
            .iter()
            .map(|ch| {
                let ch = Arc::clone(ch);
                let shared = Arc::clone(&self.shared);
                let barrier = Arc::clone(&barrier);
                let buffer_size = self.cfg.buffer_size();
                thread::Builder::new()
                    .name(format!("syndaq-ch{}", ch.index))
                    .spawn(move || producer::run(&ch, &shared, &barrier, buffer_size))
                    .map_err(Error::from)
            })
            .collect::<Result<_>>()?;

        let aligner_result = aligner::run(
            &self.cfg,
            &self.channels,
            &self.shared,
            self.ctr_channel,
            out,
        );

        // Shutdown: whatever ended the aligner, producers must unwind.
        self.shared.request_exit();
        let mut cancel_ok = true;
        for ch in &self.channels {
            if let Err(e) = ch.device.cancel_async() {
                log::error!("ch{}: {}", ch.index, e);
                cancel_ok = false;
            }
        }
        for handle in producers {
            let _ = handle.join();
        }
        if !self.shared.state.lock().control_done {
            control::unblock_reader(&self.cfg.ctr_pipe_path);
        }
        let _ = control_thread.join();
        log::info!("acquisition stopped at block {}", {
            let state = self.shared.state.lock();
            state.produced.iter().copied().min().unwrap_or(0)
        });

        let fault = self.shared.state.lock().fault.take();
        match aligner_result {
            Err(e) => Err(e),
            Ok(()) => match fault {
                Some(reason) => Err(Error::Fatal(reason)),
                None if !cancel_ok => Err(Error::CancelFailed),
                None => Ok(()),
            },
        }
    }
}
