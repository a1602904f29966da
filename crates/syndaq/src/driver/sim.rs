// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulated tuner backend.
//!
//! Deterministic, hardware-free stand-in for the vendor driver: each fake
//! tuner delivers transfers paced by its configured sample rate, either
//! from a scripted block queue (tests inject exact payloads, including
//! deliberately short ones) or as a constant fill byte. Selected at
//! runtime with `daq.driver = sim`; also the substrate of the test suite.

use crate::driver::{Tuner, TunerDriver};
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Driver over a bank of [`SimTuner`]s with serials counting from 1000.
pub struct SimDriver {
    tuners: Vec<Arc<SimTuner>>,
}

impl SimDriver {
    /// Bank of `num_devices` simulated tuners, serials "1000", "1001", …
    pub fn new(num_devices: usize) -> Self {
        Self {
            tuners: (0..num_devices)
                .map(|i| Arc::new(SimTuner::new(format!("{}", 1000 + i))))
                .collect(),
        }
    }

    /// Direct handle to a tuner, for scripting payloads in tests.
    pub fn tuner(&self, index: usize) -> &Arc<SimTuner> {
        &self.tuners[index]
    }
}

impl TunerDriver for SimDriver {
    fn device_count(&self) -> usize {
        self.tuners.len()
    }

    fn device_serial(&self, index: usize) -> Result<String> {
        self.tuners
            .get(index)
            .map(|t| t.serial.clone())
            .ok_or_else(|| Error::Tuner {
                op: "device_serial",
                reason: format!("no device at index {}", index),
            })
    }

    fn open(&self, index: usize) -> Result<Arc<dyn Tuner>> {
        match self.tuners.get(index) {
            Some(t) => Ok(Arc::clone(t) as Arc<dyn Tuner>),
            None => Err(Error::DeviceOpen {
                index,
                reason: "no such device".into(),
            }),
        }
    }
}

#[derive(Debug)]
struct TunerState {
    center_freq: u32,
    sample_rate: u32,
    gain: i32,
    agc: bool,
    dithering: bool,
    gpio: u8,
    fill: u8,
}

/// One simulated tuner.
pub struct SimTuner {
    serial: String,
    state: Mutex<TunerState>,
    // Cancel request, sticky until consumed by the streaming loop so a
    // cancel that lands before read_async starts is not lost.
    cancel: Mutex<bool>,
    cancel_cv: Condvar,
    script: Mutex<VecDeque<Vec<u8>>>,
    streaming: AtomicBool,
}

impl SimTuner {
    fn new(serial: String) -> Self {
        Self {
            serial,
            state: Mutex::new(TunerState {
                center_freq: 0,
                sample_rate: 2_400_000,
                gain: 0,
                agc: true,
                dithering: true,
                gpio: 0,
                fill: 0x80,
            }),
            cancel: Mutex::new(false),
            cancel_cv: Condvar::new(),
            script: Mutex::new(VecDeque::new()),
            streaming: AtomicBool::new(false),
        }
    }

    /// Queue one exact block; delivered before any fill blocks, verbatim
    /// (a short block simulates a short driver transfer).
    pub fn push_block(&self, block: Vec<u8>) {
        self.script.lock().push_back(block);
    }

    /// Byte used for generated blocks once the script queue is empty.
    pub fn set_fill(&self, fill: u8) {
        self.state.lock().fill = fill;
    }

    /// Current level of a GPIO pin.
    pub fn gpio_high(&self, pin: u8) -> bool {
        self.state.lock().gpio & (1 << pin) != 0
    }

    /// Whether a `read_async` session is currently running.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Configured manual gain, tenths of a dB.
    pub fn gain(&self) -> i32 {
        self.state.lock().gain
    }

    /// Whether AGC is enabled.
    pub fn agc_enabled(&self) -> bool {
        self.state.lock().agc
    }

    /// Whether LO dithering is enabled.
    pub fn dithering_enabled(&self) -> bool {
        self.state.lock().dithering
    }

    fn transfer_period(&self, transfer_len: usize) -> Duration {
        let state = self.state.lock();
        let samples = (transfer_len / 2) as f64;
        Duration::from_secs_f64(samples / f64::from(state.sample_rate.max(1)))
    }

    fn next_block(&self, transfer_len: usize) -> Vec<u8> {
        if let Some(block) = self.script.lock().pop_front() {
            return block;
        }
        vec![self.state.lock().fill; transfer_len]
    }

    fn stream_loop(&self, transfer_len: usize, on_block: &mut dyn FnMut(&[u8])) -> Result<()> {
        loop {
            let period = self.transfer_period(transfer_len);
            {
                let mut cancelled = self.cancel.lock();
                if !*cancelled {
                    let _ = self.cancel_cv.wait_for(&mut cancelled, period);
                }
                if *cancelled {
                    *cancelled = false;
                    return Ok(());
                }
            }
            let block = self.next_block(transfer_len);
            on_block(&block);
        }
    }
}

impl Tuner for SimTuner {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn set_dithering(&self, enabled: bool) -> Result<()> {
        self.state.lock().dithering = enabled;
        Ok(())
    }

    fn set_agc_mode(&self, enabled: bool) -> Result<()> {
        self.state.lock().agc = enabled;
        Ok(())
    }

    fn set_center_freq(&self, hz: u32) -> Result<()> {
        self.state.lock().center_freq = hz;
        Ok(())
    }

    fn center_freq(&self) -> Result<u32> {
        // The simulated synthesizer tunes exactly; hardware backends
        // report the quantized frequency here.
        Ok(self.state.lock().center_freq)
    }

    fn set_tuner_gain(&self, tenth_db: i32) -> Result<()> {
        self.state.lock().gain = tenth_db;
        Ok(())
    }

    fn set_sample_rate(&self, hz: u32) -> Result<()> {
        self.state.lock().sample_rate = hz;
        Ok(())
    }

    fn set_gpio(&self, pin: u8, high: bool) -> Result<()> {
        let mut state = self.state.lock();
        if high {
            state.gpio |= 1 << pin;
        } else {
            state.gpio &= !(1 << pin);
        }
        Ok(())
    }

    fn reset_buffer(&self) -> Result<()> {
        Ok(())
    }

    fn read_async(
        &self,
        _transfer_count: u32,
        transfer_len: usize,
        on_block: &mut dyn FnMut(&[u8]),
    ) -> Result<()> {
        self.streaming.store(true, Ordering::Release);
        let result = self.stream_loop(transfer_len, on_block);
        self.streaming.store(false, Ordering::Release);
        result
    }

    fn cancel_async(&self) -> Result<()> {
        *self.cancel.lock() = true;
        self.cancel_cv.notify_all();
        Ok(())
    }
}
