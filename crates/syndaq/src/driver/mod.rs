// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tuner driver seam.
//!
//! The acquisition engine talks to tuners through these two traits only.
//! [`Tuner`] covers exactly the operations the producer and the
//! reconfiguration path need; anything else the vendor library offers
//! (direct sampling, crystal trims, IF gains) stays out of the contract.
//!
//! Handles are shared: the producer thread drives initialization and the
//! blocking asynchronous read, while the aligner re-tunes, re-gains and
//! cancels from its own thread. All methods therefore take `&self` and
//! every implementation must be safe under that overlap: the vendor
//! library serializes its own control transfers, the simulator locks.

use crate::error::Result;
use std::sync::Arc;

pub mod sim;

#[cfg(feature = "rtlsdr")]
pub mod rtlsdr;

/// Driver-side transfer buffers handed to the asynchronous read.
pub const ASYNC_TRANSFER_BUFFERS: u32 = 12;

/// One opened tuner device.
pub trait Tuner: Send + Sync {
    /// Device serial number string.
    fn serial(&self) -> &str;

    /// Enable or disable the local-oscillator dither.
    ///
    /// Dithering trades spurs for phase noise; coherent operation needs
    /// every channel's PLL on the identical frequency grid, so the engine
    /// always disables it.
    fn set_dithering(&self, enabled: bool) -> Result<()>;

    /// Enable or disable the RTL2832 automatic gain control.
    fn set_agc_mode(&self, enabled: bool) -> Result<()>;

    /// Tune to `hz`.
    fn set_center_freq(&self, hz: u32) -> Result<()>;

    /// Actual tuned frequency after synthesizer quantization.
    fn center_freq(&self) -> Result<u32>;

    /// Set manual tuner gain in tenths of a dB.
    fn set_tuner_gain(&self, tenth_db: i32) -> Result<()>;

    /// Set the ADC sample rate in Hz.
    fn set_sample_rate(&self, hz: u32) -> Result<()>;

    /// Drive a GPIO pin (noise-source switch on pin 0).
    fn set_gpio(&self, pin: u8, high: bool) -> Result<()>;

    /// Reset the driver-internal sample FIFO.
    fn reset_buffer(&self) -> Result<()>;

    /// Stream fixed-size transfers, invoking `on_block` once per
    /// delivered buffer, until [`Tuner::cancel_async`] is called.
    ///
    /// Blocks the calling thread for the whole streaming session. The
    /// callback is invoked serialized per device and must return quickly.
    fn read_async(
        &self,
        transfer_count: u32,
        transfer_len: usize,
        on_block: &mut dyn FnMut(&[u8]),
    ) -> Result<()>;

    /// Make a concurrent [`Tuner::read_async`] return. Callable from any
    /// thread.
    fn cancel_async(&self) -> Result<()>;
}

/// Device enumeration and opening.
pub trait TunerDriver: Send + Sync {
    /// Number of devices visible to the driver.
    fn device_count(&self) -> usize;

    /// Serial number of the device at driver index `index`.
    fn device_serial(&self, index: usize) -> Result<String>;

    /// Open the device at driver index `index`.
    fn open(&self, index: usize) -> Result<Arc<dyn Tuner>>;

    /// Driver index of the device with the given serial, if present.
    fn find_serial(&self, serial: &str) -> Option<usize> {
        (0..self.device_count()).find(|&i| {
            self.device_serial(i)
                .map(|s| s == serial)
                .unwrap_or(false)
        })
    }
}
