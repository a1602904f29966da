// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Vendor librtlsdr backend.
//!
//! Thin binding over the coherent-receiver fork of librtlsdr, which adds
//! the dithering control and the bias-tee GPIO entry points on top of the
//! stock API. Control-path calls are serialized by the vendor library;
//! `rtlsdr_cancel_async` is its documented cross-thread operation.
//!
//! Compiled only with the `rtlsdr` cargo feature; link against the fork,
//! not stock librtlsdr (stock lacks `rtlsdr_set_dithering`).

use crate::driver::{Tuner, TunerDriver};
use crate::error::{Error, Result};
use libc::{c_char, c_int, c_uchar, c_void};
use std::ffi::CStr;
use std::sync::Arc;

#[allow(non_camel_case_types)]
#[repr(C)]
struct rtlsdr_dev {
    _opaque: [u8; 0],
}

#[allow(non_camel_case_types)]
type rtlsdr_read_async_cb_t = unsafe extern "C" fn(buf: *mut c_uchar, len: u32, ctx: *mut c_void);

#[link(name = "rtlsdr")]
extern "C" {
    fn rtlsdr_get_device_count() -> u32;
    fn rtlsdr_get_device_usb_strings(
        index: u32,
        manufact: *mut c_char,
        product: *mut c_char,
        serial: *mut c_char,
    ) -> c_int;
    fn rtlsdr_open(dev: *mut *mut rtlsdr_dev, index: u32) -> c_int;
    fn rtlsdr_close(dev: *mut rtlsdr_dev) -> c_int;
    fn rtlsdr_set_dithering(dev: *mut rtlsdr_dev, dither: c_int) -> c_int;
    fn rtlsdr_set_agc_mode(dev: *mut rtlsdr_dev, on: c_int) -> c_int;
    fn rtlsdr_set_center_freq(dev: *mut rtlsdr_dev, freq: u32) -> c_int;
    fn rtlsdr_get_center_freq(dev: *mut rtlsdr_dev) -> u32;
    fn rtlsdr_set_tuner_gain_mode(dev: *mut rtlsdr_dev, manual: c_int) -> c_int;
    fn rtlsdr_set_tuner_gain(dev: *mut rtlsdr_dev, gain: c_int) -> c_int;
    fn rtlsdr_set_sample_rate(dev: *mut rtlsdr_dev, rate: u32) -> c_int;
    fn rtlsdr_set_bias_tee_gpio(dev: *mut rtlsdr_dev, gpio: c_int, on: c_int) -> c_int;
    fn rtlsdr_reset_buffer(dev: *mut rtlsdr_dev) -> c_int;
    fn rtlsdr_read_async(
        dev: *mut rtlsdr_dev,
        cb: rtlsdr_read_async_cb_t,
        ctx: *mut c_void,
        buf_num: u32,
        buf_len: u32,
    ) -> c_int;
    fn rtlsdr_cancel_async(dev: *mut rtlsdr_dev) -> c_int;
}

fn check(op: &'static str, ret: c_int) -> Result<()> {
    if ret == 0 {
        Ok(())
    } else {
        Err(Error::Tuner {
            op,
            reason: format!("status {}", ret),
        })
    }
}

/// Enumerates and opens physical RTL dongles.
pub struct RtlDriver;

impl RtlDriver {
    pub fn new() -> Self {
        RtlDriver
    }
}

impl Default for RtlDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl TunerDriver for RtlDriver {
    fn device_count(&self) -> usize {
        // SAFETY: no preconditions; pure enumeration.
        unsafe { rtlsdr_get_device_count() as usize }
    }

    fn device_serial(&self, index: usize) -> Result<String> {
        let mut manufact = [0 as c_char; 256];
        let mut product = [0 as c_char; 256];
        let mut serial = [0 as c_char; 256];
        // SAFETY: the vendor contract is three 256-byte caller buffers.
        let ret = unsafe {
            rtlsdr_get_device_usb_strings(
                index as u32,
                manufact.as_mut_ptr(),
                product.as_mut_ptr(),
                serial.as_mut_ptr(),
            )
        };
        check("get_device_usb_strings", ret)?;
        // SAFETY: the library NUL-terminates within the 256-byte buffer.
        let serial = unsafe { CStr::from_ptr(serial.as_ptr()) };
        Ok(serial.to_string_lossy().into_owned())
    }

    fn open(&self, index: usize) -> Result<Arc<dyn Tuner>> {
        let serial = self.device_serial(index).unwrap_or_default();
        let mut dev: *mut rtlsdr_dev = std::ptr::null_mut();
        // SAFETY: out-pointer write on success only.
        let ret = unsafe { rtlsdr_open(&mut dev, index as u32) };
        if ret != 0 || dev.is_null() {
            return Err(Error::DeviceOpen {
                index,
                reason: format!("status {}", ret),
            });
        }
        Ok(Arc::new(RtlTuner { dev, serial }))
    }
}

/// One opened dongle.
pub struct RtlTuner {
    dev: *mut rtlsdr_dev,
    serial: String,
}

// SAFETY: the vendor handle may be used from multiple threads for the
// control path (the library serializes its USB control transfers), and
// cancel_async is explicitly documented for cross-thread use. The engine
// never runs two read_async sessions on one handle.
unsafe impl Send for RtlTuner {}
unsafe impl Sync for RtlTuner {}

struct AsyncCtx<'a> {
    on_block: &'a mut dyn FnMut(&[u8]),
}

unsafe extern "C" fn async_trampoline(buf: *mut c_uchar, len: u32, ctx: *mut c_void) {
    let ctx = &mut *ctx.cast::<AsyncCtx<'_>>();
    let block = std::slice::from_raw_parts(buf, len as usize);
    (ctx.on_block)(block);
}

impl Tuner for RtlTuner {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn set_dithering(&self, enabled: bool) -> Result<()> {
        check("set_dithering", unsafe {
            rtlsdr_set_dithering(self.dev, c_int::from(enabled))
        })
    }

    fn set_agc_mode(&self, enabled: bool) -> Result<()> {
        check("set_agc_mode", unsafe {
            rtlsdr_set_agc_mode(self.dev, c_int::from(enabled))
        })
    }

    fn set_center_freq(&self, hz: u32) -> Result<()> {
        check("set_center_freq", unsafe {
            rtlsdr_set_center_freq(self.dev, hz)
        })
    }

    fn center_freq(&self) -> Result<u32> {
        // SAFETY: plain getter on a valid handle.
        let hz = unsafe { rtlsdr_get_center_freq(self.dev) };
        if hz == 0 {
            return Err(Error::Tuner {
                op: "get_center_freq",
                reason: "device reports 0 Hz".into(),
            });
        }
        Ok(hz)
    }

    fn set_tuner_gain(&self, tenth_db: i32) -> Result<()> {
        // Manual gain mode first; the library rejects gain writes in AGC.
        check("set_tuner_gain_mode", unsafe {
            rtlsdr_set_tuner_gain_mode(self.dev, 1)
        })?;
        check("set_tuner_gain", unsafe {
            rtlsdr_set_tuner_gain(self.dev, tenth_db as c_int)
        })
    }

    fn set_sample_rate(&self, hz: u32) -> Result<()> {
        check("set_sample_rate", unsafe {
            rtlsdr_set_sample_rate(self.dev, hz)
        })
    }

    fn set_gpio(&self, pin: u8, high: bool) -> Result<()> {
        check("set_bias_tee_gpio", unsafe {
            rtlsdr_set_bias_tee_gpio(self.dev, c_int::from(pin), c_int::from(high))
        })
    }

    fn reset_buffer(&self) -> Result<()> {
        check("reset_buffer", unsafe { rtlsdr_reset_buffer(self.dev) })
    }

    fn read_async(
        &self,
        transfer_count: u32,
        transfer_len: usize,
        on_block: &mut dyn FnMut(&[u8]),
    ) -> Result<()> {
        let mut ctx = AsyncCtx { on_block };
        // SAFETY: ctx outlives the blocking call; the trampoline only
        // dereferences it while rtlsdr_read_async is live on this thread.
        let ret = unsafe {
            rtlsdr_read_async(
                self.dev,
                async_trampoline,
                std::ptr::addr_of_mut!(ctx).cast::<c_void>(),
                transfer_count,
                transfer_len as u32,
            )
        };
        check("read_async", ret)
    }

    fn cancel_async(&self) -> Result<()> {
        check("cancel_async", unsafe { rtlsdr_cancel_async(self.dev) })
    }
}

impl Drop for RtlTuner {
    fn drop(&mut self) {
        // SAFETY: handle is valid and no async read is live by the time
        // the last Arc drops (the engine joins producers first).
        unsafe {
            rtlsdr_close(self.dev);
        }
    }
}
