// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Alignment and emission loop.
//!
//! Emits exactly one frame per `emit_index` value, in strictly increasing
//! `daq_block_index` order, once every channel has produced the matching
//! block. Payloads are written in ascending channel order regardless of
//! which producer completed first. Pending reconfiguration is applied at
//! frame boundaries only, so a frame never observes half-applied
//! settings.

use super::{AlignState, Channel, Shared};
use crate::config::DaqConfig;
use crate::error::{Error, Result};
use crate::header::{FrameType, IqHeader, DATA_TYPE_NONE, DATA_TYPE_RAW_U8, HEADER_LEN};
use std::io::Write;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// ADC saturation marker in the unsigned 8-bit stream.
const OVERDRIVE_BYTE: u8 = 255;

/// Aligner loop. Runs on the engine's calling thread and holds the
/// alignment mutex except while parked on the condvar.
pub(super) fn run<W: Write>(
    cfg: &DaqConfig,
    channels: &[Arc<Channel>],
    shared: &Shared,
    ctr_channel: usize,
    mut out: W,
) -> Result<()> {
    let mut header = IqHeader::for_unit(
        &cfg.name,
        cfg.unit_id,
        cfg.num_ch as u32,
        cfg.ioo_type,
        u64::from(cfg.sample_rate),
        cfg.daq_buffer_size as u32,
    );
    let mut hbuf = [0u8; HEADER_LEN];
    let mut emit_index: u64 = 0;

    let mut state = shared.state.lock();
    loop {
        if state.exit {
            // Drain what is already ready, then stop. The target is a
            // snapshot so a still-streaming producer cannot keep the
            // drain alive.
            let target = min_produced(&state);
            while emit_index < target {
                emit_frame(&mut out, &mut header, &mut hbuf, channels, &mut state, emit_index, cfg)?;
                emit_index += 1;
            }
            log::info!("aligner: exit after {} frames", emit_index);
            return Ok(());
        }

        if min_produced(&state) <= emit_index {
            shared.cond.wait(&mut state);
            continue;
        }

        emit_frame(&mut out, &mut header, &mut hbuf, channels, &mut state, emit_index, cfg)?;
        emit_index += 1;
        apply_reconfig(cfg, channels, &mut state, ctr_channel);
    }
}

fn min_produced(state: &AlignState) -> u64 {
    state.produced.iter().copied().min().unwrap_or(0)
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Stamp the header for `emit_index`, classify the frame, and write it.
///
/// DUMMY frames are header-only: no overdrive scan, no payload,
/// `cpi_length` 0. DATA/CAL carry every channel's ring slot.
fn emit_frame<W: Write>(
    out: &mut W,
    header: &mut IqHeader,
    hbuf: &mut [u8; HEADER_LEN],
    channels: &[Arc<Channel>],
    state: &mut AlignState,
    emit_index: u64,
    cfg: &DaqConfig,
) -> Result<()> {
    let dummy = state.dummy_frames_left > 0;

    header.time_stamp = unix_millis();
    header.daq_block_index = emit_index as u32;
    header.rf_center_freq = u64::from(state.tuning[0].center_freq);
    for (slot, tuning) in header.if_gains.iter_mut().zip(&state.tuning) {
        *slot = tuning.gain;
    }
    header.noise_source_state = u32::from(state.noise_wanted);

    if dummy {
        header.frame_type = FrameType::Dummy;
        header.data_type = DATA_TYPE_NONE;
        header.cpi_length = 0;
        header.adc_overdrive_flags = 0;
    } else {
        header.frame_type = if state.noise_wanted {
            FrameType::Cal
        } else {
            FrameType::Data
        };
        header.data_type = DATA_TYPE_RAW_U8;
        header.cpi_length = cfg.daq_buffer_size as u32;
        let mut overdrive = 0u32;
        for (i, ch) in channels.iter().enumerate() {
            if ch.ring.slot(emit_index).contains(&OVERDRIVE_BYTE) {
                overdrive |= 1 << i;
            }
        }
        header.adc_overdrive_flags = overdrive;
    }

    header.encode_into(hbuf);
    out.write_all(hbuf).map_err(Error::StreamWrite)?;
    if !dummy {
        for ch in channels {
            out.write_all(ch.ring.slot(emit_index))
                .map_err(Error::StreamWrite)?;
        }
    }
    out.flush().map_err(Error::StreamWrite)?;

    if dummy {
        state.dummy_frames_left -= 1;
        if state.dummy_frames_left == 0 {
            log::debug!("aligner: quiesce window closed at block {}", emit_index);
        }
    }
    Ok(())
}

/// Apply pending reconfiguration at a frame boundary.
fn apply_reconfig(
    cfg: &DaqConfig,
    channels: &[Arc<Channel>],
    state: &mut AlignState,
    ctr_channel: usize,
) {
    if state.retrigger {
        state.retrigger = false;
        log::info!("aligner: reconfigure trigger, canceling async reads");
        for ch in channels {
            if let Err(e) = ch.device.cancel_async() {
                log::error!("ch{}: reconfigure cancel failed: {}", ch.index, e);
            }
        }
    }

    if let Some(freq) = state.pending_freq.take() {
        for (ch, tuning) in channels.iter().zip(&mut state.tuning) {
            let readback = ch
                .device
                .set_center_freq(freq)
                .and_then(|()| ch.device.center_freq());
            match readback {
                Ok(actual) => tuning.center_freq = actual,
                Err(e) => log::error!("ch{}: retune to {} Hz failed: {}", ch.index, freq, e),
            }
        }
    }

    if let Some(gains) = state.pending_gains.take() {
        for ((ch, tuning), gain) in channels.iter().zip(&mut state.tuning).zip(gains) {
            match ch.device.set_tuner_gain(gain) {
                Ok(()) => tuning.gain = gain,
                Err(e) => log::error!("ch{}: regain to {} failed: {}", ch.index, gain, e),
            }
        }
    }

    if state.noise_wanted != state.noise_applied && cfg.en_noise_source_ctr {
        let on = state.noise_wanted;
        drive_noise_gpio(&channels[ctr_channel], on);
        // Multi-board chassis mirror the noise switch on a second device.
        if cfg.num_ch > 4 {
            drive_noise_gpio(&channels[cfg.aux_noise_ctr_channel], on);
        }
        state.noise_applied = on;
    }
}

fn drive_noise_gpio(ch: &Channel, on: bool) {
    log::info!("ch{}: noise source GPIO {}", ch.index, if on { "on" } else { "off" });
    if let Err(e) = ch.device.set_gpio(0, on) {
        log::error!("ch{}: {}", ch.index, e);
    }
}
