// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-channel device producer.
//!
//! Brings the tuner to a known state, rendezvouses with the other
//! producers so the asynchronous reads start inside the same tight
//! window, then copies every delivered transfer into the channel ring.
//! The deprecated reconfigure path cancels the read from outside; the
//! producer then loops back through initialization and re-enters the
//! barrier.

use super::{Channel, Shared};
use crate::driver::ASYNC_TRANSFER_BUFFERS;
use crate::error::Result;
use std::sync::Barrier;

/// Producer lifecycle. One streaming session per Init→Streaming pass;
/// Cancelling loops back to Init (reconfigure) or ends the thread
/// (shutdown, device failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProducerState {
    Init,
    AtBarrier,
    Streaming,
    Cancelling,
}

/// Producer thread body.
pub(super) fn run(ch: &Channel, shared: &Shared, barrier: &Barrier, buffer_size: usize) {
    let mut state = ProducerState::Init;
    loop {
        state = advance(ch.index, state, ProducerState::Init);
        init_device(ch, shared);

        state = advance(ch.index, state, ProducerState::AtBarrier);
        barrier.wait();

        state = advance(ch.index, state, ProducerState::Streaming);
        let result = stream(ch, shared, buffer_size);

        state = advance(ch.index, state, ProducerState::Cancelling);
        match result {
            Ok(()) => {
                // Canceled from outside: shutdown or tuner reconfigure.
                if shared.exiting() {
                    log::debug!("ch{}: producer exiting", ch.index);
                    return;
                }
                log::info!("ch{}: async read canceled, re-initializing", ch.index);
            }
            Err(e) => {
                // A lost device mid-run is fatal for the whole chain.
                let reason = format!("ch{}: async read failed: {}", ch.index, e);
                log::error!("{}", reason);
                shared.fail(reason);
                return;
            }
        }
    }
}

fn advance(ch: usize, from: ProducerState, to: ProducerState) -> ProducerState {
    if from != to {
        log::trace!("ch{}: {:?} -> {:?}", ch, from, to);
    }
    to
}

/// Static device setup. The order is load-bearing for phase coherence
/// and must not be rearranged: dither off, AGC off, tune, read back,
/// gain, rate, noise GPIO off, FIFO reset. Failures are logged and
/// survived; the device continues with whatever state it has.
fn init_device(ch: &Channel, shared: &Shared) {
    let (center_freq, gain, sample_rate) = {
        let state = shared.state.lock();
        let tuning = &state.tuning[ch.index];
        (tuning.center_freq, tuning.gain, tuning.sample_rate)
    };
    let dev = &ch.device;

    log_soft(ch.index, dev.set_dithering(false));
    log_soft(ch.index, dev.set_agc_mode(false));
    log_soft(ch.index, dev.set_center_freq(center_freq));
    match dev.center_freq() {
        Ok(actual) => {
            shared.state.lock().tuning[ch.index].center_freq = actual;
            if actual != center_freq {
                log::debug!(
                    "ch{}: synthesizer settled at {} Hz (asked {})",
                    ch.index,
                    actual,
                    center_freq
                );
            }
        }
        Err(e) => log::error!("ch{}: {}", ch.index, e),
    }
    log_soft(ch.index, dev.set_tuner_gain(gain));
    log_soft(ch.index, dev.set_sample_rate(sample_rate));
    log_soft(ch.index, dev.set_gpio(0, false));
    log_soft(ch.index, dev.reset_buffer());
}

fn log_soft(ch: usize, result: Result<()>) {
    if let Err(e) = result {
        log::error!("ch{}: {}", ch, e);
    }
}

/// One asynchronous streaming session. Blocks until the read is canceled
/// or fails. The callback copies into the ring without the lock, then
/// publishes the new produced count and wakes the aligner.
fn stream(ch: &Channel, shared: &Shared, buffer_size: usize) -> Result<()> {
    let mut seq = { shared.state.lock().produced[ch.index] };
    ch.device.read_async(
        ASYNC_TRANSFER_BUFFERS,
        buffer_size,
        &mut |block: &[u8]| {
            if block.len() != buffer_size {
                let reason = format!(
                    "ch{}: short transfer ({} bytes, expected {})",
                    ch.index,
                    block.len(),
                    buffer_size
                );
                log::error!("{}", reason);
                shared.fail(reason);
                return;
            }
            ch.ring.write_slot(seq, block);
            seq += 1;
            let mut state = shared.state.lock();
            state.produced[ch.index] = seq;
            shared.cond.notify_one();
        },
    )
}
