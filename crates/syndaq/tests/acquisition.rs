// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// End-to-end acquisition scenarios over the simulated driver: a real
// engine with producer threads, a real control FIFO, and the framed
// output captured in memory.

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use syndaq::config::DriverKind;
use syndaq::control::Command;
use syndaq::driver::sim::SimDriver;
use syndaq::header::DATA_TYPE_RAW_U8;
use syndaq::logging::LogLevel;
use syndaq::{AcquisitionEngine, DaqConfig, FrameType, IqHeader, HEADER_LEN, HEADER_VERSION};
use tempfile::TempDir;

const FILL: u8 = 0x10;
const CPI: usize = 1024;

/// One parsed frame: header plus per-channel payload slices.
struct Frame {
    header: IqHeader,
    payloads: Vec<Vec<u8>>,
}

/// Split the raw byte stream back into frames using the documented
/// layout. Stops at an incomplete tail (the writer may be mid-frame).
fn parse_stream(bytes: &[u8], num_ch: usize, buffer_size: usize) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut off = 0;
    while bytes.len() - off >= HEADER_LEN {
        let header = IqHeader::decode(&bytes[off..off + HEADER_LEN]).expect("corrupt header");
        let version = u32::from_ne_bytes(bytes[off + 1020..off + 1024].try_into().unwrap());
        assert_eq!(version, HEADER_VERSION);
        let mut payloads = Vec::new();
        let mut end = off + HEADER_LEN;
        if header.frame_type != FrameType::Dummy {
            if bytes.len() - end < num_ch * buffer_size {
                break;
            }
            for _ in 0..num_ch {
                payloads.push(bytes[end..end + buffer_size].to_vec());
                end += buffer_size;
            }
        }
        frames.push(Frame { header, payloads });
        off = end;
    }
    frames
}

#[derive(Clone)]
struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Chain {
    driver: Arc<SimDriver>,
    captured: Arc<Mutex<Vec<u8>>>,
    pipe: PathBuf,
    num_ch: usize,
    buffer_size: usize,
    handle: JoinHandle<syndaq::Result<()>>,
    _dir: TempDir,
}

/// Spin up a full chain on the sim driver. `setup` runs against the
/// driver before any producer starts (script blocks, tweak fills).
fn start_chain(num_ch: usize, setup: impl FnOnce(&SimDriver)) -> Chain {
    let dir = tempfile::tempdir().unwrap();
    let pipe = dir.path().join("control");
    let cfg = DaqConfig {
        num_ch,
        name: "testbed".into(),
        unit_id: 1,
        ioo_type: 0,
        daq_buffer_size: CPI,
        // Slow enough that the 8-slot lap window dwarfs scheduler jitter
        // (one block every ~1.7 ms), fast enough for sub-second tests.
        sample_rate: 600_000,
        center_freq: 416_588_000,
        gain: 158,
        en_noise_source_ctr: true,
        ctr_channel_serial_no: 1000,
        log_level: LogLevel::Off,
        driver: DriverKind::Sim,
        ctr_pipe_path: pipe.clone(),
        aux_noise_ctr_channel: 7,
    };
    let buffer_size = cfg.buffer_size();

    let driver = Arc::new(SimDriver::new(num_ch));
    for ch in 0..num_ch {
        driver.tuner(ch).set_fill(FILL);
    }
    setup(&driver);

    let engine = AcquisitionEngine::new(cfg, driver.as_ref()).unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let writer = CaptureWriter(Arc::clone(&captured));
    let handle = thread::spawn(move || engine.run(writer));

    Chain {
        driver,
        captured,
        pipe,
        num_ch,
        buffer_size,
        handle,
        _dir: dir,
    }
}

impl Chain {
    fn frames(&self) -> Vec<Frame> {
        parse_stream(&self.captured.lock().unwrap(), self.num_ch, self.buffer_size)
    }

    fn wait_until(&self, pred: impl Fn(&[Frame]) -> bool) -> Vec<Frame> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let frames = self.frames();
            if pred(&frames) {
                return frames;
            }
            assert!(Instant::now() < deadline, "timed out waiting on the stream");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn send(&self, cmd: &Command) {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut pipe = loop {
            match OpenOptions::new().write(true).open(&self.pipe) {
                Ok(f) => break f,
                Err(_) => {
                    assert!(Instant::now() < deadline, "control pipe never appeared");
                    thread::sleep(Duration::from_millis(2));
                }
            }
        };
        pipe.write_all(&cmd.encode()).unwrap();
    }

    fn halt_and_join(self) -> (Vec<Frame>, syndaq::Result<()>, Arc<SimDriver>) {
        self.send(&Command::Halt);
        let result = self.handle.join().unwrap();
        let frames = parse_stream(&self.captured.lock().unwrap(), self.num_ch, self.buffer_size);
        (frames, result, self.driver)
    }
}

fn assert_gapless(frames: &[Frame]) {
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.header.daq_block_index, i as u32, "gap at frame {}", i);
    }
}

#[test]
fn first_frame_is_block_zero_of_constant_bytes() {
    let chain = start_chain(4, |_| {});
    chain.wait_until(|f| f.len() >= 3);
    let (frames, result, _) = chain.halt_and_join();
    result.unwrap();

    assert_gapless(&frames);
    let first = &frames[0];
    assert_eq!(first.header.daq_block_index, 0);
    assert_eq!(first.header.frame_type, FrameType::Data);
    assert_eq!(first.header.adc_overdrive_flags, 0);
    assert_eq!(first.header.cpi_length, CPI as u32);
    assert_eq!(first.header.data_type, DATA_TYPE_RAW_U8);
    assert_eq!(first.header.active_ant_chs, 4);
    assert_eq!(first.header.noise_source_state, 0);
    assert_eq!(first.header.hardware_id_str(), "testbed");
    assert_eq!(first.payloads.len(), 4);
    for payload in &first.payloads {
        assert_eq!(payload.len(), 2 * CPI);
        assert!(payload.iter().all(|&b| b == FILL));
    }
    // Startup gains come straight from configuration.
    assert_eq!(&first.header.if_gains[..4], &[158; 4]);
    assert!(first.header.if_gains[4..].iter().all(|&g| g == 0));
}

#[test]
fn overdrive_flags_mark_the_saturated_channel() {
    let chain = start_chain(4, |driver| {
        let mut block = vec![FILL; 2 * CPI];
        block[777] = 255;
        driver.tuner(2).push_block(block);
    });
    chain.wait_until(|f| f.len() >= 2);
    let (frames, result, _) = chain.halt_and_join();
    result.unwrap();

    assert_eq!(frames[0].header.adc_overdrive_flags, 0b0100);
    assert_eq!(frames[0].payloads[2][777], 255);
    // The saturation was a single block; the next frame is clean.
    assert_eq!(frames[1].header.adc_overdrive_flags, 0);
}

#[test]
fn noise_command_opens_quiesce_then_cal() {
    let chain = start_chain(4, |_| {});
    chain.wait_until(|f| f.len() >= 3);
    chain.send(&Command::NoiseOn);
    chain.wait_until(|f| f.iter().any(|fr| fr.header.frame_type == FrameType::Cal));
    let (frames, result, driver) = chain.halt_and_join();
    result.unwrap();

    assert_gapless(&frames);
    let first_dummy = frames
        .iter()
        .position(|f| f.header.frame_type == FrameType::Dummy)
        .expect("no quiesce window");
    for frame in &frames[..first_dummy] {
        assert_eq!(frame.header.frame_type, FrameType::Data);
        assert_eq!(frame.header.noise_source_state, 0);
    }
    let window = &frames[first_dummy..first_dummy + 8];
    for frame in window {
        assert_eq!(frame.header.frame_type, FrameType::Dummy);
        assert_eq!(frame.header.cpi_length, 0);
        assert_eq!(frame.header.data_type, 0);
        assert!(frame.payloads.is_empty());
        // The desired state is stamped from the first post-command frame.
        assert_eq!(frame.header.noise_source_state, 1);
    }
    let after = &frames[first_dummy + 8];
    assert_eq!(after.header.frame_type, FrameType::Cal);
    assert_eq!(after.header.noise_source_state, 1);
    assert_eq!(after.header.cpi_length, CPI as u32);

    // The control-channel device actually drove its noise GPIO.
    assert!(driver.tuner(0).gpio_high(0));
}

#[test]
fn retune_applies_after_quiesce() {
    const NEW_FREQ: u32 = 101_300_000;
    let chain = start_chain(4, |_| {});
    chain.wait_until(|f| f.len() >= 2);
    chain.send(&Command::Retune(NEW_FREQ));
    chain.wait_until(|f| {
        f.iter().any(|fr| {
            fr.header.frame_type != FrameType::Dummy
                && fr.header.rf_center_freq == u64::from(NEW_FREQ)
        })
    });
    let (frames, result, _) = chain.halt_and_join();
    result.unwrap();

    assert_gapless(&frames);
    let first_dummy = frames
        .iter()
        .position(|f| f.header.frame_type == FrameType::Dummy)
        .expect("no quiesce window");
    assert_eq!(frames[0].header.rf_center_freq, 416_588_000);
    let window = &frames[first_dummy..first_dummy + 8];
    assert!(window.iter().all(|f| f.header.frame_type == FrameType::Dummy));
    // From the first post-window frame on, the header carries the
    // driver-reported readback of the new frequency.
    for frame in &frames[first_dummy + 8..] {
        assert_eq!(frame.header.frame_type, FrameType::Data);
        assert_eq!(frame.header.rf_center_freq, u64::from(NEW_FREQ));
    }
}

#[test]
fn regain_fills_per_channel_gains() {
    const GAINS: [i32; 4] = [10, 20, 30, -15];
    let chain = start_chain(4, |_| {});
    chain.wait_until(|f| f.len() >= 2);
    chain.send(&Command::Regain(GAINS.to_vec()));
    chain.wait_until(|f| {
        f.iter()
            .any(|fr| fr.header.frame_type != FrameType::Dummy && fr.header.if_gains[1] == 20)
    });
    let (frames, result, driver) = chain.halt_and_join();
    result.unwrap();

    let first_dummy = frames
        .iter()
        .position(|f| f.header.frame_type == FrameType::Dummy)
        .expect("no quiesce window");
    let window = &frames[first_dummy..first_dummy + 8];
    assert!(window.iter().all(|f| f.header.frame_type == FrameType::Dummy));
    let after = &frames[first_dummy + 8];
    assert_eq!(&after.header.if_gains[..4], &GAINS);
    assert!(after.header.if_gains[4..].iter().all(|&g| g == 0));
    for (ch, gain) in GAINS.iter().enumerate() {
        assert_eq!(driver.tuner(ch).gain(), *gain);
    }
}

#[test]
fn halt_drains_and_unwinds() {
    let chain = start_chain(4, |_| {});
    chain.wait_until(|f| f.len() >= 2);
    let driver = Arc::clone(&chain.driver);
    let (frames, result, _) = chain.halt_and_join();
    result.unwrap();

    assert!(frames.len() >= 2);
    assert_gapless(&frames);
    // Every producer unwound: no async read session is live anymore.
    for ch in 0..4 {
        assert!(!driver.tuner(ch).is_streaming());
    }
}

#[test]
fn short_transfer_is_a_fatal_invariant_violation() {
    let chain = start_chain(4, |driver| {
        // Channel 1 delivers one undersized transfer as its first block.
        driver.tuner(1).push_block(vec![FILL; 100]);
    });
    let deadline = Instant::now() + Duration::from_secs(10);
    while !chain.handle.is_finished() {
        assert!(Instant::now() < deadline, "engine did not shut down");
        thread::sleep(Duration::from_millis(2));
    }
    let result = chain.handle.join().unwrap();
    match result {
        Err(syndaq::Error::Fatal(reason)) => assert!(reason.contains("short transfer")),
        other => panic!("expected fatal shutdown, got {:?}", other),
    }
}

#[test]
fn two_channel_chain_runs_too() {
    // The engine sizes everything from hw.num_ch; a smaller chassis must
    // not assume four channels anywhere.
    let chain = start_chain(2, |_| {});
    chain.wait_until(|f| f.len() >= 2);
    let (frames, result, _) = chain.halt_and_join();
    result.unwrap();
    assert_eq!(frames[0].payloads.len(), 2);
    assert_eq!(frames[0].header.active_ant_chs, 2);
}
