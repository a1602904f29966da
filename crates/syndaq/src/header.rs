// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! IQ frame header codec.
//!
//! Every frame on the output stream starts with this fixed 1024-byte
//! record. The core stamps provenance and state; several fields
//! (`cpi_index`, `ext_integration_cntr`, the sync flags, `sampling_freq`
//! after decimation) are deliberately left for downstream stages to
//! overwrite in place. Field order and widths are frozen. Consumers are
//! co-located, so everything is host-endian.
//!
//! Layout (offsets in bytes):
//!
//! ```text
//! 0    u32      sync_word            0x2BF7B95A
//! 4    u32      frame_type           0 DATA, 1 DUMMY, 2 RAMP, 3 CAL, 4 TRIGW
//! 8    [u8;16]  hardware_id          ASCII, NUL padded
//! 24   u32      unit_id
//! 28   u32      active_ant_chs
//! 32   u32      ioo_type
//! 36   u64      rf_center_freq       Hz
//! 44   u64      adc_sampling_freq    Hz
//! 52   u64      sampling_freq        Hz (post-decimation, downstream)
//! 60   u32      cpi_length           complex samples per channel
//! 64   u64      time_stamp           Unix time, milliseconds
//! 72   u32      daq_block_index
//! 76   u32      cpi_index            (downstream)
//! 80   u64      ext_integration_cntr (downstream)
//! 88   u32      data_type            0 none, 1 raw u8 IQ
//! 92   u32      sample_bit_depth
//! 96   u32      adc_overdrive_flags  bit i = channel i saturated
//! 100  [i32;32] if_gains             tenth-dB
//! 228  u32      delay_sync_flag      (downstream)
//! 232  u32      iq_sync_flag         (downstream)
//! 236  u32      sync_state           (downstream)
//! 240  u32      noise_source_state   0 off, 1 on
//! 244  [u8;776] reserved             zero
//! 1020 u32      header_version       7
//! ```

use crate::error::{Error, Result};

/// First four bytes of every frame.
pub const SYNC_WORD: u32 = 0x2BF7_B95A;
/// Header layout revision.
pub const HEADER_VERSION: u32 = 7;
/// Total header record length in bytes.
pub const HEADER_LEN: usize = 1024;
/// Per-channel gain slots in the wire record (larger than any chassis).
pub const GAIN_SLOTS: usize = 32;

/// `data_type` value of a frame with no payload.
pub const DATA_TYPE_NONE: u32 = 0;
/// `data_type` value of raw interleaved unsigned-8-bit IQ payload.
pub const DATA_TYPE_RAW_U8: u32 = 1;

const OFF_SYNC_WORD: usize = 0;
const OFF_FRAME_TYPE: usize = 4;
const OFF_HARDWARE_ID: usize = 8;
const OFF_UNIT_ID: usize = 24;
const OFF_ACTIVE_ANT_CHS: usize = 28;
const OFF_IOO_TYPE: usize = 32;
const OFF_RF_CENTER_FREQ: usize = 36;
const OFF_ADC_SAMPLING_FREQ: usize = 44;
const OFF_SAMPLING_FREQ: usize = 52;
const OFF_CPI_LENGTH: usize = 60;
const OFF_TIME_STAMP: usize = 64;
const OFF_DAQ_BLOCK_INDEX: usize = 72;
const OFF_CPI_INDEX: usize = 76;
const OFF_EXT_INTEGRATION_CNTR: usize = 80;
const OFF_DATA_TYPE: usize = 88;
const OFF_SAMPLE_BIT_DEPTH: usize = 92;
const OFF_ADC_OVERDRIVE_FLAGS: usize = 96;
const OFF_IF_GAINS: usize = 100;
const OFF_DELAY_SYNC_FLAG: usize = 228;
const OFF_IQ_SYNC_FLAG: usize = 232;
const OFF_SYNC_STATE: usize = 236;
const OFF_NOISE_SOURCE_STATE: usize = 240;
const OFF_HEADER_VERSION: usize = 1020;

/// Frame classification on the wire.
///
/// The core emits DATA, DUMMY and CAL; RAMP and TRIGW are reserved values
/// used by co-located consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FrameType {
    /// Live IQ capture.
    Data = 0,
    /// Header-only quiesce frame emitted while reconfiguration settles.
    Dummy = 1,
    /// Synthetic ramp payload (consumer self-test).
    Ramp = 2,
    /// Capture taken with the calibration noise source on.
    Cal = 3,
    /// Trigger-wait marker.
    TriggerWait = 4,
}

impl TryFrom<u32> for FrameType {
    type Error = Error;

    fn try_from(v: u32) -> Result<Self> {
        match v {
            0 => Ok(FrameType::Data),
            1 => Ok(FrameType::Dummy),
            2 => Ok(FrameType::Ramp),
            3 => Ok(FrameType::Cal),
            4 => Ok(FrameType::TriggerWait),
            other => Err(Error::BadFrameType(other)),
        }
    }
}

/// Decoded form of the frame header.
///
/// One instance is reused by the aligner and re-stamped per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IqHeader {
    pub frame_type: FrameType,
    pub hardware_id: [u8; 16],
    pub unit_id: u32,
    pub active_ant_chs: u32,
    pub ioo_type: u32,
    pub rf_center_freq: u64,
    pub adc_sampling_freq: u64,
    pub sampling_freq: u64,
    pub cpi_length: u32,
    pub time_stamp: u64,
    pub daq_block_index: u32,
    pub cpi_index: u32,
    pub ext_integration_cntr: u64,
    pub data_type: u32,
    pub sample_bit_depth: u32,
    pub adc_overdrive_flags: u32,
    pub if_gains: [i32; GAIN_SLOTS],
    pub delay_sync_flag: u32,
    pub iq_sync_flag: u32,
    pub sync_state: u32,
    pub noise_source_state: u32,
}

impl Default for IqHeader {
    fn default() -> Self {
        Self {
            frame_type: FrameType::Data,
            hardware_id: [0; 16],
            unit_id: 0,
            active_ant_chs: 0,
            ioo_type: 0,
            rf_center_freq: 0,
            adc_sampling_freq: 0,
            sampling_freq: 0,
            cpi_length: 0,
            time_stamp: 0,
            daq_block_index: 0,
            cpi_index: 0,
            ext_integration_cntr: 0,
            data_type: DATA_TYPE_NONE,
            sample_bit_depth: 0,
            adc_overdrive_flags: 0,
            if_gains: [0; GAIN_SLOTS],
            delay_sync_flag: 0,
            iq_sync_flag: 0,
            sync_state: 0,
            noise_source_state: 0,
        }
    }
}

impl IqHeader {
    /// Header with the static per-unit fields filled from configuration.
    ///
    /// `name` is truncated to 16 bytes; `cpi_length` is the configured
    /// buffer size in complex samples (re-stamped per frame thereafter).
    pub fn for_unit(
        name: &str,
        unit_id: u32,
        num_ch: u32,
        ioo_type: u32,
        adc_sampling_freq: u64,
        cpi_length: u32,
    ) -> Self {
        let mut hardware_id = [0u8; 16];
        let bytes = name.as_bytes();
        let n = bytes.len().min(16);
        hardware_id[..n].copy_from_slice(&bytes[..n]);
        Self {
            hardware_id,
            unit_id,
            active_ant_chs: num_ch,
            ioo_type,
            adc_sampling_freq,
            sampling_freq: adc_sampling_freq,
            cpi_length,
            sample_bit_depth: 8,
            ..Self::default()
        }
    }

    /// Hardware name with trailing NUL padding removed.
    pub fn hardware_id_str(&self) -> &str {
        let end = self
            .hardware_id
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(16);
        std::str::from_utf8(&self.hardware_id[..end]).unwrap_or("")
    }

    /// Encode into a fresh header record.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode into `buf`, which must be exactly [`HEADER_LEN`] bytes.
    pub fn encode_into(&self, buf: &mut [u8; HEADER_LEN]) {
        buf.fill(0);
        put_u32(buf, OFF_SYNC_WORD, SYNC_WORD);
        put_u32(buf, OFF_FRAME_TYPE, self.frame_type as u32);
        buf[OFF_HARDWARE_ID..OFF_HARDWARE_ID + 16].copy_from_slice(&self.hardware_id);
        put_u32(buf, OFF_UNIT_ID, self.unit_id);
        put_u32(buf, OFF_ACTIVE_ANT_CHS, self.active_ant_chs);
        put_u32(buf, OFF_IOO_TYPE, self.ioo_type);
        put_u64(buf, OFF_RF_CENTER_FREQ, self.rf_center_freq);
        put_u64(buf, OFF_ADC_SAMPLING_FREQ, self.adc_sampling_freq);
        put_u64(buf, OFF_SAMPLING_FREQ, self.sampling_freq);
        put_u32(buf, OFF_CPI_LENGTH, self.cpi_length);
        put_u64(buf, OFF_TIME_STAMP, self.time_stamp);
        put_u32(buf, OFF_DAQ_BLOCK_INDEX, self.daq_block_index);
        put_u32(buf, OFF_CPI_INDEX, self.cpi_index);
        put_u64(buf, OFF_EXT_INTEGRATION_CNTR, self.ext_integration_cntr);
        put_u32(buf, OFF_DATA_TYPE, self.data_type);
        put_u32(buf, OFF_SAMPLE_BIT_DEPTH, self.sample_bit_depth);
        put_u32(buf, OFF_ADC_OVERDRIVE_FLAGS, self.adc_overdrive_flags);
        for (i, gain) in self.if_gains.iter().enumerate() {
            put_u32(buf, OFF_IF_GAINS + 4 * i, *gain as u32);
        }
        put_u32(buf, OFF_DELAY_SYNC_FLAG, self.delay_sync_flag);
        put_u32(buf, OFF_IQ_SYNC_FLAG, self.iq_sync_flag);
        put_u32(buf, OFF_SYNC_STATE, self.sync_state);
        put_u32(buf, OFF_NOISE_SOURCE_STATE, self.noise_source_state);
        put_u32(buf, OFF_HEADER_VERSION, HEADER_VERSION);
    }

    /// Decode a header record, validating sync word and frame type.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::HeaderTooShort(buf.len()));
        }
        let sync = get_u32(buf, OFF_SYNC_WORD);
        if sync != SYNC_WORD {
            return Err(Error::BadSyncWord(sync));
        }
        let frame_type = FrameType::try_from(get_u32(buf, OFF_FRAME_TYPE))?;
        let mut hardware_id = [0u8; 16];
        hardware_id.copy_from_slice(&buf[OFF_HARDWARE_ID..OFF_HARDWARE_ID + 16]);
        let mut if_gains = [0i32; GAIN_SLOTS];
        for (i, gain) in if_gains.iter_mut().enumerate() {
            *gain = get_u32(buf, OFF_IF_GAINS + 4 * i) as i32;
        }
        Ok(Self {
            frame_type,
            hardware_id,
            unit_id: get_u32(buf, OFF_UNIT_ID),
            active_ant_chs: get_u32(buf, OFF_ACTIVE_ANT_CHS),
            ioo_type: get_u32(buf, OFF_IOO_TYPE),
            rf_center_freq: get_u64(buf, OFF_RF_CENTER_FREQ),
            adc_sampling_freq: get_u64(buf, OFF_ADC_SAMPLING_FREQ),
            sampling_freq: get_u64(buf, OFF_SAMPLING_FREQ),
            cpi_length: get_u32(buf, OFF_CPI_LENGTH),
            time_stamp: get_u64(buf, OFF_TIME_STAMP),
            daq_block_index: get_u32(buf, OFF_DAQ_BLOCK_INDEX),
            cpi_index: get_u32(buf, OFF_CPI_INDEX),
            ext_integration_cntr: get_u64(buf, OFF_EXT_INTEGRATION_CNTR),
            data_type: get_u32(buf, OFF_DATA_TYPE),
            sample_bit_depth: get_u32(buf, OFF_SAMPLE_BIT_DEPTH),
            adc_overdrive_flags: get_u32(buf, OFF_ADC_OVERDRIVE_FLAGS),
            if_gains,
            delay_sync_flag: get_u32(buf, OFF_DELAY_SYNC_FLAG),
            iq_sync_flag: get_u32(buf, OFF_IQ_SYNC_FLAG),
            sync_state: get_u32(buf, OFF_SYNC_STATE),
            noise_source_state: get_u32(buf, OFF_NOISE_SOURCE_STATE),
        })
    }
}

// Host endianness throughout: consumers are co-located.

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_ne_bytes());
}

fn put_u64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_ne_bytes());
}

fn get_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap_or_default())
}

fn get_u64(buf: &[u8], off: usize) -> u64 {
    u64::from_ne_bytes(buf[off..off + 8].try_into().unwrap_or_default())
}
