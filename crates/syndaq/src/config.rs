// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Acquisition chain configuration.
//!
//! The configuration file is sectioned key-value text (`[hw]` / `[daq]`,
//! `key = value` lines, `#` or `;` comments). The key set is closed:
//! an unknown section or key is a hard startup error, never a warning.
//! A typo in a gain or buffer size must not silently fall back to a
//! default on a live RF chain.

use crate::error::{Error, Result};
use crate::logging::LogLevel;
use std::path::PathBuf;

/// Upper bound on coherent channels per chassis.
pub const MAX_CHANNELS: usize = 8;

/// Tuner driver backend selection (`daq.driver`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// In-process simulated tuners (deterministic, hardware-free).
    Sim,
    /// Vendor librtlsdr fork (requires the `rtlsdr` cargo feature).
    Rtlsdr,
}

/// Typed view of the configuration file.
#[derive(Debug, Clone)]
pub struct DaqConfig {
    /// Number of coherent channels (1..=8).
    pub num_ch: usize,
    /// Hardware name stamped into the frame header (at most 16 bytes).
    pub name: String,
    /// Unit identifier stamped into the frame header.
    pub unit_id: u32,
    /// Illuminator-of-opportunity type code, passed through to the header.
    pub ioo_type: u32,
    /// Complex samples per channel per frame; ring slot size is twice this.
    pub daq_buffer_size: usize,
    /// ADC sample rate in Hz.
    pub sample_rate: u32,
    /// Initial center frequency in Hz.
    pub center_freq: u32,
    /// Initial tuner gain, tenths of a dB (driver convention).
    pub gain: i32,
    /// Whether the engine drives the calibration noise source GPIO.
    pub en_noise_source_ctr: bool,
    /// Serial number of the device that drives the noise source.
    pub ctr_channel_serial_no: u32,
    /// Log verbosity (0 trace .. 4 error, 5 off).
    pub log_level: LogLevel,
    /// Driver backend.
    pub driver: DriverKind,
    /// Control pipe path.
    pub ctr_pipe_path: PathBuf,
    /// Second noise-source GPIO channel on multi-board units (num_ch > 4).
    pub aux_noise_ctr_channel: usize,
}

impl DaqConfig {
    /// Load and validate the configuration file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigRead(path.to_string(), e))?;
        Self::parse(&text)
    }

    /// Parse configuration text. Unknown keys and sections are hard errors.
    pub fn parse(text: &str) -> Result<Self> {
        let mut b = Builder::default();
        let mut section = String::new();

        for raw in text.lines() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix('[') {
                let name = name
                    .strip_suffix(']')
                    .ok_or_else(|| Error::UnknownConfigKey(line.to_string()))?;
                section = name.trim().to_string();
                if section != "hw" && section != "daq" {
                    return Err(Error::UnknownConfigKey(format!("[{}]", section)));
                }
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::UnknownConfigKey(line.to_string()))?;
            b.set(&section, key.trim(), value.trim())?;
        }

        b.finish()
    }

    /// Ring slot size in bytes: one complex sample is two bytes (I then Q).
    pub fn buffer_size(&self) -> usize {
        2 * self.daq_buffer_size
    }

    /// Serial number string expected for logical channel `ch`.
    ///
    /// Channels map to serials "1000", "1001", ... in logical order.
    pub fn channel_serial(ch: usize) -> String {
        format!("{}", 1000 + ch)
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(['#', ';']) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Accumulates keys as they are seen; `finish` enforces presence and range.
#[derive(Default)]
struct Builder {
    num_ch: Option<usize>,
    name: Option<String>,
    unit_id: Option<u32>,
    ioo_type: Option<u32>,
    daq_buffer_size: Option<usize>,
    sample_rate: Option<u32>,
    center_freq: Option<u32>,
    gain: Option<i32>,
    en_noise_source_ctr: Option<bool>,
    ctr_channel_serial_no: Option<u32>,
    log_level: Option<LogLevel>,
    driver: Option<DriverKind>,
    ctr_pipe_path: Option<PathBuf>,
    aux_noise_ctr_channel: Option<usize>,
}

impl Builder {
    fn set(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        match (section, key) {
            ("hw", "num_ch") => self.num_ch = Some(parse_num("hw.num_ch", value)?),
            ("hw", "name") => self.name = Some(value.to_string()),
            ("hw", "unit_id") => self.unit_id = Some(parse_num("hw.unit_id", value)?),
            ("hw", "ioo_type") => self.ioo_type = Some(parse_num("hw.ioo_type", value)?),
            ("daq", "daq_buffer_size") => {
                self.daq_buffer_size = Some(parse_num("daq.daq_buffer_size", value)?);
            }
            ("daq", "sample_rate") => {
                self.sample_rate = Some(parse_num("daq.sample_rate", value)?);
            }
            ("daq", "center_freq") => {
                self.center_freq = Some(parse_num("daq.center_freq", value)?);
            }
            ("daq", "gain") => self.gain = Some(parse_num("daq.gain", value)?),
            ("daq", "en_noise_source_ctr") => {
                self.en_noise_source_ctr = Some(parse_bool("daq.en_noise_source_ctr", value)?);
            }
            ("daq", "ctr_channel_serial_no") => {
                self.ctr_channel_serial_no =
                    Some(parse_num("daq.ctr_channel_serial_no", value)?);
            }
            ("daq", "log_level") => {
                let n: u8 = parse_num("daq.log_level", value)?;
                self.log_level = Some(LogLevel::from_config(n).ok_or_else(|| {
                    Error::InvalidConfigValue {
                        key: "daq.log_level",
                        reason: format!("{} not in 0..=5", n),
                    }
                })?);
            }
            ("daq", "driver") => {
                self.driver = Some(match value {
                    "sim" => DriverKind::Sim,
                    "rtlsdr" => DriverKind::Rtlsdr,
                    other => {
                        return Err(Error::InvalidConfigValue {
                            key: "daq.driver",
                            reason: format!("{} is not sim|rtlsdr", other),
                        })
                    }
                });
            }
            ("daq", "ctr_pipe_path") => self.ctr_pipe_path = Some(PathBuf::from(value)),
            ("daq", "aux_noise_ctr_channel") => {
                self.aux_noise_ctr_channel = Some(parse_num("daq.aux_noise_ctr_channel", value)?);
            }
            _ => return Err(Error::UnknownConfigKey(format!("{}.{}", section, key))),
        }
        Ok(())
    }

    fn finish(self) -> Result<DaqConfig> {
        let cfg = DaqConfig {
            num_ch: self.num_ch.ok_or(Error::MissingConfigKey("hw.num_ch"))?,
            name: self.name.ok_or(Error::MissingConfigKey("hw.name"))?,
            unit_id: self.unit_id.ok_or(Error::MissingConfigKey("hw.unit_id"))?,
            ioo_type: self.ioo_type.ok_or(Error::MissingConfigKey("hw.ioo_type"))?,
            daq_buffer_size: self
                .daq_buffer_size
                .ok_or(Error::MissingConfigKey("daq.daq_buffer_size"))?,
            sample_rate: self
                .sample_rate
                .ok_or(Error::MissingConfigKey("daq.sample_rate"))?,
            center_freq: self
                .center_freq
                .ok_or(Error::MissingConfigKey("daq.center_freq"))?,
            gain: self.gain.ok_or(Error::MissingConfigKey("daq.gain"))?,
            en_noise_source_ctr: self
                .en_noise_source_ctr
                .ok_or(Error::MissingConfigKey("daq.en_noise_source_ctr"))?,
            ctr_channel_serial_no: self
                .ctr_channel_serial_no
                .ok_or(Error::MissingConfigKey("daq.ctr_channel_serial_no"))?,
            log_level: self
                .log_level
                .ok_or(Error::MissingConfigKey("daq.log_level"))?,
            driver: self.driver.unwrap_or(DriverKind::Sim),
            ctr_pipe_path: self
                .ctr_pipe_path
                .unwrap_or_else(|| PathBuf::from("syndaq_control")),
            aux_noise_ctr_channel: self.aux_noise_ctr_channel.unwrap_or(7),
        };

        if cfg.num_ch == 0 || cfg.num_ch > MAX_CHANNELS {
            return Err(Error::InvalidConfigValue {
                key: "hw.num_ch",
                reason: format!("{} not in 1..={}", cfg.num_ch, MAX_CHANNELS),
            });
        }
        if cfg.name.len() > 16 {
            return Err(Error::InvalidConfigValue {
                key: "hw.name",
                reason: format!("{} bytes, limit is 16", cfg.name.len()),
            });
        }
        if cfg.daq_buffer_size == 0 {
            return Err(Error::InvalidConfigValue {
                key: "daq.daq_buffer_size",
                reason: "must be nonzero".into(),
            });
        }
        if cfg.num_ch > 4 && cfg.aux_noise_ctr_channel >= cfg.num_ch {
            return Err(Error::InvalidConfigValue {
                key: "daq.aux_noise_ctr_channel",
                reason: format!(
                    "{} out of range for {} channels",
                    cfg.aux_noise_ctr_channel, cfg.num_ch
                ),
            });
        }
        Ok(cfg)
    }
}

fn parse_num<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T> {
    value.parse().map_err(|_| Error::InvalidConfigValue {
        key,
        reason: format!("cannot parse {:?}", value),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(Error::InvalidConfigValue {
            key,
            reason: format!("{:?} is not 0|1", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "\
# four-channel bench unit
[hw]
num_ch = 4
name = kspu4
unit_id = 0
ioo_type = 0

[daq]
daq_buffer_size = 1024
sample_rate = 2400000
center_freq = 416588000   ; DVB-T ch
gain = 158
en_noise_source_ctr = 1
ctr_channel_serial_no = 1000
log_level = 2
";

    #[test]
    fn parses_a_complete_file() {
        let cfg = DaqConfig::parse(GOOD).unwrap();
        assert_eq!(cfg.num_ch, 4);
        assert_eq!(cfg.name, "kspu4");
        assert_eq!(cfg.daq_buffer_size, 1024);
        assert_eq!(cfg.buffer_size(), 2048);
        assert_eq!(cfg.center_freq, 416_588_000);
        assert_eq!(cfg.gain, 158);
        assert!(cfg.en_noise_source_ctr);
        assert_eq!(cfg.log_level, LogLevel::Info);
        // Expansion keys take their defaults when absent.
        assert_eq!(cfg.driver, DriverKind::Sim);
        assert_eq!(cfg.ctr_pipe_path, PathBuf::from("syndaq_control"));
        assert_eq!(cfg.aux_noise_ctr_channel, 7);
    }

    #[test]
    fn unknown_key_is_a_hard_error() {
        let text = format!("{}\nsquelch_th = 3\n", GOOD);
        match DaqConfig::parse(&text) {
            Err(Error::UnknownConfigKey(k)) => assert_eq!(k, "daq.squelch_th"),
            other => panic!("expected UnknownConfigKey, got {:?}", other),
        }
    }

    #[test]
    fn unknown_section_is_a_hard_error() {
        let text = format!("{}\n[squelch]\nth = 3\n", GOOD);
        assert!(matches!(
            DaqConfig::parse(&text),
            Err(Error::UnknownConfigKey(_))
        ));
    }

    #[test]
    fn missing_required_key_is_reported_by_name() {
        let text = GOOD.replace("gain = 158", "");
        match DaqConfig::parse(&text) {
            Err(Error::MissingConfigKey(k)) => assert_eq!(k, "daq.gain"),
            other => panic!("expected MissingConfigKey, got {:?}", other),
        }
    }

    #[test]
    fn channel_count_bounds_are_enforced() {
        let text = GOOD.replace("num_ch = 4", "num_ch = 9");
        assert!(matches!(
            DaqConfig::parse(&text),
            Err(Error::InvalidConfigValue { key: "hw.num_ch", .. })
        ));
    }

    #[test]
    fn aux_noise_channel_must_exist_on_big_units() {
        let text = GOOD
            .replace("num_ch = 4", "num_ch = 5")
            .replace("log_level = 2", "log_level = 2\naux_noise_ctr_channel = 6");
        assert!(matches!(
            DaqConfig::parse(&text),
            Err(Error::InvalidConfigValue {
                key: "daq.aux_noise_ctr_channel",
                ..
            })
        ));
    }

    #[test]
    fn serial_map_counts_from_1000() {
        assert_eq!(DaqConfig::channel_serial(0), "1000");
        assert_eq!(DaqConfig::channel_serial(7), "1007");
    }
}
