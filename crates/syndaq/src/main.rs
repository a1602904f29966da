// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SYNDAQ daemon.
//!
//! Usage: `syndaq [config-path]` (default `syndaq.ini`). Frames go to
//! stdout, logs to stderr, commands arrive on the configured control
//! pipe. Exits 0 on a clean halt, -1 on any fatal startup or shutdown
//! condition.

use std::io;
use std::sync::Arc;
use syndaq::driver::sim::SimDriver;
use syndaq::driver::TunerDriver;
use syndaq::logging::StderrOutput;
use syndaq::{AcquisitionEngine, DaqConfig, DriverKind, Result};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).map_or("syndaq.ini", String::as_str);

    if let Err(e) = run(config_path) {
        // The logger may not be installed yet (config load failures), so
        // fatal errors go to stderr directly.
        eprintln!("syndaq: {}", e);
        std::process::exit(-1);
    }
}

fn run(config_path: &str) -> Result<()> {
    let cfg = DaqConfig::load(config_path)?;
    syndaq::logging::init(Box::new(StderrOutput), cfg.log_level);
    log::info!(
        "unit {} ({}): {} channels, {} sps, {} Hz, buffer {} samples",
        cfg.unit_id,
        cfg.name,
        cfg.num_ch,
        cfg.sample_rate,
        cfg.center_freq,
        cfg.daq_buffer_size
    );

    let driver = build_driver(&cfg)?;
    let engine = AcquisitionEngine::new(cfg, driver.as_ref())?;
    let out = io::BufWriter::new(io::stdout().lock());
    engine.run(out)?;
    log::info!("clean shutdown");
    Ok(())
}

fn build_driver(cfg: &DaqConfig) -> Result<Arc<dyn TunerDriver>> {
    match cfg.driver {
        DriverKind::Sim => Ok(Arc::new(SimDriver::new(cfg.num_ch))),
        #[cfg(feature = "rtlsdr")]
        DriverKind::Rtlsdr => Ok(Arc::new(syndaq::driver::rtlsdr::RtlDriver::new())),
        #[cfg(not(feature = "rtlsdr"))]
        DriverKind::Rtlsdr => Err(syndaq::Error::DriverUnavailable("rtlsdr")),
    }
}
