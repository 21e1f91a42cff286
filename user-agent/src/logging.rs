// src/logging.rs

//! Global `fern` dispatch shared by both binaries.

use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;
use std::{path::Path, process, thread};

use crate::config::LoggingConfig;

/// Map the configured level name; anything unknown falls back to INFO.
pub fn level_filter(level: &str) -> LevelFilter {
    match level.to_uppercase().as_str() {
        "OFF" => LevelFilter::Off,
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Configure global logging as requested in `[logging]`. A relative log file
/// lands in `base_dir`.
pub fn setup_logging(base_dir: &Path, logging: &LoggingConfig) -> Result<(), fern::InitError> {
    let log_path = logging
        .enable
        .then(|| base_dir.join(logging.file.as_deref().unwrap_or("ramdisk.log")));

    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}][pid={}][tid={:?}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                process::id(),
                thread::current().id(),
                msg
            ))
        })
        .level(level_filter(&logging.level))
        .chain(std::io::stdout());

    if let Some(path) = log_path {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}
