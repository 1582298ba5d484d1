//! This module contains the global logger instance used by the `log` crate.
//!
//! Every diagnostic the loader emits goes to stderr; nothing downstream
//! parses it.

use std::io::Write;

/// The global logger instance used for the `log` crate.
static LOGGER: StderrLogger = StderrLogger;

struct StderrLogger;

pub fn init() {
    log::set_logger(&LOGGER).expect("Failed to set logger");
    log::set_max_level(if cfg!(debug_assertions) {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Info
    });
}

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        if cfg!(debug_assertions) {
            let _ = writeln!(
                stderr,
                "[{:5}] {}:{}: {}",
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            );
        } else {
            let _ = writeln!(stderr, "[{:5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
