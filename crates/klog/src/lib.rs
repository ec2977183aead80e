//! Kernel logging subsystem.
//!
//! Two channels share COM1:
//!
//! - the `log` facade ([`init`] installs [`KernelLogger`]), which takes the
//!   serial lock so that lines from different cores stay whole;
//! - the critical channel ([`critical`], [`critical!`]), which never waits on
//!   that lock and is what the panic path prints through.
#![cfg_attr(not(test), no_std)]

use core::fmt;

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Label printed between brackets, padded to a common width.
pub fn label(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRACE",
        Level::Debug => "DEBUG",
        Level::Info => " INFO",
        Level::Warn => " WARN",
        Level::Error => "ERROR",
    }
}

pub fn color(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[90m", // Gray
        Level::Debug => "\x1b[36m", // Cyan
        Level::Info => "\x1b[32m",  // Green
        Level::Warn => "\x1b[33m",  // Yellow
        Level::Error => "\x1b[31m", // Red
    }
}

const RESET: &str = "\x1b[0m";

/// `log` backend writing colored lines to the serial port.
pub struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = record.level();
        write_locked(format_args!(
            "{}[{}]{} {}\n",
            color(level),
            label(level),
            RESET,
            record.args()
        ));
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Initialize the serial port and install the kernel logger.
///
/// A second call only re-applies `level`.
pub fn init(level: LevelFilter) {
    init_backend();
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

/// Writes one line on the critical channel.
pub fn critical(args: fmt::Arguments) {
    write_unlocked(format_args!("{}\n", args));
}

/// Print to serial without formatting
pub fn print(args: fmt::Arguments) {
    write_locked(args);
}

#[cfg(target_arch = "x86_64")]
fn init_backend() {
    khal::serial::init();
}

#[cfg(target_arch = "x86_64")]
fn write_locked(args: fmt::Arguments) {
    khal::serial::write_fmt(args);
}

#[cfg(target_arch = "x86_64")]
fn write_unlocked(args: fmt::Arguments) {
    khal::serial::write_fmt_unlocked(args);
}

// No console driver on other targets yet.
#[cfg(not(target_arch = "x86_64"))]
fn init_backend() {}

#[cfg(not(target_arch = "x86_64"))]
fn write_locked(_args: fmt::Arguments) {}

#[cfg(not(target_arch = "x86_64"))]
fn write_unlocked(_args: fmt::Arguments) {}

/// Print a line on the critical channel.
#[macro_export]
macro_rules! critical {
    ($($arg:tt)*) => {
        $crate::critical(format_args!($($arg)*))
    };
}

/// Print without newline
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::print(format_args!($($arg)*))
    };
}

/// Print with newline
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => {
        $crate::print(format_args!("{}\n", format_args!($($arg)*)))
    };
}
