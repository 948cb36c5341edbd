//! Daemon logging subsystem.
//!
//! All log output funnels through a single **backend** function. The default
//! backend writes one line per call to stderr; once the daemon decides to run
//! in the background it registers the syslog backend (see [`crate::syslog`])
//! and all subsequent output goes to the system log instead.
//!
//! # Backend contract
//!
//! The backend receives the level and the pre-formatted arguments for a
//! **single log line** and must write the line atomically (no interleaving
//! between threads) including its trailing newline. The stderr backend gets
//! this from `eprintln!`'s per-call stream lock; the syslog backend from
//! `syslog(3)` itself.
//!
//! # Level filter
//!
//! An atomic current-level gate is checked before formatting; disabled
//! levels cost one relaxed load.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use spin::RwLock;

// ---------------------------------------------------------------------------
// Log levels
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DlogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl DlogLevel {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => DlogLevel::Error,
            1 => DlogLevel::Warn,
            2 => DlogLevel::Info,
            3 => DlogLevel::Debug,
            _ => DlogLevel::Trace,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            DlogLevel::Error => "error",
            DlogLevel::Warn => "warn",
            DlogLevel::Info => "info",
            DlogLevel::Debug => "debug",
            DlogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for DlogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

static CURRENT_LEVEL: AtomicU8 = AtomicU8::new(DlogLevel::Info as u8);

#[inline]
pub fn dlog_is_enabled(level: DlogLevel) -> bool {
    level as u8 <= CURRENT_LEVEL.load(Ordering::Relaxed)
}

pub fn dlog_set_level(level: DlogLevel) {
    CURRENT_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn dlog_get_level() -> DlogLevel {
    DlogLevel::from_raw(CURRENT_LEVEL.load(Ordering::Relaxed))
}

// ---------------------------------------------------------------------------
// Backend dispatch
// ---------------------------------------------------------------------------

/// Signature of a log backend: one complete line per call.
pub type DlogBackend = fn(DlogLevel, fmt::Arguments<'_>);

fn stderr_backend(level: DlogLevel, args: fmt::Arguments<'_>) {
    eprintln!("switchd <{level}>: {args}");
}

static BACKEND: RwLock<DlogBackend> = RwLock::new(stderr_backend);

/// Replace the active backend. Takes effect for all subsequent lines on all
/// threads; lines already being written finish on the old backend.
pub fn dlog_register_backend(backend: DlogBackend) {
    *BACKEND.write() = backend;
}

/// Entry point used by the `dlog_*!` macros. Callable directly when the
/// level is only known at runtime.
pub fn dlog_write(level: DlogLevel, args: fmt::Arguments<'_>) {
    if !dlog_is_enabled(level) {
        return;
    }
    let backend = *BACKEND.read();
    backend(level, args);
}

// ---------------------------------------------------------------------------
// Macro front end
// ---------------------------------------------------------------------------

#[macro_export]
macro_rules! dlog_error {
    ($($arg:tt)*) => {
        $crate::dlog::dlog_write($crate::dlog::DlogLevel::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! dlog_warn {
    ($($arg:tt)*) => {
        $crate::dlog::dlog_write($crate::dlog::DlogLevel::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! dlog_info {
    ($($arg:tt)*) => {
        $crate::dlog::dlog_write($crate::dlog::DlogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! dlog_debug {
    ($($arg:tt)*) => {
        $crate::dlog::dlog_write($crate::dlog::DlogLevel::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! dlog_trace {
    ($($arg:tt)*) => {
        $crate::dlog::dlog_write($crate::dlog::DlogLevel::Trace, format_args!($($arg)*))
    };
}
