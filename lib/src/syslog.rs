//! Syslog backend for the logging subsystem.
//!
//! When the daemon detaches from its terminal, stderr goes nowhere useful;
//! [`setup_syslog`] opens the system log and registers a backend that maps
//! our levels onto syslog priorities. The ident is fixed so operators can
//! filter with `journalctl -t switchd`.

use core::ffi::c_char;
use std::ffi::CString;

use crate::dlog::{DlogLevel, dlog_register_backend};

const IDENT: &[u8] = b"switchd\0";

fn priority(level: DlogLevel) -> libc::c_int {
    match level {
        DlogLevel::Error => libc::LOG_ERR,
        DlogLevel::Warn => libc::LOG_WARNING,
        DlogLevel::Info => libc::LOG_INFO,
        DlogLevel::Debug | DlogLevel::Trace => libc::LOG_DEBUG,
    }
}

fn syslog_backend(level: DlogLevel, args: core::fmt::Arguments<'_>) {
    let text = args.to_string();
    // Interior NUL would truncate the line; replace rather than drop it.
    let msg = CString::new(text).unwrap_or_else(|e| {
        let mut bytes = e.into_vec();
        bytes.retain(|&b| b != 0);
        CString::new(bytes).expect("NUL bytes removed")
    });
    unsafe {
        libc::syslog(priority(level), c"%s".as_ptr(), msg.as_ptr());
    }
}

/// Open the system log and route all subsequent daemon output to it.
pub fn setup_syslog() {
    unsafe {
        libc::openlog(
            IDENT.as_ptr() as *const c_char,
            libc::LOG_CONS | libc::LOG_NDELAY,
            libc::LOG_DAEMON,
        );
    }
    dlog_register_backend(syslog_backend);
}

/// Close the system log at shutdown. Lines logged afterwards fall back to
/// whatever backend is registered next (normally none; call last).
pub fn end_syslog() {
    unsafe {
        libc::closelog();
    }
}
