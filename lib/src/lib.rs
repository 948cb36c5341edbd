//! Daemon-wide utilities: logging and clocks.
//!
//! Nothing in this crate knows about ports, modules, or workers; it exists
//! so that every member logs through one backend and stamps statistics from
//! one clock.

pub mod clock;
pub mod dlog;
pub mod syslog;


pub use dlog::{
    DlogBackend, DlogLevel, dlog_get_level, dlog_is_enabled, dlog_register_backend,
    dlog_set_level, dlog_write,
};
pub use syslog::{end_syslog, setup_syslog};
