//! The control core of the switch.
//!
//! Hosts the live packet graph: module classes and their registry, named
//! module instances connected through numbered gates, tasks bound to pinned
//! worker threads, per-gate capture taps, and the command dispatcher that
//! mutates all of the above under the quiesce protocol.
//!
//! # Concurrency model
//!
//! One control thread owns every table mutation. Commands whose handlers
//! reshape the graph are marked `pause_needed` and refuse to run while any
//! worker is in the running state; [`worker::pause_all_workers`] returns
//! only after every worker has parked, so such handlers see (and leave) a
//! quiesced dataplane. Read-only handlers run concurrently with workers and
//! touch only shared-immutable state or relaxed atomic counters.

pub mod control;
pub mod mclass;
pub mod module;
pub mod modules;
pub mod tap;
pub mod task;
pub mod worker;

#[cfg(test)]
mod control_tests;
#[cfg(test)]
mod tap_tests;
#[cfg(test)]
pub(crate) mod testutil;
#[cfg(test)]
mod worker_tests;

pub use control::{ControlResponse, handle_request};
pub use mclass::{ModuleClass, ModuleState, TaskResult, TaskSpec, find_mclass, list_mclasses, register_mclass};
pub use module::{Module, find_module, list_modules};
pub use worker::{WorkerState, is_any_worker_running, pause_all_workers, resume_all_workers};

/// Register every built-in driver and module class. Must run once before
/// any control input is accepted; calling it again is a no-op.
pub fn register_builtins() {
    softnic_drivers::register_builtin_drivers();
    let _ = mclass::register_mclass(std::sync::Arc::new(modules::noop::NoOP));
}
