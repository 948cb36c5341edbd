//! Compile-time limits of the dataplane.
//!
//! These bound fixed tables and per-request work; none of them is a tunable.
//! Raising a limit is an ABI-visible change (error messages and command
//! validation quote them), so they live here next to the wire format.

/// Number of worker slots. Worker ids are `0..MAX_WORKERS`.
pub const MAX_WORKERS: usize = 4;

/// Task slots a single module may register during init.
pub const MAX_TASKS_PER_MODULE: usize = 32;

/// Hard cap on a module's gate array. Gate indices are `u16`, but the
/// append-grow path refuses to double past this point.
pub const MAX_GATES: usize = 8192;

/// Queues per direction on a port.
pub const MAX_QUEUES_PER_DIR: usize = 32;

/// Per-queue descriptor count used when a driver gives no default and the
/// create argument does not override it.
pub const DEFAULT_QUEUE_SIZE: u32 = 256;

/// Listing commands page through their tables this many entries at a time.
pub const PAGE_LIST_SIZE: usize = 16;

/// Largest packet burst moved through a gate or port queue in one call.
pub const MAX_BURST: usize = 32;
