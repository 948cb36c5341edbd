//! Shared state for tests that touch the process-global tables.

use std::sync::{Mutex, MutexGuard};

/// Serializes tests that mutate the driver registry or port table.
static TABLE_LOCK: Mutex<()> = Mutex::new(());

pub fn lock_tables() -> MutexGuard<'static, ()> {
    TABLE_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
