//! Shared fixtures for core tests.
//!
//! The module table, worker table, and registries are process-global; tests
//! that touch them serialize on one lock and leave the tables empty behind
//! them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use softnic_abi::{ENODEV, Sval};
use softnic_drivers::PacketBatch;

use crate::mclass::{ModuleClass, ModuleState, TaskResult, TaskSpec, register_mclass};
use crate::module::Module;
use crate::{module, register_builtins, worker};

static TABLE_LOCK: Mutex<()> = Mutex::new(());

/// Take the table lock and start from a clean slate: builtins registered,
/// no modules, no workers.
pub fn lock_clean_tables() -> MutexGuard<'static, ()> {
    let guard = TABLE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    register_builtins();
    register_test_classes();
    worker::destroy_all_workers();
    module::reset_modules().expect("module reset failed");
    guard
}

/// `run_task` invocations across every `Spinner` instance.
pub static SPIN_RUNS: AtomicU64 = AtomicU64::new(0);

/// Packets seen by `process_batch` across every `Collector` instance.
pub static COLLECTED: AtomicU64 = AtomicU64::new(0);

/// Counts `run_task` invocations; used to observe the worker loop.
struct Spinner;

/// Counts packets seen by `process_batch`; used to observe gate traversal.
struct Collector;

/// Always fails `init`; used to observe create-time teardown.
struct InitFail;

impl ModuleClass for Spinner {
    fn name(&self) -> &'static str {
        "Spinner"
    }

    fn init(&self, _arg: &Sval) -> Result<(ModuleState, Vec<TaskSpec>), Sval> {
        Ok((Box::new(()), vec![TaskSpec::default()]))
    }

    fn run_task(&self, _module: &Module, _arg: &Sval) -> TaskResult {
        SPIN_RUNS.fetch_add(1, Ordering::Relaxed);
        TaskResult { packets: 0, bits: 0 }
    }
}

impl ModuleClass for Collector {
    fn name(&self) -> &'static str {
        "Collector"
    }

    fn init(&self, _arg: &Sval) -> Result<(ModuleState, Vec<TaskSpec>), Sval> {
        Ok((Box::new(()), Vec::new()))
    }

    fn process_batch(&self, _module: &Module, batch: &mut PacketBatch) {
        COLLECTED.fetch_add(batch.len() as u64, Ordering::Relaxed);
    }
}

impl ModuleClass for InitFail {
    fn name(&self) -> &'static str {
        "InitFail"
    }

    fn init(&self, _arg: &Sval) -> Result<(ModuleState, Vec<TaskSpec>), Sval> {
        Err(Sval::err(ENODEV, "this class never initializes"))
    }
}

fn register_test_classes() {
    // Registration is process-global and write-once; repeated calls hit
    // EEXIST, which is fine.
    let _ = register_mclass(Arc::new(Spinner));
    let _ = register_mclass(Arc::new(Collector));
    let _ = register_mclass(Arc::new(InitFail));
}
