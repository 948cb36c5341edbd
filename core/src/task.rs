//! Tasks: schedulable units registered by modules.
//!
//! A task is created when its module is (one per [`TaskSpec`] returned from
//! `init`) and lives exactly as long as the module. Attachment to a worker
//! is a single atomic slot: a task is on at most one worker's scheduler, and
//! the worker id stored here is what destroy-time detach uses to find it.
//!
//! The task holds only a weak reference to its module; the module owns its
//! tasks, and a worker whose queue outlives a destroyed module simply drops
//! entries that no longer upgrade.

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicI32, Ordering};

use softnic_abi::Sval;

use crate::mclass::{TaskResult, TaskSpec};
use crate::module::Module;

/// Sentinel for "not attached".
const NO_WORKER: i32 = -1;

#[derive(Debug)]
pub struct Task {
    module: Weak<Module>,
    tid: usize,
    arg: Sval,
    /// Worker id this task is attached to, or [`NO_WORKER`].
    worker: AtomicI32,
}

impl Task {
    pub(crate) fn new(module: Weak<Module>, tid: usize, spec: &TaskSpec) -> Self {
        Self { module, tid, arg: spec.arg.clone(), worker: AtomicI32::new(NO_WORKER) }
    }

    #[inline]
    pub fn tid(&self) -> usize {
        self.tid
    }

    pub fn is_attached(&self) -> bool {
        self.worker.load(Ordering::Acquire) != NO_WORKER
    }

    pub fn attached_worker(&self) -> Option<usize> {
        match self.worker.load(Ordering::Acquire) {
            NO_WORKER => None,
            wid => Some(wid as usize),
        }
    }

    /// Claim the attachment slot. `false` if the task is already attached;
    /// the caller has not taken ownership in that case.
    pub fn attach(&self, wid: usize) -> bool {
        self.worker
            .compare_exchange(NO_WORKER, wid as i32, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn detach(&self) {
        self.worker.store(NO_WORKER, Ordering::Release);
    }

    /// Run one invocation. A task whose module has been destroyed does
    /// nothing; the scheduler prunes it on the next pass.
    pub fn run(self: &Arc<Self>) -> Option<TaskResult> {
        let module = self.module.upgrade()?;
        Some(module.mclass().run_task(&module, &self.arg))
    }

    pub(crate) fn module_alive(&self) -> bool {
        self.module.strong_count() > 0
    }
}
