//! The worker supervisor: a fixed table of pinned poll threads.
//!
//! Each active worker owns one OS thread bound to a CPU core, running a
//! scheduler whose default traffic class holds the tasks attached to it.
//! Workers are cooperative internally (no preemption mid-invocation) and
//! parallel with each other; they never mutate control-plane tables.
//!
//! # Quiesce protocol
//!
//! A worker is in exactly one of three states: `Inactive` (slot empty),
//! `Paused` (thread parked on the control condvar), `Running` (polling its
//! scheduler). [`pause_all_workers`] sets every active worker's command to
//! pause and then blocks until each one has *acknowledged* by storing
//! `Paused` and parking. Acknowledgment happens between scheduler rounds,
//! never mid-invocation, so when it returns no worker is touching the
//! graph. Graph-mutating commands rely on exactly this guarantee.
//!
//! The park/ack channel uses a blocking `std` mutex and condvar rather than
//! the spin locks used elsewhere: a paused worker must sleep, not spin.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use spin::RwLock;

use softnic_abi::{EEXIST, EINVAL, MAX_WORKERS, Sval};
use softnic_lib::dlog_info;

use crate::task::Task;

/// Run state of one worker slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Inactive = 0,
    Paused = 1,
    Running = 2,
}

/// What the control thread wants the worker to be doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    Pause,
    Run,
    Quit,
}

/// Idle nap between empty scheduler rounds, so a running worker with no
/// tasks does not saturate its core.
const IDLE_NAP: Duration = Duration::from_micros(100);

// =============================================================================
// Scheduler
// =============================================================================

/// The default traffic class: attached tasks served round-robin.
#[derive(Default)]
struct TaskQueue {
    tasks: Vec<Arc<Task>>,
    next: usize,
}

impl TaskQueue {
    fn add(&mut self, task: Arc<Task>) {
        self.tasks.push(task);
    }

    fn remove(&mut self, task: &Arc<Task>) {
        self.tasks.retain(|t| !Arc::ptr_eq(t, task));
        self.next = 0;
    }

    /// Pick the next live task, pruning entries whose module is gone.
    fn pick(&mut self) -> Option<Arc<Task>> {
        self.tasks.retain(|t| t.module_alive());
        if self.tasks.is_empty() {
            return None;
        }
        self.next %= self.tasks.len();
        let task = Arc::clone(&self.tasks[self.next]);
        self.next += 1;
        Some(task)
    }
}

// =============================================================================
// Worker slots
// =============================================================================

struct WorkerShared {
    wid: usize,
    core: usize,
    /// Actual state, written by the worker thread.
    state: AtomicU8,
    /// Desired state, written by the control thread.
    command: Mutex<Command>,
    /// Signals both directions: command changes and state acknowledgments.
    cond: Condvar,
    sched: Mutex<TaskQueue>,
}

impl WorkerShared {
    fn state(&self) -> WorkerState {
        match self.state.load(Ordering::Acquire) {
            1 => WorkerState::Paused,
            2 => WorkerState::Running,
            _ => WorkerState::Inactive,
        }
    }

    fn store_state(&self, s: WorkerState) {
        self.state.store(s as u8, Ordering::Release);
    }
}

struct WorkerEntry {
    shared: Arc<WorkerShared>,
    join: thread::JoinHandle<()>,
}

static WORKERS: RwLock<[Option<WorkerEntry>; MAX_WORKERS]> =
    RwLock::new([const { None }; MAX_WORKERS]);

fn lock_command(shared: &WorkerShared) -> MutexGuard<'_, Command> {
    shared.command.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// Worker thread body
// =============================================================================

#[cfg(target_os = "linux")]
fn pin_to_core(core: usize) {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);
        // Pin the calling thread; failure leaves us schedulable anywhere,
        // which is slower but correct.
        libc::sched_setaffinity(0, size_of::<libc::cpu_set_t>(), &set);
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_to_core(_core: usize) {}

fn worker_main(shared: Arc<WorkerShared>) {
    pin_to_core(shared.core);
    dlog_info!("worker {} up on core {}", shared.wid, shared.core);

    let mut cmd = lock_command(&shared);
    loop {
        match *cmd {
            Command::Quit => {
                shared.store_state(WorkerState::Inactive);
                shared.cond.notify_all();
                return;
            }
            Command::Pause => {
                shared.store_state(WorkerState::Paused);
                shared.cond.notify_all();
                cmd = shared.cond.wait(cmd).unwrap_or_else(|e| e.into_inner());
            }
            Command::Run => {
                shared.store_state(WorkerState::Running);
                drop(cmd);
                let picked = {
                    let mut sched = shared.sched.lock().unwrap_or_else(|e| e.into_inner());
                    sched.pick()
                };
                // The invocation runs outside every lock; pause waits for
                // it to finish, never interrupts it.
                match picked {
                    Some(task) => {
                        let _ = task.run();
                    }
                    None => thread::sleep(IDLE_NAP),
                }
                cmd = lock_command(&shared);
            }
        }
    }
}

// =============================================================================
// Supervisor API
// =============================================================================

pub fn num_logical_cores() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Launch worker `wid` pinned to `core`. The worker starts `Paused`; this
/// returns once the thread has acknowledged parking.
pub fn launch_worker(wid: usize, core: usize) -> Result<(), Sval> {
    if wid >= MAX_WORKERS {
        return Err(Sval::err(
            EINVAL,
            format!("'wid' must be between 0 and {}", MAX_WORKERS - 1),
        ));
    }
    if core >= num_logical_cores() {
        return Err(Sval::err(
            EINVAL,
            format!("'core' must be between 0 and {}", num_logical_cores() - 1),
        ));
    }

    let mut workers = WORKERS.write();
    if workers[wid].is_some() {
        return Err(Sval::err(EEXIST, format!("worker:{wid} is already active")));
    }

    let shared = Arc::new(WorkerShared {
        wid,
        core,
        state: AtomicU8::new(WorkerState::Inactive as u8),
        command: Mutex::new(Command::Pause),
        cond: Condvar::new(),
        sched: Mutex::new(TaskQueue::default()),
    });

    let thread_shared = Arc::clone(&shared);
    let join = thread::Builder::new()
        .name(format!("worker-{wid}"))
        .spawn(move || worker_main(thread_shared))
        .map_err(|e| Sval::err(EINVAL, format!("cannot spawn worker thread: {e}")))?;

    // Wait for the parked acknowledgment so the caller observes an active,
    // paused worker.
    {
        let mut cmd = lock_command(&shared);
        while shared.state() != WorkerState::Paused {
            cmd = shared.cond.wait(cmd).unwrap_or_else(|e| e.into_inner());
        }
    }

    workers[wid] = Some(WorkerEntry { shared, join });
    Ok(())
}

pub fn is_worker_active(wid: usize) -> bool {
    wid < MAX_WORKERS && WORKERS.read()[wid].is_some()
}

pub fn worker_state(wid: usize) -> WorkerState {
    if wid >= MAX_WORKERS {
        return WorkerState::Inactive;
    }
    match &WORKERS.read()[wid] {
        Some(entry) => entry.shared.state(),
        None => WorkerState::Inactive,
    }
}

pub fn is_any_worker_running() -> bool {
    let workers = WORKERS.read();
    workers
        .iter()
        .flatten()
        .any(|e| e.shared.state() == WorkerState::Running)
}

/// Park every active worker and wait for each acknowledgment. On return no
/// worker is mid-invocation. Idempotent.
pub fn pause_all_workers() {
    let workers = WORKERS.read();
    for entry in workers.iter().flatten() {
        let mut cmd = lock_command(&entry.shared);
        *cmd = Command::Pause;
        entry.shared.cond.notify_all();
    }
    for entry in workers.iter().flatten() {
        let mut cmd = lock_command(&entry.shared);
        while entry.shared.state() == WorkerState::Running {
            cmd = entry.shared.cond.wait(cmd).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Wake every active worker into the running state. Idempotent.
pub fn resume_all_workers() {
    let workers = WORKERS.read();
    for entry in workers.iter().flatten() {
        let mut cmd = lock_command(&entry.shared);
        *cmd = Command::Run;
        entry.shared.cond.notify_all();
    }
}

/// Add `task` to worker `wid`'s default traffic class. The caller has
/// already validated the slot and claimed the task's attachment.
pub fn attach_to_worker(wid: usize, task: Arc<Task>) -> Result<(), Sval> {
    let workers = WORKERS.read();
    let Some(entry) = workers.get(wid).and_then(Option::as_ref) else {
        return Err(Sval::err(EINVAL, format!("Worker {wid} does not exist")));
    };
    entry.shared.sched.lock().unwrap_or_else(|e| e.into_inner()).add(task);
    Ok(())
}

/// Remove `task` from worker `wid`'s scheduler, if present.
pub fn detach_from_worker(wid: usize, task: &Arc<Task>) {
    let workers = WORKERS.read();
    if let Some(entry) = workers.get(wid).and_then(Option::as_ref) {
        entry.shared.sched.lock().unwrap_or_else(|e| e.into_inner()).remove(task);
    }
}

/// Stop and join every worker thread, freeing all slots. Daemon shutdown
/// and test teardown only.
pub fn destroy_all_workers() {
    let mut workers = WORKERS.write();
    for slot in workers.iter_mut() {
        let Some(entry) = slot.take() else {
            continue;
        };
        {
            let mut cmd = lock_command(&entry.shared);
            *cmd = Command::Quit;
            entry.shared.cond.notify_all();
        }
        let _ = entry.join.join();
        dlog_info!("worker {} stopped", entry.shared.wid);
    }
}
