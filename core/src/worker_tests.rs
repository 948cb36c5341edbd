//! Worker supervisor tests: launch validation, the quiesce protocol, and
//! task execution through the scheduler.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use softnic_abi::{EEXIST, EINVAL, MAX_WORKERS, Sval};

use crate::mclass::find_mclass;
use crate::module::{create_module, destroy_module};
use crate::testutil::{SPIN_RUNS, lock_clean_tables};
use crate::worker::{
    WorkerState, destroy_all_workers, is_any_worker_running, is_worker_active, launch_worker,
    num_logical_cores, pause_all_workers, resume_all_workers, worker_state,
};

#[test]
fn launch_validates_slot_and_core() {
    let _guard = lock_clean_tables();

    let err = launch_worker(MAX_WORKERS, 0).unwrap_err();
    assert_eq!(err.as_err().unwrap().code, EINVAL);

    let err = launch_worker(0, 1 << 20).unwrap_err();
    assert_eq!(err.as_err().unwrap().code, EINVAL);

    launch_worker(0, 0).unwrap();
    assert!(is_worker_active(0));
    assert_eq!(worker_state(0), WorkerState::Paused);

    let err = launch_worker(0, 0).unwrap_err();
    assert_eq!(err.as_err().unwrap().code, EEXIST);

    destroy_all_workers();
    assert!(!is_worker_active(0));
}

#[test]
fn pause_and_resume_are_idempotent() {
    let _guard = lock_clean_tables();
    launch_worker(0, 0).unwrap();
    if num_logical_cores() > 1 {
        launch_worker(1, 1).unwrap();
    }

    assert!(!is_any_worker_running());

    resume_all_workers();
    resume_all_workers();
    // The ack is asynchronous on resume; poll briefly.
    wait_for(|| is_any_worker_running());

    pause_all_workers();
    assert!(!is_any_worker_running());
    assert_eq!(worker_state(0), WorkerState::Paused);
    pause_all_workers();
    assert!(!is_any_worker_running());

    destroy_all_workers();
}

#[test]
fn attached_task_runs_only_while_running() {
    let _guard = lock_clean_tables();
    let spinner = find_mclass("Spinner").unwrap();
    let m = create_module(Some("spin0"), &spinner, &Sval::nil()).unwrap();
    launch_worker(0, 0).unwrap();

    let task = &m.tasks()[0];
    assert!(task.attach(0));
    crate::worker::attach_to_worker(0, std::sync::Arc::clone(task)).unwrap();

    // Paused: no invocations.
    let before = SPIN_RUNS.load(Ordering::Relaxed);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(SPIN_RUNS.load(Ordering::Relaxed), before);

    resume_all_workers();
    wait_for(|| SPIN_RUNS.load(Ordering::Relaxed) > before);

    // pause_all_workers returns only once the worker is parked, i.e. not
    // mid-invocation; afterwards the counter must hold still.
    pause_all_workers();
    let frozen = SPIN_RUNS.load(Ordering::Relaxed);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(SPIN_RUNS.load(Ordering::Relaxed), frozen);

    destroy_module(&m).unwrap();
    destroy_all_workers();
}

#[test]
fn destroyed_module_tasks_are_detached() {
    let _guard = lock_clean_tables();
    let spinner = find_mclass("Spinner").unwrap();
    let m = create_module(Some("spin1"), &spinner, &Sval::nil()).unwrap();
    launch_worker(0, 0).unwrap();

    let task = std::sync::Arc::clone(&m.tasks()[0]);
    assert!(task.attach(0));
    crate::worker::attach_to_worker(0, std::sync::Arc::clone(&task)).unwrap();
    assert!(task.is_attached());

    destroy_module(&m).unwrap();
    assert!(!task.is_attached());

    // The worker keeps running without the task.
    resume_all_workers();
    let before = SPIN_RUNS.load(Ordering::Relaxed);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(SPIN_RUNS.load(Ordering::Relaxed), before);
    pause_all_workers();

    destroy_all_workers();
}

/// Poll `cond` for up to ~2 s.
fn wait_for(cond: impl Fn() -> bool) {
    for _ in 0..2000 {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("condition not reached within timeout");
}
