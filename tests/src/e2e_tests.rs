//! Dispatcher scenarios, end to end.

use std::sync::{Mutex, MutexGuard};

use softnic_abi::{
    E2BIG, EBUSY, EINVAL, ENODEV, ENOENT, MAX_GATES, MAX_TASKS_PER_MODULE, MAX_WORKERS, Sval,
    SvalType,
};
use softnic_core::worker::destroy_all_workers;
use softnic_core::{handle_request, is_any_worker_running, register_builtins};

use crate::pmd::MockPmd;

static SCENARIO_LOCK: Mutex<()> = Mutex::new(());

/// Serialize scenarios and reset the dataplane: builtins plus the mock PMD
/// registered, no workers, no modules, no ports.
fn lock_and_reset() -> MutexGuard<'static, ()> {
    let guard = SCENARIO_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    register_builtins();
    let _ = softnic_drivers::register_driver(std::sync::Arc::new(MockPmd));
    destroy_all_workers();
    let r = sn("reset_all", None);
    assert!(!r.is_err(), "reset_all failed: {r}");
    guard
}

/// Issue one `softnic` command and return the reply value.
fn sn(cmd: &str, arg: Option<Sval>) -> Sval {
    let mut req = Sval::map();
    req.map_set("to", Sval::str("softnic"));
    req.map_set("cmd", Sval::str(cmd));
    if let Some(arg) = arg {
        req.map_set("arg", arg);
    }
    handle_request(&req).reply
}

fn map1(key: &str, v: Sval) -> Sval {
    let mut m = Sval::map();
    m.map_set(key, v);
    m
}

fn expect_err(reply: &Sval, code: u32) {
    let e = reply.as_err().unwrap_or_else(|| panic!("expected err({code}), got {reply}"));
    assert_eq!(e.code, code, "unexpected code in {reply}");
}

fn add_worker(wid: u64, core: u64) {
    let mut arg = Sval::map();
    arg.map_set("wid", Sval::uint(wid));
    arg.map_set("core", Sval::uint(core));
    let r = sn("add_worker", Some(arg));
    assert!(r.is_nil(), "add_worker failed: {r}");
}

fn create_noop() -> String {
    let r = sn("create_module", Some(map1("mclass", Sval::str("NoOP"))));
    r.eval_str("name").unwrap_or_else(|| panic!("create_module failed: {r}")).to_owned()
}

fn connect(m1: &str, m2: &str, gate: u64) -> Sval {
    let mut arg = Sval::map();
    arg.map_set("m1", Sval::str(m1));
    arg.map_set("m2", Sval::str(m2));
    arg.map_set("gate", Sval::uint(gate));
    sn("connect_modules", Some(arg))
}

#[test]
fn empty_switch_lists_nothing() {
    let _guard = lock_and_reset();
    assert_eq!(sn("list_ports", None).as_list().map(<[Sval]>::len), Some(0));
    assert_eq!(sn("list_modules", None).as_list().map(<[Sval]>::len), Some(0));
}

#[test]
fn port_create_destroy_destroy_again() {
    let _guard = lock_and_reset();

    let mut arg = Sval::map();
    arg.map_set("driver", Sval::str("PMD"));
    arg.map_set("arg", map1("port_id", Sval::int(0)));
    let r = sn("create_port", Some(arg));
    assert_eq!(r.eval_str("name"), Some("PMD0"), "{r}");

    let listed = sn("list_ports", None);
    let entry = &listed.as_list().unwrap()[0];
    assert_eq!(entry.eval_str("name"), Some("PMD0"));
    assert_eq!(entry.eval_str("driver"), Some("PMD"));

    assert!(sn("destroy_port", Some(Sval::str("PMD0"))).is_nil());
    expect_err(&sn("destroy_port", Some(Sval::str("PMD0"))), ENOENT);
}

#[test]
fn port_create_respects_device_probe() {
    let _guard = lock_and_reset();

    let mut arg = Sval::map();
    arg.map_set("driver", Sval::str("PMD"));
    arg.map_set("arg", map1("port_id", Sval::int(99)));
    expect_err(&sn("create_port", Some(arg)), ENODEV);

    let mut arg = Sval::map();
    arg.map_set("driver", Sval::str("PMD"));
    arg.map_set("arg", map1("port_id", Sval::str("zero")));
    expect_err(&sn("create_port", Some(arg)), EINVAL);

    expect_err(&sn("create_port", Some(map1("driver", Sval::str("Missing")))), ENOENT);
    assert_eq!(sn("list_ports", None).as_list().map(<[Sval]>::len), Some(0));
}

#[test]
fn reset_modules_requires_quiesce() {
    let _guard = lock_and_reset();
    add_worker(0, 0);
    assert!(sn("resume_all", None).is_nil());
    for _ in 0..2000 {
        if is_any_worker_running() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    assert!(is_any_worker_running());

    expect_err(&sn("reset_modules", None), EBUSY);
    assert!(sn("pause_all", None).is_nil());
    assert!(sn("reset_modules", None).is_nil());

    destroy_all_workers();
}

#[test]
fn module_names_synthesize_in_sequence() {
    let _guard = lock_and_reset();
    assert_eq!(create_noop(), "NoOP0");
    assert_eq!(create_noop(), "NoOP1");
}

#[test]
fn connect_twice_is_busy_and_info_shows_the_edge() {
    let _guard = lock_and_reset();
    let m1 = create_noop();
    let m2 = create_noop();

    assert!(connect(&m1, &m2, 0).is_nil());
    expect_err(&connect(&m1, &m2, 0), EBUSY);

    let info = sn("get_module_info", Some(Sval::str(m1.as_str())));
    assert_eq!(info.eval_str("name"), Some(m1.as_str()));
    assert_eq!(info.eval_str("mclass"), Some("NoOP"));
    let gates = info.map_get("gates").and_then(Sval::as_list).unwrap();
    assert_eq!(gates.len(), 1);
    assert_eq!(gates[0].eval_uint("gate"), Some(0));
    assert_eq!(gates[0].eval_str("name"), Some(m2.as_str()));

    let mut arg = Sval::map();
    arg.map_set("name", Sval::str(m1.as_str()));
    arg.map_set("gate", Sval::uint(0));
    assert!(sn("disconnect_modules", Some(arg.clone())).is_nil());
    expect_err(&sn("disconnect_modules", Some(arg)), ENOENT);

    let info = sn("get_module_info", Some(Sval::str(m1.as_str())));
    assert_eq!(info.map_get("gates").and_then(Sval::as_list).map(<[Sval]>::len), Some(0));
}

#[test]
fn attach_task_twice_is_busy() {
    let _guard = lock_and_reset();
    add_worker(0, 0);
    let m = create_noop();

    let mut arg = Sval::map();
    arg.map_set("name", Sval::str(m.as_str()));
    arg.map_set("taskid", Sval::uint(0));
    arg.map_set("wid", Sval::uint(0));
    assert!(sn("attach_task", Some(arg.clone())).is_nil());
    expect_err(&sn("attach_task", Some(arg)), EBUSY);

    destroy_all_workers();
}

#[test]
fn boundary_indices_are_refused() {
    let _guard = lock_and_reset();

    let mut arg = Sval::map();
    arg.map_set("wid", Sval::uint(MAX_WORKERS as u64));
    arg.map_set("core", Sval::uint(0));
    expect_err(&sn("add_worker", Some(arg)), EINVAL);

    let m = create_noop();
    let mut arg = Sval::map();
    arg.map_set("name", Sval::str(m.as_str()));
    arg.map_set("taskid", Sval::uint(MAX_TASKS_PER_MODULE as u64));
    arg.map_set("wid", Sval::uint(0));
    expect_err(&sn("attach_task", Some(arg)), EINVAL);

    let m2 = create_noop();
    expect_err(&connect(&m, &m2, MAX_GATES as u64), E2BIG);
}

#[test]
fn unattached_worker_is_invalid_for_tasks() {
    let _guard = lock_and_reset();
    let m = create_noop();

    let mut arg = Sval::map();
    arg.map_set("name", Sval::str(m.as_str()));
    arg.map_set("taskid", Sval::uint(0));
    arg.map_set("wid", Sval::uint(0));
    // No worker 0 launched.
    expect_err(&sn("attach_task", Some(arg)), EINVAL);

    let mut arg = Sval::map();
    arg.map_set("name", Sval::str(m.as_str()));
    arg.map_set("taskid", Sval::uint(1));
    arg.map_set("wid", Sval::uint(0));
    // NoOP declares a single task slot.
    expect_err(&sn("attach_task", Some(arg)), ENOENT);
}

#[test]
fn port_stats_have_both_directions_and_a_timestamp() {
    let _guard = lock_and_reset();

    let r = sn("create_port", Some(map1("driver", Sval::str("Loopback"))));
    let name = r.eval_str("name").unwrap().to_owned();

    let stats = sn("get_port_stats", Some(Sval::str(name.as_str())));
    for dir in ["inc", "out"] {
        for field in ["packets", "dropped", "bytes"] {
            assert_eq!(
                stats.eval_uint(&format!("{dir}.{field}")),
                Some(0),
                "missing {dir}.{field} in {stats}"
            );
        }
    }
    let ts = stats.map_get("timestamp").unwrap();
    assert_eq!(ts.get_type(), SvalType::Double);
    assert!(ts.as_double().unwrap() > 1_577_836_800.0);

    expect_err(&sn("get_port_stats", Some(Sval::str("nonesuch"))), ENOENT);
}

#[test]
fn listings_cross_the_page_boundary_exactly_once() {
    let _guard = lock_and_reset();
    let names: Vec<String> = (0..20).map(|_| create_noop()).collect();

    let listed = sn("list_modules", None);
    let listed = listed.as_list().unwrap();
    assert_eq!(listed.len(), 20);
    for name in &names {
        let hits = listed.iter().filter(|m| m.eval_str("name") == Some(name.as_str())).count();
        assert_eq!(hits, 1, "{name} listed {hits} times");
    }

    let drivers = sn("list_drivers", None);
    let driver_names: Vec<&str> =
        drivers.as_list().unwrap().iter().filter_map(Sval::as_str).collect();
    assert!(driver_names.contains(&"PMD"));
    assert!(driver_names.contains(&"Loopback"));

    let mclasses = sn("list_mclasses", None);
    let mclass_names: Vec<&str> =
        mclasses.as_list().unwrap().iter().filter_map(Sval::as_str).collect();
    assert!(mclass_names.contains(&"NoOP"));
}

#[test]
fn cycles_connect_fine_and_the_diagnostic_reports_them() {
    let _guard = lock_and_reset();
    let m1 = create_noop();
    let m2 = create_noop();

    assert!(connect(&m1, &m2, 0).is_nil());
    assert!(sn("check_cycles", None).is_nil());

    assert!(connect(&m2, &m1, 0).is_nil());
    let r = sn("check_cycles", None);
    let cycle = r.map_get("cycle").and_then(Sval::as_list).unwrap();
    assert_eq!(cycle.len(), 2);

    let mut arg = Sval::map();
    arg.map_set("name", Sval::str(m2.as_str()));
    arg.map_set("gate", Sval::uint(0));
    assert!(sn("disconnect_modules", Some(arg)).is_nil());
    assert!(sn("check_cycles", None).is_nil());
}

#[test]
fn reset_all_clears_modules_then_ports() {
    let _guard = lock_and_reset();

    let m = create_noop();
    let r = sn("create_port", Some(map1("driver", Sval::str("Loopback"))));
    assert!(r.eval_str("name").is_some());

    // A module holding a port reference would block reset_ports alone;
    // reset_all tears modules down first, so it always succeeds.
    let port = softnic_drivers::find_port(r.eval_str("name").unwrap()).unwrap();
    port.inc_ref();
    expect_err(&sn("reset_ports", None), EBUSY);
    port.dec_ref();

    assert!(sn("reset_all", None).is_nil());
    assert_eq!(sn("list_ports", None).as_list().map(<[Sval]>::len), Some(0));
    assert_eq!(sn("list_modules", None).as_list().map(<[Sval]>::len), Some(0));
    assert!(softnic_core::find_module(&m).is_none());
}
