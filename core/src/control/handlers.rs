//! Control-plane command handlers.
//!
//! Every handler takes the request's `arg` value and produces a
//! [`CmdOutcome`]. Validation errors name the offending field; entity
//! lookups name the missing entity. Handlers marked `pause_needed` in the
//! table may assume no worker is running.

use std::sync::Arc;

use softnic_abi::{
    EINVAL, ENOTSUP, MAX_TASKS_PER_MODULE, MAX_WORKERS, PAGE_LIST_SIZE, Sval,
};
use softnic_drivers as drivers;
use softnic_lib::clock::epoch_now;
use softnic_lib::dlog_info;

use super::{CmdOutcome, done, fail, reply};
use crate::module::{self, GateIdx};
use crate::tap::Tap;
use crate::{mclass, worker};

// =============================================================================
// Workers
// =============================================================================

pub(super) fn reset_all(arg: &Sval) -> CmdOutcome {
    dlog_info!("*** reset_all requested ***");
    match reset_modules(arg) {
        CmdOutcome::Reply(r) if r.is_err() => return reply(r),
        _ => {}
    }
    match reset_ports(arg) {
        CmdOutcome::Reply(r) if r.is_err() => return reply(r),
        _ => {}
    }
    done()
}

pub(super) fn pause_all(_arg: &Sval) -> CmdOutcome {
    worker::pause_all_workers();
    dlog_info!("*** all workers have been paused ***");
    done()
}

pub(super) fn resume_all(_arg: &Sval) -> CmdOutcome {
    worker::resume_all_workers();
    dlog_info!("*** resumed ***");
    done()
}

pub(super) fn add_worker(arg: &Sval) -> CmdOutcome {
    let Some(wid) = arg.eval_uint("wid") else {
        return fail(EINVAL, "Missing 'wid' field");
    };
    let Some(core) = arg.eval_uint("core") else {
        return fail(EINVAL, "Missing 'core' field");
    };
    if wid >= MAX_WORKERS as u64 {
        return fail(EINVAL, format!("'wid' must be between 0 and {}", MAX_WORKERS - 1));
    }
    match worker::launch_worker(wid as usize, core as usize) {
        Ok(()) => done(),
        Err(e) => reply(e),
    }
}

pub(super) fn not_implemented(_arg: &Sval) -> CmdOutcome {
    fail(ENOTSUP, "Not implemented yet")
}

// =============================================================================
// Ports
// =============================================================================

pub(super) fn list_drivers(_arg: &Sval) -> CmdOutcome {
    let mut r = Sval::list();
    let mut offset = 0;
    loop {
        let page = drivers::list_drivers(offset, PAGE_LIST_SIZE);
        if page.is_empty() {
            break;
        }
        offset += page.len();
        for d in &page {
            r.list_add(Sval::str(d.name()));
        }
    }
    reply(r)
}

pub(super) fn reset_ports(_arg: &Sval) -> CmdOutcome {
    if let Err(e) = drivers::reset_ports() {
        return reply(e);
    }
    dlog_info!("*** all ports have been destroyed ***");
    done()
}

pub(super) fn list_ports(_arg: &Sval) -> CmdOutcome {
    let mut r = Sval::list();
    let mut offset = 0;
    loop {
        let page = drivers::list_ports(offset, PAGE_LIST_SIZE);
        if page.is_empty() {
            break;
        }
        offset += page.len();
        for p in &page {
            let mut port = Sval::map();
            port.map_set("name", Sval::str(p.name()));
            port.map_set("driver", Sval::str(p.driver().name()));
            r.list_add(port);
        }
    }
    reply(r)
}

pub(super) fn create_port(arg: &Sval) -> CmdOutcome {
    let Some(driver_name) = arg.eval_str("driver") else {
        return fail(EINVAL, "Missing 'driver' field");
    };
    let Some(driver) = drivers::find_driver(driver_name) else {
        return fail(softnic_abi::ENOENT, format!("No port driver '{driver_name}' found"));
    };

    let port_arg = arg.eval("arg").cloned().unwrap_or(Sval::Nil);
    match drivers::create_port(arg.eval_str("name"), &driver, &port_arg) {
        Ok(port) => {
            let mut r = Sval::map();
            r.map_set("name", Sval::str(port.name()));
            reply(r)
        }
        Err(e) => reply(e),
    }
}

pub(super) fn destroy_port(arg: &Sval) -> CmdOutcome {
    let Some(name) = arg.as_str() else {
        return fail(EINVAL, "Argument must be a name in str");
    };
    let Some(port) = drivers::find_port(name) else {
        return fail(softnic_abi::ENOENT, format!("No port '{name}' found"));
    };
    match drivers::destroy_port(&port) {
        Ok(()) => done(),
        Err(e) => reply(e),
    }
}

pub(super) fn get_port_stats(arg: &Sval) -> CmdOutcome {
    let Some(name) = arg.as_str() else {
        return fail(EINVAL, "Argument must be a name in str");
    };
    let Some(port) = drivers::find_port(name) else {
        return fail(softnic_abi::ENOENT, format!("No port '{name}' found"));
    };
    let stats = port.get_stats();

    let dir_map = |c: drivers::DirCounters| {
        let mut m = Sval::map();
        m.map_set("packets", Sval::uint(c.packets));
        m.map_set("dropped", Sval::uint(c.dropped));
        m.map_set("bytes", Sval::uint(c.bytes));
        m
    };

    let mut r = Sval::map();
    r.map_set("inc", dir_map(stats.inc));
    r.map_set("out", dir_map(stats.out));
    r.map_set("timestamp", Sval::double(epoch_now()));
    reply(r)
}

// =============================================================================
// Modules
// =============================================================================

pub(super) fn list_mclasses(_arg: &Sval) -> CmdOutcome {
    let mut r = Sval::list();
    let mut offset = 0;
    loop {
        let page = mclass::list_mclasses(offset, PAGE_LIST_SIZE);
        if page.is_empty() {
            break;
        }
        offset += page.len();
        for c in &page {
            r.list_add(Sval::str(c.name()));
        }
    }
    reply(r)
}

pub(super) fn reset_modules(_arg: &Sval) -> CmdOutcome {
    if let Err(e) = module::reset_modules() {
        return reply(e);
    }
    dlog_info!("*** all modules have been destroyed ***");
    done()
}

pub(super) fn list_modules(_arg: &Sval) -> CmdOutcome {
    let mut r = Sval::list();
    let mut offset = 0;
    loop {
        let page = module::list_modules(offset, PAGE_LIST_SIZE);
        if page.is_empty() {
            break;
        }
        offset += page.len();
        for m in &page {
            let mut entry = Sval::map();
            entry.map_set("name", Sval::str(m.name()));
            entry.map_set("mclass", Sval::str(m.mclass().name()));
            if let Some(desc) = m.mclass().get_desc(m) {
                entry.map_set("desc", desc);
            }
            r.list_add(entry);
        }
    }
    reply(r)
}

pub(super) fn create_module(arg: &Sval) -> CmdOutcome {
    let Some(mclass_name) = arg.eval_str("mclass") else {
        return fail(EINVAL, "Missing 'mclass' field");
    };
    let Some(class) = mclass::find_mclass(mclass_name) else {
        return fail(softnic_abi::ENOENT, format!("No mclass '{mclass_name}' found"));
    };

    let init_arg = arg.eval("arg").cloned().unwrap_or(Sval::Nil);
    match module::create_module(arg.eval_str("name"), &class, &init_arg) {
        Ok(m) => {
            let mut r = Sval::map();
            r.map_set("name", Sval::str(m.name()));
            reply(r)
        }
        Err(e) => reply(e),
    }
}

pub(super) fn destroy_module(arg: &Sval) -> CmdOutcome {
    let Some(name) = arg.as_str() else {
        return fail(EINVAL, "Argument must be a name in str");
    };
    let Some(m) = module::find_module(name) else {
        return fail(softnic_abi::ENOENT, format!("No module '{name}' found"));
    };
    match module::destroy_module(&m) {
        Ok(()) => done(),
        Err(e) => reply(e),
    }
}

pub(super) fn get_module_info(arg: &Sval) -> CmdOutcome {
    let Some(name) = arg.as_str() else {
        return fail(EINVAL, "Argument must be a name in str");
    };
    let Some(m) = module::find_module(name) else {
        return fail(softnic_abi::ENOENT, format!("No module '{name}' found"));
    };
    reply(module::get_module_info(&m))
}

fn eval_gate(arg: &Sval) -> Result<GateIdx, CmdOutcome> {
    match arg.eval_uint("gate") {
        None => Err(fail(EINVAL, "Missing 'gate' field")),
        Some(g) if g > u64::from(GateIdx::MAX) => {
            Err(fail(EINVAL, format!("'gate' must fit in {} bits", GateIdx::BITS)))
        }
        Some(g) => Ok(g as GateIdx),
    }
}

pub(super) fn connect_modules(arg: &Sval) -> CmdOutcome {
    let (Some(m1_name), Some(m2_name)) = (arg.eval_str("m1"), arg.eval_str("m2")) else {
        return fail(EINVAL, "Missing 'm1' or 'm2' field");
    };
    let gate = match eval_gate(arg) {
        Ok(g) => g,
        Err(out) => return out,
    };
    let Some(m1) = module::find_module(m1_name) else {
        return fail(softnic_abi::ENOENT, format!("No module '{m1_name}' found"));
    };
    let Some(m2) = module::find_module(m2_name) else {
        return fail(softnic_abi::ENOENT, format!("No module '{m2_name}' found"));
    };

    match module::connect_modules(&m1, gate, &m2) {
        Ok(()) => {
            dlog_info!("{}[{}] -> {}", m1_name, gate, m2_name);
            done()
        }
        Err(code) => {
            fail(code, format!("Connection '{m1_name}'[{gate}]->'{m2_name}' failed"))
        }
    }
}

pub(super) fn disconnect_modules(arg: &Sval) -> CmdOutcome {
    let Some(name) = arg.eval_str("name") else {
        return fail(EINVAL, "Missing 'name' field");
    };
    let gate = match eval_gate(arg) {
        Ok(g) => g,
        Err(out) => return out,
    };
    let Some(m) = module::find_module(name) else {
        return fail(softnic_abi::ENOENT, format!("No module '{name}' found"));
    };

    match module::disconnect_modules(&m, gate) {
        Ok(()) => {
            dlog_info!("{}[{}] -> <dead end>", name, gate);
            done()
        }
        Err(code) => fail(code, format!("Disconnection '{name}'[{gate}] failed")),
    }
}

pub(super) fn check_cycles(_arg: &Sval) -> CmdOutcome {
    match module::find_cycle() {
        Some(names) => {
            let mut cycle = Sval::list();
            for n in names {
                cycle.list_add(Sval::str(n));
            }
            let mut r = Sval::map();
            r.map_set("cycle", cycle);
            reply(r)
        }
        None => done(),
    }
}

// =============================================================================
// Tasks
// =============================================================================

pub(super) fn attach_task(arg: &Sval) -> CmdOutcome {
    let Some(name) = arg.eval_str("name") else {
        return fail(EINVAL, "Missing 'name' field");
    };
    let Some(m) = module::find_module(name) else {
        return fail(softnic_abi::ENOENT, format!("No module '{name}' found"));
    };

    let Some(tid) = arg.eval_uint("taskid") else {
        return fail(EINVAL, "Missing 'taskid' field");
    };
    if tid >= MAX_TASKS_PER_MODULE as u64 {
        return fail(
            EINVAL,
            format!("'taskid' must be between 0 and {}", MAX_TASKS_PER_MODULE - 1),
        );
    }
    let Some(task) = m.tasks().get(tid as usize) else {
        return fail(softnic_abi::ENOENT, format!("Task {name}:{tid} does not exist"));
    };
    if task.is_attached() {
        return fail(
            softnic_abi::EBUSY,
            format!("Task {name}:{tid} is already attached to a worker"),
        );
    }

    let Some(wid) = arg.eval_uint("wid") else {
        return fail(EINVAL, "Missing 'wid' field");
    };
    if wid >= MAX_WORKERS as u64 {
        return fail(EINVAL, format!("'wid' must be between 0 and {}", MAX_WORKERS - 1));
    }
    let wid = wid as usize;
    if !worker::is_worker_active(wid) {
        return fail(EINVAL, format!("Worker {wid} does not exist"));
    }

    if !task.attach(wid) {
        return fail(
            softnic_abi::EBUSY,
            format!("Task {name}:{tid} is already attached to a worker"),
        );
    }
    if let Err(e) = worker::attach_to_worker(wid, Arc::clone(task)) {
        task.detach();
        return reply(e);
    }
    dlog_info!("task {}:{} attached to worker {}", name, tid, wid);
    done()
}

// =============================================================================
// Taps
// =============================================================================

pub(super) fn enable_tcpdump(arg: &Sval) -> CmdOutcome {
    let Some(name) = arg.eval_str("name") else {
        return fail(EINVAL, "Missing 'name' field");
    };
    let gate = match eval_gate(arg) {
        Ok(g) => g,
        Err(out) => return out,
    };
    let Some(fifo) = arg.eval_str("fifo") else {
        return fail(EINVAL, "Missing 'fifo' field");
    };
    let Some(m) = module::find_module(name) else {
        return fail(softnic_abi::ENOENT, format!("No module '{name}' found"));
    };
    if usize::from(gate) >= m.allocated_gates() {
        return fail(EINVAL, format!("Gate '{gate}' does not exist"));
    }

    let tap = match Tap::open(fifo) {
        Ok(tap) => tap,
        Err(e) => return reply(e),
    };
    match module::attach_tap(&m, gate, tap) {
        Ok(()) => done(),
        Err(code) => fail(code, format!("Enabling tcpdump {name}[{gate}] failed")),
    }
}

pub(super) fn disable_tcpdump(arg: &Sval) -> CmdOutcome {
    let Some(name) = arg.eval_str("name") else {
        return fail(EINVAL, "Missing 'name' field");
    };
    let gate = match eval_gate(arg) {
        Ok(g) => g,
        Err(out) => return out,
    };
    let Some(m) = module::find_module(name) else {
        return fail(softnic_abi::ENOENT, format!("No module '{name}' found"));
    };
    if usize::from(gate) >= m.allocated_gates() {
        return fail(EINVAL, format!("Gate '{gate}' does not exist"));
    }

    match module::detach_tap(&m, gate) {
        Ok(()) => done(),
        Err(code) => fail(code, format!("Disabling tcpdump {name}[{gate}] failed")),
    }
}

// =============================================================================
// Daemon control
// =============================================================================

pub(super) fn kill_bess(_arg: &Sval) -> CmdOutcome {
    dlog_info!("switchd kill requested");
    CmdOutcome::Shutdown
}
