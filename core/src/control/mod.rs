//! The command dispatcher.
//!
//! A request is a structured value map `{to, cmd, arg}`; the reply is a
//! single structured value (`nil` on quiet success, an `err` value on any
//! failure). Routing happens on `to`: `"softnic"` reaches the command table
//! below, `"module"` reaches a live module's `query` capability, anything
//! else is refused.
//!
//! Each table entry carries its handler and one piece of metadata: whether
//! the command requires a quiesced dataplane. The precondition is enforced
//! here, once, before the handler runs; handlers themselves never check
//! worker state.
//!
//! `kill_bess` does not terminate the process from inside the dispatcher;
//! it surfaces as [`ControlResponse::shutdown`] so the embedding daemon can
//! unwind cleanly.

mod handlers;

use softnic_abi::{EBUSY, EINVAL, ENOTSUP, Sval};

use crate::worker::is_any_worker_running;

/// Outcome of one handled request.
#[derive(Debug)]
pub struct ControlResponse {
    pub reply: Sval,
    /// Set by `kill_bess`: the daemon should exit 0 after replying.
    pub shutdown: bool,
}

/// What a handler produced. Almost everything is `Reply`.
pub(crate) enum CmdOutcome {
    Reply(Sval),
    Shutdown,
}

pub(crate) fn reply(v: Sval) -> CmdOutcome {
    CmdOutcome::Reply(v)
}

/// Quiet success, normalized to `nil`.
pub(crate) fn done() -> CmdOutcome {
    CmdOutcome::Reply(Sval::nil())
}

pub(crate) fn fail(code: u32, msg: impl Into<String>) -> CmdOutcome {
    CmdOutcome::Reply(Sval::err(code, msg))
}

struct CmdEntry {
    name: &'static str,
    /// Refuse with `EBUSY` unless every worker is paused.
    pause_needed: bool,
    func: fn(&Sval) -> CmdOutcome,
}

/// The control-plane command table. Linear scan; the table is small and
/// dispatch is far from any hot path.
static SN_COMMANDS: &[CmdEntry] = &[
    // Remove all modules, then all ports.
    CmdEntry { name: "reset_all", pause_needed: true, func: handlers::reset_all },
    // Pause and resume all workers.
    CmdEntry { name: "pause_all", pause_needed: false, func: handlers::pause_all },
    CmdEntry { name: "resume_all", pause_needed: false, func: handlers::resume_all },
    CmdEntry { name: "list_workers", pause_needed: false, func: handlers::not_implemented },
    CmdEntry { name: "add_worker", pause_needed: true, func: handlers::add_worker },
    CmdEntry { name: "delete_worker", pause_needed: true, func: handlers::not_implemented },
    CmdEntry { name: "list_drivers", pause_needed: false, func: handlers::list_drivers },
    CmdEntry { name: "import_driver", pause_needed: false, func: handlers::not_implemented },
    CmdEntry { name: "reset_ports", pause_needed: true, func: handlers::reset_ports },
    CmdEntry { name: "list_ports", pause_needed: false, func: handlers::list_ports },
    CmdEntry { name: "create_port", pause_needed: false, func: handlers::create_port },
    CmdEntry { name: "destroy_port", pause_needed: false, func: handlers::destroy_port },
    CmdEntry { name: "get_port_stats", pause_needed: false, func: handlers::get_port_stats },
    CmdEntry { name: "list_mclasses", pause_needed: false, func: handlers::list_mclasses },
    CmdEntry { name: "import_mclass", pause_needed: false, func: handlers::not_implemented },
    CmdEntry { name: "reset_modules", pause_needed: true, func: handlers::reset_modules },
    CmdEntry { name: "list_modules", pause_needed: false, func: handlers::list_modules },
    CmdEntry { name: "create_module", pause_needed: true, func: handlers::create_module },
    CmdEntry { name: "destroy_module", pause_needed: true, func: handlers::destroy_module },
    CmdEntry { name: "get_module_info", pause_needed: false, func: handlers::get_module_info },
    CmdEntry { name: "connect_modules", pause_needed: true, func: handlers::connect_modules },
    CmdEntry { name: "disconnect_modules", pause_needed: true, func: handlers::disconnect_modules },
    CmdEntry { name: "check_cycles", pause_needed: false, func: handlers::check_cycles },
    CmdEntry { name: "attach_task", pause_needed: true, func: handlers::attach_task },
    CmdEntry { name: "enable_tcpdump", pause_needed: true, func: handlers::enable_tcpdump },
    CmdEntry { name: "disable_tcpdump", pause_needed: true, func: handlers::disable_tcpdump },
    CmdEntry { name: "kill_bess", pause_needed: true, func: handlers::kill_bess },
];

static NIL_ARG: Sval = Sval::Nil;

fn dispatch_softnic(req: &Sval) -> CmdOutcome {
    let Some(cmd) = req.eval_str("cmd") else {
        return fail(EINVAL, "Missing 'cmd' field");
    };
    let arg = req.map_get("arg").unwrap_or(&NIL_ARG);

    let Some(entry) = SN_COMMANDS.iter().find(|e| e.name == cmd) else {
        return fail(ENOTSUP, format!("Unknown command in 'cmd': '{cmd}'"));
    };
    if entry.pause_needed && is_any_worker_running() {
        return fail(EBUSY, "There is a running worker");
    }
    (entry.func)(arg)
}

fn dispatch_module(req: &Sval) -> CmdOutcome {
    let Some(name) = req.eval_str("name") else {
        return fail(EINVAL, "Missing module name field 'name'");
    };
    let Some(module) = crate::module::find_module(name) else {
        return fail(softnic_abi::ENOENT, format!("No module '{name}' found"));
    };
    let Some(cmd) = req.eval_str("cmd") else {
        return fail(EINVAL, "Missing 'cmd' field");
    };
    if cmd != "query" {
        return fail(ENOTSUP, format!("Not supported command '{cmd}'"));
    }
    let arg = req.map_get("arg").unwrap_or(&NIL_ARG);
    reply(module.mclass().query(&module, arg))
}

/// Handle one request end to end. Total: every malformed input becomes an
/// `err` reply, never a panic.
pub fn handle_request(req: &Sval) -> ControlResponse {
    let outcome = if req.as_map().is_none() {
        fail(EINVAL, "The message must be a map")
    } else {
        match req.eval_str("to") {
            None => fail(EINVAL, "There is no 'to' field"),
            Some("softnic") => dispatch_softnic(req),
            Some("module") => dispatch_module(req),
            Some(other) => fail(EINVAL, format!("Unknown destination in 'to': {other}")),
        }
    };

    match outcome {
        CmdOutcome::Reply(reply) => ControlResponse { reply, shutdown: false },
        CmdOutcome::Shutdown => ControlResponse { reply: Sval::nil(), shutdown: true },
    }
}
