//! The switch daemon.
//!
//! Sequences startup (logging, builtin registration, driver enumeration,
//! control socket) and then serves control requests until a client sends
//! `kill_bess`. All interesting behavior lives in the member crates; this
//! binary only wires them together.

use std::process::ExitCode;

use softnic_lib::dlog::{DlogLevel, dlog_set_level};
use softnic_lib::{dlog_error, dlog_info, setup_syslog};

mod channel;


const DEFAULT_SOCKET: &str = "/tmp/softnic.sock";

struct Options {
    socket: String,
    foreground: bool,
    log_level: DlogLevel,
}

fn usage() -> ! {
    eprintln!("usage: switchd [--socket PATH] [--foreground] [--log-level LEVEL]");
    eprintln!("  --socket PATH      control socket path (default {DEFAULT_SOCKET})");
    eprintln!("  --foreground       stay attached to the terminal, log to stderr");
    eprintln!("  --log-level LEVEL  error | warn | info | debug | trace");
    std::process::exit(2);
}

fn parse_options() -> Options {
    let mut opts = Options {
        socket: DEFAULT_SOCKET.to_owned(),
        foreground: false,
        log_level: DlogLevel::Info,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--socket" => match args.next() {
                Some(path) => opts.socket = path,
                None => usage(),
            },
            "--foreground" => opts.foreground = true,
            "--log-level" => {
                let level = args.next().unwrap_or_else(|| usage());
                opts.log_level = match level.as_str() {
                    "error" => DlogLevel::Error,
                    "warn" => DlogLevel::Warn,
                    "info" => DlogLevel::Info,
                    "debug" => DlogLevel::Debug,
                    "trace" => DlogLevel::Trace,
                    _ => usage(),
                };
            }
            _ => usage(),
        }
    }
    opts
}

fn main() -> ExitCode {
    let opts = parse_options();
    dlog_set_level(opts.log_level);

    if !opts.foreground {
        // Detach first so syslog sees the daemon's pid, not the parent's.
        if unsafe { libc::daemon(0, 0) } != 0 {
            eprintln!("switchd: cannot daemonize: {}", std::io::Error::last_os_error());
            return ExitCode::FAILURE;
        }
        setup_syslog();
    }

    softnic_core::register_builtins();
    if let Err(e) = softnic_drivers::init_all_drivers() {
        dlog_error!("driver initialization failed: {e}");
        return ExitCode::FAILURE;
    }

    let listener = match channel::bind(&opts.socket) {
        Ok(l) => l,
        Err(e) => {
            dlog_error!("cannot bind control socket {}: {e}", opts.socket);
            return ExitCode::FAILURE;
        }
    };
    dlog_info!("listening on {}", opts.socket);

    channel::serve(listener);

    // kill_bess: quiesce, tear the dataplane down, exit clean.
    softnic_core::pause_all_workers();
    softnic_core::worker::destroy_all_workers();
    let _ = std::fs::remove_file(&opts.socket);
    dlog_info!("switchd exiting");
    if !opts.foreground {
        softnic_lib::end_syslog();
    }
    ExitCode::SUCCESS
}
