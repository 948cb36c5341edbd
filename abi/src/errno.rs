//! POSIX-aligned error codes carried by [`Sval::Err`](crate::sval::Sval).
//!
//! The numeric values match Linux errno numbering so that error replies read
//! the same through external tooling (`strerror`, tcpdump scripts, the CLI).
//! Only the codes the control plane actually produces are defined.

/// Operation not permitted.
pub const EPERM: u32 = 1;
/// Named entity does not exist.
pub const ENOENT: u32 = 2;
/// I/O failure (tap pipe, control socket).
pub const EIO: u32 = 5;
/// Argument list (here: gate index) exceeds the implementation cap.
pub const E2BIG: u32 = 7;
/// Try again (non-blocking pipe full).
pub const EAGAIN: u32 = 11;
/// Precondition violated: running worker, referenced port, occupied gate,
/// attached task.
pub const EBUSY: u32 = 16;
/// Name or slot already in use.
pub const EEXIST: u32 = 17;
/// Hardware unavailable.
pub const ENODEV: u32 = 19;
/// Malformed request, wrong type, out-of-range index.
pub const EINVAL: u32 = 22;
/// No space left (table full).
pub const ENOSPC: u32 = 28;
/// Broken pipe (capture reader went away).
pub const EPIPE: u32 = 32;
/// Unimplemented or unsupported command/query.
pub const ENOTSUP: u32 = 95;

/// Short description used by [`Sval::errno`](crate::sval::Sval::errno) when
/// the caller has no better message than the code itself.
pub fn errno_name(code: u32) -> &'static str {
    match code {
        EPERM => "Operation not permitted",
        ENOENT => "No such entity",
        EIO => "I/O error",
        E2BIG => "Argument list too long",
        EAGAIN => "Resource temporarily unavailable",
        EBUSY => "Resource busy",
        EEXIST => "Already exists",
        ENODEV => "No such device",
        EINVAL => "Invalid argument",
        ENOSPC => "No space left",
        EPIPE => "Broken pipe",
        ENOTSUP => "Operation not supported",
        _ => "Unknown error",
    }
}
