//! The control channel: framed structured values over a Unix socket.
//!
//! Each message is a 4-byte little-endian length followed by one
//! wire-encoded structured value. Connections are served one at a time and
//! requests within a connection are handled in arrival order, which is the
//! only ordering the control plane guarantees.
//!
//! A malformed frame (oversized length prefix or undecodable body) gets an
//! `EINVAL` error reply and the connection is dropped; the next client
//! starts clean.

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};

use softnic_abi::{EINVAL, Sval, decode, encode};
use softnic_core::{ControlResponse, handle_request};
use softnic_lib::{dlog_debug, dlog_warn};

/// Upper bound on one frame. Control values are small; anything bigger is a
/// confused or hostile client.
const MAX_FRAME: usize = 4 * 1024 * 1024;

pub fn bind(path: &str) -> std::io::Result<UnixListener> {
    // A previous unclean shutdown leaves the socket file behind.
    let _ = std::fs::remove_file(path);
    UnixListener::bind(path)
}

/// Accept connections until a client requests shutdown.
pub fn serve(listener: UnixListener) {
    for conn in listener.incoming() {
        let stream = match conn {
            Ok(s) => s,
            Err(e) => {
                dlog_warn!("accept failed: {e}");
                continue;
            }
        };
        if serve_connection(stream) == Served::Shutdown {
            return;
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Served {
    Closed,
    Shutdown,
}

/// One length-prefixed frame, or the reasons there is none.
enum Frame {
    Body(Vec<u8>),
    /// Clean EOF before the length prefix.
    Eof,
    /// The length prefix exceeds [`MAX_FRAME`]; the body was not read.
    Oversized(usize),
}

pub(crate) fn serve_connection(mut stream: UnixStream) -> Served {
    loop {
        let body = match read_frame(&mut stream) {
            Ok(Frame::Body(body)) => body,
            Ok(Frame::Eof) => return Served::Closed,
            Ok(Frame::Oversized(len)) => {
                // Malformed frame: reply EINVAL, then drop the connection.
                let reply = Sval::err(
                    EINVAL,
                    format!("frame of {len} bytes exceeds the {MAX_FRAME} byte cap"),
                );
                let _ = write_frame(&mut stream, &reply);
                return Served::Closed;
            }
            Err(e) => {
                dlog_warn!("control connection error: {e}");
                return Served::Closed;
            }
        };

        let req = match decode(&body) {
            Ok(req) => req,
            Err(e) => {
                // Same contract as an oversized frame: the framing is no
                // longer trustworthy, so answer and hang up.
                let reply = Sval::err(EINVAL, format!("undecodable request: {e}"));
                let _ = write_frame(&mut stream, &reply);
                return Served::Closed;
            }
        };

        dlog_debug!("request: {req}");
        let ControlResponse { reply, shutdown } = handle_request(&req);

        if let Err(e) = write_frame(&mut stream, &reply) {
            dlog_warn!("cannot write reply: {e}");
            return Served::Closed;
        }
        if shutdown {
            return Served::Shutdown;
        }
    }
}

fn read_frame(stream: &mut UnixStream) -> std::io::Result<Frame> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(Frame::Eof),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME {
        return Ok(Frame::Oversized(len));
    }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    Ok(Frame::Body(body))
}

fn write_frame(stream: &mut UnixStream, reply: &Sval) -> std::io::Result<()> {
    let body = encode(reply);
    stream.write_all(&(body.len() as u32).to_le_bytes())?;
    stream.write_all(&body)?;
    stream.flush()
}
