//! Per-gate packet capture sinks.
//!
//! A tap is a pcap stream written to a named pipe the operator created
//! (`mkfifo` + `tcpdump -r` on the other end). The pipe is opened
//! write-only and non-blocking: a reader must already be waiting, and a
//! reader that stops draining costs us dropped capture records, never a
//! stalled worker.
//!
//! Capture is best-effort by design: short writes, `EAGAIN`, and `EPIPE`
//! all drop the record silently. Counters on the gate remain authoritative.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;

use softnic_abi::{EIO, Sval};
use softnic_drivers::PacketBatch;
use softnic_lib::clock::epoch_now;
use softnic_lib::dlog_info;

/// Longest packet prefix recorded per capture record.
const SNAPLEN: usize = 65535;

const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
const PCAP_VERSION_MAJOR: u16 = 2;
const PCAP_VERSION_MINOR: u16 = 4;
const LINKTYPE_ETHERNET: u32 = 1;

/// An open capture sink. Dropping it closes the pipe.
#[derive(Debug)]
pub struct Tap {
    fifo: File,
    path: String,
}

impl Tap {
    /// Open `path` for writing without blocking and emit the pcap file
    /// header. Any failure maps to `EIO` with the OS detail in the message.
    pub fn open(path: &str) -> Result<Self, Sval> {
        let fifo = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| Sval::err(EIO, format!("cannot open fifo '{path}': {e}")))?;

        let tap = Self { fifo, path: path.to_owned() };
        tap.write_file_header()
            .map_err(|e| Sval::err(EIO, format!("cannot write pcap header to '{path}': {e}")))?;
        dlog_info!("tcpdump attached to {path}");
        Ok(tap)
    }

    fn write_file_header(&self) -> std::io::Result<()> {
        let mut hdr = Vec::with_capacity(24);
        hdr.extend_from_slice(&PCAP_MAGIC.to_le_bytes());
        hdr.extend_from_slice(&PCAP_VERSION_MAJOR.to_le_bytes());
        hdr.extend_from_slice(&PCAP_VERSION_MINOR.to_le_bytes());
        hdr.extend_from_slice(&0i32.to_le_bytes()); // thiszone
        hdr.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
        hdr.extend_from_slice(&(SNAPLEN as u32).to_le_bytes());
        hdr.extend_from_slice(&LINKTYPE_ETHERNET.to_le_bytes());
        (&self.fifo).write_all(&hdr)
    }

    /// Write one capture record per packet in `batch`. Errors are dropped;
    /// see the module docs.
    pub fn log_batch(&self, batch: &PacketBatch) {
        let now = epoch_now();
        let ts_sec = now as u32;
        let ts_usec = ((now - f64::from(ts_sec)) * 1e6) as u32;

        for pkt in batch.pkts() {
            let incl = pkt.len().min(SNAPLEN);
            let mut rec = Vec::with_capacity(16 + incl);
            rec.extend_from_slice(&ts_sec.to_le_bytes());
            rec.extend_from_slice(&ts_usec.to_le_bytes());
            rec.extend_from_slice(&(incl as u32).to_le_bytes());
            rec.extend_from_slice(&(pkt.len() as u32).to_le_bytes());
            rec.extend_from_slice(&pkt.data()[..incl]);
            // One write per record keeps records whole or absent; a pipe
            // write of <= PIPE_BUF bytes is atomic.
            let _ = (&self.fifo).write_all(&rec);
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for Tap {
    fn drop(&mut self) {
        dlog_info!("tcpdump detached from {}", self.path);
    }
}
