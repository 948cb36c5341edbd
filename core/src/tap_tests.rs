//! Capture tap tests, against a real FIFO.
//!
//! The read end is opened first (non-blocking write-only opens of a FIFO
//! with no reader fail with ENXIO, which is also the EIO error path test).

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use softnic_abi::EIO;
use softnic_drivers::{PacketBatch, PacketBuf};

use crate::tap::Tap;

fn fifo_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("softnic-tap-{}-{tag}.pipe", std::process::id()))
}

fn make_fifo(path: &PathBuf) -> File {
    let _ = std::fs::remove_file(path);
    let cpath = CString::new(path.to_str().unwrap()).unwrap();
    let rc = unsafe { libc::mkfifo(cpath.as_ptr(), 0o600) };
    assert_eq!(rc, 0, "mkfifo failed");
    // Reader first, so the writer's non-blocking open succeeds.
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .expect("cannot open fifo read end")
}

#[test]
fn tap_writes_pcap_header_and_records() {
    let path = fifo_path("hdr");
    let mut reader = make_fifo(&path);

    let tap = Tap::open(path.to_str().unwrap()).expect("tap open failed");

    let mut batch = PacketBatch::new();
    batch.push(PacketBuf::new(vec![0xde, 0xad, 0xbe, 0xef]));
    tap.log_batch(&batch);

    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).ok();

    // 24-byte file header.
    assert!(buf.len() >= 24 + 16 + 4, "short capture: {} bytes", buf.len());
    assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), 0xa1b2_c3d4);
    assert_eq!(u16::from_le_bytes(buf[4..6].try_into().unwrap()), 2);
    assert_eq!(u32::from_le_bytes(buf[20..24].try_into().unwrap()), 1); // ethernet

    // One record: incl_len == orig_len == 4, then the payload.
    let incl = u32::from_le_bytes(buf[32..36].try_into().unwrap());
    let orig = u32::from_le_bytes(buf[36..40].try_into().unwrap());
    assert_eq!(incl, 4);
    assert_eq!(orig, 4);
    assert_eq!(&buf[40..44], &[0xde, 0xad, 0xbe, 0xef]);

    drop(tap);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn tap_open_without_reader_fails_eio() {
    let path = fifo_path("noreader");
    let _ = std::fs::remove_file(&path);
    let cpath = CString::new(path.to_str().unwrap()).unwrap();
    assert_eq!(unsafe { libc::mkfifo(cpath.as_ptr(), 0o600) }, 0);

    let err = Tap::open(path.to_str().unwrap()).unwrap_err();
    assert_eq!(err.as_err().unwrap().code, EIO);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn tap_open_on_missing_path_fails_eio() {
    let path = fifo_path("missing");
    let _ = std::fs::remove_file(&path);
    let err = Tap::open(path.to_str().unwrap()).unwrap_err();
    assert_eq!(err.as_err().unwrap().code, EIO);
}
