//! Binary wire codec for structured values.
//!
//! One byte of type tag per node, little-endian fixed-width scalars, `u32`
//! length prefixes for strings/blobs and element counts for containers. The
//! channel layer wraps each encoded value in its own 4-byte length frame;
//! this module only covers the value body.
//!
//! Decoding is strict: truncated input, trailing bytes, unknown tags,
//! invalid UTF-8, and nesting deeper than [`MAX_DEPTH`] are all rejected.
//! Encoding cannot fail (container sizes beyond `u32::MAX` would OOM long
//! before they serialize).

use core::fmt;

use crate::sval::{Sval, SvalError, SvalMap};

/// Nesting cap enforced by the decoder. Legitimate control traffic is a few
/// levels deep; the cap bounds stack use on hostile input.
pub const MAX_DEPTH: usize = 64;

const TAG_NIL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_UINT: u8 = 2;
const TAG_DOUBLE: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_BLOB: u8 = 5;
const TAG_LIST: u8 = 6;
const TAG_MAP: u8 = 7;
const TAG_ERR: u8 = 8;

// =============================================================================
// Errors
// =============================================================================

/// Decode failure. The position is the byte offset where the problem was
/// detected, for logging on the channel layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireError {
    Truncated { at: usize },
    TrailingBytes { at: usize },
    BadTag { tag: u8, at: usize },
    BadUtf8 { at: usize },
    DepthExceeded,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Truncated { at } => write!(f, "truncated input at byte {at}"),
            WireError::TrailingBytes { at } => write!(f, "trailing bytes after value at byte {at}"),
            WireError::BadTag { tag, at } => write!(f, "unknown type tag {tag:#04x} at byte {at}"),
            WireError::BadUtf8 { at } => write!(f, "invalid UTF-8 in string at byte {at}"),
            WireError::DepthExceeded => write!(f, "nesting deeper than {MAX_DEPTH}"),
        }
    }
}

impl std::error::Error for WireError {}

// =============================================================================
// Encoding
// =============================================================================

/// Serialize `v` into a fresh buffer.
pub fn encode(v: &Sval) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    encode_into(v, &mut out);
    out
}

/// Serialize `v`, appending to `out`.
pub fn encode_into(v: &Sval, out: &mut Vec<u8>) {
    match v {
        Sval::Nil => out.push(TAG_NIL),
        Sval::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&i.to_le_bytes());
        }
        Sval::Uint(u) => {
            out.push(TAG_UINT);
            out.extend_from_slice(&u.to_le_bytes());
        }
        Sval::Double(d) => {
            out.push(TAG_DOUBLE);
            out.extend_from_slice(&d.to_le_bytes());
        }
        Sval::Str(s) => {
            out.push(TAG_STR);
            put_bytes(s.as_bytes(), out);
        }
        Sval::Blob(b) => {
            out.push(TAG_BLOB);
            put_bytes(b, out);
        }
        Sval::List(items) => {
            out.push(TAG_LIST);
            put_count(items.len(), out);
            for item in items {
                encode_into(item, out);
            }
        }
        Sval::Map(m) => {
            out.push(TAG_MAP);
            put_count(m.len(), out);
            for (k, val) in m.iter() {
                put_bytes(k.as_bytes(), out);
                encode_into(val, out);
            }
        }
        Sval::Err(e) => {
            out.push(TAG_ERR);
            out.extend_from_slice(&e.code.to_le_bytes());
            put_bytes(e.msg.as_bytes(), out);
        }
    }
}

fn put_bytes(b: &[u8], out: &mut Vec<u8>) {
    put_count(b.len(), out);
    out.extend_from_slice(b);
}

fn put_count(n: usize, out: &mut Vec<u8>) {
    out.extend_from_slice(&(n as u32).to_le_bytes());
}

// =============================================================================
// Decoding
// =============================================================================

/// Parse one value occupying the whole of `buf`.
pub fn decode(buf: &[u8]) -> Result<Sval, WireError> {
    let mut cur = Cursor { buf, pos: 0 };
    let v = cur.value(0)?;
    if cur.pos != buf.len() {
        return Err(WireError::TrailingBytes { at: cur.pos });
    }
    Ok(v)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn value(&mut self, depth: usize) -> Result<Sval, WireError> {
        if depth > MAX_DEPTH {
            return Err(WireError::DepthExceeded);
        }
        let at = self.pos;
        let tag = self.u8()?;
        match tag {
            TAG_NIL => Ok(Sval::Nil),
            TAG_INT => Ok(Sval::Int(i64::from_le_bytes(self.fixed()?))),
            TAG_UINT => Ok(Sval::Uint(u64::from_le_bytes(self.fixed()?))),
            TAG_DOUBLE => Ok(Sval::Double(f64::from_le_bytes(self.fixed()?))),
            TAG_STR => Ok(Sval::Str(self.string()?)),
            TAG_BLOB => Ok(Sval::Blob(self.bytes()?.to_vec())),
            TAG_LIST => {
                let n = self.count()?;
                let mut items = Vec::new();
                for _ in 0..n {
                    items.push(self.value(depth + 1)?);
                }
                Ok(Sval::List(items))
            }
            TAG_MAP => {
                let n = self.count()?;
                let mut m = SvalMap::new();
                for _ in 0..n {
                    let key = self.string()?;
                    let val = self.value(depth + 1)?;
                    m.set(key, val);
                }
                Ok(Sval::Map(m))
            }
            TAG_ERR => {
                let code = u32::from_le_bytes(self.fixed()?);
                let msg = self.string()?;
                Ok(Sval::Err(SvalError { code, msg }))
            }
            other => Err(WireError::BadTag { tag: other, at }),
        }
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or(WireError::Truncated { at: self.pos })?;
        self.pos += 1;
        Ok(b)
    }

    fn fixed<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let end = self
            .pos
            .checked_add(N)
            .filter(|&e| e <= self.buf.len())
            .ok_or(WireError::Truncated { at: self.pos })?;
        let mut arr = [0u8; N];
        arr.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(arr)
    }

    fn count(&mut self) -> Result<usize, WireError> {
        Ok(u32::from_le_bytes(self.fixed()?) as usize)
    }

    fn bytes(&mut self) -> Result<&[u8], WireError> {
        let n = self.count()?;
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.buf.len())
            .ok_or(WireError::Truncated { at: self.pos })?;
        let b = &self.buf[self.pos..end];
        self.pos = end;
        Ok(b)
    }

    fn string(&mut self) -> Result<String, WireError> {
        let at = self.pos;
        let b = self.bytes()?;
        core::str::from_utf8(b)
            .map(str::to_owned)
            .map_err(|_| WireError::BadUtf8 { at })
    }
}
