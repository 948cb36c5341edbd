//! Structured values: the self-describing tagged tree used for all
//! control-plane arguments, results, and diagnostics.
//!
//! Every request argument, handler reply, and driver/module-class hook error
//! is an [`Sval`]. Errors are first-class values ([`Sval::Err`]), never
//! out-of-band signals, so a handler is a total function from `Sval` to
//! `Sval`.
//!
//! # Accessor discipline
//!
//! Typed accessors return `Option` and report absence rather than failing:
//! a missing map key, a type mismatch, and an out-of-range list index all
//! look the same to the caller (`None`). Handlers turn `None` into an
//! `EINVAL` reply with a message naming the field; nothing in this module
//! panics on malformed input.
//!
//! # Maps
//!
//! [`SvalMap`] preserves insertion order (listing replies are rendered in
//! the order fields were added), but equality ignores it: two maps are equal
//! when they relate the same keys to equal values.

use core::fmt;

use crate::errno::errno_name;

// =============================================================================
// Value tree
// =============================================================================

/// Discriminant of an [`Sval`], for error messages and wire tagging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SvalType {
    Nil,
    Int,
    Uint,
    Double,
    Str,
    Blob,
    List,
    Map,
    Err,
}

impl fmt::Display for SvalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SvalType::Nil => "nil",
            SvalType::Int => "int",
            SvalType::Uint => "uint",
            SvalType::Double => "double",
            SvalType::Str => "str",
            SvalType::Blob => "blob",
            SvalType::List => "list",
            SvalType::Map => "map",
            SvalType::Err => "err",
        };
        f.write_str(s)
    }
}

/// An error value: non-negative code (errno numbering) plus a human message.
#[derive(Clone, Debug, PartialEq)]
pub struct SvalError {
    pub code: u32,
    pub msg: String,
}

/// A structured value.
///
/// The sum is closed; the wire codec and every accessor below enumerate it
/// exhaustively, so adding a variant is a breaking protocol change.
#[derive(Clone, Debug, PartialEq)]
pub enum Sval {
    Nil,
    Int(i64),
    Uint(u64),
    Double(f64),
    Str(String),
    Blob(Vec<u8>),
    List(Vec<Sval>),
    Map(SvalMap),
    Err(SvalError),
}

impl Sval {
    // -------------------------------------------------------------------------
    // Constructors
    // -------------------------------------------------------------------------

    #[inline]
    pub const fn nil() -> Self {
        Sval::Nil
    }

    #[inline]
    pub const fn int(v: i64) -> Self {
        Sval::Int(v)
    }

    #[inline]
    pub const fn uint(v: u64) -> Self {
        Sval::Uint(v)
    }

    #[inline]
    pub const fn double(v: f64) -> Self {
        Sval::Double(v)
    }

    #[inline]
    pub fn str(v: impl Into<String>) -> Self {
        Sval::Str(v.into())
    }

    #[inline]
    pub fn blob(v: impl Into<Vec<u8>>) -> Self {
        Sval::Blob(v.into())
    }

    /// An empty list; grow it with [`list_add`](Self::list_add).
    #[inline]
    pub const fn list() -> Self {
        Sval::List(Vec::new())
    }

    /// An empty map; grow it with [`map_set`](Self::map_set).
    #[inline]
    pub const fn map() -> Self {
        Sval::Map(SvalMap::new())
    }

    /// An error value with an explicit message.
    pub fn err(code: u32, msg: impl Into<String>) -> Self {
        Sval::Err(SvalError { code, msg: msg.into() })
    }

    /// An error value whose message is the stock description of `code`.
    pub fn errno(code: u32) -> Self {
        Sval::Err(SvalError { code, msg: errno_name(code).into() })
    }

    // -------------------------------------------------------------------------
    // Mutators
    // -------------------------------------------------------------------------

    /// Append `v` to a list. No-op with a debug assertion on non-lists;
    /// builders always know the shape they are assembling.
    pub fn list_add(&mut self, v: Sval) {
        match self {
            Sval::List(items) => items.push(v),
            other => debug_assert!(false, "list_add on {}", other.get_type()),
        }
    }

    /// Insert or replace `key` in a map. Replacement keeps the key's
    /// original position. Ownership of `v` moves into the container.
    pub fn map_set(&mut self, key: impl Into<String>, v: Sval) {
        match self {
            Sval::Map(m) => m.set(key.into(), v),
            other => debug_assert!(false, "map_set on {}", other.get_type()),
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[inline]
    pub fn get_type(&self) -> SvalType {
        match self {
            Sval::Nil => SvalType::Nil,
            Sval::Int(_) => SvalType::Int,
            Sval::Uint(_) => SvalType::Uint,
            Sval::Double(_) => SvalType::Double,
            Sval::Str(_) => SvalType::Str,
            Sval::Blob(_) => SvalType::Blob,
            Sval::List(_) => SvalType::List,
            Sval::Map(_) => SvalType::Map,
            Sval::Err(_) => SvalType::Err,
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Sval::Nil)
    }

    #[inline]
    pub fn is_err(&self) -> bool {
        matches!(self, Sval::Err(_))
    }

    /// Signed integer view. A `Uint` that fits in `i64` also qualifies;
    /// clients are not required to distinguish the two for small values.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Sval::Int(v) => Some(*v),
            Sval::Uint(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Unsigned integer view. A non-negative `Int` also qualifies.
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Sval::Uint(v) => Some(*v),
            Sval::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Sval::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Sval::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Sval::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sval]> {
        match self {
            Sval::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&SvalMap> {
        match self {
            Sval::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_err(&self) -> Option<&SvalError> {
        match self {
            Sval::Err(e) => Some(e),
            _ => None,
        }
    }

    /// Map lookup; `None` when `self` is not a map or the key is absent.
    pub fn map_get(&self, key: &str) -> Option<&Sval> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// List index; `None` when `self` is not a list or `idx` is out of range.
    pub fn list_get(&self, idx: usize) -> Option<&Sval> {
        self.as_list().and_then(|items| items.get(idx))
    }

    // -------------------------------------------------------------------------
    // Dotted-path evaluation
    // -------------------------------------------------------------------------

    /// Resolve a dotted path (`a.b.c`) through nested maps.
    ///
    /// Every component must name a map entry except the last; the empty path
    /// resolves to `self`.
    pub fn eval(&self, path: &str) -> Option<&Sval> {
        if path.is_empty() {
            return Some(self);
        }
        let mut cur = self;
        for comp in path.split('.') {
            cur = cur.map_get(comp)?;
        }
        Some(cur)
    }

    pub fn eval_str(&self, path: &str) -> Option<&str> {
        self.eval(path).and_then(Sval::as_str)
    }

    pub fn eval_int(&self, path: &str) -> Option<i64> {
        self.eval(path).and_then(Sval::as_int)
    }

    pub fn eval_uint(&self, path: &str) -> Option<u64> {
        self.eval(path).and_then(Sval::as_uint)
    }

    pub fn eval_map(&self, path: &str) -> Option<&SvalMap> {
        self.eval(path).and_then(Sval::as_map)
    }
}

impl Default for Sval {
    fn default() -> Self {
        Sval::Nil
    }
}

impl fmt::Display for Sval {
    /// Single-line rendering for log output. Not a serialization format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sval::Nil => f.write_str("nil"),
            Sval::Int(v) => write!(f, "{v}"),
            Sval::Uint(v) => write!(f, "{v}"),
            Sval::Double(v) => write!(f, "{v}"),
            Sval::Str(s) => write!(f, "{s:?}"),
            Sval::Blob(b) => write!(f, "blob[{}]", b.len()),
            Sval::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Sval::Map(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Sval::Err(e) => write!(f, "err({}, {:?})", e.code, e.msg),
        }
    }
}

// =============================================================================
// Insertion-ordered map
// =============================================================================

/// A mapping from string keys to values that remembers insertion order.
///
/// Control-plane maps are small (a handful of request fields, a page of
/// listing entries), so lookups scan linearly; no hashing, no allocation
/// beyond the backing vector.
#[derive(Clone, Debug, Default)]
pub struct SvalMap {
    entries: Vec<(String, Sval)>,
}

impl SvalMap {
    #[inline]
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace. Replacement keeps the original position so that
    /// repeated `set` calls do not reshuffle rendered output.
    pub fn set(&mut self, key: String, v: Sval) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = v,
            None => self.entries.push((key, v)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Sval> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Sval)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Key-order-insensitive: maps are equal when they relate the same keys to
/// equal values, regardless of insertion history.
impl PartialEq for SvalMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|ov| ov == v))
    }
}
