//! Control-plane data model shared by the switch daemon and its clients.
//!
//! This crate provides the canonical definitions for everything that crosses
//! the control channel: the structured value tree ([`Sval`]), its wire codec
//! ([`wire`]), the errno constants carried inside error values, and the
//! compile-time limits of the dataplane. Having a single source of truth
//! eliminates duplicate type definitions and keeps daemon and client tooling
//! in agreement about framing and error codes.
//!
//! The crate is intentionally dependency-free.

#![forbid(unsafe_code)]

pub mod errno;
pub mod limits;
pub mod sval;
pub mod wire;


pub use errno::*;
pub use limits::*;
pub use sval::{Sval, SvalError, SvalMap, SvalType};
pub use wire::{WireError, decode, encode};
