//! Built-in module classes, registered by
//! [`register_builtins`](crate::register_builtins).

pub mod noop;
