//! Port drivers and live ports.
//!
//! This crate establishes the boundary between port drivers (which move
//! packet bursts) and the rest of the switch (which reshapes the graph and
//! reads statistics). A driver is a process-wide capability registered once
//! at startup; a port is a named live endpoint created from a driver by the
//! control plane. Only [`PacketBatch`] crosses the driver boundary.

pub mod driver;
pub mod loopback;
pub mod packet;
pub mod port;

#[cfg(test)]
mod testutil;

pub use driver::{
    DriverFeatures, PacketDir, PortConfig, PortDriver, PortState, find_driver, init_all_drivers,
    list_drivers, register_driver,
};
pub use loopback::Loopback;
pub use packet::{PacketBatch, PacketBuf};
pub use port::{
    DirCounters, Port, PortStats, create_port, destroy_port, find_port, list_ports, reset_ports,
};

/// Register the drivers built into the daemon. Called once from
/// `register_builtins()` before any control input is accepted.
pub fn register_builtin_drivers() {
    // Registration can only fail on a duplicate name, which for builtins
    // means register_builtin_drivers ran twice; the second call is a no-op.
    let _ = register_driver(std::sync::Arc::new(Loopback));
}
