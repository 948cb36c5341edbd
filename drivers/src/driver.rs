//! The `PortDriver` capability trait and the process-wide driver registry.
//!
//! A driver is an immutable descriptor-plus-hooks value registered during
//! startup and never removed; the registry is therefore write-once and
//! lock-free to read for the life of the process (the lock only serializes
//! startup registration).
//!
//! All hook methods take `&self` and a shared reference to the port's
//! private state; drivers use interior mutability for anything they mutate
//! on the data path. This keeps `recv_pkts`/`send_pkts` callable from worker
//! threads while the control thread reads descriptors concurrently.

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;
use spin::RwLock;

use softnic_abi::{DEFAULT_QUEUE_SIZE, EEXIST, Sval};
use softnic_lib::dlog_info;

use crate::packet::PacketBatch;

// =============================================================================
// Capability trait
// =============================================================================

/// Packet direction, from the switch's point of view: `Inc` is traffic
/// arriving from the port, `Out` is traffic handed to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketDir {
    Inc,
    Out,
}

bitflags! {
    /// Capabilities a driver advertises. Purely informational today; the
    /// control plane lists them in diagnostics.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DriverFeatures: u32 {
        const MULTI_QUEUE = 1 << 0;
        const HAS_STATS   = 1 << 1;
        const LINK_STATUS = 1 << 2;
    }
}

/// Per-port private state owned by the port, interpreted by its driver.
pub type PortState = Box<dyn Any + Send + Sync>;

/// Queue shape settled by the control plane before `init_port` runs.
#[derive(Clone, Debug)]
pub struct PortConfig {
    pub name: String,
    pub num_inc_q: usize,
    pub num_out_q: usize,
    pub size_inc_q: u32,
    pub size_out_q: u32,
}

/// A port driver.
///
/// `init_port` may fail with a structured error (surfaced unchanged to the
/// requesting client); the burst hooks are non-blocking and infallible.
/// A sick device simply receives nothing and accepts nothing.
pub trait PortDriver: Send + Sync {
    /// Unique registry key, e.g. `"Loopback"`.
    fn name(&self) -> &'static str;

    fn features(&self) -> DriverFeatures {
        DriverFeatures::empty()
    }

    fn default_queue_size(&self, _dir: PacketDir) -> u32 {
        DEFAULT_QUEUE_SIZE
    }

    /// Called once at startup, after every driver is registered. May
    /// enumerate hardware and log discoveries. An error here is fatal to
    /// daemon initialization.
    fn init_driver(&self) -> Result<(), Sval> {
        Ok(())
    }

    /// Configure a new endpoint. Returns the driver's private state for the
    /// port, or a structured error (nothing is inserted on failure).
    fn init_port(&self, config: &PortConfig, arg: &Sval) -> Result<PortState, Sval>;

    /// Release endpoint resources. The port is already unreachable from the
    /// table when this runs.
    fn deinit_port(&self, _state: &PortState) {}

    /// Non-blocking burst receive from queue `qid`: up to `cap` packets.
    fn recv_pkts(&self, state: &PortState, qid: usize, cap: usize) -> PacketBatch;

    /// Non-blocking burst transmit on queue `qid`. Returns how many packets
    /// were accepted; the unaccepted remainder is the caller's to count as
    /// dropped.
    fn send_pkts(&self, state: &PortState, qid: usize, batch: PacketBatch) -> usize;
}

// =============================================================================
// Registry
// =============================================================================

/// Sorted by driver name so paged listing is stable.
static DRIVERS: RwLock<Vec<Arc<dyn PortDriver>>> = RwLock::new(Vec::new());

/// Register a driver. Startup only; a duplicate name is refused with
/// `EEXIST` and the registry is left unchanged.
pub fn register_driver(driver: Arc<dyn PortDriver>) -> Result<(), Sval> {
    let mut drivers = DRIVERS.write();
    let name = driver.name();
    match drivers.binary_search_by(|d| d.name().cmp(name)) {
        Ok(_) => Err(Sval::err(EEXIST, format!("Driver '{name}' is already registered"))),
        Err(pos) => {
            drivers.insert(pos, driver);
            Ok(())
        }
    }
}

pub fn find_driver(name: &str) -> Option<Arc<dyn PortDriver>> {
    let drivers = DRIVERS.read();
    drivers
        .binary_search_by(|d| d.name().cmp(name))
        .ok()
        .map(|pos| Arc::clone(&drivers[pos]))
}

/// A bounded page of registered drivers in name order.
pub fn list_drivers(offset: usize, limit: usize) -> Vec<Arc<dyn PortDriver>> {
    let drivers = DRIVERS.read();
    drivers.iter().skip(offset).take(limit).map(Arc::clone).collect()
}

/// Run every registered driver's `init_driver` hook. Called once after
/// `register_builtins()`; the first failure aborts initialization.
pub fn init_all_drivers() -> Result<(), Sval> {
    let drivers: Vec<_> = list_drivers(0, usize::MAX);
    for driver in drivers {
        driver.init_driver()?;
        dlog_info!("driver {} initialized", driver.name());
    }
    Ok(())
}
