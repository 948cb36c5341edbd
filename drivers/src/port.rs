//! Live ports and the port table.
//!
//! Ports are created and destroyed by the control thread only; the table
//! lock is held across name-check, driver `init_port`, and insert so that
//! two racing creates can never claim one name. Workers touch ports only
//! through the burst helpers, which read shared state and bump relaxed
//! atomic counters.
//!
//! A port stays destroyable only while no module references it; the module
//! layer pins a port with [`Port::inc_ref`] for as long as a module is bound
//! to it, and `destroy_port` refuses with `EBUSY` meanwhile.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use spin::RwLock;

use softnic_abi::{EBUSY, EEXIST, EINVAL, ENOENT, MAX_QUEUES_PER_DIR, Sval};
use softnic_lib::dlog_info;

use crate::driver::{PacketDir, PortConfig, PortDriver, PortState};
use crate::packet::PacketBatch;

// =============================================================================
// Statistics
// =============================================================================

/// Per-queue counters, written by workers with relaxed increments. Readers
/// accept torn reads across fields; the counters are advisory.
#[derive(Debug, Default)]
struct QueueCounters {
    packets: AtomicU64,
    dropped: AtomicU64,
    bytes: AtomicU64,
}

/// One direction's counters, summed across queues at read time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirCounters {
    pub packets: u64,
    pub dropped: u64,
    pub bytes: u64,
}

/// Snapshot returned by [`Port::get_stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PortStats {
    pub inc: DirCounters,
    pub out: DirCounters,
}

// =============================================================================
// Port
// =============================================================================

/// A live NIC endpoint of a driver.
pub struct Port {
    name: String,
    driver: Arc<dyn PortDriver>,
    state: PortState,
    num_inc_q: usize,
    num_out_q: usize,
    size_inc_q: u32,
    size_out_q: u32,
    inc_counters: Vec<QueueCounters>,
    out_counters: Vec<QueueCounters>,
    /// Modules currently bound to this port.
    refcnt: AtomicUsize,
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("driver", &self.driver.name())
            .field("state", &self.state)
            .field("num_inc_q", &self.num_inc_q)
            .field("num_out_q", &self.num_out_q)
            .field("size_inc_q", &self.size_inc_q)
            .field("size_out_q", &self.size_out_q)
            .field("inc_counters", &self.inc_counters)
            .field("out_counters", &self.out_counters)
            .field("refcnt", &self.refcnt)
            .finish()
    }
}

impl Port {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn driver(&self) -> &Arc<dyn PortDriver> {
        &self.driver
    }

    #[inline]
    pub fn num_queues(&self, dir: PacketDir) -> usize {
        match dir {
            PacketDir::Inc => self.num_inc_q,
            PacketDir::Out => self.num_out_q,
        }
    }

    #[inline]
    pub fn queue_size(&self, dir: PacketDir) -> u32 {
        match dir {
            PacketDir::Inc => self.size_inc_q,
            PacketDir::Out => self.size_out_q,
        }
    }

    /// Pin the port against destruction while a module is bound to it.
    pub fn inc_ref(&self) {
        self.refcnt.fetch_add(1, Ordering::AcqRel);
    }

    pub fn dec_ref(&self) {
        let prev = self.refcnt.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "port {} refcount underflow", self.name);
    }

    pub fn refcount(&self) -> usize {
        self.refcnt.load(Ordering::Acquire)
    }

    /// Burst receive on inbound queue `qid`, counting packets and bytes.
    pub fn recv_burst(&self, qid: usize, cap: usize) -> PacketBatch {
        let batch = self.driver.recv_pkts(&self.state, qid, cap);
        if let Some(c) = self.inc_counters.get(qid) {
            c.packets.fetch_add(batch.len() as u64, Ordering::Relaxed);
            c.bytes.fetch_add(batch.total_bytes(), Ordering::Relaxed);
        }
        batch
    }

    /// Burst transmit on outbound queue `qid`. Packets the driver does not
    /// accept are dropped here and counted as such.
    pub fn send_burst(&self, qid: usize, batch: PacketBatch) -> usize {
        let offered = batch.len() as u64;
        let offered_bytes = batch.total_bytes();
        let sent = self.driver.send_pkts(&self.state, qid, batch);
        if let Some(c) = self.out_counters.get(qid) {
            c.packets.fetch_add(sent as u64, Ordering::Relaxed);
            c.dropped.fetch_add(offered - sent as u64, Ordering::Relaxed);
            // Counting accepted bytes would require sizing each packet on
            // the hot path twice; byte counters track offered traffic.
            c.bytes.fetch_add(offered_bytes, Ordering::Relaxed);
        }
        sent
    }

    /// Account packets dropped before they reached the driver (queue
    /// resolution failure, port draining).
    pub fn count_dropped(&self, dir: PacketDir, qid: usize, pkts: u64) {
        let counters = match dir {
            PacketDir::Inc => &self.inc_counters,
            PacketDir::Out => &self.out_counters,
        };
        if let Some(c) = counters.get(qid) {
            c.dropped.fetch_add(pkts, Ordering::Relaxed);
        }
    }

    pub fn get_stats(&self) -> PortStats {
        PortStats {
            inc: sum_counters(&self.inc_counters),
            out: sum_counters(&self.out_counters),
        }
    }
}

fn sum_counters(queues: &[QueueCounters]) -> DirCounters {
    let mut total = DirCounters::default();
    for q in queues {
        total.packets += q.packets.load(Ordering::Relaxed);
        total.dropped += q.dropped.load(Ordering::Relaxed);
        total.bytes += q.bytes.load(Ordering::Relaxed);
    }
    total
}

// =============================================================================
// Port table
// =============================================================================

/// Keyed by port name; BTreeMap iteration order makes paged listing stable.
static PORTS: RwLock<BTreeMap<String, Arc<Port>>> = RwLock::new(BTreeMap::new());

fn eval_queue_count(arg: &Sval, key: &str) -> Result<Option<usize>, Sval> {
    match arg.eval_uint(key) {
        None if arg.eval(key).is_some() => {
            Err(Sval::err(EINVAL, format!("'{key}' must be an unsigned integer")))
        }
        None => Ok(None),
        Some(n) if n == 0 || n > MAX_QUEUES_PER_DIR as u64 => Err(Sval::err(
            EINVAL,
            format!("'{key}' must be between 1 and {MAX_QUEUES_PER_DIR}"),
        )),
        Some(n) => Ok(Some(n as usize)),
    }
}

fn eval_queue_size(arg: &Sval, key: &str, default: u32) -> Result<u32, Sval> {
    match arg.eval_uint(key) {
        None if arg.eval(key).is_some() => {
            Err(Sval::err(EINVAL, format!("'{key}' must be an unsigned integer")))
        }
        None => Ok(default),
        Some(0) => Err(Sval::err(EINVAL, format!("'{key}' must be positive"))),
        Some(n) if n > u32::MAX as u64 => {
            Err(Sval::err(EINVAL, format!("'{key}' does not fit in 32 bits")))
        }
        Some(n) => Ok(n as u32),
    }
}

/// Smallest-free-suffix name synthesis: `Loopback0`, `Loopback1`, ...
fn synthesize_name(table: &BTreeMap<String, Arc<Port>>, driver_name: &str) -> String {
    for n in 0.. {
        let candidate = format!("{driver_name}{n}");
        if !table.contains_key(&candidate) {
            return candidate;
        }
    }
    unreachable!("fewer than usize::MAX ports exist")
}

/// Create a port from `driver`.
///
/// The table write lock is held across name allocation, `init_port`, and
/// insert: a racing create cannot steal the name, and a failed `init_port`
/// leaves no trace.
pub fn create_port(
    name_opt: Option<&str>,
    driver: &Arc<dyn PortDriver>,
    arg: &Sval,
) -> Result<Arc<Port>, Sval> {
    let mut ports = PORTS.write();

    let name = match name_opt {
        Some(name) => {
            if ports.contains_key(name) {
                return Err(Sval::err(EEXIST, format!("Port '{name}' already exists")));
            }
            name.to_owned()
        }
        None => synthesize_name(&ports, driver.name()),
    };

    let config = PortConfig {
        name: name.clone(),
        num_inc_q: eval_queue_count(arg, "num_inc_q")?.unwrap_or(1),
        num_out_q: eval_queue_count(arg, "num_out_q")?.unwrap_or(1),
        size_inc_q: eval_queue_size(arg, "size_inc_q", driver.default_queue_size(PacketDir::Inc))?,
        size_out_q: eval_queue_size(arg, "size_out_q", driver.default_queue_size(PacketDir::Out))?,
    };

    let state = driver.init_port(&config, arg)?;

    let port = Arc::new(Port {
        inc_counters: (0..config.num_inc_q).map(|_| QueueCounters::default()).collect(),
        out_counters: (0..config.num_out_q).map(|_| QueueCounters::default()).collect(),
        name: name.clone(),
        driver: Arc::clone(driver),
        state,
        num_inc_q: config.num_inc_q,
        num_out_q: config.num_out_q,
        size_inc_q: config.size_inc_q,
        size_out_q: config.size_out_q,
        refcnt: AtomicUsize::new(0),
    });

    ports.insert(name.clone(), Arc::clone(&port));
    dlog_info!("port {} created (driver {})", name, driver.name());
    Ok(port)
}

/// Destroy `port`: refuses with `EBUSY` while any module references it.
pub fn destroy_port(port: &Arc<Port>) -> Result<(), Sval> {
    let mut ports = PORTS.write();
    if port.refcount() > 0 {
        return Err(Sval::err(
            EBUSY,
            format!("Port '{}' is still referenced by {} module(s)", port.name, port.refcount()),
        ));
    }
    if ports.remove(&port.name).is_none() {
        return Err(Sval::err(ENOENT, format!("No port '{}' found", port.name)));
    }
    port.driver.deinit_port(&port.state);
    dlog_info!("port {} destroyed", port.name);
    Ok(())
}

pub fn find_port(name: &str) -> Option<Arc<Port>> {
    PORTS.read().get(name).map(Arc::clone)
}

/// A bounded page of ports in name order.
pub fn list_ports(offset: usize, limit: usize) -> Vec<Arc<Port>> {
    PORTS.read().values().skip(offset).take(limit).map(Arc::clone).collect()
}

/// Destroy every port. Fails on the first port still referenced by a
/// module; callers that want a full reset destroy modules first.
pub fn reset_ports() -> Result<(), Sval> {
    loop {
        let Some(port) = list_ports(0, 1).pop() else {
            return Ok(());
        };
        destroy_port(&port)?;
    }
}
