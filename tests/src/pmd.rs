//! A mock poll-mode driver with hardware-shaped create semantics.
//!
//! Stands in for a DPDK-style NIC driver: the create argument names a
//! device by `port_id`, a wrong type is `EINVAL`, and a device beyond the
//! (pretend) probe count is `ENODEV`. Packets go nowhere and come from
//! nowhere.

use softnic_abi::{EINVAL, ENODEV, Sval, SvalType};
use softnic_drivers::{DriverFeatures, PacketBatch, PortConfig, PortDriver, PortState};

/// How many fake devices the fake probe "found".
pub const MOCK_DEVICE_COUNT: i64 = 8;

pub struct MockPmd;

struct MockPmdPort {
    #[allow(dead_code)]
    port_id: i64,
}

impl PortDriver for MockPmd {
    fn name(&self) -> &'static str {
        "PMD"
    }

    fn features(&self) -> DriverFeatures {
        DriverFeatures::MULTI_QUEUE | DriverFeatures::HAS_STATS | DriverFeatures::LINK_STATUS
    }

    fn init_port(&self, _config: &PortConfig, arg: &Sval) -> Result<PortState, Sval> {
        let port_id = match arg.eval("port_id") {
            None => 0,
            Some(v) if v.get_type() != SvalType::Int && v.get_type() != SvalType::Uint => {
                return Err(Sval::err(EINVAL, "Port ID must be an integer"));
            }
            Some(v) => v.as_int().unwrap_or(-1),
        };
        if !(0..MOCK_DEVICE_COUNT).contains(&port_id) {
            return Err(Sval::err(ENODEV, format!("Port id {port_id} is not available")));
        }
        Ok(Box::new(MockPmdPort { port_id }))
    }

    fn recv_pkts(&self, _state: &PortState, _qid: usize, _cap: usize) -> PacketBatch {
        PacketBatch::new()
    }

    fn send_pkts(&self, _state: &PortState, _qid: usize, batch: PacketBatch) -> usize {
        batch.len()
    }
}
