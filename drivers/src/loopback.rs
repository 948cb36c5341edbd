//! Loopback port driver.
//!
//! Packets transmitted on a loopback port are queued internally and handed
//! back on the matching inbound queue at the next receive burst; no wire,
//! no hardware. It is the reference `PortDriver` implementation and the
//! workhorse of the test suite.
//!
//! Queue `i` out pairs with queue `i` in; the queue count is the larger of
//! the two configured directions so every queue id resolves.

use std::collections::VecDeque;

use spin::Mutex;

use softnic_abi::Sval;

use crate::driver::{DriverFeatures, PortConfig, PortDriver, PortState};
use crate::packet::{PacketBatch, PacketBuf};

/// One internal queue, bounded by the configured out-queue size.
struct LoopQueue {
    pkts: Mutex<VecDeque<PacketBuf>>,
    capacity: usize,
}

struct LoopbackPort {
    queues: Vec<LoopQueue>,
}

/// The loopback driver. Stateless; everything lives in per-port state.
pub struct Loopback;

impl PortDriver for Loopback {
    fn name(&self) -> &'static str {
        "Loopback"
    }

    fn features(&self) -> DriverFeatures {
        DriverFeatures::MULTI_QUEUE | DriverFeatures::HAS_STATS
    }

    fn init_port(&self, config: &PortConfig, _arg: &Sval) -> Result<PortState, Sval> {
        let nq = config.num_inc_q.max(config.num_out_q);
        let queues = (0..nq)
            .map(|_| LoopQueue {
                pkts: Mutex::new(VecDeque::with_capacity(64)),
                capacity: config.size_out_q as usize,
            })
            .collect();
        Ok(Box::new(LoopbackPort { queues }))
    }

    fn recv_pkts(&self, state: &PortState, qid: usize, cap: usize) -> PacketBatch {
        let mut batch = PacketBatch::new();
        let Some(port) = state.downcast_ref::<LoopbackPort>() else {
            return batch;
        };
        let Some(q) = port.queues.get(qid) else {
            return batch;
        };
        let mut pkts = q.pkts.lock();
        while batch.len() < cap {
            let Some(pkt) = pkts.pop_front() else {
                break;
            };
            if !batch.push(pkt) {
                break;
            }
        }
        batch
    }

    fn send_pkts(&self, state: &PortState, qid: usize, mut batch: PacketBatch) -> usize {
        let Some(port) = state.downcast_ref::<LoopbackPort>() else {
            return 0;
        };
        let Some(q) = port.queues.get(qid) else {
            return 0;
        };
        let mut pkts = q.pkts.lock();
        let mut accepted = 0;
        for pkt in batch.drain() {
            if pkts.len() >= q.capacity {
                break;
            }
            pkts.push_back(pkt);
            accepted += 1;
        }
        accepted
    }
}
