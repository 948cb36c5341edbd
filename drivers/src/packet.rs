//! Packet buffers and bursts.
//!
//! The control core never inspects packet contents; it only moves owned
//! buffers between ports, gates, and capture taps. [`PacketBatch`] is the
//! unit of work everywhere: drivers fill one per receive call, tasks hand
//! one to each downstream gate, taps copy one record per packet.

use softnic_abi::MAX_BURST;

/// One owned packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PacketBuf {
    data: Vec<u8>,
}

impl PacketBuf {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop bytes past `len`, e.g. for snaplen-limited capture copies.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }
}

/// A bounded burst of packets.
///
/// Capacity is [`MAX_BURST`]; `push` refuses beyond that so a driver bug
/// cannot turn one burst into an unbounded allocation.
#[derive(Debug, Default)]
pub struct PacketBatch {
    pkts: Vec<PacketBuf>,
}

impl PacketBatch {
    pub fn new() -> Self {
        Self { pkts: Vec::with_capacity(MAX_BURST) }
    }

    /// `true` if the packet was accepted, `false` when the burst is full.
    pub fn push(&mut self, pkt: PacketBuf) -> bool {
        if self.pkts.len() >= MAX_BURST {
            return false;
        }
        self.pkts.push(pkt);
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pkts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pkts.is_empty()
    }

    #[inline]
    pub fn pkts(&self) -> &[PacketBuf] {
        &self.pkts
    }

    /// Total payload bytes across the burst.
    pub fn total_bytes(&self) -> u64 {
        self.pkts.iter().map(|p| p.len() as u64).sum()
    }

    /// Take every packet out, leaving the burst empty but with its
    /// capacity intact.
    pub fn drain(&mut self) -> impl Iterator<Item = PacketBuf> {
        self.pkts.drain(..)
    }
}

impl FromIterator<PacketBuf> for PacketBatch {
    /// Collect at most [`MAX_BURST`] packets; the tail of a longer iterator
    /// is dropped.
    fn from_iter<T: IntoIterator<Item = PacketBuf>>(iter: T) -> Self {
        let mut batch = PacketBatch::new();
        for pkt in iter {
            if !batch.push(pkt) {
                break;
            }
        }
        batch
    }
}
