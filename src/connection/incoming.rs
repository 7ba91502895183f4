//! Reassembly of out-of-order segments and in-order delivery to the local
//! sink.

use super::{
    receive_sequence_space::ReceiveSequenceSpace,
    seq::{seq_leq, seq_lt},
};
use crate::host::Host;
use std::collections::BTreeMap;

/// The reassembly buffer. Received payloads are keyed by sequence number and
/// stay buffered until the sink accepts them, so the buffered byte count is
/// exactly what the advertised window must subtract.
#[derive(Debug, Default)]
pub struct Incoming {
    reassembly: BTreeMap<u32, Vec<u8>>,
    buffered: usize,
}

impl Incoming {
    /// Bytes held for delivery, in-order and out-of-order together.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Classifies and, when acceptable, buffers an arriving payload.
    ///
    /// Extends `rcv.nxt` over every newly-contiguous segment. Buffered
    /// entries are left in place for [`Incoming::deliver`]; extension and
    /// delivery advance independently so a backpressured sink cannot stall
    /// acknowledgment bookkeeping.
    pub fn admit(
        &mut self,
        rcv: &mut ReceiveSequenceSpace,
        window: u16,
        seqno: u32,
        payload: Vec<u8>,
    ) -> Admission {
        debug_assert!(!payload.is_empty());
        let end = seqno.wrapping_add(payload.len() as u32);

        // Segments entirely before rcv.nxt are retransmissions we have
        // already acknowledged. A segment straddling rcv.nxt cannot come
        // from a conforming sender (chunk boundaries never move); treat it
        // the same way rather than deliver bytes twice.
        if seq_leq(end, rcv.nxt) || seq_lt(seqno, rcv.nxt) {
            return Admission::Duplicate;
        }

        // A copy buffered earlier wins over a retransmission, and is already
        // accounted against the window
        if !self.reassembly.contains_key(&seqno) {
            if payload.len() > window as usize {
                return Admission::OutOfWindow;
            }
            self.buffered += payload.len();
            self.reassembly.insert(seqno, payload);
        }

        while let Some(next) = self.reassembly.get(&rcv.nxt) {
            rcv.nxt = rcv.nxt.wrapping_add(next.len() as u32);
        }

        Admission::Accepted
    }

    /// Hands contiguous buffered bytes to the sink, in order, as long as the
    /// sink has room for each whole payload. Frees buffer space as it goes.
    pub fn deliver(&mut self, rcv: &mut ReceiveSequenceSpace, host: &mut impl Host) {
        while let Some(next) = self.reassembly.get(&rcv.delivered) {
            if host.bufspace() < next.len() {
                break;
            }
            let payload = self.reassembly.remove(&rcv.delivered).unwrap();
            host.output(&payload);
            self.buffered -= payload.len();
            rcv.delivered = rcv.delivered.wrapping_add(payload.len() as u32);
        }
    }
}

/// How an arriving payload was classified.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Buffered; acknowledge with the updated cumulative position
    Accepted,
    /// Already acknowledged; acknowledge again, the peer missed it
    Duplicate,
    /// No room in the receive buffer; stay silent so the sender retries
    /// after its timeout
    OutOfWindow,
}
