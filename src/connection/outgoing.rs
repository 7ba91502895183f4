//! The queue of outbound segments that have not yet been cumulatively
//! acknowledged.

use super::seq::seq_leq;
use crate::{host::Host, logging, segment::Segment};
use std::collections::VecDeque;

/// The total number of times a segment is sent before the peer is declared
/// unresponsive: the initial transmission plus five retransmissions.
pub const MAX_TRANSMIT_ATTEMPTS: u32 = 6;

/// The retransmission queue. Segments join when admitted, transmit in order
/// as the window allows, and leave only when a cumulative acknowledgment
/// covers their entire sequence range.
#[derive(Debug, Default)]
pub struct Outgoing {
    transmits: VecDeque<Transmit>,
}

impl Outgoing {
    /// Appends a newly-admitted segment. It will not be transmitted until
    /// [`Outgoing::pump`] finds room for it in the send window.
    pub fn push(&mut self, segment: Segment) {
        self.transmits.push_back(Transmit::new(segment));
    }

    pub fn is_empty(&self) -> bool {
        self.transmits.is_empty()
    }

    /// Transmits queued segments, oldest first, while they fit inside the
    /// effective window measured from `una`. Stops at the first segment that
    /// does not fit; later segments have larger sequence numbers and cannot
    /// fit either.
    pub fn pump(&mut self, una: u32, window: u16, host: &mut impl Host) {
        for transmit in self.transmits.iter_mut() {
            if transmit.time_sent.is_some() {
                continue;
            }
            if transmit.segment.seq_end().wrapping_sub(una) > window as u32 {
                break;
            }
            let wire = transmit.segment.serialize();
            host.send(&wire);
            transmit.time_sent = Some(host.now());
            transmit.retransmits = 1;
            logging::segment_sent_event(&transmit.segment.header, transmit.segment.payload.len());
        }
    }

    /// Retires every segment whose sequence range the cumulative
    /// acknowledgment fully covers. A mid-segment acknowledgment retires
    /// nothing of that segment.
    pub fn retire(&mut self, ackno: u32) {
        while let Some(head) = self.transmits.front() {
            if seq_leq(head.segment.seq_end(), ackno) {
                self.transmits.pop_front();
            } else {
                break;
            }
        }
    }

    /// The retransmission and timeout sweep. Every sent segment whose timer
    /// has lapsed is resent byte-for-byte; a segment that has exhausted its
    /// transmission attempts declares the peer unresponsive instead.
    ///
    /// A zero peer window never stalls this path; only unsent segments wait
    /// for the window.
    pub fn sweep(&mut self, rt_timeout_ms: u64, host: &mut impl Host) -> SweepResult {
        let now = host.now();
        for transmit in self.transmits.iter_mut() {
            let sent_at = match transmit.time_sent {
                Some(sent_at) => sent_at,
                None => continue,
            };
            if now.saturating_sub(sent_at) <= rt_timeout_ms {
                continue;
            }
            if transmit.retransmits >= MAX_TRANSMIT_ATTEMPTS {
                return SweepResult::PeerUnresponsive;
            }
            let wire = transmit.segment.serialize();
            host.send(&wire);
            transmit.retransmits += 1;
            transmit.time_sent = Some(now);
            tracing::trace!(
                seqno = transmit.segment.header.seqno,
                attempt = transmit.retransmits,
                "retransmitted segment"
            );
        }
        SweepResult::Alive
    }

    /// The number of transmissions of the oldest unacknowledged segment, for
    /// inspection in tests and diagnostics.
    pub fn head_attempts(&self) -> Option<u32> {
        self.transmits.front().map(|transmit| transmit.retransmits)
    }
}

/// A segment on the retransmission queue, along with its transmission
/// bookkeeping.
#[derive(Debug, Clone)]
pub struct Transmit {
    /// The segment, fully built at admission. Retransmissions serialize the
    /// same segment again, so the peer sees identical bytes.
    pub segment: Segment,
    /// When the segment was last put on the wire, or `None` if it has never
    /// been transmitted.
    pub time_sent: Option<u64>,
    /// How many times the segment has been transmitted.
    pub retransmits: u32,
}

impl Transmit {
    fn new(segment: Segment) -> Self {
        Self {
            segment,
            time_sent: None,
            retransmits: 0,
        }
    }
}

/// The outcome of a retransmission sweep.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepResult {
    /// Nothing to report
    Alive,
    /// A segment ran out of transmission attempts and the connection should
    /// be torn down
    PeerUnresponsive,
}
