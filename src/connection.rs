//! The per-connection protocol engine.
//!
//! A [`Connection`] is a single-threaded state machine driven to completion
//! by four external events: bytes becoming available at the local source
//! (`on_read`), a datagram arriving from the peer (`on_receive`), the local
//! sink draining (`on_output`), and the periodic timer tick (`on_timer`). It
//! is implemented separately from the registry and from any I/O plumbing so
//! that two endpoints can be wired together in memory and tested without a
//! network.

use crate::{
    host::{Host, Input},
    logging,
    segment::{SegmentBuilder, SegmentHeader, HEADER_OCTETS},
};
use std::time::Duration;


mod seq;
use seq::{seq_gt, seq_leq, seq_lt};

mod send_sequence_space;
use send_sequence_space::SendSequenceSpace;

mod receive_sequence_space;
use receive_sequence_space::ReceiveSequenceSpace;

mod outgoing;
pub use outgoing::MAX_TRANSMIT_ATTEMPTS;
use outgoing::{Outgoing, SweepResult};

mod incoming;
use incoming::{Admission, Incoming};

/// The largest payload a single segment may carry.
pub const MAX_SEG_DATA_SIZE: u16 = 1440;

/// Per-connection tunables, fixed at establishment.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// How long a transmitted segment waits for an acknowledgment before it
    /// is retransmitted
    pub rt_timeout: Duration,
    /// The most bytes kept in flight regardless of what the peer advertises
    pub send_window: u16,
    /// The size of the receive buffer backing reassembly, and therefore the
    /// ceiling of the window we advertise
    pub recv_window: u16,
    /// The largest payload we will put in one segment
    pub max_seg_data_size: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rt_timeout: Duration::from_millis(200),
            send_window: 8 * MAX_SEG_DATA_SIZE,
            recv_window: 8 * MAX_SEG_DATA_SIZE,
            max_seg_data_size: MAX_SEG_DATA_SIZE,
        }
    }
}

/// The state for one reliable byte-stream connection.
///
/// There is no synchronization handshake; a connection is born established
/// with both directions starting at sequence number one.
#[derive(Debug)]
pub struct Connection<H: Host> {
    host: H,
    cfg: Config,
    /// The send sequence space
    snd: SendSequenceSpace,
    /// The receive sequence space
    rcv: ReceiveSequenceSpace,
    /// Segments admitted for transmission and not yet acknowledged
    outgoing: Outgoing,
    /// Segments received from the peer and not yet delivered to the sink
    incoming: Incoming,
    /// The sequence number our FIN consumed, once the source reports EOF
    fin_sent: Option<u32>,
    /// Whether the peer has acknowledged our FIN
    fin_acked: bool,
    /// Whether the peer's FIN has been consumed
    fin_recv: bool,
    /// Whether the zero-length end-of-stream write has reached the sink
    eof_signaled: bool,
}

impl<H: Host> Connection<H> {
    pub fn new(host: H, cfg: Config) -> Self {
        Self {
            host,
            cfg,
            // Until the peer's first acknowledgment arrives there is no
            // advertised window to honor; assume the configured one
            snd: SendSequenceSpace {
                wnd: cfg.send_window,
                ..Default::default()
            },
            rcv: ReceiveSequenceSpace::default(),
            outgoing: Outgoing::default(),
            incoming: Incoming::default(),
            fin_sent: None,
            fin_acked: false,
            fin_recv: false,
            eof_signaled: false,
        }
    }

    /// The local byte source has data (or EOF) for us.
    ///
    /// Pulls data from the source only while the peer permits more bytes in
    /// flight, chunking into segments of at most one maximum payload each.
    /// The window gates data admission alone: a saturated window shrinks the
    /// read to a zero-length poll, so EOF is still observed and the FIN is
    /// still admitted. It consumes one sequence number and waits on the
    /// queue until the window opens.
    pub fn on_read(&mut self) -> EventResult {
        if self.fin_sent.is_some() {
            // The source already closed; nothing more can be admitted
            return EventResult::Ok;
        }
        loop {
            let window = self.snd.wnd.min(self.cfg.send_window) as u32;
            let room = window.saturating_sub(self.snd.in_flight());
            let chunk = room.min(self.cfg.max_seg_data_size as u32) as usize;
            let mut buf = vec![0; chunk];
            match self.host.input(&mut buf) {
                Input::Data(count) => {
                    if count == 0 {
                        // The source has bytes but the window has no room
                        break;
                    }
                    buf.truncate(count);
                    self.admit(buf, false);
                }
                Input::Empty => break,
                Input::Eof => {
                    self.fin_sent = Some(self.snd.nxt);
                    self.admit(Vec::new(), true);
                    break;
                }
            }
        }
        self.pump();
        EventResult::Ok
    }

    /// A datagram arrived from the peer.
    ///
    /// Anything that fails checksum or length verification is dropped
    /// without response. A verified segment is processed to completion:
    /// acknowledgment bookkeeping first, then payload reassembly, then FIN
    /// handling, then delivery to the sink, then at most one cumulative
    /// acknowledgment back to the peer.
    pub fn on_receive(&mut self, datagram: &[u8]) -> EventResult {
        let header = match SegmentHeader::from_bytes(datagram.iter().cloned(), datagram.len()) {
            Ok(header) => header,
            Err(error) => {
                tracing::trace!(%error, "dropped segment");
                return EventResult::Ok;
            }
        };
        let payload = datagram[HEADER_OCTETS as usize..].to_vec();
        let payload_len = payload.len() as u32;
        logging::segment_received_event(&header, payload.len());

        if header.ctl.ack() {
            self.process_ack(header.ackno, header.window);
        }

        let mut respond = false;
        if !payload.is_empty() {
            let window = self.advertised_window();
            match self.incoming.admit(&mut self.rcv, window, header.seqno, payload) {
                Admission::Accepted | Admission::Duplicate => respond = true,
                Admission::OutOfWindow => {
                    tracing::trace!(
                        seqno = header.seqno,
                        "dropped segment outside the receive window"
                    );
                }
            }
        }

        if header.ctl.fin() {
            let fin_seqno = header.seqno.wrapping_add(payload_len);
            if self.fin_recv || seq_lt(fin_seqno, self.rcv.nxt) {
                // A retransmission of a FIN we already consumed; our
                // acknowledgment was lost, so send it again
                respond = true;
            } else if fin_seqno == self.rcv.nxt {
                self.rcv.nxt = self.rcv.nxt.wrapping_add(1);
                self.fin_recv = true;
                respond = true;
            }
            // A FIN past rcv.nxt waits for the missing bytes; the peer's
            // retransmission will bring it back
        }

        self.deliver();

        if respond {
            self.transmit_ack();
        }

        // The acknowledgment may have opened the window for queued segments
        self.pump();

        if self.done() {
            EventResult::Close
        } else {
            EventResult::Ok
        }
    }

    /// The local sink drained and can accept more bytes.
    pub fn on_output(&mut self) -> EventResult {
        let was_closed = self.advertised_window() == 0;
        self.deliver();
        if was_closed && self.advertised_window() > 0 {
            // The peer saw a zero window and may have nothing in flight that
            // would draw an acknowledgment out of us; announce the reopening
            self.transmit_ack();
        }
        if self.done() {
            EventResult::Close
        } else {
            EventResult::Ok
        }
    }

    /// The periodic tick: retransmit lapsed segments and detect an
    /// unresponsive peer.
    pub fn on_timer(&mut self) -> EventResult {
        let rt_timeout = self.cfg.rt_timeout.as_millis() as u64;
        match self.outgoing.sweep(rt_timeout, &mut self.host) {
            SweepResult::Alive => EventResult::Ok,
            SweepResult::PeerUnresponsive => {
                tracing::warn!(
                    attempts = MAX_TRANSMIT_ATTEMPTS,
                    "peer unresponsive, tearing down"
                );
                EventResult::Close
            }
        }
    }

    /// The connection's current place in the shutdown exchange.
    pub fn state(&self) -> State {
        if self.done() {
            return State::Closed;
        }
        match (self.fin_sent.is_some(), self.fin_acked, self.fin_recv) {
            (false, _, false) => State::Established,
            (false, _, true) => State::CloseWait,
            (true, false, false) => State::FinWait1,
            (true, true, false) => State::FinWait2,
            (true, _, true) => State::Closing,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Builds a segment around the payload, stamps it with the next send
    /// sequence number, and queues it unsent.
    fn admit(&mut self, payload: Vec<u8>, fin: bool) {
        let builder = SegmentBuilder::new(self.snd.nxt)
            .ack(self.rcv.nxt)
            .wnd(self.advertised_window());
        let builder = if fin { builder.fin() } else { builder };
        let segment = builder.build(payload);
        self.snd.nxt = self.snd.nxt.wrapping_add(segment.seq_len());
        self.outgoing.push(segment);
    }

    /// Cumulative acknowledgment processing for the send direction.
    fn process_ack(&mut self, ackno: u32, window: u16) {
        // Every acknowledgment refreshes the peer's advertised window, even
        // a duplicate
        self.snd.wnd = window;
        if seq_leq(ackno, self.snd.una) {
            return;
        }
        if seq_gt(ackno, self.snd.nxt) {
            tracing::warn!(ackno, "dropped acknowledgment of bytes never sent");
            return;
        }
        self.outgoing.retire(ackno);
        self.snd.una = ackno;
        if let Some(fin_seqno) = self.fin_sent {
            if ackno == fin_seqno.wrapping_add(1) {
                self.fin_acked = true;
            }
        }
    }

    /// Sends a pure acknowledgment carrying the latest cumulative position
    /// and the current advertised window. Never queued for retransmission.
    fn transmit_ack(&mut self) {
        let segment = SegmentBuilder::new(self.snd.nxt)
            .ack(self.rcv.nxt)
            .wnd(self.advertised_window())
            .build(Vec::new());
        let wire = segment.serialize();
        self.host.send(&wire);
        logging::segment_sent_event(&segment.header, 0);
    }

    /// Drains contiguous reassembled bytes into the sink, then signals EOF
    /// exactly once when the peer's FIN has been consumed and every byte
    /// before it has been delivered.
    fn deliver(&mut self) {
        self.incoming.deliver(&mut self.rcv, &mut self.host);
        if self.fin_recv
            && !self.eof_signaled
            && self.rcv.delivered.wrapping_add(1) == self.rcv.nxt
        {
            self.host.output(&[]);
            self.eof_signaled = true;
        }
    }

    /// Transmits queued segments as far as the effective window allows.
    fn pump(&mut self) {
        let window = self.snd.wnd.min(self.cfg.send_window);
        self.outgoing.pump(self.snd.una, window, &mut self.host);
    }

    /// The window we advertise: the part of the receive buffer not occupied
    /// by bytes awaiting delivery.
    fn advertised_window(&self) -> u16 {
        self.cfg.recv_window.saturating_sub(self.incoming.buffered() as u16)
    }

    /// Both streams are finished: our FIN is out and acknowledged, the
    /// peer's FIN is consumed, and the sink has seen everything including
    /// EOF.
    fn done(&self) -> bool {
        self.fin_sent.is_some()
            && self.fin_acked
            && self.fin_recv
            && self.outgoing.is_empty()
            && self.eof_signaled
    }
}

/// The shutdown exchange, viewed from one endpoint. Without a
/// synchronization handshake the connection begins in ESTABLISHED; the rest
/// of the diagram is the FIN exchange.
///
/// ```text
///                    +-------------+
///                    | ESTABLISHED |
///                    +-------------+
///        local EOF    |           |  rcv FIN
///        snd FIN      |           |  snd ACK
///            +--------+           +--------+
///            V                             V
///      +------------+              +------------+
///      | FIN-WAIT-1 |              | CLOSE-WAIT |
///      +------------+              +------------+
///        |        |                        |
///        | rcv ACK| rcv FIN      local EOF |
///        | of FIN | snd ACK        snd FIN |
///        V        +--------+      +--------+
///  +------------+          V      V
///  | FIN-WAIT-2 |        +---------+
///  +------------+        | CLOSING |
///        |               +---------+
///        | rcv FIN            |  rcv ACK of FIN,
///        | snd ACK            |  all bytes delivered
///        +-------------> +--------+
///                        | CLOSED |
///                        +--------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Both directions open; the normal data transfer state
    Established,
    /// Our FIN is out and unacknowledged; the peer's stream is still open
    FinWait1,
    /// Our FIN is acknowledged; waiting for the peer's FIN
    FinWait2,
    /// The peer's stream ended; ours is still open
    CloseWait,
    /// Both FINs are in motion; waiting for the last acknowledgment or the
    /// last delivery
    Closing,
    /// Fully shut down; the connection should be destroyed
    Closed,
}

/// What the caller should do with the connection after an event.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResult {
    /// The event was processed and the connection lives on
    Ok,
    /// The connection has finished or failed and should be destroyed
    Close,
}
