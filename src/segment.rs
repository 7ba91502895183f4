//! The segment codec: wire layout, flag bits, serialization, and checksummed
//! parsing.
//!
//! A segment is an 18-octet header followed by zero or more payload bytes.
//! All multi-byte fields are big-endian. The `len` field counts the header
//! and the payload together, and `cksum` is the one's-complement Internet
//! checksum over the whole segment with the checksum field taken as zero.

use crate::utility::Checksum;
use thiserror::Error as ThisError;

/// The number of bytes in a segment header
pub const HEADER_OCTETS: u16 = 18;

/// Represents a segment header, either one that was parsed or one we are
/// going to serialize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Byte offset of the first payload byte, or of the next byte to be sent
    /// for pure control segments
    pub seqno: u32,
    /// Next in-order byte offset expected from the peer
    pub ackno: u32,
    /// Total segment length, header included
    pub len: u16,
    /// Control bits
    pub ctl: Flags,
    /// Payload bytes the sender is currently willing to receive
    pub window: u16,
    /// The checksum carried in the header
    pub checksum: u16,
}

impl SegmentHeader {
    /// Parses a segment header from an iterator over the datagram's bytes,
    /// accumulating the checksum as it goes. `datagram_len` is the number of
    /// bytes the datagram actually carried.
    pub fn from_bytes(
        mut bytes: impl Iterator<Item = u8>,
        datagram_len: usize,
    ) -> Result<Self, ParseError> {
        let mut next = || -> Result<u8, ParseError> { bytes.next().ok_or(ParseError::HeaderTooShort) };
        let mut checksum = Checksum::new();

        let seqno_bytes = [next()?, next()?, next()?, next()?];
        let seqno = u32::from_be_bytes(seqno_bytes);
        checksum.add_u32(seqno_bytes);

        let ackno_bytes = [next()?, next()?, next()?, next()?];
        let ackno = u32::from_be_bytes(ackno_bytes);
        checksum.add_u32(ackno_bytes);

        let len = u16::from_be_bytes([next()?, next()?]);
        checksum.add_u16(len);

        let flags_bytes = [next()?, next()?, next()?, next()?];
        let ctl = Flags::from(u32::from_be_bytes(flags_bytes));
        checksum.add_u32(flags_bytes);

        let window = u16::from_be_bytes([next()?, next()?]);
        checksum.add_u16(window);

        // The checksum field itself is taken as zero while summing
        let expected_checksum = u16::from_be_bytes([next()?, next()?]);

        checksum.accumulate_remainder(&mut bytes);

        if (len as usize) != datagram_len || len < HEADER_OCTETS {
            Err(ParseError::LengthMismatch)?
        }

        if ctl.reserved() != 0 {
            Err(ParseError::ReservedFlags)?
        }

        let actual_checksum = checksum.as_u16();
        if actual_checksum != expected_checksum {
            Err(ParseError::Checksum {
                actual: actual_checksum,
                expected: expected_checksum,
            })?
        }

        Ok(Self {
            seqno,
            ackno,
            len,
            ctl,
            window,
            checksum: expected_checksum,
        })
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("Too few bytes to constitute a segment header")]
    HeaderTooShort,
    #[error("The segment length field disagrees with the bytes received")]
    LengthMismatch,
    #[error(
        "The computed checksum {actual:#06x} did not match the header checksum {expected:#06x}"
    )]
    Checksum { actual: u16, expected: u16 },
    #[error("Reserved flag bits were set")]
    ReservedFlags,
}

/// The segment control bits. `ACK` and `FIN` are the only assigned bits; the
/// rest of the field is reserved and must be zero on the wire.
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Flags(u32);

impl Flags {
    const ACK: u32 = 0x10;
    const FIN: u32 = 0x01;

    pub fn new(ack: bool, fin: bool) -> Self {
        Self(ack as u32 * Self::ACK | fin as u32 * Self::FIN)
    }

    /// Acknowledgment field significant
    pub fn ack(&self) -> bool {
        self.0 & Self::ACK != 0
    }

    /// No more data from sender
    pub fn fin(&self) -> bool {
        self.0 & Self::FIN != 0
    }

    /// The value of the reserved bits, which must be zero
    pub fn reserved(&self) -> u32 {
        self.0 & !(Self::ACK | Self::FIN)
    }
}

impl From<u32> for Flags {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

impl From<Flags> for u32 {
    fn from(ctl: Flags) -> Self {
        ctl.0
    }
}

/// A header paired with its value-owned payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: SegmentHeader,
    pub payload: Vec<u8>,
}

impl Segment {
    pub fn new(header: SegmentHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    /// The number of sequence numbers the segment occupies. A FIN consumes
    /// one sequence number on top of the payload.
    pub fn seq_len(&self) -> u32 {
        self.payload.len() as u32 + self.header.ctl.fin() as u32
    }

    /// The sequence number just past this segment.
    pub fn seq_end(&self) -> u32 {
        self.header.seqno.wrapping_add(self.seq_len())
    }

    /// Serializes the segment for the wire, computing and patching in the
    /// checksum. Serializing the same segment twice yields identical bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let header = self.header;
        let flags: u32 = header.ctl.into();

        let mut checksum = Checksum::new();
        checksum.add_u32(header.seqno.to_be_bytes());
        checksum.add_u32(header.ackno.to_be_bytes());
        checksum.add_u16(header.len);
        checksum.add_u32(flags.to_be_bytes());
        checksum.add_u16(header.window);
        checksum.accumulate_remainder(&mut self.payload.iter().cloned());

        let mut out = Vec::with_capacity(header.len as usize);
        out.extend_from_slice(&header.seqno.to_be_bytes());
        out.extend_from_slice(&header.ackno.to_be_bytes());
        out.extend_from_slice(&header.len.to_be_bytes());
        out.extend_from_slice(&flags.to_be_bytes());
        out.extend_from_slice(&header.window.to_be_bytes());
        out.extend_from_slice(&checksum.as_u16().to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Assembles outgoing segments field by field, in the order the connection
/// state machine knows them.
#[derive(Debug, Clone, Copy)]
pub struct SegmentBuilder {
    seqno: u32,
    ackno: u32,
    ack: bool,
    fin: bool,
    window: u16,
}

impl SegmentBuilder {
    pub fn new(seqno: u32) -> Self {
        Self {
            seqno,
            ackno: 0,
            ack: false,
            fin: false,
            window: 0,
        }
    }

    pub fn ack(mut self, ackno: u32) -> Self {
        self.ack = true;
        self.ackno = ackno;
        self
    }

    pub fn fin(mut self) -> Self {
        self.fin = true;
        self
    }

    pub fn wnd(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    pub fn build(self, payload: Vec<u8>) -> Segment {
        let header = SegmentHeader {
            seqno: self.seqno,
            ackno: self.ackno,
            len: HEADER_OCTETS + payload.len() as u16,
            ctl: Flags::new(self.ack, self.fin),
            window: self.window,
            checksum: 0,
        };
        Segment::new(header, payload)
    }
}
