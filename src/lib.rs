//! A reliable, connection-oriented byte-stream transport layered atop an
//! unreliable datagram service.
//!
//! The crate delivers ordered, deduplicated, integrity-checked bytes between
//! two peers and tears each connection down cleanly when both ends signal
//! end-of-stream. Reliability comes from cumulative acknowledgments and
//! per-segment retransmission; ordering from a sequence-numbered reassembly
//! buffer; integrity from a one's-complement checksum over every segment;
//! and flow control from the advertised receive window. Congestion control,
//! stream multiplexing, and encryption are out of scope.
//!
//! # Organization
//!
//! - [`segment`] implements the wire codec
//! - [`connection`] implements the per-connection protocol state machine
//! - [`engine`] owns the registry of live connections and the timer fan-out
//! - [`host`] is the seam to the datagram link, the local byte source and
//!   sink, and the clock
//!
//! # Structure
//!
//! [`Connection`] and [`Engine`] work closely together. A connection holds
//! the state of one open byte stream: its send and receive windows, the
//! retransmission queue, and the reassembly buffer. The engine creates
//! connections, routes external events to them, fans the periodic timer
//! tick out across all of them, and destroys them when their shutdown
//! exchange completes or their peer stops responding. Everything a
//! connection needs from the outside world arrives through its [`Host`], so
//! endpoints can just as easily be wired back-to-back in memory as run over
//! a real datagram socket.

pub mod segment;

pub mod utility;

pub mod host;
pub use host::{Host, Input};

pub mod connection;
pub use connection::{Config, Connection, EventResult, State, MAX_SEG_DATA_SIZE};

pub mod engine;
pub use engine::{ConnectionId, Engine};

mod logging;
pub use logging::init_events;

use dashmap::DashMap;
use std::hash::BuildHasherDefault;
pub type FxDashMap<K, V> = DashMap<K, V, BuildHasherDefault<rustc_hash::FxHasher>>;
