//! The registry of live connections and the timer fan-out.

use crate::{
    connection::{Config, Connection, EventResult},
    host::Host,
    logging, FxDashMap,
};
use std::{
    fmt::{self, Display},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::task::JoinHandle;

/// How often the timer sweep runs when the engine drives itself.
const TICK_INTERVAL: Duration = Duration::from_millis(40);

/// Identifies one connection in the engine's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The process-wide collection of live connections.
///
/// Routes the four external events to the connection they belong to, runs
/// the retransmission sweep across all of them on every tick, and destroys
/// connections that finish their shutdown exchange or give up on an
/// unresponsive peer.
#[derive(Debug)]
pub struct Engine<H: Host> {
    connections: FxDashMap<ConnectionId, Connection<H>>,
    next_id: AtomicU64,
}

impl<H: Host> Engine<H> {
    pub fn new() -> Self {
        Self {
            connections: Default::default(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a fresh connection wired to the given collaborators. The
    /// connection is live immediately; there is no handshake.
    pub fn establish(&self, host: H, cfg: Config) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.connections.insert(id, Connection::new(host, cfg));
        id
    }

    /// The number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Routes a source-readable event to a connection.
    pub fn on_read(&self, id: ConnectionId) {
        let result = match self.connections.get_mut(&id) {
            Some(mut connection) => connection.on_read(),
            None => return,
        };
        self.conclude(id, result);
    }

    /// Routes an arriving datagram to a connection.
    pub fn on_receive(&self, id: ConnectionId, datagram: &[u8]) {
        let result = match self.connections.get_mut(&id) {
            Some(mut connection) => connection.on_receive(datagram),
            None => return,
        };
        self.conclude(id, result);
    }

    /// Routes a sink-drained event to a connection.
    pub fn on_output(&self, id: ConnectionId) {
        let result = match self.connections.get_mut(&id) {
            Some(mut connection) => connection.on_output(),
            None => return,
        };
        self.conclude(id, result);
    }

    /// Sweeps every connection's retransmission timer, destroying the ones
    /// that ran out of attempts.
    pub fn on_timer(&self) {
        self.connections.retain(|id, connection| {
            match connection.on_timer() {
                EventResult::Ok => true,
                EventResult::Close => {
                    tracing::warn!(connection = %id, "destroying unresponsive connection");
                    logging::teardown_event(id.0, false);
                    connection.host_mut().closed();
                    false
                }
            }
        });
    }

    /// Removes a connection and fires its host's teardown hook.
    pub fn destroy(&self, id: ConnectionId) {
        if let Some((_, mut connection)) = self.connections.remove(&id) {
            connection.host_mut().closed();
        }
    }

    fn conclude(&self, id: ConnectionId, result: EventResult) {
        if result == EventResult::Close {
            logging::teardown_event(id.0, true);
            self.destroy(id);
        }
    }
}

impl<H: Host + Send + Sync + 'static> Engine<H> {
    /// Spawns the timer driver: a periodic tick that fans the
    /// retransmission sweep out to every live connection, running until the
    /// registry drains. Establish at least one connection first.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(TICK_INTERVAL).await;
                self.on_timer();
                if self.is_empty() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Input;
    use std::collections::VecDeque;
    use std::sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Mutex,
    };

    /// A host whose state lives behind shared handles so the test can watch
    /// it after handing the host to the engine.
    #[derive(Debug, Default, Clone)]
    struct SharedHost {
        now: Arc<AtomicU64>,
        source: Arc<Mutex<VecDeque<u8>>>,
        source_eof: Arc<AtomicBool>,
        wire: Arc<Mutex<VecDeque<Vec<u8>>>>,
        sink: Arc<Mutex<Vec<u8>>>,
        sink_eof: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
    }

    impl Host for SharedHost {
        fn send(&mut self, datagram: &[u8]) -> usize {
            self.wire.lock().unwrap().push_back(datagram.to_vec());
            datagram.len()
        }

        fn input(&mut self, buf: &mut [u8]) -> Input {
            let mut source = self.source.lock().unwrap();
            if source.is_empty() {
                return if self.source_eof.load(SeqCst) {
                    Input::Eof
                } else {
                    Input::Empty
                };
            }
            let count = buf.len().min(source.len());
            for slot in buf[..count].iter_mut() {
                *slot = source.pop_front().unwrap();
            }
            Input::Data(count)
        }

        fn output(&mut self, bytes: &[u8]) -> usize {
            if bytes.is_empty() {
                self.sink_eof.store(true, SeqCst);
                return 0;
            }
            self.sink.lock().unwrap().extend_from_slice(bytes);
            bytes.len()
        }

        fn bufspace(&self) -> usize {
            (1 << 16) - self.sink.lock().unwrap().len()
        }

        fn now(&self) -> u64 {
            self.now.load(SeqCst)
        }

        fn closed(&mut self) {
            self.closed.store(true, SeqCst);
        }
    }

    #[test]
    fn shutdown_exchange_empties_the_registry() {
        let engine = Engine::new();
        let a = SharedHost::default();
        let b = SharedHost::default();
        a.source.lock().unwrap().extend(b"ping");
        a.source_eof.store(true, SeqCst);
        b.source_eof.store(true, SeqCst);

        let a_id = engine.establish(a.clone(), Config::default());
        let b_id = engine.establish(b.clone(), Config::default());
        assert_eq!(engine.len(), 2);

        for _ in 0..10 {
            engine.on_read(a_id);
            engine.on_read(b_id);
            let from_a: Vec<_> = a.wire.lock().unwrap().drain(..).collect();
            for datagram in from_a {
                engine.on_receive(b_id, &datagram);
            }
            let from_b: Vec<_> = b.wire.lock().unwrap().drain(..).collect();
            for datagram in from_b {
                engine.on_receive(a_id, &datagram);
            }
            if engine.is_empty() {
                break;
            }
        }

        assert!(engine.is_empty());
        assert_eq!(&*b.sink.lock().unwrap(), b"ping");
        assert!(b.sink_eof.load(SeqCst));
        assert!(a.closed.load(SeqCst));
        assert!(b.closed.load(SeqCst));
    }

    #[test]
    fn unresponsive_peer_swept_from_registry() {
        let engine = Engine::new();
        let host = SharedHost::default();
        host.source.lock().unwrap().extend(b"x");
        let id = engine.establish(host.clone(), Config::default());
        engine.on_read(id);
        assert_eq!(host.wire.lock().unwrap().len(), 1);

        // Nothing ever answers; every sweep retransmits until the ceiling
        for _ in 0..6 {
            assert!(!engine.is_empty());
            host.now.fetch_add(201, SeqCst);
            engine.on_timer();
        }
        assert!(engine.is_empty());
        assert!(host.closed.load(SeqCst));
    }

    #[test]
    fn destroy_fires_the_host_hook() {
        let engine = Engine::new();
        let host = SharedHost::default();
        let id = engine.establish(host.clone(), Config::default());
        engine.destroy(id);
        assert!(engine.is_empty());
        assert!(host.closed.load(SeqCst));

        // Late events for a destroyed connection are ignored
        engine.on_read(id);
        engine.on_output(id);
        engine.on_receive(id, &[0; 4]);
    }
}
