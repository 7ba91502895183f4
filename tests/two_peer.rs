//! Two engines wired back-to-back over an in-memory datagram link, driven
//! the way a real client would drive them: the tokio timer task handles
//! retransmission while the test shuttles datagrams and polls the read and
//! output events.

use ctcp::{Config, Engine, Host, Input};
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering::SeqCst},
    Arc, Mutex,
};
use std::time::{Duration, Instant};

/// A host backed by shared queues, so the test keeps a handle to the state
/// it gave away to the engine. The clock is the real one.
#[derive(Debug, Clone)]
struct ChannelHost {
    start: Instant,
    source: Arc<Mutex<VecDeque<u8>>>,
    source_eof: Arc<AtomicBool>,
    wire: Arc<Mutex<VecDeque<Vec<u8>>>>,
    sink: Arc<Mutex<Vec<u8>>>,
    sink_eof: Arc<AtomicBool>,
}

impl ChannelHost {
    fn new(start: Instant) -> Self {
        Self {
            start,
            source: Default::default(),
            source_eof: Default::default(),
            wire: Default::default(),
            sink: Default::default(),
            sink_eof: Default::default(),
        }
    }

    fn feed(&self, bytes: &[u8]) {
        self.source.lock().unwrap().extend(bytes.iter().cloned());
    }

    fn close_source(&self) {
        self.source_eof.store(true, SeqCst);
    }

    fn drain_wire(&self) -> Vec<Vec<u8>> {
        self.wire.lock().unwrap().drain(..).collect()
    }

    fn sink(&self) -> Vec<u8> {
        self.sink.lock().unwrap().clone()
    }

    fn sink_eof(&self) -> bool {
        self.sink_eof.load(SeqCst)
    }
}

impl Host for ChannelHost {
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
        self.start.elapsed().as_millis() as u64
    }
}

#[tokio::test]
async fn clean_bidirectional_exchange() {
    let start = Instant::now();
    let a = ChannelHost::new(start);
    let b = ChannelHost::new(start);
    a.feed(b"request bytes");
    a.close_source();
    b.feed(b"response bytes");
    b.close_source();

    let engine_a = Arc::new(Engine::new());
    let engine_b = Arc::new(Engine::new());
    let a_id = engine_a.establish(a.clone(), Config::default());
    let b_id = engine_b.establish(b.clone(), Config::default());
    let timer_a = engine_a.clone().start();
    let timer_b = engine_b.clone().start();

    while !(engine_a.is_empty() && engine_b.is_empty())
        && start.elapsed() < Duration::from_secs(10)
    {
        engine_a.on_read(a_id);
        engine_b.on_read(b_id);
        for datagram in a.drain_wire() {
            engine_b.on_receive(b_id, &datagram);
        }
        for datagram in b.drain_wire() {
            engine_a.on_receive(a_id, &datagram);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(engine_a.is_empty(), "peer A never finished its shutdown");
    assert!(engine_b.is_empty(), "peer B never finished its shutdown");
    assert_eq!(a.sink(), b"response bytes");
    assert_eq!(b.sink(), b"request bytes");
    assert!(a.sink_eof());
    assert!(b.sink_eof());

    timer_a.await.unwrap();
    timer_b.await.unwrap();
}

#[tokio::test]
async fn lossy_link_delivers_everything() {
    ctcp::init_events();

    let expected: Vec<u8> = (0..20_000).map(|i| (i % 251) as u8).collect();
    let start = Instant::now();
    let a = ChannelHost::new(start);
    let b = ChannelHost::new(start);
    a.feed(&expected);
    a.close_source();
    b.close_source();

    let engine_a = Arc::new(Engine::new());
    let engine_b = Arc::new(Engine::new());
    let a_id = engine_a.establish(a.clone(), Config::default());
    let b_id = engine_b.establish(b.clone(), Config::default());
    let timer_a = engine_a.clone().start();
    let timer_b = engine_b.clone().start();

    // The link swallows every fourth datagram, counted across both
    // directions, so no segment can lose all of its transmission attempts
    let mut counter = 0u64;
    let mut lossy = |datagram: Vec<u8>| {
        counter += 1;
        (counter % 4 != 0).then_some(datagram)
    };

    while !(engine_a.is_empty() && engine_b.is_empty())
        && start.elapsed() < Duration::from_secs(30)
    {
        engine_a.on_read(a_id);
        engine_b.on_read(b_id);
        engine_b.on_output(b_id);
        for datagram in a.drain_wire().into_iter().filter_map(&mut lossy) {
            engine_b.on_receive(b_id, &datagram);
        }
        for datagram in b.drain_wire().into_iter().filter_map(&mut lossy) {
            engine_a.on_receive(a_id, &datagram);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(engine_a.is_empty(), "peer A never finished its shutdown");
    assert!(engine_b.is_empty(), "peer B never finished its shutdown");
    assert_eq!(b.sink(), expected);
    assert!(b.sink_eof());

    timer_a.await.unwrap();
    timer_b.await.unwrap();
}
