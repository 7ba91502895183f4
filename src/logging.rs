//! Contains basic logging functions.

use crate::segment::SegmentHeader;
use std::fs::{create_dir_all, OpenOptions};
use std::sync::Arc;
use tracing::{event, Level};
use tracing_subscriber::FmtSubscriber;

/// Logging holds wrapper functions for logging protocol events. Each function
/// corresponds to a type of event (segment sent, segment received, teardown).
/// These functions are meant to be called from inside the connection engine.

/// Initializes event logging. Should only be called once, when the client
/// starts. Installs a JSON subscriber writing to a timestamped file under
/// ./logs so every `event!` in the engine lands in the same place. Without
/// this call the events are simply discarded, which is what tests want.
pub fn init_events() {
    let main_path = "./logs";
    match create_dir_all(main_path) {
        Ok(dir) => dir,
        Err(error) => panic!("Error: {error:?}"),
    };
    let file_path = format!(
        "{}/debug-{}.log",
        main_path,
        chrono::offset::Local::now().format("%y-%m-%d_%H-%M-%S")
    );
    let file = OpenOptions::new().append(true).create(true).open(file_path);
    let file = match file {
        Ok(file) => file,
        Err(error) => panic!("Error: {error:?}"),
    };
    let subscriber = FmtSubscriber::builder()
        .with_writer(Arc::new(file))
        .json()
        .finish();
    // Set the global default so all events go to the same subscriber and
    // subsequently the same file
    match tracing::subscriber::set_global_default(subscriber) {
        Ok(sub) => sub,
        Err(error) => println!("{error:?}"),
    };
}

/// Segment transmission event handler. Captures the header fields and the
/// payload length of every segment put on the wire, first sends and
/// retransmissions alike.
pub fn segment_sent_event(header: &SegmentHeader, payload_len: usize) {
    event!(
        target: "SEND_SEGMENT",
        Level::INFO,
        seqno = header.seqno,
        ackno = header.ackno,
        len = header.len,
        flags = format!("{:#010x}", u32::from(header.ctl)),
        window = header.window,
        payload_len = payload_len
    );
}

/// Segment arrival event handler. Captures the header fields of every
/// segment that survived checksum verification.
pub fn segment_received_event(header: &SegmentHeader, payload_len: usize) {
    event!(
        target: "RECV_SEGMENT",
        Level::INFO,
        seqno = header.seqno,
        ackno = header.ackno,
        len = header.len,
        flags = format!("{:#010x}", u32::from(header.ctl)),
        window = header.window,
        payload_len = payload_len
    );
}

/// Connection teardown event handler. `orderly` distinguishes a completed
/// shutdown handshake from an abortive teardown of an unresponsive peer.
pub fn teardown_event(id: u64, orderly: bool) {
    event!(target: "TEARDOWN", Level::INFO, connection = id, orderly = orderly);
}
