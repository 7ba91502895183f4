//      1          2          3
// ----------|----------|----------
//     RCV.DELIVERED RCV.NXT
//
// 1 - sequence numbers already handed to the local sink
// 2 - sequence numbers received in order but not yet delivered
// 3 - sequence numbers not yet received in order
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct ReceiveSequenceSpace {
    /// Next sequence number expected on an incoming segment, and the value
    /// carried as the cumulative acknowledgment in every outgoing segment
    pub nxt: u32,
    /// Next sequence number to hand to the local sink. Trails `nxt` while
    /// the sink is backpressured.
    pub delivered: u32,
}

impl Default for ReceiveSequenceSpace {
    fn default() -> Self {
        Self {
            nxt: 1,
            delivered: 1,
        }
    }
}
