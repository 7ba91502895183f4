//      1         2          3          4
// ----------|----------|----------|----------
//        SND.UNA    SND.NXT    SND.UNA
//                             +SND.WND
//
// 1 - old sequence numbers which have been acknowledged
// 2 - sequence numbers of unacknowledged data
// 3 - sequence numbers allowed for new data transmission (send window)
// 4 - future sequence numbers which are not yet allowed
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct SendSequenceSpace {
    /// Oldest unacknowledged sequence number
    pub una: u32,
    /// Next sequence number to be assigned to outgoing bytes
    pub nxt: u32,
    /// The size of the remote peer's advertised window
    pub wnd: u16,
}

impl SendSequenceSpace {
    /// The number of sequence numbers currently in flight.
    pub fn in_flight(&self) -> u32 {
        self.nxt.wrapping_sub(self.una)
    }
}

impl Default for SendSequenceSpace {
    fn default() -> Self {
        // The stream starts at byte one; there is no synchronization exchange
        Self {
            una: 1,
            nxt: 1,
            wnd: 0,
        }
    }
}
