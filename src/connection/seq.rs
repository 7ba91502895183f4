//! Sequence number comparisons modulo 2^32.
//!
//! Sequence numbers are 1-based byte offsets into the stream and wrap around
//! after 4 GiB. Ordering is decided by the sign of the wrapping difference,
//! which is well defined as long as the compared numbers are within 2^31 of
//! each other, far beyond any window this protocol permits.

/// a < b under modular arithmetic
pub fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// a <= b under modular arithmetic
pub fn seq_leq(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) <= 0
}

/// a > b under modular arithmetic
pub fn seq_gt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modular_comparison() {
        assert!(seq_lt(10, 20));
        assert!(!seq_lt(20, 10));
        assert!(seq_lt(2_000_000_000, 3_000_000_000));
        assert!(!seq_lt(3_000_000_000, 2_000_000_000));
        assert!(seq_lt(3_000_000_000, 4_000_000_000));
        assert!(!seq_lt(4_000_000_000, 3_000_000_000));

        assert!(!seq_lt(5, 5));
        assert!(seq_leq(5, 5));

        assert!(seq_gt(20, 10));
        assert!(!seq_gt(5, 5));

        // Comparisons hold across the wrap point
        assert!(seq_lt(u32::MAX - 5, 5));
        assert!(seq_gt(5, u32::MAX - 5));
        assert!(seq_leq(u32::MAX, 0));
    }
}
