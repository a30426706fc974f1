//! Sequence numbers are u32 and wrap; two numbers compare by their signed
//! distance, which stays correct while they are less than 2^31 apart.

/// Signed distance from `b` to `a`.
#[inline]
pub fn sequence_diff(a: u32, b: u32) -> i32 {
    a.wrapping_sub(b) as i32
}

/// Compares sequence numbers with wrapping arithmetic.
#[inline]
pub fn sequence_greater_than(a: u32, b: u32) -> bool {
    sequence_diff(a, b) > 0
}

/// Compares sequence numbers with wrapping arithmetic.
#[inline]
pub fn sequence_less_than(a: u32, b: u32) -> bool {
    sequence_diff(a, b) < 0
}
