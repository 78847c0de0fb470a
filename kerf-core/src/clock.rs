//! Millisecond tick arithmetic
//!
//! Time is a free-running `u32` millisecond counter that wraps after about
//! 49 days. Comparisons go through these helpers so wrap-around is handled
//! in one place.

/// Milliseconds elapsed from `then` to `now`
#[inline]
pub fn since(now_ms: u32, then_ms: u32) -> u32 {
    now_ms.wrapping_sub(then_ms)
}

/// Check whether `deadline_ms` has been reached
///
/// Valid while the deadline is less than ~24 days away.
#[inline]
pub fn reached(now_ms: u32, deadline_ms: u32) -> bool {
    (now_ms.wrapping_sub(deadline_ms) as i32) >= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reached_across_wrap() {
        let deadline = 50u32;
        assert!(!reached(u32::MAX - 10, deadline));
        assert!(!reached(49, deadline));
        assert!(reached(50, deadline));
        assert!(reached(51, deadline));
    }

    #[test]
    fn test_since_across_wrap() {
        assert_eq!(since(5, u32::MAX - 4), 10);
        assert_eq!(since(100, 40), 60);
    }
}
