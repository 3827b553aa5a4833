//! Monotonic presentation clock
//!
//! Presentation timestamps are raw monotonic nanosecond ticks; the encoder
//! time base is set to the tick period so no rescaling happens per frame.

use std::sync::OnceLock;
use std::time::Instant;

/// Tick period of [`now_ticks`] as a (numerator, denominator) rational
pub const TIME_BASE: (i32, i32) = (1, 1_000_000_000);

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Current monotonic tick count (nanoseconds since the process clock origin)
pub fn now_ticks() -> i64 {
    let origin = ORIGIN.get_or_init(Instant::now);
    i64::try_from(origin.elapsed().as_nanos()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_are_monotonic() {
        let a = now_ticks();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = now_ticks();
        assert!(b > a);
        assert!(b - a >= 1_000_000);
    }
}
