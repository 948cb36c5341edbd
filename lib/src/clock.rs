//! Wall-clock and monotonic time sources.
//!
//! Statistics replies carry wall-clock timestamps (operators correlate them
//! with packet captures); scheduler bookkeeping uses the monotonic clock so
//! NTP steps cannot run time backwards under a worker.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use spin::Once;

static START: Once<Instant> = Once::new();

/// Seconds since the Unix epoch as a double, microsecond-ish precision.
pub fn epoch_now() -> f64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        // Clock set before 1970: report zero rather than panic.
        Err(_) => 0.0,
    }
}

/// Monotonic nanoseconds since the first call in this process.
pub fn monotonic_ns() -> u64 {
    let start = *START.call_once(Instant::now);
    start.elapsed().as_nanos() as u64
}
