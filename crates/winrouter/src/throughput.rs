use std::{num::NonZeroU32, thread};

use governor::{Quota, clock::Clock, clock::DefaultClock};

pub type Limiter = governor::DefaultDirectRateLimiter;

/// Builds a per-second item-rate limiter for the root sender (§4.6 step 2,
/// §6 `throughput_limit`). Returns `None` when unconfigured, in which case
/// the sender runs unthrottled.
pub fn build_limiter(samples_per_sec: Option<u32>) -> Option<Limiter> {
    let rate = NonZeroU32::new(samples_per_sec?)?;
    Some(governor::RateLimiter::direct(Quota::per_second(rate)))
}

/// Blocks the caller until the limiter admits one more unit.
pub fn throttle(limiter: &Limiter) {
    loop {
        match limiter.check() {
            Ok(()) => return,
            Err(not_until) => {
                thread::sleep(not_until.wait_time_from(DefaultClock::default().now()));
            }
        }
    }
}
