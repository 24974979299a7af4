//! Shared monotonic time base

use std::time::{Duration, Instant};

/// Seconds since a common origin.
///
/// Every detector and the board exchange timestamps as `f64` seconds from one
/// clock, so workers started at different moments agree on "now".
#[derive(Debug, Clone, Copy)]
pub struct ShowClock {
    origin: Instant,
}

impl ShowClock {
    /// Clock starting at zero now
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Seconds elapsed since the origin
    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    /// Timestamp of an instant taken from this clock's timeline
    pub fn at(&self, instant: Instant) -> f64 {
        instant
            .checked_duration_since(self.origin)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64()
    }
}

impl Default for ShowClock {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = ShowClock::start();
        let a = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        let b = clock.now();
        assert!(a >= 0.0);
        assert!(b > a);
    }

    #[test]
    fn test_instants_before_origin_clamp_to_zero() {
        let before = Instant::now();
        let clock = ShowClock::start();
        assert_eq!(clock.at(before), 0.0);
        assert!(clock.at(Instant::now()) >= 0.0);
    }
}
