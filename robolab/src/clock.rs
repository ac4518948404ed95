//! Wall-clock sources for timing level attempts.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Monotonic seconds since an arbitrary origin.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Real time, measured from when the clock was created.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to. Clones share the same time, so a
/// caller can keep one handle and give another to the session.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    seconds: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: f64) {
        self.seconds.set(self.seconds.get() + seconds);
    }

    pub fn set(&self, seconds: f64) {
        self.seconds.set(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.seconds.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clones_share_time() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance(1.5);
        handle.advance(0.25);
        assert_eq!(clock.now(), 1.75);
        clock.set(10.0);
        assert_eq!(handle.now(), 10.0);
    }

    #[test]
    fn system_clock_never_runs_backwards() {
        let clock = SystemClock::new();
        let first = clock.now();
        assert!(clock.now() >= first);
    }
}
