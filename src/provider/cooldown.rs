// src/provider/cooldown.rs
// Time-boxed backoff state keyed by backend identity.
//
// One tracker is owned by one gateway and shared by every invocation passing
// through it; reads and writes go through a lock so concurrent invocations
// cannot race a cooldown into the past. The clock is injectable so tests can
// move time instead of sleeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

pub struct CooldownTracker {
    window: Duration,
    until: Mutex<HashMap<String, Instant>>,
    clock: Arc<dyn Clock>,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            until: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Starts (or restarts) the cooldown window for a backend.
    pub fn begin(&self, backend_id: &str) {
        let deadline = self.clock.now() + self.window;
        self.until
            .lock()
            .expect("cooldown lock poisoned")
            .insert(backend_id.to_string(), deadline);
    }

    pub fn is_cooling(&self, backend_id: &str) -> bool {
        self.remaining(backend_id).is_some()
    }

    /// Time left in the backend's cooldown, if one is active. Expired entries
    /// are dropped on read.
    pub fn remaining(&self, backend_id: &str) -> Option<Duration> {
        let now = self.clock.now();
        let mut until = self.until.lock().expect("cooldown lock poisoned");
        match until.get(backend_id) {
            Some(&deadline) if deadline > now => Some(deadline - now),
            Some(_) => {
                until.remove(backend_id);
                None
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ManualClock {
        base: Instant,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }
    }

    #[test]
    fn cooldown_expires_after_window() {
        let clock = Arc::new(ManualClock::new());
        let tracker = CooldownTracker::with_clock(Duration::from_secs(60), clock.clone());

        assert!(!tracker.is_cooling("anthropic"));
        tracker.begin("anthropic");
        assert!(tracker.is_cooling("anthropic"));

        clock.advance(Duration::from_secs(59));
        assert!(tracker.is_cooling("anthropic"));

        clock.advance(Duration::from_secs(2));
        assert!(!tracker.is_cooling("anthropic"));
    }

    #[test]
    fn cooldowns_are_per_backend() {
        let tracker = CooldownTracker::new(Duration::from_secs(60));
        tracker.begin("anthropic");
        assert!(tracker.is_cooling("anthropic"));
        assert!(!tracker.is_cooling("openai"));
    }

    #[test]
    fn begin_restarts_the_window() {
        let clock = Arc::new(ManualClock::new());
        let tracker = CooldownTracker::with_clock(Duration::from_secs(60), clock.clone());

        tracker.begin("anthropic");
        clock.advance(Duration::from_secs(45));
        tracker.begin("anthropic");
        clock.advance(Duration::from_secs(30));
        assert!(tracker.is_cooling("anthropic"));
    }
}
