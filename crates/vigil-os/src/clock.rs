use std::time::{Duration, Instant};

use vigil::clock::Clock;

// Sleep of a cooperative pause.
const PAUSE: Duration = Duration::from_millis(1);

/// A [`Clock`] counting milliseconds since its creation.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a [`SystemClock`] starting at zero.
    #[must_use]
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
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn pause(&self) {
        std::thread::sleep(PAUSE);
    }
}
