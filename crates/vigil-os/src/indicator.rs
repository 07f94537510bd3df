use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use vigil::response::Indicator;

// Sysfs LED brightness values.
const LED_ON: &str = "1";
const LED_OFF: &str = "0";

/// An [`Indicator`] driving an optional sysfs LED.
///
/// Without an LED, state changes are only logged.
#[derive(Debug)]
pub struct LedIndicator {
    brightness: Option<PathBuf>,
    half_period: Duration,
    on: AtomicBool,
}

impl LedIndicator {
    /// Creates a [`LedIndicator`] for the LED directory `led`, for example
    /// `/sys/class/leds/status`.
    #[must_use]
    pub fn new(led: Option<&Path>, blink_ms: u64) -> Self {
        Self {
            brightness: led.map(|led| led.join("brightness")),
            half_period: Duration::from_millis(blink_ms),
            on: AtomicBool::new(false),
        }
    }

    /// Whether the indicator is on.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }

    fn write(&self, on: bool) {
        if let Some(brightness) = &self.brightness {
            let value = if on { LED_ON } else { LED_OFF };
            if let Err(e) = std::fs::write(brightness, value) {
                warn!("Cannot drive LED {}: {e}", brightness.display());
            }
        }
    }
}

impl Indicator for LedIndicator {
    fn set(&self, on: bool) {
        info!("Indicator {}", if on { "on" } else { "off" });
        self.on.store(on, Ordering::Release);
        self.write(on);
    }

    fn blink(&self, times: u8) {
        debug!("Indicator blinking {times} times");
        let restore = self.is_on();
        for _ in 0..times {
            self.write(!restore);
            std::thread::sleep(self.half_period);
            self.write(restore);
            std::thread::sleep(self.half_period);
        }
    }
}

#[cfg(test)]
mod tests {
    use vigil::response::Indicator;

    use super::LedIndicator;

    #[test]
    fn without_led() {
        let indicator = LedIndicator::new(None, 0);
        assert!(!indicator.is_on());
        indicator.set(true);
        assert!(indicator.is_on());
        indicator.blink(2);
        assert!(indicator.is_on());
    }

    #[test]
    fn sysfs_led() {
        let dir = tempfile::tempdir().unwrap();
        let indicator = LedIndicator::new(Some(dir.path()), 0);
        let brightness = dir.path().join("brightness");

        indicator.set(true);
        assert_eq!(std::fs::read_to_string(&brightness).unwrap(), "1");

        indicator.blink(1);
        assert_eq!(std::fs::read_to_string(&brightness).unwrap(), "1");

        indicator.set(false);
        assert_eq!(std::fs::read_to_string(&brightness).unwrap(), "0");
    }
}
