use log::{debug, info, warn};

use crate::config::LightThresholds;
use crate::error::Result;

use super::{Debounce, History, Verdict, abs};

/// Samples kept in the light history.
pub const LIGHT_HISTORY_LEN: usize = 10;

/// A source of ambient light levels.
pub trait LightSensor {
    /// Reads the ambient light level.
    ///
    /// # Errors
    ///
    /// Fails when the sensor cannot be read.
    fn sample(&mut self) -> Result<f32>;
}

impl<L: LightSensor + ?Sized> LightSensor for &mut L {
    fn sample(&mut self) -> Result<f32> {
        (**self).sample()
    }
}

/// Detects the enclosure being opened.
///
/// Every sample is calibration data until the history is full. Then a level
/// farther from the rolling mean than the larger of
/// [`LightThresholds::absolute_delta`] and
/// [`LightThresholds::relative_delta`] times the mean, for
/// [`LightThresholds::debounce_run`] consecutive samples, is an anomaly.
#[derive(Debug, Clone)]
pub struct LightDetector {
    thresholds: LightThresholds,
    history: History<f32, LIGHT_HISTORY_LEN>,
    debounce: Debounce,
}

impl LightDetector {
    /// Creates an uncalibrated [`LightDetector`].
    #[must_use]
    pub fn new(thresholds: LightThresholds) -> Self {
        Self {
            thresholds,
            history: History::new(),
            debounce: Debounce::new(thresholds.debounce_run),
        }
    }

    /// Whether calibration is over.
    #[must_use]
    pub const fn is_calibrated(&self) -> bool {
        self.history.is_full()
    }

    /// Rolling mean of the history, once calibrated.
    #[must_use]
    pub fn mean(&self) -> Option<f32> {
        self.history.mean()
    }

    /// Samples `sensor` and judges the level.
    pub fn poll<L: LightSensor + ?Sized>(&mut self, sensor: &mut L) -> Verdict {
        match sensor.sample() {
            Ok(level) => self.observe(level),
            Err(e) => {
                warn!("Cannot sample light: {e}");
                Verdict::Unavailable
            }
        }
    }

    /// Judges a level.
    ///
    /// A non-finite level is a glitch and never enters the history.
    pub fn observe(&mut self, level: f32) -> Verdict {
        if !level.is_finite() {
            debug!("Light glitch {level}");
            if self.is_calibrated() {
                self.debounce.settle();
            }
            return Verdict::Glitch;
        }

        let Some(mean) = self.history.mean() else {
            self.history.push(level);
            if self.history.is_full() {
                info!("Light calibration finished");
            }
            return Verdict::Calibrating;
        };

        let tolerance = self
            .thresholds
            .absolute_delta
            .max(self.thresholds.relative_delta * abs(mean));
        if abs(level - mean) > tolerance {
            if self.debounce.deviate() {
                warn!("Light anomaly, mean {mean}, level {level}");
                self.reset();
                return Verdict::Anomaly;
            }
            debug!("Light deviation {level}");
            return Verdict::Deviation;
        }

        self.debounce.settle();
        self.history.push(level);
        Verdict::Quiet
    }

    /// Forgets the history and starts calibrating again.
    pub fn reset(&mut self) {
        self.history.clear();
        self.debounce.clear();
    }
}
