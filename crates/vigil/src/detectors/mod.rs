//! Every detector follows the same shape: a sample is compared with the
//! rolling mean of a fixed-length history, and a run of consecutive
//! deviating samples, tracked by a [`Debounce`] shift register, declares an
//! anomaly. Until its history is full a detector is calibrating and never
//! reports anything.

mod history;

/// Proximity badge detector.
pub mod badge;
/// Ambient light detector.
pub mod light;
/// Six-axis motion detector.
pub mod motion;

pub use badge::{BadgeDetector, BadgeEvent, BadgeReader};
pub use history::{Debounce, History};
pub use light::{LightDetector, LightSensor};
pub use motion::{MotionDetector, MotionSample, MotionSensor};

/// Outcome of a single detector sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The history is not full yet.
    Calibrating,
    /// The sample is consistent with the history.
    Quiet,
    /// The sample is physically implausible and was discarded.
    Glitch,
    /// The sample deviates, but not for long enough.
    Deviation,
    /// A sustained deviation: the detector has reset itself.
    Anomaly,
    /// The sensor could not be sampled.
    Unavailable,
}

impl Verdict {
    /// Whether the verdict requests an intrusion response.
    #[must_use]
    pub const fn is_anomaly(self) -> bool {
        matches!(self, Self::Anomaly)
    }
}

pub(crate) const fn abs(value: f32) -> f32 {
    if value < 0.0 { -value } else { value }
}
