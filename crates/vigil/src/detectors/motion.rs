use log::{debug, info, warn};

use crate::config::MotionThresholds;
use crate::error::Result;

use super::{Debounce, History, Verdict, abs};

/// Samples kept in the motion history.
pub const MOTION_HISTORY_LEN: usize = 10;

/// A six-axis motion sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionSample {
    /// Angular velocity around x, y and z, in rad/s.
    pub gyro: [f32; 3],
    /// Acceleration along x, y and z, in m/s².
    pub accel: [f32; 3],
}

impl MotionSample {
    /// Creates a [`MotionSample`].
    #[must_use]
    pub const fn new(gyro: [f32; 3], accel: [f32; 3]) -> Self {
        Self { gyro, accel }
    }

    const fn axes(self) -> [f32; 6] {
        let [gx, gy, gz] = self.gyro;
        let [ax, ay, az] = self.accel;
        [gx, gy, gz, ax, ay, az]
    }

    const fn from_axes(axes: [f32; 6]) -> Self {
        let [gx, gy, gz, ax, ay, az] = axes;
        Self::new([gx, gy, gz], [ax, ay, az])
    }
}

/// A source of motion samples.
pub trait MotionSensor {
    /// Reads a sample.
    ///
    /// # Errors
    ///
    /// Fails when the sensor cannot be read.
    fn sample(&mut self) -> Result<MotionSample>;
}

impl<M: MotionSensor + ?Sized> MotionSensor for &mut M {
    fn sample(&mut self) -> Result<MotionSample> {
        (**self).sample()
    }
}

/// Detects the device being moved.
///
/// The detector first calibrates: it collects
/// [`MOTION_HISTORY_LEN`] consecutive samples of a device at rest, i.e. with
/// gravity visible on some axis and no rotation. Afterwards, an acceleration
/// axis drifting away from its rolling mean for
/// [`MotionThresholds::debounce_run`] consecutive samples is an anomaly.
/// After an anomaly the detector calibrates again.
#[derive(Debug, Clone)]
pub struct MotionDetector {
    thresholds: MotionThresholds,
    history: History<[f32; 6], MOTION_HISTORY_LEN>,
    debounce: Debounce,
    calibrated: bool,
}

impl MotionDetector {
    /// Creates an uncalibrated [`MotionDetector`].
    #[must_use]
    pub fn new(thresholds: MotionThresholds) -> Self {
        Self {
            thresholds,
            history: History::new(),
            debounce: Debounce::new(thresholds.debounce_run),
            calibrated: false,
        }
    }

    /// Whether calibration is over.
    #[must_use]
    pub const fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Rolling mean of the history, once calibrated.
    #[must_use]
    pub fn mean(&self) -> Option<MotionSample> {
        self.history.mean().map(MotionSample::from_axes)
    }

    /// Samples `sensor` and judges the sample.
    pub fn poll<M: MotionSensor + ?Sized>(&mut self, sensor: &mut M) -> Verdict {
        match sensor.sample() {
            Ok(sample) => self.observe(sample),
            Err(e) => {
                warn!("Cannot sample motion: {e}");
                Verdict::Unavailable
            }
        }
    }

    /// Judges a sample.
    ///
    /// A sample with a non-finite axis is a glitch and never enters the
    /// history.
    pub fn observe(&mut self, sample: MotionSample) -> Verdict {
        if !sample.axes().iter().all(|axis| axis.is_finite()) {
            debug!("Motion glitch {sample:?}");
            if self.calibrated {
                self.debounce.settle();
            }
            return Verdict::Glitch;
        }

        if !self.calibrated {
            return self.calibrate(sample);
        }

        let Some(mean) = self.history.mean() else {
            self.calibrated = false;
            return Verdict::Calibrating;
        };

        if self.is_glitch(&sample) {
            debug!("Motion glitch {sample:?}");
            self.debounce.settle();
            return Verdict::Glitch;
        }

        if self.deviates(&sample, &mean) {
            if self.debounce.deviate() {
                warn!("Motion anomaly, mean {mean:?}, sample {sample:?}");
                self.reset();
                return Verdict::Anomaly;
            }
            debug!("Motion deviation {sample:?}");
            return Verdict::Deviation;
        }

        self.debounce.settle();
        self.history.push(sample.axes());
        Verdict::Quiet
    }

    /// Forgets the history and starts calibrating again.
    pub fn reset(&mut self) {
        self.history.clear();
        self.debounce.clear();
        self.calibrated = false;
    }

    fn calibrate(&mut self, sample: MotionSample) -> Verdict {
        if self.is_at_rest(&sample) {
            self.history.push(sample.axes());
            if self.history.is_full() {
                self.calibrated = true;
                info!("Motion calibration finished");
            }
        } else if !self.history.is_empty() {
            debug!("Motion calibration restarted");
            self.history.clear();
        }
        Verdict::Calibrating
    }

    fn is_at_rest(&self, sample: &MotionSample) -> bool {
        let thresholds = &self.thresholds;
        let gravity = sample
            .accel
            .iter()
            .any(|a| abs(*a) >= thresholds.rest_gravity_min);
        let bounded = sample
            .accel
            .iter()
            .all(|a| abs(*a) <= thresholds.rest_accel_max);
        let still = sample
            .gyro
            .iter()
            .all(|g| abs(*g) <= thresholds.rest_gyro_max);
        gravity && bounded && still
    }

    fn is_glitch(&self, sample: &MotionSample) -> bool {
        sample
            .accel
            .iter()
            .all(|a| abs(*a) < self.thresholds.glitch_floor)
            || sample
                .accel
                .iter()
                .any(|a| abs(*a) > self.thresholds.glitch_ceiling)
    }

    fn deviates(&self, sample: &MotionSample, mean: &[f32; 6]) -> bool {
        let mean = MotionSample::from_axes(*mean);
        let accel = sample
            .accel
            .iter()
            .zip(mean.accel)
            .any(|(a, m)| abs(a - m) > self.thresholds.accel_delta);
        let gyro = self.thresholds.gyro_delta.is_some_and(|delta| {
            sample
                .gyro
                .iter()
                .zip(mean.gyro)
                .any(|(g, m)| abs(g - m) > delta)
        });
        accel || gyro
    }
}

#[cfg(test)]
mod tests {
    use crate::config::MotionThresholds;
    use crate::detectors::Verdict;
    use crate::error::{Error, Result};

    use super::{MOTION_HISTORY_LEN, MotionDetector, MotionSample, MotionSensor};

    const REST: MotionSample = MotionSample::new([0.01, -0.02, 0.0], [0.1, 0.2, 9.8]);
    const SHAKEN: MotionSample = MotionSample::new([0.01, -0.02, 0.0], [1.5, 0.2, 9.8]);

    fn calibrated(thresholds: MotionThresholds) -> MotionDetector {
        let mut detector = MotionDetector::new(thresholds);
        for _ in 0..MOTION_HISTORY_LEN {
            assert_eq!(detector.observe(REST), Verdict::Calibrating);
        }
        assert!(detector.is_calibrated());
        detector
    }

    #[test]
    fn calibration_needs_consecutive_rest_samples() {
        let mut detector = MotionDetector::new(MotionThresholds::default());
        for _ in 0..MOTION_HISTORY_LEN - 1 {
            let _ = detector.observe(REST);
        }
        // Rotating: not at rest, progress is lost.
        let _ = detector.observe(MotionSample::new([2.0, 0.0, 0.0], [0.0, 0.0, 9.8]));
        let _ = detector.observe(REST);
        assert!(!detector.is_calibrated());

        // No axis sees gravity: free fall or a broken sensor.
        let _ = detector.observe(MotionSample::new([0.0; 3], [1.0, 1.0, 1.0]));
        for _ in 0..MOTION_HISTORY_LEN - 1 {
            let _ = detector.observe(REST);
        }
        assert!(!detector.is_calibrated());
        let _ = detector.observe(REST);
        assert!(detector.is_calibrated());
        assert!(detector.mean().is_some());
    }

    #[test]
    fn sustained_deviation_is_an_anomaly() {
        let mut detector = calibrated(MotionThresholds::default());

        for _ in 0..4 {
            assert_eq!(detector.observe(SHAKEN), Verdict::Deviation);
        }
        assert_eq!(detector.observe(SHAKEN), Verdict::Anomaly);
        assert!(!detector.is_calibrated());
        assert_eq!(detector.observe(REST), Verdict::Calibrating);
    }

    #[test]
    fn interrupted_run_is_not_an_anomaly() {
        let mut detector = calibrated(MotionThresholds::default());

        for _ in 0..4 {
            assert_eq!(detector.observe(SHAKEN), Verdict::Deviation);
        }
        assert_eq!(detector.observe(REST), Verdict::Quiet);
        for _ in 0..4 {
            assert_eq!(detector.observe(SHAKEN), Verdict::Deviation);
        }
        assert!(detector.is_calibrated());
    }

    #[test]
    fn glitches_break_the_run() {
        let mut detector = calibrated(MotionThresholds::default());

        for _ in 0..4 {
            let _ = detector.observe(SHAKEN);
        }
        let glitch = MotionSample::new([0.0; 3], [0.1, 0.1, 0.1]);
        assert_eq!(detector.observe(glitch), Verdict::Glitch);
        let spike = MotionSample::new([0.0; 3], [0.1, 20.0, 9.8]);
        assert_eq!(detector.observe(spike), Verdict::Glitch);
        assert_eq!(detector.observe(SHAKEN), Verdict::Deviation);
    }

    #[test]
    fn gyro_threshold_is_optional() {
        let spinning = MotionSample::new([0.5, 0.0, 0.0], [0.1, 0.2, 9.8]);

        let mut detector = calibrated(MotionThresholds::default());
        assert_eq!(detector.observe(spinning), Verdict::Quiet);

        let mut detector = calibrated(MotionThresholds::default().gyro_delta(0.2).debounce_run(1));
        assert_eq!(detector.observe(spinning), Verdict::Anomaly);
    }

    #[test]
    fn non_finite_samples_are_discarded() {
        let broken = MotionSample::new([f32::NAN, 0.0, 0.0], [0.1, 0.2, 9.8]);

        let mut detector = MotionDetector::new(MotionThresholds::default());
        for _ in 0..MOTION_HISTORY_LEN - 1 {
            let _ = detector.observe(REST);
        }
        assert_eq!(detector.observe(broken), Verdict::Glitch);
        assert_eq!(detector.observe(REST), Verdict::Calibrating);
        assert!(detector.is_calibrated());

        let infinite = MotionSample::new([0.0; 3], [f32::INFINITY, 0.2, 9.8]);
        assert_eq!(detector.observe(infinite), Verdict::Glitch);
        assert_eq!(detector.observe(broken), Verdict::Glitch);
        assert!(detector.mean().is_some_and(|mean| mean.gyro[0].is_finite()));

        for _ in 0..4 {
            assert_eq!(detector.observe(SHAKEN), Verdict::Deviation);
        }
        assert_eq!(detector.observe(SHAKEN), Verdict::Anomaly);
    }

    struct Broken;

    impl MotionSensor for Broken {
        fn sample(&mut self) -> Result<MotionSample> {
            Err(Error::sensor("bus error"))
        }
    }

    #[test]
    fn unavailable_sensor() {
        let mut detector = MotionDetector::new(MotionThresholds::default());
        assert_eq!(detector.poll(&mut Broken), Verdict::Unavailable);
    }
}
