use alloc::string::String;
use alloc::vec::Vec;

use serde::Deserialize;

/// Default control channel port.
pub const DEFAULT_CONTROL_PORT: u16 = 21;
/// Default passive data channel port.
pub const DEFAULT_DATA_PORT: u16 = 50009;
/// Default username.
pub const DEFAULT_USERNAME: &str = "esp32";
/// Default password.
pub const DEFAULT_PASSWORD: &str = "esp32";
/// Default idle timeout of a logged-in session, in milliseconds.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 5 * 60 * 1000;
/// Default time allowed to send credentials after the greeting, in
/// milliseconds.
pub const DEFAULT_LOGIN_TIMEOUT_MS: u64 = 10 * 1000;
/// Default time allowed to a client to open the data channel, in
/// milliseconds.
pub const DEFAULT_DATA_CONNECT_TIMEOUT_MS: u64 = 10 * 1000;

/// File-transfer service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The only accepted username.
    pub username: String,
    /// The password of [`ServerConfig::username`].
    pub password: String,
    /// Control channel port.
    pub control_port: u16,
    /// Passive data channel port, advertised in every passive mode reply.
    pub data_port: u16,
    /// Idle timeout of a logged-in session, in milliseconds.
    pub idle_timeout_ms: u64,
    /// Time allowed to log in after the greeting, in milliseconds.
    pub login_timeout_ms: u64,
    /// Time allowed to a client to open the data channel, in milliseconds.
    pub data_connect_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            username: String::from(DEFAULT_USERNAME),
            password: String::from(DEFAULT_PASSWORD),
            control_port: DEFAULT_CONTROL_PORT,
            data_port: DEFAULT_DATA_PORT,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            login_timeout_ms: DEFAULT_LOGIN_TIMEOUT_MS,
            data_connect_timeout_ms: DEFAULT_DATA_CONNECT_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Sets the credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Sets the control channel port.
    #[must_use]
    pub const fn control_port(mut self, port: u16) -> Self {
        self.control_port = port;
        self
    }

    /// Sets the data channel port.
    #[must_use]
    pub const fn data_port(mut self, port: u16) -> Self {
        self.data_port = port;
        self
    }

    /// Sets the idle timeout, in milliseconds.
    #[must_use]
    pub const fn idle_timeout_ms(mut self, timeout: u64) -> Self {
        self.idle_timeout_ms = timeout;
        self
    }

    /// Sets the login timeout, in milliseconds.
    #[must_use]
    pub const fn login_timeout_ms(mut self, timeout: u64) -> Self {
        self.login_timeout_ms = timeout;
        self
    }

    /// Sets the data channel connection timeout, in milliseconds.
    #[must_use]
    pub const fn data_connect_timeout_ms(mut self, timeout: u64) -> Self {
        self.data_connect_timeout_ms = timeout;
        self
    }
}

/// Thresholds of the motion detector.
///
/// Accelerations are in m/s², angular velocities in rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct MotionThresholds {
    /// During calibration, at least one axis must see at least this
    /// acceleration, i.e. gravity.
    pub rest_gravity_min: f32,
    /// During calibration, no axis may exceed this acceleration.
    pub rest_accel_max: f32,
    /// During calibration, no axis may exceed this angular velocity.
    pub rest_gyro_max: f32,
    /// A sample whose accelerations are all below this value is a glitch.
    pub glitch_floor: f32,
    /// A sample with any acceleration above this value is a glitch.
    pub glitch_ceiling: f32,
    /// Maximum deviation of an acceleration axis from its rolling mean.
    pub accel_delta: f32,
    /// Maximum deviation of a gyroscope axis from its rolling mean.
    ///
    /// Gyroscope deviations are ignored when [`None`].
    pub gyro_delta: Option<f32>,
    /// Consecutive deviating samples needed to declare an anomaly.
    pub debounce_run: u8,
}

impl Default for MotionThresholds {
    fn default() -> Self {
        Self {
            rest_gravity_min: 7.0,
            rest_accel_max: 11.0,
            rest_gyro_max: 1.0,
            glitch_floor: 0.5,
            glitch_ceiling: 15.0,
            accel_delta: 0.5,
            gyro_delta: None,
            debounce_run: 5,
        }
    }
}

impl MotionThresholds {
    /// Sets the acceleration deviation threshold.
    #[must_use]
    pub const fn accel_delta(mut self, delta: f32) -> Self {
        self.accel_delta = delta;
        self
    }

    /// Enables gyroscope deviation checks with the given threshold.
    #[must_use]
    pub const fn gyro_delta(mut self, delta: f32) -> Self {
        self.gyro_delta = Some(delta);
        self
    }

    /// Sets the number of consecutive deviating samples that make an
    /// anomaly.
    #[must_use]
    pub const fn debounce_run(mut self, run: u8) -> Self {
        self.debounce_run = run;
        self
    }
}

/// Thresholds of the ambient light detector.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LightThresholds {
    /// Minimum deviation from the rolling mean considered relevant.
    pub absolute_delta: f32,
    /// Deviation from the rolling mean, as a fraction of the mean.
    ///
    /// The larger of this and [`LightThresholds::absolute_delta`] applies.
    pub relative_delta: f32,
    /// Consecutive deviating samples needed to declare an anomaly.
    pub debounce_run: u8,
}

impl Default for LightThresholds {
    fn default() -> Self {
        Self {
            absolute_delta: 40.0,
            relative_delta: 0.25,
            debounce_run: 3,
        }
    }
}

impl LightThresholds {
    /// Sets the absolute deviation threshold.
    #[must_use]
    pub const fn absolute_delta(mut self, delta: f32) -> Self {
        self.absolute_delta = delta;
        self
    }

    /// Sets the relative deviation threshold.
    #[must_use]
    pub const fn relative_delta(mut self, fraction: f32) -> Self {
        self.relative_delta = fraction;
        self
    }

    /// Sets the number of consecutive deviating samples that make an
    /// anomaly.
    #[must_use]
    pub const fn debounce_run(mut self, run: u8) -> Self {
        self.debounce_run = run;
        self
    }
}

/// Badge allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BadgeConfig {
    /// Badge identifiers allowed to toggle the unsecure mode.
    pub allowed: Vec<Vec<u8>>,
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            allowed: alloc::vec![alloc::vec![201, 44, 11, 179]],
        }
    }
}

impl BadgeConfig {
    /// Creates a [`BadgeConfig`] with an empty allow-list.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            allowed: Vec::new(),
        }
    }

    /// Adds a badge identifier to the allow-list.
    #[must_use]
    pub fn allow(mut self, uid: &[u8]) -> Self {
        self.allowed.push(uid.into());
        self
    }
}
