//! Daemon configuration.
//!
//! The configuration is a TOML document. Every section and every key is
//! optional: a missing value takes the default of the appliance.
//!
//! ```toml
//! [server]
//! username = "esp32"
//! password = "esp32"
//! control_port = 2121
//!
//! [storage]
//! root = "/srv/vigil"
//!
//! [motion]
//! device = "/sys/bus/iio/devices/iio:device0"
//!
//! [motion.detector]
//! accel_delta = 0.8
//! ```
//!
//! An `MPU6050` wired to an I²C bus replaces the IIO motion device:
//!
//! ```toml
//! [motion.mpu6050]
//! bus = "/dev/i2c-1"
//! ad0_high = false
//! ```

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use vigil::config::{BadgeConfig, LightThresholds, MotionThresholds, ServerConfig};

use vigil_drivers::mpu6050::Address;

use crate::error::Result;

const DEFAULT_STORAGE_ROOT: &str = "vigil-data";
const DEFAULT_HOSTNAME: &str = "vigil";

/// Storage section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    /// Directory exposed as the storage root.
    pub root: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_STORAGE_ROOT),
        }
    }
}

/// Network section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSection {
    /// Address both listeners bind to.
    pub bind: Ipv4Addr,
    /// Address advertised in passive mode replies.
    ///
    /// When missing, the local address of the control connection is used.
    pub advertised: Option<Ipv4Addr>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind: Ipv4Addr::UNSPECIFIED,
            advertised: None,
        }
    }
}

/// Periods of the scheduled tasks, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    /// Period of the transfer session task.
    pub session_period_ms: u64,
    /// Period of the motion detector task.
    pub motion_period_ms: u64,
    /// Period of the ambient light detector task.
    pub light_period_ms: u64,
    /// Period of the badge detector task.
    pub badge_period_ms: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            session_period_ms: 30,
            motion_period_ms: 200,
            light_period_ms: 250,
            badge_period_ms: 300,
        }
    }
}

/// Motion detector section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MotionSection {
    /// IIO device directory of the accelerometer and gyroscope.
    ///
    /// The detector is disabled when missing.
    pub device: Option<PathBuf>,
    /// An `MPU6050` on an I²C bus, used instead of `device`.
    pub mpu6050: Option<Mpu6050Section>,
    /// Detector thresholds.
    pub detector: MotionThresholds,
}

/// `MPU6050` wiring.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mpu6050Section {
    /// I²C character device of the bus.
    pub bus: PathBuf,
    /// Whether the AD0 pin is tied high.
    #[serde(default)]
    pub ad0_high: bool,
}

impl Mpu6050Section {
    /// Bus address selected by the AD0 pin.
    #[must_use]
    pub const fn address(&self) -> Address {
        if self.ad0_high {
            Address::High
        } else {
            Address::Low
        }
    }
}

/// Ambient light detector section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LightSection {
    /// IIO device directory of the light sensor.
    ///
    /// The detector is disabled when missing.
    pub device: Option<PathBuf>,
    /// Detector thresholds.
    pub detector: LightThresholds,
}

/// Badge detector section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BadgeSection {
    /// Spool file written by the badge reader daemon.
    ///
    /// The detector is disabled when missing.
    pub spool: Option<PathBuf>,
    /// Allow-list.
    pub detector: BadgeConfig,
}

/// Indicator section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndicatorSection {
    /// Sysfs LED directory.
    ///
    /// When missing, the indicator only logs.
    pub led: Option<PathBuf>,
    /// Half period of a blink, in milliseconds.
    pub blink_ms: u64,
}

impl Default for IndicatorSection {
    fn default() -> Self {
        Self {
            led: None,
            blink_ms: 150,
        }
    }
}

/// mDNS-SD section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MdnsSection {
    /// Whether the control port is advertised.
    pub enabled: bool,
    /// Host name, without the `.local.` suffix.
    pub hostname: String,
    /// Service instance name.
    pub instance: String,
}

impl Default for MdnsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            hostname: DEFAULT_HOSTNAME.into(),
            instance: DEFAULT_HOSTNAME.into(),
        }
    }
}

/// The daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// File-transfer service.
    pub server: ServerConfig,
    /// Storage root.
    pub storage: StorageSection,
    /// Listeners.
    pub network: NetworkSection,
    /// Task periods.
    pub scheduler: SchedulerSection,
    /// Motion detector.
    pub motion: MotionSection,
    /// Ambient light detector.
    pub light: LightSection,
    /// Badge detector.
    pub badge: BadgeSection,
    /// Indicator.
    pub indicator: IndicatorSection,
    /// Service advertisement.
    pub mdns: MdnsSection,
}

impl Config {
    /// Parses a [`Config`] from a TOML document.
    ///
    /// # Errors
    ///
    /// Fails when the document is not valid TOML or contains unknown keys.
    pub fn from_toml(document: &str) -> Result<Self> {
        Ok(toml::from_str(document)?)
    }

    /// Loads a [`Config`] from a TOML file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let document = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&document)
    }

    /// Sets the storage root.
    #[must_use]
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage.root = root.into();
        self
    }

    /// Sets the control channel port.
    #[must_use]
    pub fn control_port(mut self, port: u16) -> Self {
        self.server.control_port = port;
        self
    }

    /// Sets the data channel port.
    #[must_use]
    pub fn data_port(mut self, port: u16) -> Self {
        self.server.data_port = port;
        self
    }
}
