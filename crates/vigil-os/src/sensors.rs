//! Host sensor sources.
//!
//! On Linux, the kernel exposes accelerometers, gyroscopes and light sensors
//! through the Industrial I/O (IIO) subsystem: every channel is a sysfs file
//! holding a raw integer, and a sibling `*_scale` file holds the factor that
//! converts it into SI units.

use std::fs;
use std::path::{Path, PathBuf};

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
#[cfg(target_os = "linux")]
use linux_embedded_hal::{Delay, I2cdev};
use tracing::{debug, info};

use vigil::detectors::{BadgeReader, LightSensor, MotionSample, MotionSensor};
use vigil::error::{Error, Result};

use vigil_drivers::mpu6050::{AccelRange, Address, FilterBandwidth, GyroRange, Mpu6050, Mpu6050Error};

use crate::error::sensor_error;

const AXES: [&str; 3] = ["x", "y", "z"];

fn read_value(path: &Path) -> Result<f32> {
    let text = fs::read_to_string(path).map_err(|e| sensor_error(&e))?;
    text.trim()
        .parse::<f32>()
        .map_err(|_| Error::sensor(format!("Invalid value in {}", path.display())))
}

// A missing scale file means the raw value is already in SI units.
fn read_scale(path: &Path) -> Result<f32> {
    if path.exists() {
        read_value(path)
    } else {
        Ok(1.0)
    }
}

fn read_channel(dir: &Path, channel: &str) -> Result<[f32; 3]> {
    let scale = read_scale(&dir.join(format!("in_{channel}_scale")))?;
    let mut values = [0.0; 3];
    for (value, axis) in values.iter_mut().zip(AXES) {
        *value = read_value(&dir.join(format!("in_{channel}_{axis}_raw")))? * scale;
    }
    Ok(values)
}

/// Accelerometer and gyroscope of an IIO device.
#[derive(Debug, Clone)]
pub struct IioMotion {
    dir: PathBuf,
}

impl IioMotion {
    /// Creates an [`IioMotion`] reading the IIO device directory `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MotionSensor for IioMotion {
    fn sample(&mut self) -> Result<MotionSample> {
        let accel = read_channel(&self.dir, "accel")?;
        let gyro = read_channel(&self.dir, "anglvel")?;
        Ok(MotionSample::new(gyro, accel))
    }
}

/// Illuminance of an IIO device.
#[derive(Debug, Clone)]
pub struct IioLight {
    dir: PathBuf,
}

impl IioLight {
    /// Creates an [`IioLight`] reading the IIO device directory `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LightSensor for IioLight {
    fn sample(&mut self) -> Result<f32> {
        // Processed value first, raw value otherwise.
        let input = self.dir.join("in_illuminance_input");
        if input.exists() {
            return read_value(&input);
        }

        let scale = read_scale(&self.dir.join("in_illuminance_scale"))?;
        Ok(read_value(&self.dir.join("in_illuminance_raw"))? * scale)
    }
}

/// A badge reader fed through a spool file.
///
/// An external reader daemon writes the identifier of every presented badge
/// into the spool file as hexadecimal bytes, for example `C9 2C 0B B3` or
/// `c9:2c:0b:b3`. The file is consumed when read.
#[derive(Debug, Clone)]
pub struct SpoolBadgeReader {
    path: PathBuf,
}

impl SpoolBadgeReader {
    /// Creates a [`SpoolBadgeReader`] watching `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn parse_uid(text: &str) -> Option<Vec<u8>> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}

impl BadgeReader for SpoolBadgeReader {
    fn is_new_badge_present(&mut self) -> bool {
        self.path.is_file()
    }

    fn read_uid(&mut self) -> Result<Vec<u8>> {
        let text = fs::read_to_string(&self.path).map_err(|e| sensor_error(&e))?;
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("Cannot consume {}: {e}", self.path.display());
        }
        parse_uid(&text).ok_or_else(|| Error::sensor("Malformed badge identifier"))
    }
}

/// An `MPU6050` on an I²C bus used as a [`MotionSensor`].
pub struct Mpu6050Motion<I2C, D> {
    mpu: Mpu6050<I2C, D>,
}

impl<I2C, E, D> Mpu6050Motion<I2C, D>
where
    I2C: I2c<u8, Error = E>,
    E: core::fmt::Debug,
    D: DelayNs,
{
    /// Initializes the device with a ±8 g accelerometer range, a ±500 °/s
    /// gyroscope range and a 5 Hz low-pass filter.
    ///
    /// # Errors
    ///
    /// Fails when the device does not answer or is not an `MPU6050`.
    pub fn start(
        i2c: I2C,
        delay: D,
        address: Address,
    ) -> core::result::Result<Self, Mpu6050Error<E>> {
        let mut mpu = Mpu6050::new(i2c, delay, address);
        mpu.init()?;
        mpu.set_accel_range(AccelRange::G8)?;
        mpu.set_gyro_range(GyroRange::Deg500)?;
        mpu.set_filter_bandwidth(FilterBandwidth::Hz5)?;
        info!("MPU6050 ready");
        Ok(Self { mpu })
    }

    /// Releases the bus and the delay provider.
    pub fn release(self) -> (I2C, D) {
        self.mpu.release()
    }
}

#[cfg(target_os = "linux")]
impl Mpu6050Motion<I2cdev, Delay> {
    /// Opens an `MPU6050` on the I²C character device `bus`.
    ///
    /// # Errors
    ///
    /// Fails when the bus cannot be opened or the device does not answer.
    pub fn open(bus: &Path, address: Address) -> crate::error::Result<Self> {
        let i2c = I2cdev::new(bus).map_err(|e| {
            crate::error::Error::new(
                crate::error::ErrorKind::Io,
                format!("Cannot open {}: {e}", bus.display()),
            )
        })?;
        Self::start(i2c, Delay, address).map_err(|e| {
            crate::error::Error::new(
                crate::error::ErrorKind::Io,
                format!("No MPU6050 on {}: {e:?}", bus.display()),
            )
        })
    }
}

impl<I2C, E, D> MotionSensor for Mpu6050Motion<I2C, D>
where
    I2C: I2c<u8, Error = E>,
    E: core::fmt::Debug,
    D: DelayNs,
{
    fn sample(&mut self) -> Result<MotionSample> {
        let measurement = self
            .mpu
            .read()
            .map_err(|e| Error::sensor(format!("MPU6050 read failed: {e:?}")))?;
        Ok(MotionSample::new(measurement.gyro, measurement.accel))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    use vigil::detectors::{BadgeReader, LightSensor, MotionSensor};
    use vigil::error::ErrorKind;

    use vigil_drivers::mpu6050::Address;

    use super::{IioLight, IioMotion, Mpu6050Motion, SpoolBadgeReader, parse_uid};

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn iio_motion() {
        let dir = tempfile::tempdir().unwrap();
        for (file, value) in [
            ("in_accel_scale", "0.5"),
            ("in_accel_x_raw", "2"),
            ("in_accel_y_raw", "-4"),
            ("in_accel_z_raw", "19\n"),
            ("in_anglvel_x_raw", "1"),
            ("in_anglvel_y_raw", "0"),
            ("in_anglvel_z_raw", "-1"),
        ] {
            fs::write(dir.path().join(file), value).unwrap();
        }

        let sample = IioMotion::new(dir.path()).sample().unwrap();
        assert_eq!(sample.accel, [1.0, -2.0, 9.5]);
        assert_eq!(sample.gyro, [1.0, 0.0, -1.0]);
    }

    #[test]
    fn iio_motion_missing_channel() {
        let dir = tempfile::tempdir().unwrap();
        let error = IioMotion::new(dir.path()).sample().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Sensor);
    }

    #[test]
    fn iio_light() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("in_illuminance_raw"), "300").unwrap();
        fs::write(dir.path().join("in_illuminance_scale"), "0.5").unwrap();
        let mut light = IioLight::new(dir.path());
        assert_eq!(light.sample().unwrap(), 150.0);

        fs::write(dir.path().join("in_illuminance_input"), "42.5").unwrap();
        assert_eq!(light.sample().unwrap(), 42.5);

        fs::write(dir.path().join("in_illuminance_input"), "dark").unwrap();
        assert!(light.sample().is_err());
    }

    #[test]
    fn uid_formats() {
        assert_eq!(parse_uid("C9 2C 0B B3\n"), Some(vec![201, 44, 11, 179]));
        assert_eq!(parse_uid("c9:2c:0b:b3"), Some(vec![201, 44, 11, 179]));
        assert_eq!(parse_uid("c92c0bb3"), Some(vec![201, 44, 11, 179]));
        assert_eq!(parse_uid(""), None);
        assert_eq!(parse_uid("c92"), None);
        assert_eq!(parse_uid("zz"), None);
    }

    #[test]
    fn spool_reader() {
        let dir = tempfile::tempdir().unwrap();
        let spool = dir.path().join("badge");
        let mut reader = SpoolBadgeReader::new(&spool);
        assert!(!reader.is_new_badge_present());

        fs::write(&spool, "C9 2C 0B B3").unwrap();
        assert!(reader.is_new_badge_present());
        assert_eq!(reader.read_uid().unwrap(), vec![201, 44, 11, 179]);
        assert!(!reader.is_new_badge_present());

        fs::write(&spool, "garbage").unwrap();
        assert!(reader.read_uid().is_err());
        assert!(reader.read_uid().is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn mpu6050_missing_bus() {
        let Err(error) = Mpu6050Motion::open(
            std::path::Path::new("/nonexistent/i2c-9"),
            Address::Low,
        ) else {
            panic!("opened a missing bus");
        };
        assert_eq!(error.kind(), crate::error::ErrorKind::Io);
    }

    #[test]
    fn mpu6050_motion() {
        let expectations = [
            I2cTransaction::write(0x68, vec![0x6B, 0x80]),
            I2cTransaction::write(0x68, vec![0x6B, 0x01]),
            I2cTransaction::write_read(0x68, vec![0x75], vec![0x68]),
            I2cTransaction::write(0x68, vec![0x1C, 0x10]),
            I2cTransaction::write(0x68, vec![0x1B, 0x08]),
            I2cTransaction::write(0x68, vec![0x1A, 0x06]),
            I2cTransaction::write_read(
                0x68,
                vec![0x3B],
                vec![
                    0x00, 0x00, 0x00, 0x00, 0x10, 0x00, // accel: 1 g on z.
                    0x00, 0x00, // temperature.
                    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // gyro.
                ],
            ),
        ];

        let i2c = I2cMock::new(&expectations);
        let mut motion = Mpu6050Motion::start(i2c, NoopDelay::new(), Address::Low).unwrap();
        let sample = motion.sample().unwrap();
        assert!(close(sample.accel[2], 9.806_65));
        assert_eq!(sample.gyro, [0.0; 3]);

        let (mut i2c, _delay) = motion.release();
        i2c.done();
    }
}
