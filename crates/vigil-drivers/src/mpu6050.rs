//! # MPU6050 Driver
//!
//! This module provides a blocking, architecture-agnostic driver for the
//! `MPU6050` six-axis motion tracking device, reading acceleration, angular
//! velocity and die temperature over the I²C protocol.
//!
//! Measurements are converted to SI units:
//! - **Acceleration**: m/s²
//! - **Angular velocity**: rad/s
//! - **Temperature**: °C
//!
//! For detailed specifications, refer to the
//! [register map](https://invensense.tdk.com/wp-content/uploads/2015/02/MPU-6000-Register-Map1.pdf).

use core::result::Result::{self, Err, Ok};

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

// Register addresses.
const CONFIG: u8 = 0x1A;
const GYRO_CONFIG: u8 = 0x1B;
const ACCEL_CONFIG: u8 = 0x1C;
const ACCEL_XOUT_H: u8 = 0x3B;
const PWR_MGMT_1: u8 = 0x6B;
const WHO_AM_I: u8 = 0x75;

const DEVICE_RESET: u8 = 0x80;
// Wakes the device up clocked by the X axis gyroscope PLL.
const CLOCK_PLL_XGYRO: u8 = 0x01;
const DEVICE_ID: u8 = 0x68;
const RESET_DELAY_MS: u32 = 100;

// Accelerometer, temperature and gyroscope output registers.
const DATA_LEN: usize = 14;

const STANDARD_GRAVITY: f32 = 9.806_65;
const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;

/// I²C address of the `MPU6050`, selected by the AD0 pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    /// `0x68` when AD0 is low.
    Low = 0x68,
    /// `0x69` when AD0 is high.
    High = 0x69,
}

/// Accelerometer full-scale range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelRange {
    /// ±2 g.
    G2,
    /// ±4 g.
    G4,
    /// ±8 g.
    G8,
    /// ±16 g.
    G16,
}

impl AccelRange {
    #[inline]
    const fn bits(self) -> u8 {
        (self as u8) << 3
    }

    #[inline]
    const fn lsb_per_g(self) -> f32 {
        match self {
            Self::G2 => 16384.0,
            Self::G4 => 8192.0,
            Self::G8 => 4096.0,
            Self::G16 => 2048.0,
        }
    }
}

/// Gyroscope full-scale range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GyroRange {
    /// ±250 °/s.
    Deg250,
    /// ±500 °/s.
    Deg500,
    /// ±1000 °/s.
    Deg1000,
    /// ±2000 °/s.
    Deg2000,
}

impl GyroRange {
    #[inline]
    const fn bits(self) -> u8 {
        (self as u8) << 3
    }

    #[inline]
    const fn lsb_per_deg(self) -> f32 {
        match self {
            Self::Deg250 => 131.0,
            Self::Deg500 => 65.5,
            Self::Deg1000 => 32.8,
            Self::Deg2000 => 16.4,
        }
    }
}

/// Bandwidth of the digital low-pass filter applied to both the
/// accelerometer and the gyroscope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterBandwidth {
    /// 260 Hz, i.e. no filtering.
    Hz260,
    /// 184 Hz.
    Hz184,
    /// 94 Hz.
    Hz94,
    /// 44 Hz.
    Hz44,
    /// 21 Hz.
    Hz21,
    /// 10 Hz.
    Hz10,
    /// 5 Hz.
    Hz5,
}

/// A single `MPU6050` measurement.
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    /// Acceleration along x, y and z, in m/s².
    pub accel: [f32; 3],
    /// Angular velocity around x, y and z, in rad/s.
    pub gyro: [f32; 3],
    /// Die temperature, in °C.
    pub temperature: f32,
}

/// Errors that may occur when interacting with the `MPU6050`.
#[derive(Debug, Clone, Copy)]
pub enum Mpu6050Error<E> {
    /// I²C bus error.
    I2c(E),
    /// The device answered with an unexpected identifier.
    UnexpectedDevice(u8),
}

impl<E> From<E> for Mpu6050Error<E> {
    fn from(e: E) -> Self {
        Mpu6050Error::I2c(e)
    }
}

/// The `MPU6050` driver.
pub struct Mpu6050<I2C, D> {
    i2c: I2C,
    delay: D,
    address: Address,
    accel_range: AccelRange,
    gyro_range: GyroRange,
}

impl<I2C, E, D> Mpu6050<I2C, D>
where
    I2C: I2c<u8, Error = E>,
    D: DelayNs,
{
    /// Creates an [`Mpu6050`] driver for the given I²C bus, delay provider
    /// and address.
    ///
    /// Ranges are assumed to be the power-on ones, ±2 g and ±250 °/s.
    #[must_use]
    pub const fn new(i2c: I2C, delay: D, address: Address) -> Self {
        Self {
            i2c,
            delay,
            address,
            accel_range: AccelRange::G2,
            gyro_range: GyroRange::Deg250,
        }
    }

    /// Resets the device, wakes it up and checks its identity.
    ///
    /// # Errors
    ///
    /// Returns [`Mpu6050Error::UnexpectedDevice`] when another device
    /// answers at the address, or an I²C error.
    pub fn init(&mut self) -> Result<(), Mpu6050Error<E>> {
        self.write_register(PWR_MGMT_1, DEVICE_RESET)?;
        self.delay.delay_ms(RESET_DELAY_MS);
        self.accel_range = AccelRange::G2;
        self.gyro_range = GyroRange::Deg250;

        self.wake()?;

        match self.who_am_i()? {
            DEVICE_ID => Ok(()),
            id => Err(Mpu6050Error::UnexpectedDevice(id)),
        }
    }

    /// Leaves sleep mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I²C bus operation fails.
    pub fn wake(&mut self) -> Result<(), Mpu6050Error<E>> {
        self.write_register(PWR_MGMT_1, CLOCK_PLL_XGYRO)
    }

    /// Reads the `WHO_AM_I` register.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I²C bus operation fails.
    pub fn who_am_i(&mut self) -> Result<u8, Mpu6050Error<E>> {
        let mut id = [0u8; 1];
        self.i2c
            .write_read(self.address as u8, &[WHO_AM_I], &mut id)?;
        Ok(id[0])
    }

    /// Sets the accelerometer range.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I²C bus operation fails.
    pub fn set_accel_range(&mut self, range: AccelRange) -> Result<(), Mpu6050Error<E>> {
        self.write_register(ACCEL_CONFIG, range.bits())?;
        self.accel_range = range;
        Ok(())
    }

    /// Sets the gyroscope range.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I²C bus operation fails.
    pub fn set_gyro_range(&mut self, range: GyroRange) -> Result<(), Mpu6050Error<E>> {
        self.write_register(GYRO_CONFIG, range.bits())?;
        self.gyro_range = range;
        Ok(())
    }

    /// Sets the low-pass filter bandwidth.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I²C bus operation fails.
    pub fn set_filter_bandwidth(
        &mut self,
        bandwidth: FilterBandwidth,
    ) -> Result<(), Mpu6050Error<E>> {
        self.write_register(CONFIG, bandwidth as u8)
    }

    /// Reads all the sensors in a single burst.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I²C bus operation fails.
    pub fn read(&mut self) -> Result<Measurement, Mpu6050Error<E>> {
        let mut data = [0u8; DATA_LEN];
        self.i2c
            .write_read(self.address as u8, &[ACCEL_XOUT_H], &mut data)?;

        // Big-endian words: accel x, y, z, temperature, gyro x, y, z.
        let word = |index: usize| f32::from(i16::from_be_bytes([data[2 * index], data[2 * index + 1]]));

        let accel_scale = STANDARD_GRAVITY / self.accel_range.lsb_per_g();
        let gyro_scale = DEG_TO_RAD / self.gyro_range.lsb_per_deg();

        Ok(Measurement {
            accel: [word(0) * accel_scale, word(1) * accel_scale, word(2) * accel_scale],
            temperature: word(3) / 340.0 + 36.53,
            gyro: [word(4) * gyro_scale, word(5) * gyro_scale, word(6) * gyro_scale],
        })
    }

    /// Releases the bus and the delay provider.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    #[inline]
    fn write_register(&mut self, register: u8, value: u8) -> Result<(), Mpu6050Error<E>> {
        self.i2c.write(self.address as u8, &[register, value])?;

        Ok(())
    }
}
