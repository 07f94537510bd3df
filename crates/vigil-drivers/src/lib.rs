//! `vigil-drivers` provides architecture-agnostic drivers for the sensors
//! watched by the `vigil` anomaly detectors.
//!
//! Drivers are implemented using only the [`embedded-hal`] traits, so they
//! run on any platform that supports these abstractions. They are blocking
//! because detector steps are synchronous.
//!
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![no_std]

/// The `MPU6050` driver.
#[cfg(feature = "mpu6050")]
pub mod mpu6050;
