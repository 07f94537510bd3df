//! Host runtime of the `vigil` storage appliance.
//!
//! This crate provides the collaborators the `vigil` core needs on an
//! operating system, and the service running them:
//!
//! - A filesystem storage rooted at a host directory.
//! - Non-blocking TCP listeners for the control and data channels.
//! - Sensor sources: Linux IIO devices, a spool-file badge reader and an
//!   adapter for the `MPU6050` driver.
//! - A two-core scheduler, the storage core running the transfer session and
//!   the intrusion response, the sensors core running the detectors.
//! - An optional mDNS-SD advertisement of the control channel.
//!
//! The [`service::Vault`] type puts everything together.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Millisecond clock.
pub mod clock;
/// Daemon configuration.
pub mod config;
/// Error handling.
pub mod error;
/// Visible indicator.
pub mod indicator;
/// Service advertisement.
pub mod mdns;
/// TCP transport.
pub mod net;
/// Task scheduler.
pub mod scheduler;
/// Host sensor sources.
pub mod sensors;
/// The appliance service.
pub mod service;
/// Filesystem storage.
pub mod storage;

pub use config::Config;
pub use service::{RunningVault, Vault};
