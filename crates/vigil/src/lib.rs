//! The core of the `vigil` storage appliance.
//!
//! This crate provides:
//!
//! - A line-oriented file-transfer session with a control channel and a
//!   passive data channel. The session is driven one non-blocking step at a
//!   time through [`session::Session::tick`], so it can run inside any
//!   cooperative scheduler.
//! - A transfer engine that moves one bounded chunk per step between the
//!   storage and the data channel.
//! - Anomaly detectors for motion, ambient light and proximity badges, each
//!   with its own calibration and debounce logic.
//! - An intrusion response coordinator that suspends the session and wipes
//!   the storage, guaranteeing that at most one wipe runs at a time.
//!
//! Storage, network, clock and sensors are external collaborators described
//! by traits, so the crate can be compiled for both `std` and `no_std`
//! environments.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

/// Monotonic time source.
pub mod clock;
/// Control channel command parsing.
pub mod command;
/// Service and detector configuration.
pub mod config;
/// Sensor anomaly detectors.
pub mod detectors;
/// Error handling.
pub mod error;
/// Network collaborator traits.
pub mod net;
/// Path resolution against a working directory.
pub mod path;
/// Control channel replies.
pub mod reply;
/// Intrusion response coordination.
pub mod response;
/// The file-transfer session state machine.
pub mod session;
/// Storage collaborator traits.
pub mod storage;
/// Chunked file transfers over the data channel.
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
pub(crate) fn deserialize<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
    serde_json::from_value(value).unwrap()
}
