use alloc::vec::Vec;

use log::{info, warn};

use crate::config::BadgeConfig;
use crate::error::Result;

// The last three presence samples must be absent, absent, present.
const EDGE_MASK: u8 = 0b111;
const EDGE_PATTERN: u8 = 0b001;

/// A proximity badge reader.
pub trait BadgeReader {
    /// Whether a badge that was not read yet is in the field.
    fn is_new_badge_present(&mut self) -> bool;

    /// Reads the identifier of the badge in the field.
    ///
    /// # Errors
    ///
    /// Fails when the badge cannot be read.
    fn read_uid(&mut self) -> Result<Vec<u8>>;
}

impl<R: BadgeReader + ?Sized> BadgeReader for &mut R {
    fn is_new_badge_present(&mut self) -> bool {
        (**self).is_new_badge_present()
    }

    fn read_uid(&mut self) -> Result<Vec<u8>> {
        (**self).read_uid()
    }
}

/// Outcome of a badge poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeEvent {
    /// No new badge.
    None,
    /// An allowed badge was presented.
    Authorized,
    /// An unknown badge was presented.
    Rejected,
    /// A badge was presented but could not be read.
    Unreadable,
}

/// Detects allowed badges.
///
/// Presence is sampled into a three-bit history and a badge is read only on
/// an isolated rising edge, so a badge held in the field is read once.
#[derive(Debug, Clone)]
pub struct BadgeDetector {
    config: BadgeConfig,
    history: u8,
}

impl BadgeDetector {
    /// Creates a [`BadgeDetector`].
    #[must_use]
    pub const fn new(config: BadgeConfig) -> Self {
        Self { config, history: 0 }
    }

    /// Whether `uid` is in the allow-list.
    #[must_use]
    pub fn is_allowed(&self, uid: &[u8]) -> bool {
        self.config
            .allowed
            .iter()
            .any(|allowed| allowed.as_slice() == uid)
    }

    /// Samples `reader` once.
    pub fn poll<R: BadgeReader + ?Sized>(&mut self, reader: &mut R) -> BadgeEvent {
        self.history = (self.history << 1) | u8::from(reader.is_new_badge_present());
        if self.history & EDGE_MASK != EDGE_PATTERN {
            return BadgeEvent::None;
        }

        match reader.read_uid() {
            Ok(uid) if self.is_allowed(&uid) => {
                info!("Badge {uid:02X?} accepted");
                BadgeEvent::Authorized
            }
            Ok(uid) => {
                warn!("Badge {uid:02X?} rejected");
                BadgeEvent::Rejected
            }
            Err(e) => {
                warn!("Cannot read badge: {e}");
                BadgeEvent::Unreadable
            }
        }
    }
}
