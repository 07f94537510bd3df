//! Intrusion response.
//!
//! A detector reporting an anomaly asks the [`Coordinator`] for a
//! [`ResponseRun`]. At most one run exists at a time and none is granted while
//! the unsecure mode is on. Executing a run suspends the transfer session,
//! wipes the storage and resumes the session; dropping the run releases the
//! coordinator.

use alloc::sync::Arc;

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{error, info, warn};

use crate::path::join;
use crate::storage::Storage;

/// Blinks of the indicator before and after a wipe.
pub const WIPE_BLINKS: u8 = 3;

/// Detectors able to trigger a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The motion detector.
    Motion,
    /// The ambient light detector.
    Light,
}

impl core::fmt::Display for Trigger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Motion => "motion",
            Self::Light => "light",
        })
    }
}

/// Suspension of the transfer session task.
pub trait SessionControl {
    /// Suspends the session, returning once no session step is running.
    fn suspend(&self);

    /// Resumes a suspended session.
    fn resume(&self);
}

/// The visible indicator.
pub trait Indicator {
    /// Turns the indicator on or off.
    fn set(&self, on: bool);

    /// Blinks the indicator `times` times.
    fn blink(&self, times: u8);
}

/// Counts of a storage wipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WipeReport {
    /// Removed files.
    pub files_removed: usize,
    /// Removed directories.
    pub dirs_removed: usize,
    /// Entries that could not be listed or removed.
    pub failures: usize,
}

/// Grants intrusion response runs.
#[derive(Debug, Default)]
pub struct Coordinator {
    active: AtomicBool,
    unsecure: AtomicBool,
    completed: AtomicUsize,
}

impl Coordinator {
    /// Creates a [`Coordinator`] in secure mode.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            unsecure: AtomicBool::new(false),
            completed: AtomicUsize::new(0),
        }
    }

    /// Whether a run is in progress.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Whether the unsecure mode is on.
    #[must_use]
    pub fn is_unsecure(&self) -> bool {
        self.unsecure.load(Ordering::Acquire)
    }

    /// Flips the unsecure mode and returns the new value.
    pub fn toggle_unsecure(&self) -> bool {
        let unsecure = !self.unsecure.fetch_xor(true, Ordering::AcqRel);
        info!("Unsecure mode {}", if unsecure { "on" } else { "off" });
        unsecure
    }

    /// Number of runs executed to completion.
    #[must_use]
    pub fn completed_runs(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Requests a run for `trigger`.
    ///
    /// Returns [`None`], dropping the request, when a run is already active
    /// or the unsecure mode is on.
    #[must_use]
    pub fn try_begin(self: &Arc<Self>, trigger: Trigger, now_ms: u64) -> Option<ResponseRun> {
        if self.is_unsecure() {
            info!("Intrusion reported by {trigger} ignored in unsecure mode");
            return None;
        }

        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Intrusion reported by {trigger} dropped, a response is running");
            return None;
        }

        warn!("Intrusion reported by {trigger}");
        Some(ResponseRun {
            coordinator: Arc::clone(self),
            trigger,
            started_ms: now_ms,
            completed: false,
        })
    }
}

/// The single active intrusion response.
#[derive(Debug)]
pub struct ResponseRun {
    coordinator: Arc<Coordinator>,
    trigger: Trigger,
    started_ms: u64,
    completed: bool,
}

impl ResponseRun {
    /// The detector that triggered the run.
    #[must_use]
    pub const fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// When the run was granted, in milliseconds.
    #[must_use]
    pub const fn started_ms(&self) -> u64 {
        self.started_ms
    }

    /// Suspends the session, wipes `storage` and resumes the session.
    pub fn execute<S, P, I>(mut self, storage: &S, session: &P, indicator: &I) -> WipeReport
    where
        S: Storage + ?Sized,
        P: SessionControl + ?Sized,
        I: Indicator + ?Sized,
    {
        indicator.blink(WIPE_BLINKS);
        session.suspend();
        info!("Session suspended, wiping storage");

        let report = wipe(storage);

        session.resume();
        indicator.blink(WIPE_BLINKS);
        warn!(
            "Storage wiped after {} alert: {} files and {} directories removed, {} failures",
            self.trigger, report.files_removed, report.dirs_removed, report.failures
        );

        self.completed = true;
        report
    }
}

impl Drop for ResponseRun {
    fn drop(&mut self) {
        if self.completed {
            let _ = self.coordinator.completed.fetch_add(1, Ordering::AcqRel);
        }
        self.coordinator.active.store(false, Ordering::Release);
    }
}

/// Removes every file and directory of `storage`, bottom-up.
///
/// Failures are counted and skipped, never retried.
pub fn wipe<S: Storage + ?Sized>(storage: &S) -> WipeReport {
    let mut report = WipeReport::default();
    storage.remove_all(&mut report);
    report
}

/// Walks the tree below `dir` through [`Storage::list`], removing entries
/// bottom-up.
pub(crate) fn wipe_dir<S: Storage + ?Sized>(storage: &S, dir: &str, report: &mut WipeReport) {
    let entries = match storage.list(dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!("Cannot list {dir}: {e}");
            report.failures += 1;
            return;
        }
    };

    for entry in entries {
        let path = join(dir, &entry.name);
        if entry.is_dir {
            wipe_dir(storage, &path, report);
            match storage.remove_dir(&path) {
                Ok(()) => report.dirs_removed += 1,
                Err(e) => {
                    error!("Cannot remove {path}: {e}");
                    report.failures += 1;
                }
            }
        } else {
            match storage.remove_file(&path) {
                Ok(()) => report.files_removed += 1,
                Err(e) => {
                    error!("Cannot remove {path}: {e}");
                    report.failures += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::vec::Vec;

    use alloc::sync::Arc;

    use crate::storage::Storage;
    use crate::testing::MemStorage;

    use super::{Coordinator, Indicator, SessionControl, Trigger, WipeReport, wipe};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<&'static str>>,
        blinks: AtomicUsize,
    }

    impl Recorder {
        fn push(&self, event: &'static str) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    impl SessionControl for Recorder {
        fn suspend(&self) {
            self.push("suspend");
        }

        fn resume(&self) {
            self.push("resume");
        }
    }

    impl Indicator for Recorder {
        fn set(&self, on: bool) {
            self.push(if on { "on" } else { "off" });
        }

        fn blink(&self, times: u8) {
            let _ = self.blinks.fetch_add(usize::from(times), Ordering::Relaxed);
            self.push("blink");
        }
    }

    fn populated() -> MemStorage {
        let storage = MemStorage::new();
        storage.put_file("/a.txt", b"a");
        storage.put_dir("/docs");
        storage.put_file("/docs/b.txt", b"b");
        storage.put_dir("/docs/deep");
        storage.put_file("/docs/deep/c.txt", b"c");
        storage.put_dir("/empty");
        storage
    }

    #[test]
    fn wipe_removes_everything() {
        let storage = populated();
        assert_eq!(
            wipe(&storage),
            WipeReport {
                files_removed: 3,
                dirs_removed: 3,
                failures: 0,
            }
        );
        assert!(storage.is_empty());
        assert!(storage.list("/").unwrap().is_empty());
    }

    #[test]
    fn wipe_skips_failures() {
        let storage = populated();
        storage.lock("/docs/b.txt");

        let report = wipe(&storage);
        // The locked file keeps its directory alive.
        assert_eq!(report.files_removed, 2);
        assert_eq!(report.dirs_removed, 2);
        assert_eq!(report.failures, 2);
        assert_eq!(storage.file("/docs/b.txt").unwrap(), b"b");
    }

    #[test]
    fn run_suspends_the_session_during_the_wipe() {
        let coordinator = Arc::new(Coordinator::new());
        let storage = populated();
        let recorder = Recorder::default();

        let run = coordinator.try_begin(Trigger::Motion, 42).unwrap();
        assert_eq!(run.trigger(), Trigger::Motion);
        assert_eq!(run.started_ms(), 42);
        assert!(coordinator.is_active());

        let report = run.execute(&storage, &recorder, &recorder);
        assert_eq!(report.files_removed, 3);
        assert_eq!(
            recorder.events(),
            ["blink", "suspend", "resume", "blink"]
        );
        assert!(!coordinator.is_active());
        assert_eq!(coordinator.completed_runs(), 1);
    }

    #[test]
    fn at_most_one_run() {
        let coordinator = Arc::new(Coordinator::new());

        let run = coordinator.try_begin(Trigger::Motion, 0).unwrap();
        assert!(coordinator.try_begin(Trigger::Light, 1).is_none());
        drop(run);

        // An abandoned run releases the coordinator without counting.
        assert!(!coordinator.is_active());
        assert_eq!(coordinator.completed_runs(), 0);
        assert!(coordinator.try_begin(Trigger::Light, 2).is_some());
    }

    #[test]
    fn unsecure_mode_suppresses_runs() {
        let coordinator = Arc::new(Coordinator::new());

        assert!(coordinator.toggle_unsecure());
        assert!(coordinator.try_begin(Trigger::Motion, 0).is_none());
        assert!(!coordinator.is_active());

        assert!(!coordinator.toggle_unsecure());
        assert!(coordinator.try_begin(Trigger::Motion, 0).is_some());
    }
}
