//! Task scheduler.
//!
//! Tasks are pinned to one of two execution contexts, the storage core and
//! the sensors core. Each core is a dedicated thread driving a
//! single-threaded `tokio` runtime, so two tasks of the same core never run
//! at the same time while tasks of different cores do.
//!
//! A periodic task runs behind a gate. Suspending a task waits for its
//! in-flight step to finish and skips every following step until the task is
//! resumed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use vigil::response::SessionControl;

use crate::error::{Error, ErrorKind, Result};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Execution contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Core {
    /// Runs the transfer session and the intrusion response.
    Storage,
    /// Runs the detectors.
    Sensors,
}

impl Core {
    const fn thread_name(self) -> &'static str {
        match self {
            Self::Storage => "vigil-storage",
            Self::Sensors => "vigil-sensors",
        }
    }
}

/// What a periodic task does after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFlow {
    /// Runs again at the next period.
    Continue,
    /// Terminates the task.
    Stop,
}

#[derive(Debug, Default)]
struct Gate {
    suspended: AtomicBool,
    finished: AtomicBool,
    running: Mutex<()>,
}

impl Gate {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }
}

/// A handle to a periodic task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    name: &'static str,
    gate: Arc<Gate>,
}

impl TaskHandle {
    /// Task name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the task is suspended.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.gate.is_suspended()
    }

    /// Whether the task terminated.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.gate.finished.load(Ordering::Acquire)
    }
}

impl SessionControl for TaskHandle {
    fn suspend(&self) {
        self.gate.suspended.store(true, Ordering::Release);
        // Waits for the in-flight step.
        drop(self.gate.lock());
        info!("Task {} suspended", self.name);
    }

    fn resume(&self) {
        self.gate.suspended.store(false, Ordering::Release);
        info!("Task {} resumed", self.name);
    }
}

/// Spawns tasks on the scheduler cores.
///
/// It is cheap to clone and can be moved into tasks.
#[derive(Debug, Clone)]
pub struct Spawner {
    storage: Handle,
    sensors: Handle,
}

impl Spawner {
    const fn handle(&self, core: Core) -> &Handle {
        match core {
            Core::Storage => &self.storage,
            Core::Sensors => &self.sensors,
        }
    }

    /// Runs `step` on `core` every `period` until it returns
    /// [`TaskFlow::Stop`].
    pub fn spawn_periodic<F>(
        &self,
        core: Core,
        name: &'static str,
        period: Duration,
        mut step: F,
    ) -> TaskHandle
    where
        F: FnMut() -> TaskFlow + Send + 'static,
    {
        let gate = Arc::new(Gate::default());
        let task_gate = Arc::clone(&gate);

        let _ = self.handle(core).spawn(async move {
            let mut interval = tokio::time::interval(period.max(MIN_PERIOD));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("Task {name} started on {core:?} every {period:?}");

            loop {
                let _ = interval.tick().await;
                if task_gate.is_suspended() {
                    continue;
                }

                let _running = task_gate.lock();
                // Suspended while waiting for the lock.
                if task_gate.is_suspended() {
                    continue;
                }
                if step() == TaskFlow::Stop {
                    break;
                }
            }

            task_gate.finished.store(true, Ordering::Release);
            debug!("Task {name} finished");
        });

        TaskHandle { name, gate }
    }

    /// Runs `job` once on `core`.
    pub fn spawn_once<F>(&self, core: Core, name: &'static str, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        debug!("Job {name} queued on {core:?}");
        let _ = self.handle(core).spawn(async move {
            job();
            debug!("Job {name} done");
        });
    }
}

struct CoreThread {
    core: Core,
    shutdown: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

impl CoreThread {
    fn start(core: Core) -> Result<(Self, Handle)> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| Error::new(ErrorKind::Scheduler, e.to_string()))?;
        let handle = runtime.handle().clone();
        let (shutdown, stopped) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(core.thread_name().into())
            .spawn(move || {
                runtime.block_on(async {
                    let _ = stopped.await;
                });
            })
            .map_err(|e| Error::new(ErrorKind::Scheduler, e.to_string()))?;

        info!("Core {core:?} started");
        Ok((
            Self {
                core,
                shutdown,
                thread,
            },
            handle,
        ))
    }

    fn stop(self) {
        let _ = self.shutdown.send(());
        if self.thread.join().is_err() {
            error!("Core {:?} panicked", self.core);
        } else {
            info!("Core {:?} stopped", self.core);
        }
    }
}

/// The two-core scheduler.
pub struct Scheduler {
    spawner: Spawner,
    cores: Vec<CoreThread>,
}

impl Scheduler {
    /// Starts both cores.
    ///
    /// # Errors
    ///
    /// Fails when a runtime or a core thread cannot be created.
    pub fn start() -> Result<Self> {
        let (storage_core, storage) = CoreThread::start(Core::Storage)?;
        let (sensors_core, sensors) = match CoreThread::start(Core::Sensors) {
            Ok(started) => started,
            Err(e) => {
                storage_core.stop();
                return Err(e);
            }
        };

        Ok(Self {
            spawner: Spawner { storage, sensors },
            cores: vec![storage_core, sensors_core],
        })
    }

    /// Returns a [`Spawner`] for both cores.
    #[must_use]
    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    /// Stops both cores, dropping every task still scheduled.
    pub fn shutdown(self) {
        for core in self.cores {
            core.stop();
        }
    }
}
