//! The storage appliance service.
//!
//! A [`Vault`] wires the transfer session, the detectors and the intrusion
//! response onto the scheduler cores:
//!
//! - the session task runs on the storage core
//! - one task per configured detector runs on the sensors core
//! - an anomaly spawns the wipe on the storage core, where it suspends the
//!   session task for its whole duration

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use vigil::clock::Clock;
use vigil::detectors::{
    BadgeDetector, BadgeEvent, BadgeReader, LightDetector, LightSensor, MotionDetector,
    MotionSensor,
};
use vigil::response::{Coordinator, Indicator, Trigger};
use vigil::session::Session;

use crate::clock::SystemClock;
use crate::config::{Config, Mpu6050Section};
use crate::indicator::LedIndicator;
use crate::mdns::Advertiser;
use crate::net::TcpNetwork;
use crate::scheduler::{Core, Scheduler, Spawner, TaskFlow, TaskHandle};
#[cfg(target_os = "linux")]
use crate::sensors::Mpu6050Motion;
use crate::sensors::{IioLight, IioMotion, SpoolBadgeReader};
use crate::storage::FsStorage;

#[cfg(not(target_os = "linux"))]
use crate::error::{Error, ErrorKind};
use crate::error::Result;

// Longest wait for the session to release its connections on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

type SharedIndicator = Arc<dyn Indicator + Send + Sync>;

#[cfg(target_os = "linux")]
fn open_mpu6050(section: &Mpu6050Section) -> Result<impl MotionSensor + Send + 'static> {
    let sensor = Mpu6050Motion::open(&section.bus, section.address())?;
    info!("Motion sampled from the MPU6050 on {}", section.bus.display());
    Ok(sensor)
}

#[cfg(not(target_os = "linux"))]
fn open_mpu6050(section: &Mpu6050Section) -> Result<IioMotion> {
    Err(Error::new(
        ErrorKind::Io,
        format!("No I²C support for {} on this platform", section.bus.display()),
    ))
}

// Everything a detector task needs to start a response.
#[derive(Clone)]
struct Responder {
    coordinator: Arc<Coordinator>,
    spawner: Spawner,
    storage: Arc<FsStorage>,
    session: TaskHandle,
    indicator: SharedIndicator,
    clock: SystemClock,
}

impl Responder {
    fn alert(&self, trigger: Trigger) {
        let Some(run) = self.coordinator.try_begin(trigger, self.clock.now_ms()) else {
            return;
        };

        let storage = Arc::clone(&self.storage);
        let session = self.session.clone();
        let indicator = Arc::clone(&self.indicator);
        self.spawner.spawn_once(Core::Storage, "wipe", move || {
            let report = run.execute(&*storage, &session, &*indicator);
            info!(
                "Response to {trigger} done: {} files, {} directories, {} failures",
                report.files_removed, report.dirs_removed, report.failures
            );
        });
    }
}

/// A configured, not yet started, appliance.
pub struct Vault {
    config: Config,
    motion: Option<Box<dyn MotionSensor + Send>>,
    light: Option<Box<dyn LightSensor + Send>>,
    badge: Option<Box<dyn BadgeReader + Send>>,
    indicator: Option<SharedIndicator>,
}

impl Vault {
    /// Creates a [`Vault`] without sensors.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            motion: None,
            light: None,
            badge: None,
            indicator: None,
        }
    }

    /// Creates a [`Vault`] with the host sensors named in `config`.
    ///
    /// An `MPU6050` takes precedence over an IIO motion device.
    ///
    /// # Errors
    ///
    /// Fails when the configured `MPU6050` cannot be started.
    pub fn from_config(config: Config) -> Result<Self> {
        let mpu6050 = config.motion.mpu6050.clone();
        let motion = config.motion.device.clone();
        let light = config.light.device.clone();
        let badge = config.badge.spool.clone();

        let mut vault = Self::new(config);
        if let Some(mpu6050) = mpu6050 {
            vault = vault.motion_sensor(open_mpu6050(&mpu6050)?);
        } else if let Some(device) = motion {
            vault = vault.motion_sensor(IioMotion::new(device));
        }
        if let Some(device) = light {
            vault = vault.light_sensor(IioLight::new(device));
        }
        if let Some(spool) = badge {
            vault = vault.badge_reader(SpoolBadgeReader::new(spool));
        }
        Ok(vault)
    }

    /// Sets the motion sensor.
    #[must_use]
    pub fn motion_sensor(mut self, sensor: impl MotionSensor + Send + 'static) -> Self {
        self.motion = Some(Box::new(sensor));
        self
    }

    /// Sets the ambient light sensor.
    #[must_use]
    pub fn light_sensor(mut self, sensor: impl LightSensor + Send + 'static) -> Self {
        self.light = Some(Box::new(sensor));
        self
    }

    /// Sets the badge reader.
    #[must_use]
    pub fn badge_reader(mut self, reader: impl BadgeReader + Send + 'static) -> Self {
        self.badge = Some(Box::new(reader));
        self
    }

    /// Sets the indicator.
    ///
    /// Defaults to a [`LedIndicator`] built from the configuration.
    #[must_use]
    pub fn indicator(mut self, indicator: impl Indicator + Send + Sync + 'static) -> Self {
        self.indicator = Some(Arc::new(indicator));
        self
    }

    /// Binds the listeners and starts every task.
    ///
    /// # Errors
    ///
    /// Fails when the storage root, a listener or the scheduler cannot be
    /// set up.
    pub fn start(self) -> Result<RunningVault> {
        let Self {
            config,
            motion,
            light,
            badge,
            indicator,
        } = self;

        let storage = Arc::new(FsStorage::new(&config.storage.root)?);
        let network = TcpNetwork::bind(
            config.network.bind,
            config.server.control_port,
            config.server.data_port,
        )?
        .advertised(config.network.advertised);
        let control_port = network.control_port()?;
        let data_port = network.data_port()?;
        info!(
            "Serving {} on control port {control_port}, data port {data_port}",
            config.storage.root.display()
        );

        let scheduler = Scheduler::start()?;
        let spawner = scheduler.spawner();
        let stop = Arc::new(AtomicBool::new(false));
        let clock = SystemClock::new();

        let server = config
            .server
            .clone()
            .control_port(control_port)
            .data_port(data_port);
        let mut session = Session::new(server, network, Arc::clone(&storage), clock);
        let session_stop = Arc::clone(&stop);
        let session_task = spawner.spawn_periodic(
            Core::Storage,
            "session",
            Duration::from_millis(config.scheduler.session_period_ms),
            move || {
                if session_stop.load(Ordering::Acquire) {
                    session.shutdown();
                    return TaskFlow::Stop;
                }
                session.tick();
                TaskFlow::Continue
            },
        );

        let indicator: SharedIndicator = match indicator {
            Some(indicator) => indicator,
            None => Arc::new(LedIndicator::new(
                config.indicator.led.as_deref(),
                config.indicator.blink_ms,
            )),
        };
        let coordinator = Arc::new(Coordinator::new());
        let responder = Responder {
            coordinator: Arc::clone(&coordinator),
            spawner: spawner.clone(),
            storage,
            session: session_task.clone(),
            indicator: Arc::clone(&indicator),
            clock,
        };

        let mut detectors = Vec::new();

        if let Some(mut sensor) = motion {
            let mut detector = MotionDetector::new(config.motion.detector);
            let responder = responder.clone();
            let stop = Arc::clone(&stop);
            detectors.push(spawner.spawn_periodic(
                Core::Sensors,
                "motion",
                Duration::from_millis(config.scheduler.motion_period_ms),
                move || {
                    if stop.load(Ordering::Acquire) {
                        return TaskFlow::Stop;
                    }
                    if detector.poll(sensor.as_mut()).is_anomaly() {
                        responder.alert(Trigger::Motion);
                    }
                    TaskFlow::Continue
                },
            ));
        }

        if let Some(mut sensor) = light {
            let mut detector = LightDetector::new(config.light.detector);
            let responder = responder.clone();
            let stop = Arc::clone(&stop);
            detectors.push(spawner.spawn_periodic(
                Core::Sensors,
                "light",
                Duration::from_millis(config.scheduler.light_period_ms),
                move || {
                    if stop.load(Ordering::Acquire) {
                        return TaskFlow::Stop;
                    }
                    if detector.poll(sensor.as_mut()).is_anomaly() {
                        responder.alert(Trigger::Light);
                    }
                    TaskFlow::Continue
                },
            ));
        }

        if let Some(mut reader) = badge {
            let mut detector = BadgeDetector::new(config.badge.detector.clone());
            let coordinator = Arc::clone(&coordinator);
            let indicator = Arc::clone(&indicator);
            let stop = Arc::clone(&stop);
            detectors.push(spawner.spawn_periodic(
                Core::Sensors,
                "badge",
                Duration::from_millis(config.scheduler.badge_period_ms),
                move || {
                    if stop.load(Ordering::Acquire) {
                        return TaskFlow::Stop;
                    }
                    if detector.poll(reader.as_mut()) == BadgeEvent::Authorized {
                        indicator.set(coordinator.toggle_unsecure());
                    }
                    TaskFlow::Continue
                },
            ));
        }

        let advertiser = if config.mdns.enabled {
            match Advertiser::register(&config.mdns, control_port) {
                Ok(advertiser) => Some(advertiser),
                Err(e) => {
                    warn!("Service not advertised: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(RunningVault {
            scheduler,
            stop,
            session_task,
            detectors,
            coordinator,
            advertiser,
            control_port,
            data_port,
        })
    }
}

/// A started appliance.
pub struct RunningVault {
    scheduler: Scheduler,
    stop: Arc<AtomicBool>,
    session_task: TaskHandle,
    detectors: Vec<TaskHandle>,
    coordinator: Arc<Coordinator>,
    advertiser: Option<Advertiser>,
    control_port: u16,
    data_port: u16,
}

impl RunningVault {
    /// Bound control channel port.
    #[must_use]
    pub const fn control_port(&self) -> u16 {
        self.control_port
    }

    /// Bound data channel port.
    #[must_use]
    pub const fn data_port(&self) -> u16 {
        self.data_port
    }

    /// The intrusion response coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// The session task.
    #[must_use]
    pub const fn session_task(&self) -> &TaskHandle {
        &self.session_task
    }

    /// The detector tasks.
    #[must_use]
    pub fn detector_tasks(&self) -> &[TaskHandle] {
        &self.detectors
    }

    /// Stops every task, releasing the connections of the session.
    pub fn shutdown(self) {
        info!("Shutting down");
        self.stop.store(true, Ordering::Release);

        let mut waited = Duration::ZERO;
        while !self.session_task.is_finished() && waited < SHUTDOWN_GRACE {
            std::thread::sleep(SHUTDOWN_POLL);
            waited += SHUTDOWN_POLL;
        }
        if !self.session_task.is_finished() {
            warn!("Session did not stop in time");
        }

        if let Some(advertiser) = self.advertiser {
            advertiser.shutdown();
        }
        self.scheduler.shutdown();
    }
}
