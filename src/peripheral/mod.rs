pub mod adapter;
pub mod advertisement;
pub mod application;
pub mod bluez;
pub mod registrar;
pub mod watcher;

use dbus::Path;
use futures::{channel::oneshot, future::BoxFuture, FutureExt, StreamExt};
use log::{debug, error, info, warn};
use std::{
    any::Any,
    future::Future,
    io,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard},
};
use uuid::Uuid;

use self::{
    adapter::AdapterController,
    advertisement::Advertisement,
    application::Application,
    bluez::BluezBus,
    registrar::{PendingRegistrations, Progress, Registrar},
    watcher::SignalWatcher,
};
use crate::{bus::ManagementBus, gatt::service::Service, Error, ErrorType, PeripheralConfig};

/// Where a [`Peripheral`] is in its session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    /// Registrations are in flight; the event loop is already dispatching.
    Starting,
    /// Both objects are registered and signals are watched.
    Running,
    /// Tearing down subscriptions and registrations.
    Stopping,
}

#[derive(Debug)]
struct Lifecycle {
    state: State,
    stop: Option<oneshot::Sender<()>>,
}

#[derive(Debug)]
struct Session {
    registrar: Registrar,
    watcher: SignalWatcher,
}

/// Why the event loop returned.
#[derive(Debug)]
enum Exit {
    Stopped,
    Interrupted,
    RegistrationFailed,
    /// A dispatch failed; logged, not returned to the caller of `run`.
    Failed(Error),
    /// Returned to the caller of `run` once teardown is done.
    Escalated(Error),
}

type Interrupt = Arc<dyn Fn() -> BoxFuture<'static, io::Result<()>> + Send + Sync>;

/// A BLE peripheral session on one adapter: holds the adapter to its
/// configuration, registers an advertisement and a GATT application, and
/// keeps both registered until stopped.
pub struct Peripheral {
    bus: Arc<dyn ManagementBus>,
    adapter: AdapterController,
    config: PeripheralConfig,
    lifecycle: Mutex<Lifecycle>,
    session: tokio::sync::Mutex<Session>,
    interrupt: Interrupt,
}

impl std::fmt::Debug for Peripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Peripheral")
            .field("adapter", &self.adapter)
            .field("state", &self.state())
            .finish()
    }
}

impl Peripheral {
    /// Connects to the system bus and picks an adapter, `adapter` by name if
    /// given.
    pub async fn new<T: Into<String>>(alias: T, adapter: Option<&str>) -> Result<Self, Error> {
        let mut config = PeripheralConfig::new(alias);
        config.adapter = adapter.map(str::to_owned);
        Peripheral::with_config(config).await
    }

    pub async fn with_config(config: PeripheralConfig) -> Result<Self, Error> {
        let bus = BluezBus::connect(config.bus_timeout)?;
        Peripheral::with_bus(Arc::new(bus), config).await
    }

    pub async fn with_bus(bus: Arc<dyn ManagementBus>, config: PeripheralConfig) -> Result<Self, Error> {
        info!("Creating BLE Peripheral with alias: {}", config.alias);

        let adapter = AdapterController::new(Arc::clone(&bus), config.alias.clone(), config.adapter.as_deref())
            .await
            .map_err(|err| {
                error!("Could not find any adapter implementing GattManager1 + LEAdvertisingManager1 interfaces");
                err
            })?;

        let mut advertisement = Advertisement::new(object_path(config.advertisement_path())?);
        advertisement.add_name(config.alias.clone());
        let application = Application::new(object_path(config.object_path_base.clone())?);

        let registrar = Registrar::new(adapter.object_path.clone(), advertisement, application);

        Ok(Peripheral {
            bus,
            adapter,
            config,
            lifecycle: Mutex::new(Lifecycle {
                state: State::Idle,
                stop: None,
            }),
            session: tokio::sync::Mutex::new(Session {
                registrar,
                watcher: SignalWatcher::new(),
            }),
            interrupt: Arc::new(|| tokio::signal::ctrl_c().boxed()),
        })
    }

    pub fn adapter(&self) -> &AdapterController {
        &self.adapter
    }

    pub fn state(&self) -> State {
        self.lifecycle().state
    }

    /// Takes effect on the next `run`.
    pub fn add_service(&mut self, service: Arc<dyn Service>) {
        self.session.get_mut().registrar.application_mut().add_service(service);
    }

    /// Takes effect on the next `run`.
    pub fn add_advertised_service_uuid(&mut self, uuid: Uuid) {
        self.session.get_mut().registrar.advertisement_mut().add_service_uuid(uuid);
    }

    /// Replaces Ctrl-C as the interrupt a session listens for while
    /// `handle_interrupt` is set. `interrupt` is called once per `run`.
    pub fn set_interrupt<F, Fut>(&mut self, interrupt: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        self.interrupt = Arc::new(move || interrupt().boxed());
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, from: &[State], to: State) {
        let mut lifecycle = self.lifecycle();
        if from.contains(&lifecycle.state) {
            debug!("Peripheral {:?} -> {:?}", lifecycle.state, to);
            lifecycle.state = to;
        }
    }

    /// Runs one session until [`stop`](Peripheral::stop), Ctrl-C (when
    /// enabled) or a failed registration ends it. Subscriptions and
    /// registrations are always torn down before this returns.
    ///
    /// Returns immediately when a session is already active. Only errors
    /// that leave the adapter policy unenforceable are returned: a failed
    /// pre-flight, a rejected signal subscription, or subscriptions the bus
    /// closed mid-session.
    pub async fn run(&self) -> Result<(), Error> {
        let stop = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state != State::Idle {
                debug!("Peripheral already {:?}, ignoring run()", lifecycle.state);
                return Ok(());
            }
            let (sender, receiver) = oneshot::channel();
            lifecycle.state = State::Starting;
            lifecycle.stop = Some(sender);
            receiver
        };

        let mut session = self.session.lock().await;
        let result = self.start(&mut session, stop).await;

        self.transition(&[State::Starting, State::Running], State::Stopping);
        session.watcher.unsubscribe(&self.bus).await;
        session.registrar.unregister(&self.bus).await;

        {
            let mut lifecycle = self.lifecycle();
            lifecycle.stop = None;
            lifecycle.state = State::Idle;
        }
        info!("--- Mainloop finished ---");
        result
    }

    /// Asks a running session to end. The loop honours it at its next
    /// dispatch boundary. No-op while idle.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle();
        match lifecycle.state {
            State::Starting | State::Running => {
                if let Some(stop) = lifecycle.stop.take() {
                    info!("Stopping peripheral");
                    let _ = stop.send(());
                }
            }
            State::Idle | State::Stopping => {}
        }
    }

    async fn start(&self, session: &mut Session, stop: oneshot::Receiver<()>) -> Result<(), Error> {
        self.adapter.enforce().await?;
        self.adapter.disconnect_all().await?;
        let pending = session.registrar.register(&self.bus);

        info!("--- Mainloop started ---");
        let exit = AssertUnwindSafe(self.event_loop(session, pending, stop))
            .catch_unwind()
            .await;

        match exit {
            Ok(Exit::Stopped) => info!("Peripheral stopped"),
            Ok(Exit::Interrupted) => info!("Interrupted, stopping peripheral"),
            Ok(Exit::RegistrationFailed) => warn!("Registration failed, stopping peripheral"),
            Ok(Exit::Failed(err)) => error!("{}", err),
            Ok(Exit::Escalated(err)) => {
                error!("{}", err);
                return Err(err);
            }
            Err(panic) => error!("Event loop panicked: {}", panic_message(&*panic)),
        }
        Ok(())
    }

    async fn event_loop(
        &self,
        session: &mut Session,
        mut pending: PendingRegistrations,
        mut stop: oneshot::Receiver<()>,
    ) -> Exit {
        let Session { registrar, watcher } = session;
        let mut handle_interrupt = self.config.handle_interrupt;
        let mut interrupt = (self.interrupt)();

        loop {
            tokio::select! {
                biased;

                _ = &mut stop => return Exit::Stopped,

                result = &mut interrupt, if handle_interrupt => match result {
                    Ok(()) => return Exit::Interrupted,
                    Err(err) => {
                        warn!("Couldn't listen for Ctrl-C: {}", err);
                        handle_interrupt = false;
                    }
                },

                Some(completion) = pending.next(), if !pending.is_empty() => {
                    match registrar.complete(completion) {
                        Ok(Progress::Waiting) => {}
                        Ok(Progress::Complete) => {
                            if let Err(err) = watcher.subscribe(&self.bus).await {
                                return Exit::Escalated(err);
                            }
                            self.transition(&[State::Starting], State::Running);
                            info!("Peripheral running on {}", self.adapter.name());
                        }
                        Err(_) => return Exit::RegistrationFailed,
                    }
                }

                change = watcher.next_change() => {
                    let change = match change {
                        Some(change) => change,
                        None => {
                            return Exit::Escalated(Error::new(
                                "SignalStreamClosed",
                                "the bus closed the property-change subscriptions",
                                ErrorType::Subscription,
                            ))
                        }
                    };
                    let services = registrar.application().services();
                    if let Err(err) = watcher.dispatch(change, &self.adapter, services).await {
                        return Exit::Failed(err);
                    }
                }
            }
        }
    }
}

fn object_path(path: String) -> Result<Path<'static>, Error> {
    Path::new(path).map_err(|reason| Error::new("InvalidObjectPath", reason, ErrorType::Config))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
