use dbus::Path;
use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt};
use log::{error, info, warn};
use std::{fmt, sync::Arc};

use super::{advertisement::Advertisement, application::Application};
use crate::{bus::ManagementBus, Error, ErrorType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Pending,
    Registered,
    Failed,
}

/// The two objects a session registers with the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registrable {
    Advertisement,
    Application,
}

impl fmt::Display for Registrable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Registrable::Advertisement => write!(f, "advertisement"),
            Registrable::Application => write!(f, "GATT application"),
        }
    }
}

/// Outcome of one registration request.
#[derive(Debug)]
pub struct Completion {
    pub target: Registrable,
    pub result: Result<(), Error>,
}

/// In-flight registration requests. Poll it from the event loop and hand each
/// [`Completion`] back to [`Registrar::complete`].
pub type PendingRegistrations = FuturesUnordered<BoxFuture<'static, Completion>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The other request has not resolved yet.
    Waiting,
    /// Both objects are registered.
    Complete,
}

#[derive(Debug)]
pub struct Registrar {
    adapter: Path<'static>,
    advertisement: Advertisement,
    application: Application,
    advertisement_state: RegistrationState,
    application_state: RegistrationState,
}

impl Registrar {
    pub fn new(adapter: Path<'static>, advertisement: Advertisement, application: Application) -> Self {
        Registrar {
            adapter,
            advertisement,
            application,
            advertisement_state: RegistrationState::Unregistered,
            application_state: RegistrationState::Unregistered,
        }
    }

    pub fn advertisement_mut(&mut self) -> &mut Advertisement {
        &mut self.advertisement
    }

    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn application_mut(&mut self) -> &mut Application {
        &mut self.application
    }

    pub fn state(&self, target: Registrable) -> RegistrationState {
        match target {
            Registrable::Advertisement => self.advertisement_state,
            Registrable::Application => self.application_state,
        }
    }

    fn set_state(&mut self, target: Registrable, state: RegistrationState) {
        match target {
            Registrable::Advertisement => self.advertisement_state = state,
            Registrable::Application => self.application_state = state,
        }
    }

    /// Issues both registration requests without waiting on either.
    pub fn register(&mut self, bus: &Arc<dyn ManagementBus>) -> PendingRegistrations {
        let pending = PendingRegistrations::new();

        info!("Registering Advertisement...");
        self.advertisement_state = RegistrationState::Pending;
        {
            let bus = Arc::clone(bus);
            let adapter = self.adapter.clone();
            let advertisement = self.advertisement.clone();
            pending.push(
                async move {
                    Completion {
                        target: Registrable::Advertisement,
                        result: bus.register_advertisement(&adapter, advertisement).await,
                    }
                }
                .boxed(),
            );
        }

        info!("Registering GATT application...");
        self.application_state = RegistrationState::Pending;
        {
            let bus = Arc::clone(bus);
            let adapter = self.adapter.clone();
            let application = self.application.clone();
            pending.push(
                async move {
                    Completion {
                        target: Registrable::Application,
                        result: bus.register_application(&adapter, application).await,
                    }
                }
                .boxed(),
            );
        }

        pending
    }

    /// Records one outcome. Any failure is returned so the session can abort,
    /// whatever state the other request is in.
    pub fn complete(&mut self, completion: Completion) -> Result<Progress, Error> {
        let Completion { target, result } = completion;
        match result {
            Ok(()) => {
                self.set_state(target, RegistrationState::Registered);
                info!("Registered {}", target);
                if self.advertisement_state == RegistrationState::Registered
                    && self.application_state == RegistrationState::Registered
                {
                    Ok(Progress::Complete)
                } else {
                    Ok(Progress::Waiting)
                }
            }
            Err(err) => {
                self.set_state(target, RegistrationState::Failed);
                error!("Failed to register {}: {}", target, err);
                if target == Registrable::Advertisement {
                    error!("Make sure no device is connected before registering an advertisement!");
                }
                Err(err.with_type(ErrorType::Registration))
            }
        }
    }

    /// Unregisters both objects. Failures, typically because an object never
    /// made it onto the bus, are logged and dropped.
    pub async fn unregister(&mut self, bus: &Arc<dyn ManagementBus>) {
        if let Err(err) = bus
            .unregister_advertisement(&self.adapter, &self.advertisement.object_path)
            .await
        {
            warn!(
                "Couldn't unregister advertisement, maybe it wasn't created. {}",
                err.with_type(ErrorType::Unregistration)
            );
        }
        self.advertisement_state = RegistrationState::Unregistered;

        if let Err(err) = bus
            .unregister_application(&self.adapter, &self.application.object_path)
            .await
        {
            warn!(
                "Couldn't unregister application, maybe it wasn't created. {}",
                err.with_type(ErrorType::Unregistration)
            );
        }
        self.application_state = RegistrationState::Unregistered;

        info!("Peripheral unregistered");
    }
}
